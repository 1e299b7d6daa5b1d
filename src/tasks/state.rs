use super::types::State;

/// Legal target states for each source state. `Completed` is terminal and
/// `Failed -> Scheduled` is the only way back from a failure.
pub fn allowed_transitions(src: State) -> &'static [State] {
    match src {
        State::Pending => &[State::Scheduled],
        State::Scheduled => &[State::Scheduled, State::Running, State::Failed],
        State::Running => &[
            State::Scheduled,
            State::Running,
            State::Completed,
            State::Failed,
        ],
        State::Completed => &[],
        State::Failed => &[State::Scheduled],
    }
}

pub fn valid_state_transition(src: &State, dst: &State) -> bool {
    allowed_transitions(*src).contains(dst)
}

#[cfg(test)]
mod tests {
    use super::*;

    const LEGAL: &[(State, State)] = &[
        (State::Pending, State::Scheduled),
        (State::Scheduled, State::Scheduled),
        (State::Scheduled, State::Running),
        (State::Scheduled, State::Failed),
        (State::Running, State::Scheduled),
        (State::Running, State::Running),
        (State::Running, State::Completed),
        (State::Running, State::Failed),
        (State::Failed, State::Scheduled),
    ];

    #[test]
    fn transition_table_is_exact() {
        for src in State::ALL {
            for dst in State::ALL {
                let expected = LEGAL.contains(&(src, dst));
                assert_eq!(
                    valid_state_transition(&src, &dst),
                    expected,
                    "{} -> {}",
                    src,
                    dst
                );
            }
        }
    }

    #[test]
    fn completed_is_terminal() {
        assert!(allowed_transitions(State::Completed).is_empty());
    }

    #[test]
    fn failed_only_recovers_to_scheduled() {
        assert_eq!(allowed_transitions(State::Failed), &[State::Scheduled]);
    }

    #[test]
    fn scheduled_cannot_complete_directly() {
        assert!(!valid_state_transition(&State::Scheduled, &State::Completed));
        assert!(valid_state_transition(&State::Running, &State::Completed));
    }
}
