use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::node::Node;
use crate::tasks::types::Task;

/// Node id (name) to score. Lower is better.
pub type Scores = HashMap<String, f64>;

pub trait Scheduler: Send + Sync {
    fn name(&self) -> &str;

    /// Nodes able to host `task`.
    fn select_candidate_nodes(&self, task: &Task, nodes: &[Node]) -> Vec<Node>;

    fn score(&mut self, task: &Task, candidates: &[Node]) -> Scores;

    /// Lowest-scoring candidate; ties go to the earliest in `candidates`.
    fn pick(&self, scores: &Scores, candidates: &[Node]) -> Option<Node> {
        let mut best: Option<(&Node, f64)> = None;
        for node in candidates {
            let Some(&score) = scores.get(&node.name) else {
                continue;
            };
            match best {
                Some((_, lowest)) if score >= lowest => {}
                _ => best = Some((node, score)),
            }
        }
        best.map(|(node, _)| node.clone())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SchedulerType {
    #[default]
    RoundRobin,
    Epvm,
}

impl fmt::Display for SchedulerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchedulerType::RoundRobin => write!(f, "roundrobin"),
            SchedulerType::Epvm => write!(f, "epvm"),
        }
    }
}

impl FromStr for SchedulerType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "roundrobin" | "round-robin" => Ok(SchedulerType::RoundRobin),
            "epvm" => Ok(SchedulerType::Epvm),
            other => Err(format!(
                "unknown scheduler '{}' (expected \"roundrobin\" or \"epvm\")",
                other
            )),
        }
    }
}

/// Rotates through every node in list order, ignoring load.
#[derive(Debug, Clone, Default)]
pub struct RoundRobin {
    pub next: usize,
}

/// Load-aware scheduler: prefers the node with the lowest projected memory
/// and disk utilisation after placement.
#[derive(Debug, Clone)]
pub struct Epvm {
    pub memory_weight: f64,
    pub disk_weight: f64,
}

impl Default for Epvm {
    fn default() -> Self {
        Epvm {
            memory_weight: 0.5,
            disk_weight: 0.5,
        }
    }
}
