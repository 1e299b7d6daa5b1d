use super::types::{Epvm, RoundRobin, Scheduler, SchedulerType, Scores};
use crate::node::Node;
use crate::tasks::types::Task;

pub fn new_scheduler(kind: SchedulerType) -> Box<dyn Scheduler> {
    match kind {
        SchedulerType::RoundRobin => Box::new(RoundRobin::default()),
        SchedulerType::Epvm => Box::new(Epvm::default()),
    }
}

impl Scheduler for RoundRobin {
    fn name(&self) -> &str {
        "roundrobin"
    }

    fn select_candidate_nodes(&self, _task: &Task, nodes: &[Node]) -> Vec<Node> {
        nodes.to_vec()
    }

    fn score(&mut self, _task: &Task, candidates: &[Node]) -> Scores {
        if candidates.is_empty() {
            return Scores::new();
        }

        let chosen = self.next % candidates.len();
        self.next = (chosen + 1) % candidates.len();

        candidates
            .iter()
            .enumerate()
            .map(|(idx, node)| {
                let score = if idx == chosen { 0.1 } else { 1.0 };
                (node.name.clone(), score)
            })
            .collect()
    }
}

fn fits(task: &Task, node: &Node) -> bool {
    let memory = node.memory_allocated.checked_add(task.memory);
    let disk = node.disk_allocated.checked_add(task.disk);
    matches!(memory, Some(m) if m <= node.memory) && matches!(disk, Some(d) if d <= node.disk)
}

fn utilisation(allocated: u64, requested: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (allocated + requested) as f64 / total as f64
}

impl Scheduler for Epvm {
    fn name(&self) -> &str {
        "epvm"
    }

    fn select_candidate_nodes(&self, task: &Task, nodes: &[Node]) -> Vec<Node> {
        nodes.iter().filter(|node| fits(task, node)).cloned().collect()
    }

    fn score(&mut self, task: &Task, candidates: &[Node]) -> Scores {
        candidates
            .iter()
            .map(|node| {
                let memory = utilisation(node.memory_allocated, task.memory, node.memory);
                let disk = utilisation(node.disk_allocated, task.disk, node.disk);
                (
                    node.name.clone(),
                    self.memory_weight * memory + self.disk_weight * disk,
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(name: &str, memory: u64, memory_allocated: u64, disk: u64, disk_allocated: u64) -> Node {
        Node {
            memory,
            memory_allocated,
            disk,
            disk_allocated,
            ..Node::for_worker(name)
        }
    }

    fn schedule(scheduler: &mut dyn Scheduler, task: &Task, nodes: &[Node]) -> Option<String> {
        let candidates = scheduler.select_candidate_nodes(task, nodes);
        if candidates.is_empty() {
            return None;
        }
        let scores = scheduler.score(task, &candidates);
        scheduler.pick(&scores, &candidates).map(|n| n.name)
    }

    #[test]
    fn scheduler_type_parses() {
        assert_eq!("roundrobin".parse::<SchedulerType>(), Ok(SchedulerType::RoundRobin));
        assert_eq!("EPVM".parse::<SchedulerType>(), Ok(SchedulerType::Epvm));
        assert!("greedy".parse::<SchedulerType>().is_err());
        assert_eq!(new_scheduler(SchedulerType::Epvm).name(), "epvm");
    }

    #[test]
    fn round_robin_assigns_task_k_to_worker_k_mod_n() {
        let nodes = vec![
            node("w0:1", 0, 0, 0, 0),
            node("w1:1", 10, 10, 10, 10),
            node("w2:1", 1 << 40, 0, 1 << 40, 0),
        ];
        let mut rr = RoundRobin::default();
        let mut task = Task::default();
        task.memory = u64::MAX;

        for k in 0..10 {
            let picked = schedule(&mut rr, &task, &nodes).unwrap();
            assert_eq!(picked, nodes[k % nodes.len()].name, "task {}", k);
        }
    }

    #[test]
    fn round_robin_with_no_nodes_picks_nothing() {
        let mut rr = RoundRobin::default();
        assert!(schedule(&mut rr, &Task::default(), &[]).is_none());
    }

    #[test]
    fn epvm_filters_nodes_without_capacity() {
        let nodes = vec![
            node("full-mem:1", 1000, 900, 1000, 0),
            node("full-disk:1", 1000, 0, 1000, 950),
            node("ok:1", 1000, 500, 1000, 500),
        ];
        let task = Task {
            memory: 200,
            disk: 100,
            ..Default::default()
        };

        let epvm = Epvm::default();
        let candidates = epvm.select_candidate_nodes(&task, &nodes);
        let names: Vec<_> = candidates.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, vec!["ok:1"]);
    }

    #[test]
    fn epvm_exact_fit_is_a_candidate() {
        let nodes = vec![node("exact:1", 1000, 800, 1000, 900)];
        let task = Task {
            memory: 200,
            disk: 100,
            ..Default::default()
        };
        assert_eq!(Epvm::default().select_candidate_nodes(&task, &nodes).len(), 1);
    }

    #[test]
    fn epvm_returns_none_when_nothing_fits() {
        let nodes = vec![node("small:1", 100, 0, 100, 0)];
        let task = Task {
            memory: 101,
            ..Default::default()
        };
        assert!(schedule(&mut Epvm::default(), &task, &nodes).is_none());
    }

    #[test]
    fn epvm_prefers_more_free_memory() {
        let nodes = vec![
            node("busy:1", 1000, 600, 1000, 100),
            node("idle:1", 1000, 100, 1000, 100),
        ];
        let task = Task {
            memory: 100,
            disk: 10,
            ..Default::default()
        };
        assert_eq!(
            schedule(&mut Epvm::default(), &task, &nodes).as_deref(),
            Some("idle:1")
        );
    }

    #[test]
    fn epvm_ties_go_to_first_candidate() {
        let nodes = vec![
            node("a:1", 1000, 100, 1000, 100),
            node("b:1", 1000, 100, 1000, 100),
            node("c:1", 1000, 100, 1000, 100),
        ];
        let task = Task {
            memory: 10,
            disk: 10,
            ..Default::default()
        };
        for _ in 0..5 {
            assert_eq!(
                schedule(&mut Epvm::default(), &task, &nodes).as_deref(),
                Some("a:1")
            );
        }
    }

    #[test]
    fn epvm_score_is_weighted_projected_utilisation() {
        let nodes = vec![node("n:1", 1000, 250, 2000, 500)];
        let task = Task {
            memory: 250,
            disk: 500,
            ..Default::default()
        };
        let mut epvm = Epvm {
            memory_weight: 0.75,
            disk_weight: 0.25,
        };
        let scores = epvm.score(&task, &nodes);
        let score = scores["n:1"];
        assert!((score - (0.75 * 0.5 + 0.25 * 0.5)).abs() < 1e-9);
    }
}
