use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::config::ManagerConfig;
use crate::node::Node;
use crate::queue::Queue;
use crate::scheduler::Scheduler;
use crate::store::{Store, StoreError};
use crate::tasks::types::{Task, TaskEvent};

pub struct Manager {
    pub pending: Queue<TaskEvent>,
    pub task_db: Box<dyn Store<Task>>,
    pub event_db: Box<dyn Store<TaskEvent>>,
    pub workers: Vec<String>,
    pub nodes: RwLock<Vec<Node>>,
    pub assignments: Mutex<Assignments>,
    pub scheduler: Mutex<Box<dyn Scheduler>>,
    pub config: ManagerConfig,
    pub(crate) client: reqwest::Client,
    /// Held for every read-modify-write of a task record.
    pub(crate) records: Mutex<()>,
}

pub struct ManagerServer {
    pub address: String,
    pub port: u16,
    pub manager: Arc<Manager>,
}

/// Worker to tasks and task to worker, always changed together. A task keeps
/// its worker for life; restarts go back to it.
#[derive(Debug, Default)]
pub struct Assignments {
    worker_tasks: HashMap<String, Vec<Uuid>>,
    task_worker: HashMap<Uuid, String>,
}

impl Assignments {
    pub fn new(workers: &[String]) -> Self {
        Assignments {
            worker_tasks: workers.iter().map(|w| (w.clone(), Vec::new())).collect(),
            task_worker: HashMap::new(),
        }
    }

    /// Records the assignment. Returns false, changing nothing, if the task
    /// already belongs to a worker.
    pub fn assign(&mut self, task_id: Uuid, worker: &str) -> bool {
        if self.task_worker.contains_key(&task_id) {
            return false;
        }
        self.worker_tasks
            .entry(worker.to_string())
            .or_default()
            .push(task_id);
        self.task_worker.insert(task_id, worker.to_string());
        true
    }

    /// Undoes an assignment whose dispatch never reached the worker.
    pub fn unassign(&mut self, task_id: &Uuid) -> Option<String> {
        let worker = self.task_worker.remove(task_id)?;
        if let Some(tasks) = self.worker_tasks.get_mut(&worker) {
            tasks.retain(|id| id != task_id);
        }
        Some(worker)
    }

    pub fn worker_for(&self, task_id: &Uuid) -> Option<&str> {
        self.task_worker.get(task_id).map(String::as_str)
    }

    pub fn tasks_for(&self, worker: &str) -> &[Uuid] {
        self.worker_tasks
            .get(worker)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.task_worker.len()
    }

    pub fn is_empty(&self) -> bool {
        self.task_worker.is_empty()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ManagerError {
    #[error("Could not reach worker {worker}: {source}")]
    Transport {
        worker: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Could not decode response from worker {worker}: {source}")]
    Decode {
        worker: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Worker {worker} rejected request ({status}): {message}")]
    WorkerRejected {
        worker: String,
        status: u16,
        message: String,
    },

    #[error("No available candidate for task {0}")]
    NoCandidates(Uuid),

    #[error("Task {0} not found")]
    TaskNotFound(Uuid),

    #[error("Task {0} is not assigned to a worker")]
    Unassigned(Uuid),

    #[error("Task {0} has no host port for its health check")]
    NoHostPort(Uuid),

    #[error("Health check for task {task_id} failed: {source}")]
    HealthCheck {
        task_id: Uuid,
        #[source]
        source: reqwest::Error,
    },

    #[error("Health check for task {task_id} returned status {status}")]
    Unhealthy { task_id: Uuid, status: u16 },

    #[error("HTTP client error: {0}")]
    Client(#[source] reqwest::Error),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl ManagerError {
    /// The request never got an answer from the worker.
    pub fn is_transport(&self) -> bool {
        matches!(self, ManagerError::Transport { .. })
    }
}

pub type ManagerResult<T> = Result<T, ManagerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assign_updates_both_directions() {
        let workers = vec!["w1:1".to_string(), "w2:1".to_string()];
        let mut assignments = Assignments::new(&workers);
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        assert!(assignments.assign(a, "w1:1"));
        assert!(assignments.assign(b, "w2:1"));

        assert_eq!(assignments.worker_for(&a), Some("w1:1"));
        assert_eq!(assignments.worker_for(&b), Some("w2:1"));
        assert_eq!(assignments.tasks_for("w1:1"), &[a]);
        assert_eq!(assignments.tasks_for("w2:1"), &[b]);
        assert_eq!(assignments.len(), 2);
    }

    #[test]
    fn a_task_is_never_reassigned() {
        let mut assignments = Assignments::new(&["w1:1".to_string(), "w2:1".to_string()]);
        let id = Uuid::new_v4();
        assert!(assignments.assign(id, "w1:1"));
        assert!(!assignments.assign(id, "w2:1"));

        assert_eq!(assignments.worker_for(&id), Some("w1:1"));
        assert!(assignments.tasks_for("w2:1").is_empty());
    }

    #[test]
    fn unassign_clears_both_directions() {
        let mut assignments = Assignments::new(&["w1:1".to_string()]);
        let id = Uuid::new_v4();
        assignments.assign(id, "w1:1");

        assert_eq!(assignments.unassign(&id).as_deref(), Some("w1:1"));
        assert!(assignments.worker_for(&id).is_none());
        assert!(assignments.tasks_for("w1:1").is_empty());
        assert!(assignments.is_empty());
        assert!(assignments.unassign(&id).is_none());
    }

    #[test]
    fn unknown_worker_has_no_tasks() {
        let assignments = Assignments::default();
        assert!(assignments.tasks_for("nowhere:1").is_empty());
    }
}
