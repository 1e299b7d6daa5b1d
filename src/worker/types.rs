use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};

use crate::config::WorkerConfig;
use crate::queue::Queue;
use crate::store::{Store, StoreError};
use crate::tasks::types::{Executor, ExecutorError, State, Task};

pub struct Worker {
    pub name: String,
    pub queue: Queue<Task>,
    pub db: Box<dyn Store<Task>>,
    pub stats: RwLock<Option<SystemStats>>,
    pub config: WorkerConfig,
    pub(crate) executor: Arc<dyn Executor>,
    pub(crate) sysinfo: Mutex<sysinfo::System>,
    /// Held for every read-modify-write of a task record.
    pub(crate) records: Mutex<()>,
}

/// Host resource snapshot reported on `GET /stats`. Sizes are in bytes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemStats {
    pub cpu_usage: f32,
    pub total_cpus: u64,
    pub total_memory: u64,
    pub used_memory: u64,
    pub total_swap: u64,
    pub used_swap: u64,
    pub total_disk: u64,
    pub used_disk: u64,
    pub system_name: String,
    pub hostname: String,
    pub task_count: u64,
}

pub struct TaskServer {
    pub worker: Arc<Worker>,
    pub address: String,
    pub port: u16,
}

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: State, to: State },

    #[error("Invalid target state {0} for task {1}")]
    InvalidTargetState(State, uuid::Uuid),

    #[error("Task {0} has no container to stop")]
    MissingContainerId(uuid::Uuid),

    #[error("Executor error: {0}")]
    Executor(#[from] ExecutorError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

pub type WorkerResult<T> = Result<T, WorkerError>;
