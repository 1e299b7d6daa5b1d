use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::scheduler::SchedulerType;
use crate::store::StoreType;

/// Settings for the control node.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    pub host: String,
    pub port: u16,
    /// Worker addresses in `host:port` form. Fixed for the manager's lifetime.
    pub workers: Vec<String>,
    pub scheduler: SchedulerType,
    pub store: StoreType,
    /// Directory holding `tasks.db` and `events.db` for the persistent store.
    pub data_dir: PathBuf,
    pub dispatch_interval: Duration,
    pub update_interval: Duration,
    pub health_check_interval: Duration,
    pub node_stats_interval: Duration,
    /// Automatic restarts allowed per task.
    pub max_restarts: u32,
    /// Timeout on every outbound HTTP call (dispatch, reconcile, health checks).
    pub request_timeout: Duration,
    pub stats_retries: u32,
    pub stats_backoff: Duration,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5555,
            workers: vec!["localhost:5556".to_string()],
            scheduler: SchedulerType::RoundRobin,
            store: StoreType::Memory,
            data_dir: PathBuf::from("."),
            dispatch_interval: Duration::from_secs(10),
            update_interval: Duration::from_secs(15),
            health_check_interval: Duration::from_secs(60),
            node_stats_interval: Duration::from_secs(15),
            max_restarts: 3,
            request_timeout: Duration::from_secs(10),
            stats_retries: 3,
            stats_backoff: Duration::from_secs(5),
        }
    }
}

impl ManagerConfig {
    pub fn new(workers: Vec<String>) -> Self {
        Self {
            workers,
            ..Default::default()
        }
    }

    pub fn with_scheduler(mut self, scheduler: SchedulerType) -> Self {
        self.scheduler = scheduler;
        self
    }

    pub fn with_store(mut self, store: StoreType, data_dir: impl AsRef<Path>) -> Self {
        self.store = store;
        self.data_dir = data_dir.as_ref().to_path_buf();
        self
    }

    pub fn task_db_path(&self) -> PathBuf {
        self.data_dir.join("tasks.db")
    }

    pub fn event_db_path(&self) -> PathBuf {
        self.data_dir.join("events.db")
    }
}

/// Settings for an execution node.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub name: String,
    pub host: String,
    pub port: u16,
    pub store: StoreType,
    pub data_dir: PathBuf,
    /// Tick of the execution loop; a short interval approximates continuous mode.
    pub run_interval: Duration,
    pub update_interval: Duration,
    pub stats_interval: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            name: "worker-1".to_string(),
            host: "0.0.0.0".to_string(),
            port: 5556,
            store: StoreType::Memory,
            data_dir: PathBuf::from("."),
            run_interval: Duration::from_secs(10),
            update_interval: Duration::from_secs(15),
            stats_interval: Duration::from_secs(15),
        }
    }
}

impl WorkerConfig {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn task_db_path(&self) -> PathBuf {
        self.data_dir.join(format!("{}_tasks.db", self.name))
    }
}
