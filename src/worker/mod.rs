pub mod api;
pub mod stats;
pub mod types;
pub mod worker;

pub use types::{SystemStats, TaskServer, Worker, WorkerError, WorkerResult};
pub use worker::{collect_stats, reconcile_tasks, run_tasks};
