pub mod api;
pub mod manager;
pub mod types;

pub use manager::{health_check_tasks, process_tasks, reconcile_tasks, refresh_node_stats};
pub use types::{Assignments, Manager, ManagerError, ManagerResult, ManagerServer};
