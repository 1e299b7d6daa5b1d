pub mod scheduler;
pub mod types;

pub use scheduler::new_scheduler;
pub use types::{Epvm, RoundRobin, Scheduler, SchedulerType, Scores};
