pub mod config;
pub mod manager;
pub mod node;
pub mod queue;
pub mod scheduler;
pub mod shutdown;
pub mod store;
pub mod tasks;
pub mod worker;
