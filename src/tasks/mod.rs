pub mod docker;
pub mod state;
pub mod task;
pub mod types;

pub use state::valid_state_transition;
pub use task::new_config;
pub use types::{
    Config, DockerClient, DockerResult, ErrResponse, Executor, ExecutorError, ExecutorResult,
    InspectResult, State, Task, TaskEvent,
};
