use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use bollard::Docker;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum State {
    #[default]
    Pending,
    Scheduled,
    Running,
    Completed,
    Failed,
}

impl State {
    pub const ALL: [State; 5] = [
        State::Pending,
        State::Scheduled,
        State::Running,
        State::Completed,
        State::Failed,
    ];
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            State::Pending => "Pending",
            State::Scheduled => "Scheduled",
            State::Running => "Running",
            State::Completed => "Completed",
            State::Failed => "Failed",
        };
        write!(f, "{}", name)
    }
}

/// A unit of work. Everything but `id` is mutated in place by whichever side
/// holds the authoritative copy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Task {
    pub id: Uuid,
    pub container_id: Option<String>,
    pub name: String,
    pub state: State,
    pub image: String,
    pub cpu: f64,
    pub memory: u64,
    pub disk: u64,
    pub env: Vec<String>,
    pub exposed_ports: Vec<String>,
    /// Observed bindings, container port ("80/tcp") to host port.
    pub host_ports: BTreeMap<String, String>,
    pub restart_policy: String,
    pub start_time: Option<DateTime<Utc>>,
    pub finish_time: Option<DateTime<Utc>>,
    pub health_check: String,
    pub restart_count: u32,
}

/// Desired-state command carrying a snapshot of the task. Never mutated once
/// recorded in the event store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TaskEvent {
    pub id: Uuid,
    pub state: State,
    pub timestamp: DateTime<Utc>,
    pub task: Task,
}

/// Error body returned by both HTTP surfaces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrResponse {
    #[serde(rename = "HTTPStatusCode")]
    pub http_status_code: u16,
    #[serde(rename = "Message")]
    pub message: String,
}

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub name: String,
    pub exposed_ports: Vec<String>,
    pub image: String,
    pub cpu: f64,
    pub memory: i64,
    pub disk: i64,
    pub env: Vec<String>,
    pub restart_policy: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DockerResult {
    pub container_id: String,
    pub action: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct InspectResult {
    pub status: String,
    pub host_ports: BTreeMap<String, String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    #[error("Docker client error: {0}")]
    Docker(#[from] bollard::errors::Error),

    #[error("Image pull failed for {image}: {message}")]
    ImagePull { image: String, message: String },

    #[error("Executor error: {0}")]
    Other(String),
}

pub type ExecutorResult<T> = Result<T, ExecutorError>;

/// The runtime that actually starts, stops and inspects workloads.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn run(&self, config: &Config) -> ExecutorResult<DockerResult>;

    async fn stop(&self, container_id: &str) -> ExecutorResult<DockerResult>;

    async fn inspect(&self, container_id: &str) -> ExecutorResult<InspectResult>;
}

#[derive(Debug, Clone)]
pub struct DockerClient {
    pub client: Docker,
}
