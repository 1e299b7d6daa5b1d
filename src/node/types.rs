use serde::{Deserialize, Serialize};

use crate::worker::types::SystemStats;

/// A worker as the manager sees it. Capacity and allocation come from the
/// worker's last reported stats.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub name: String,
    pub ip: String,
    pub api: String,
    pub role: String,
    pub cores: u64,
    pub memory: u64,
    pub memory_allocated: u64,
    pub disk: u64,
    pub disk_allocated: u64,
    pub stats: Option<SystemStats>,
    pub task_count: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    #[error("Request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Invalid status code from {url}: {status}")]
    Status { url: String, status: u16 },

    #[error("Could not decode stats from node {node}: {source}")]
    Decode {
        node: String,
        #[source]
        source: reqwest::Error,
    },
}

pub type NodeResult<T> = Result<T, NodeError>;
