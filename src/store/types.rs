use std::fmt;
use std::str::FromStr;

use serde::{Serialize, de::DeserializeOwned};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Lock error: {0}")]
    Lock(String),

    #[error("Invalid record set name: {0}")]
    InvalidBucket(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Key-value store of entities keyed by their string identifier. One record
/// per key, last write wins.
pub trait Store<T>: Send + Sync
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync,
{
    fn put(&self, key: &str, value: &T) -> StoreResult<()>;

    fn get(&self, key: &str) -> StoreResult<Option<T>>;

    fn list(&self) -> StoreResult<Vec<T>>;

    fn count(&self) -> StoreResult<usize>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StoreType {
    #[default]
    Memory,
    Persistent,
}

impl fmt::Display for StoreType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreType::Memory => write!(f, "memory"),
            StoreType::Persistent => write!(f, "persistent"),
        }
    }
}

impl FromStr for StoreType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Ok(StoreType::Memory),
            "persistent" | "sqlite" => Ok(StoreType::Persistent),
            other => Err(format!(
                "unknown store type '{}' (expected \"memory\" or \"persistent\")",
                other
            )),
        }
    }
}
