pub mod memory;
pub mod sqlite;
pub mod types;

use std::path::Path;

use serde::{Serialize, de::DeserializeOwned};

pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;
pub use types::{Store, StoreError, StoreResult, StoreType};

/// Opens the backend named by `kind`. `file` and `bucket` are only used by
/// the persistent backend.
pub fn open_store<T>(kind: StoreType, file: &Path, bucket: &str) -> StoreResult<Box<dyn Store<T>>>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    match kind {
        StoreType::Memory => Ok(Box::new(InMemoryStore::new())),
        StoreType::Persistent => Ok(Box::new(SqliteStore::open(file, bucket)?)),
    }
}
