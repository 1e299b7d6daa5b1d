use std::collections::HashMap;
use std::sync::RwLock;

use serde::{Serialize, de::DeserializeOwned};

use super::types::{Store, StoreError, StoreResult};

/// Volatile backend; contents are lost with the process.
#[derive(Debug)]
pub struct InMemoryStore<T> {
    db: RwLock<HashMap<String, T>>,
}

impl<T> Default for InMemoryStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> InMemoryStore<T> {
    pub fn new() -> Self {
        InMemoryStore {
            db: RwLock::new(HashMap::new()),
        }
    }
}

impl<T> Store<T> for InMemoryStore<T>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync,
{
    fn put(&self, key: &str, value: &T) -> StoreResult<()> {
        let mut db = self
            .db
            .write()
            .map_err(|e| StoreError::Lock(e.to_string()))?;
        db.insert(key.to_string(), value.clone());
        Ok(())
    }

    fn get(&self, key: &str) -> StoreResult<Option<T>> {
        let db = self.db.read().map_err(|e| StoreError::Lock(e.to_string()))?;
        Ok(db.get(key).cloned())
    }

    fn list(&self) -> StoreResult<Vec<T>> {
        let db = self.db.read().map_err(|e| StoreError::Lock(e.to_string()))?;
        Ok(db.values().cloned().collect())
    }

    fn count(&self) -> StoreResult<usize> {
        let db = self.db.read().map_err(|e| StoreError::Lock(e.to_string()))?;
        Ok(db.len())
    }
}
