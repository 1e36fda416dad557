use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::anyhow;

use crate::storage::{error::StorageError, operations::Storage};

pub mod db;
pub mod error;
pub mod operations;
pub(crate) mod schema;

/// Registry handle shared between request handlers
pub type SharedStorage = Arc<Mutex<Storage>>;

pub fn shared(storage: Storage) -> SharedStorage {
    Arc::new(Mutex::new(storage))
}

pub fn lock(storage: &SharedStorage) -> Result<MutexGuard<'_, Storage>, StorageError> {
    storage.lock().map_err(|e| {
        StorageError::Internal(anyhow!("Could not access blobdeck storage under lock: {e}"))
    })
}
