//! Storage Infrastructure Layer
//!
//! Record store backends for the `RecordStore` port

pub mod memory_store;
pub use memory_store::InMemoryRecordStore;

#[cfg(feature = "sqlite")]
pub mod sqlite_store;
#[cfg(feature = "sqlite")]
pub use sqlite_store::SqliteRecordStore;

use std::sync::Arc;

use crate::config::{Backend, StorageConfig};
use crate::domain::RecordStore;
use crate::error::{ErrorKind, IndexError, Result};

/// Open the backend named by `config`
pub fn open_store(config: &StorageConfig) -> Result<Arc<dyn RecordStore>> {
    match config.backend {
        Backend::Memory => Ok(Arc::new(InMemoryRecordStore::new())),
        #[cfg(feature = "sqlite")]
        Backend::Sqlite => Ok(Arc::new(SqliteRecordStore::from_config(config)?)),
        #[cfg(not(feature = "sqlite"))]
        Backend::Sqlite => Err(IndexError::new(
            ErrorKind::Config,
            "SQLite backend requested but the `sqlite` feature is disabled",
        )),
    }
}
