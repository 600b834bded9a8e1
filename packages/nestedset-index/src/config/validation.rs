//! Configuration validation

use super::error::{ConfigError, ConfigResult};
use super::{IndexConfig, StorageConfig};

/// Trait for validatable configuration objects
pub trait Validatable {
    /// Returns `Ok(())` if valid, `Err(ConfigError)` with details if invalid.
    fn validate(&self) -> ConfigResult<()>;

    /// Get the configuration name for error messages
    fn config_name(&self) -> &'static str {
        "Config"
    }

    /// `Name.field` path reported in validation errors
    fn field_path(&self, field: &str) -> String {
        format!("{}.{}", self.config_name(), field)
    }
}

pub(crate) const PAGE_SIZE_RANGE: (usize, usize) = (1, 100_000);
pub(crate) const BUSY_TIMEOUT_RANGE: (u64, u64) = (0, 600_000);

impl Validatable for IndexConfig {
    fn validate(&self) -> ConfigResult<()> {
        let (min, max) = PAGE_SIZE_RANGE;
        if !(min..=max).contains(&self.page_size) {
            return Err(ConfigError::range(
                self.field_path("page_size"),
                self.page_size,
                min,
                max,
                "Cursor pages must hold at least one row.",
            ));
        }
        self.storage.validate()
    }

    fn config_name(&self) -> &'static str {
        "IndexConfig"
    }
}

impl Validatable for StorageConfig {
    fn validate(&self) -> ConfigResult<()> {
        let (min, max) = BUSY_TIMEOUT_RANGE;
        if !(min..=max).contains(&self.busy_timeout_ms) {
            return Err(ConfigError::range(
                self.field_path("busy_timeout_ms"),
                self.busy_timeout_ms,
                min,
                max,
                "Timeouts above ten minutes hide lock contention.",
            ));
        }
        Ok(())
    }

    fn config_name(&self) -> &'static str {
        "StorageConfig"
    }
}
