//! Configuration validation.

use super::{Config, SourceKind};
use crate::error::{MigrateError, Result};

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    // Source validation
    if config.source.path.as_os_str().is_empty() && config.source.connection_string.is_none() {
        return Err(MigrateError::Config("source.path is required".into()));
    }
    if config.source.r#type == SourceKind::Access && !cfg!(feature = "access") {
        return Err(MigrateError::Config(
            "source.type 'access' requires the 'access' feature (ODBC support)".into(),
        ));
    }
    if config.source.r#type == SourceKind::Sqlite && config.source.connection_string.is_some() {
        return Err(MigrateError::Config(
            "source.connection_string is only supported for 'access' sources".into(),
        ));
    }

    // Target validation
    let target = config.target_path();
    if target.as_os_str().is_empty() {
        return Err(MigrateError::Config("target.path is required".into()));
    }

    // Cannot migrate onto the source file
    if target == config.source.path {
        return Err(MigrateError::Config(
            "source and target cannot be the same file".into(),
        ));
    }

    // Migration config validation
    if config.migration.progress_interval == 0 {
        return Err(MigrateError::Config(
            "migration.progress_interval must be at least 1".into(),
        ));
    }
    if config.migration.channel_capacity == 0 {
        return Err(MigrateError::Config(
            "migration.channel_capacity must be at least 1".into(),
        ));
    }

    Ok(())
}
