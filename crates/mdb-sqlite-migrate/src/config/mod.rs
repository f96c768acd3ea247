//! Configuration loading and validation.

mod types;
mod validation;

pub use types::*;

use crate::error::Result;
use std::path::{Path, PathBuf};

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Build a configuration from a source path, with every other setting
    /// at its default.
    pub fn for_paths(
        source_type: SourceKind,
        source: impl Into<PathBuf>,
        target: Option<PathBuf>,
    ) -> Self {
        Config {
            source: SourceConfig {
                r#type: source_type,
                path: source.into(),
                connection_string: None,
                schema: None,
            },
            target: TargetConfig {
                path: target,
                ..TargetConfig::default()
            },
            migration: MigrationConfig::default(),
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }

    /// Effective target path: the configured one, or the source path with
    /// its extension replaced by `.db`.
    pub fn target_path(&self) -> PathBuf {
        match &self.target.path {
            Some(path) => path.clone(),
            None => self.source.path.with_extension("db"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_yaml_defaults() {
        let config: Config = serde_yaml::from_str(
            r#"
source:
  path: ./data/northwind.mdb
"#,
        )
        .unwrap();

        assert_eq!(config.source.r#type, SourceKind::Access);
        assert!(config.source.schema.is_none());
        assert!(config.target.foreign_keys);
        assert!(!config.target.erase);
        assert_eq!(config.migration.progress_interval, 100);
        assert_eq!(config.migration.channel_capacity, 1024);
        assert_eq!(config.target_path(), PathBuf::from("./data/northwind.db"));
    }

    #[test]
    fn test_from_yaml_full() {
        let config = Config::from_yaml(
            r#"
source:
  type: sqlite
  path: in.sqlite
  schema: main
target:
  path: out.db
  erase: true
  foreign_keys: false
migration:
  progress_interval: 500
  channel_capacity: 16
  verbose: true
"#,
        )
        .unwrap();

        assert_eq!(config.source.r#type, SourceKind::Sqlite);
        assert_eq!(config.source.schema.as_deref(), Some("main"));
        assert_eq!(config.target_path(), PathBuf::from("out.db"));
        assert!(config.target.erase);
        assert!(!config.target.foreign_keys);
        assert_eq!(config.migration.progress_interval, 500);
        assert!(config.migration.verbose);
    }

    #[test]
    fn test_from_yaml_rejects_unknown_type() {
        let err = Config::from_yaml("source:\n  type: oracle\n  path: x\n").unwrap_err();
        assert!(matches!(err, crate::error::MigrateError::Yaml(_)));
    }

    #[test]
    fn test_for_paths() {
        let config = Config::for_paths(SourceKind::Sqlite, "a/b.sqlite", None);
        assert_eq!(config.target_path(), PathBuf::from("a/b.db"));
        assert!(config.target.foreign_keys);
    }

    #[test]
    fn test_odbc_connection_string() {
        let mut config = Config::for_paths(SourceKind::Access, "C:/data/nw.mdb", None);
        assert_eq!(
            config.source.odbc_connection_string(),
            "Driver={Microsoft Access Driver (*.mdb, *.accdb)};Dbq=C:/data/nw.mdb;"
        );

        config.source.connection_string = Some("DSN=northwind;PWD=secret".into());
        assert_eq!(config.source.odbc_connection_string(), "DSN=northwind;PWD=secret");
    }
}
