//! Configuration for QLE
//!
//! Settings come from defaults, an optional JSON file, `QLE_*` environment
//! variables and finally command-line flags, in increasing precedence.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{Error, Result};

/// Default number of records listed by `history`
pub const DEFAULT_HISTORY_LIMIT: usize = 50;

/// Default number of nodes fetched for the lineage graph
pub const DEFAULT_GRAPH_LIMIT: usize = 500;

/// Default number of rows returned by an artifact preview
pub const DEFAULT_PREVIEW_LIMIT: usize = 50;

/// Default SQLite busy timeout in milliseconds
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5000;

/// Where the catalog and engine database lives
///
/// Accepted forms: `:memory:`, `sqlite::memory:`, `sqlite://<path>` or a bare
/// file path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum DatabaseLocation {
    Memory,
    File(PathBuf),
}

impl DatabaseLocation {
    /// Parse a database location string
    pub fn parse(location: &str) -> Result<Self> {
        let location = location.trim();
        if location.is_empty() {
            return Err(Error::Config("empty database location".to_string()));
        }

        let rest = match location.split_once("://") {
            Some(("sqlite", rest)) => rest,
            Some((scheme, _)) => {
                return Err(Error::Config(format!(
                    "unsupported database scheme '{}'",
                    scheme
                )))
            }
            None => location.strip_prefix("sqlite:").unwrap_or(location),
        };

        match rest {
            "" => Err(Error::Config("missing database path".to_string())),
            ":memory:" => Ok(DatabaseLocation::Memory),
            path => Ok(DatabaseLocation::File(PathBuf::from(path))),
        }
    }
}

impl fmt::Display for DatabaseLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatabaseLocation::Memory => write!(f, ":memory:"),
            DatabaseLocation::File(path) => write!(f, "{}", path.display()),
        }
    }
}

impl FromStr for DatabaseLocation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for DatabaseLocation {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        Self::parse(&s)
    }
}

impl From<DatabaseLocation> for String {
    fn from(location: DatabaseLocation) -> Self {
        location.to_string()
    }
}

/// Catalog configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Database holding the catalog and the analytical data
    pub database: DatabaseLocation,
    /// SQLite busy timeout
    pub busy_timeout_ms: u64,
    /// Records listed by `history` when no limit is given
    pub history_limit: usize,
    /// Nodes fetched for the lineage graph
    pub graph_limit: usize,
    /// Rows returned by an artifact preview when no limit is given
    pub preview_limit: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseLocation::File(PathBuf::from("qle.db")),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            history_limit: DEFAULT_HISTORY_LIMIT,
            graph_limit: DEFAULT_GRAPH_LIMIT,
            preview_limit: DEFAULT_PREVIEW_LIMIT,
        }
    }
}

impl Config {
    /// Create a config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a config from a JSON file; missing keys keep their defaults
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)?;
        serde_json::from_str(&json)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }

    /// Override settings from `QLE_*` environment variables
    pub fn apply_env(self) -> Result<Self> {
        self.apply_vars(|key| std::env::var(key).ok())
    }

    fn apply_vars(mut self, var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(location) = var("QLE_DATABASE") {
            self.database = DatabaseLocation::parse(&location)?;
        }
        if let Some(ms) = var("QLE_BUSY_TIMEOUT_MS") {
            self.busy_timeout_ms = parse_number("QLE_BUSY_TIMEOUT_MS", &ms)?;
        }
        if let Some(limit) = var("QLE_HISTORY_LIMIT") {
            self.history_limit = parse_number("QLE_HISTORY_LIMIT", &limit)?;
        }
        if let Some(limit) = var("QLE_PREVIEW_LIMIT") {
            self.preview_limit = parse_number("QLE_PREVIEW_LIMIT", &limit)?;
        }
        Ok(self)
    }

    /// Set the database location
    pub fn database(mut self, database: DatabaseLocation) -> Self {
        self.database = database;
        self
    }

    /// Set the default history limit
    pub fn history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    /// Set the default preview limit
    pub fn preview_limit(mut self, limit: usize) -> Self {
        self.preview_limit = limit;
        self
    }
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::Config(format!("{} must be a number, got '{}'", key, value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_database_location_forms() {
        assert_eq!(
            DatabaseLocation::parse(":memory:").unwrap(),
            DatabaseLocation::Memory
        );
        assert_eq!(
            DatabaseLocation::parse("sqlite::memory:").unwrap(),
            DatabaseLocation::Memory
        );
        assert_eq!(
            DatabaseLocation::parse("sqlite:///var/lib/qle.db").unwrap(),
            DatabaseLocation::File(PathBuf::from("/var/lib/qle.db"))
        );
        assert_eq!(
            DatabaseLocation::parse("data/qle.db").unwrap(),
            DatabaseLocation::File(PathBuf::from("data/qle.db"))
        );
    }

    #[test]
    fn test_database_location_rejects() {
        assert!(DatabaseLocation::parse("").is_err());
        assert!(DatabaseLocation::parse("postgres://localhost/imdb").is_err());
        assert!(DatabaseLocation::parse("sqlite://").is_err());
    }

    #[test]
    fn test_config_from_json_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("qle.json");
        std::fs::write(&path, r#"{"database": ":memory:", "history_limit": 10}"#).unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.database, DatabaseLocation::Memory);
        assert_eq!(config.history_limit, 10);
        assert_eq!(config.preview_limit, DEFAULT_PREVIEW_LIMIT);
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("QLE_DATABASE", "sqlite://lineage.db"),
            ("QLE_PREVIEW_LIMIT", "5"),
        ]
        .into_iter()
        .collect();

        let config = Config::new()
            .apply_vars(|k| vars.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(
            config.database,
            DatabaseLocation::File(PathBuf::from("lineage.db"))
        );
        assert_eq!(config.preview_limit, 5);
        assert_eq!(config.history_limit, DEFAULT_HISTORY_LIMIT);

        let flagged = config.history_limit(20).preview_limit(3);
        assert_eq!((flagged.history_limit, flagged.preview_limit), (20, 3));

        let bad = Config::new().apply_vars(|k| (k == "QLE_HISTORY_LIMIT").then(|| "many".into()));
        assert!(matches!(bad, Err(Error::Config(_))));
    }
}
