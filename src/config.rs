//! Configuration for the CLI and the demonstration source.
//!
//! Loaded from `resync.toml` when present, every field has a sensible
//! default and CLI flags override file values.
//!
//! | Section      | Purpose                                            |
//! |--------------|----------------------------------------------------|
//! | `[codec]`    | Entry limit, multifile policy, pretty printing     |
//! | `[publish]`  | Base URI, output directory, document name, cadence |
//! | `[simulate]` | Bootstrap size, payloads, event mix and frequency  |

use crate::resource::ChangeKind;
use serde::Deserialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default config file name, looked up in the working directory.
pub const CONFIG_FILE: &str = "resync.toml";

/// Configuration-related errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error when reading `{0}`")]
    Io(PathBuf, #[source] io::Error),

    #[error("config file parsing error")]
    Toml(#[from] toml::de::Error),

    #[error("config validation error: {0}")]
    Validation(String),
}

// ============================================================================
// Root configuration
// ============================================================================

/// Root configuration structure representing resync.toml
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub codec: CodecConfig,
    pub publish: PublishConfig,
    pub simulate: SimulateConfig,
}

impl Config {
    /// Load from an explicit path, or from [`CONFIG_FILE`] when it exists,
    /// or defaults otherwise.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => {
                let default = PathBuf::from(CONFIG_FILE);
                if !default.exists() {
                    return Ok(Self::default());
                }
                default
            }
        };
        let raw = fs::read_to_string(&path).map_err(|e| ConfigError::Io(path.clone(), e))?;
        let config: Self = toml::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.codec.max_entries == 0 {
            return Err(ConfigError::Validation(
                "codec.max_entries must be positive".into(),
            ));
        }
        if self.simulate.frequency <= 0.0 {
            return Err(ConfigError::Validation(
                "simulate.frequency must be positive".into(),
            ));
        }
        if self.simulate.event_types.is_empty() {
            return Err(ConfigError::Validation(
                "simulate.event_types must not be empty".into(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// [codec]
// ============================================================================

/// Sitemap codec policy.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CodecConfig {
    /// Maximum records per document.
    pub max_entries: usize,
    /// Permit multi-document output and sitemapindex input.
    pub allow_multifile: bool,
    /// Indent output documents.
    pub pretty_xml: bool,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            max_entries: 50_000,
            allow_multifile: true,
            pretty_xml: false,
        }
    }
}

// ============================================================================
// [publish]
// ============================================================================

/// Where and how often the demo source publishes itself.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PublishConfig {
    /// Base URI the published documents claim to live under.
    pub base_uri: String,
    /// Local directory the documents are written to.
    pub directory: PathBuf,
    /// Name of the inventory document inside `directory`.
    pub document: String,
    /// Seconds between publication cycles.
    pub interval: u64,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            base_uri: "http://localhost:8888".into(),
            directory: PathBuf::from("public"),
            document: "sitemap.xml".into(),
            interval: 10,
        }
    }
}

// ============================================================================
// [simulate]
// ============================================================================

/// Event type the simulator may pick each tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    Create,
    Update,
    Delete,
}

impl From<EventType> for ChangeKind {
    fn from(event: EventType) -> Self {
        match event {
            EventType::Create => Self::Created,
            EventType::Update => Self::Updated,
            EventType::Delete => Self::Deleted,
        }
    }
}

/// Change simulation parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SimulateConfig {
    /// Resources created at bootstrap.
    pub resources: usize,
    /// Maximum synthetic payload size in bytes.
    pub average_payload: usize,
    /// Events per second.
    pub frequency: f64,
    /// Stop after this many events; endless when absent.
    pub max_events: Option<u64>,
    /// Event mix to draw from, uniformly.
    pub event_types: Vec<EventType>,
}

impl Default for SimulateConfig {
    fn default() -> Self {
        Self {
            resources: 100,
            average_payload: 500,
            frequency: 1.0,
            max_events: None,
            event_types: vec![EventType::Create, EventType::Update, EventType::Delete],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.codec.max_entries, 50_000);
        assert!(config.codec.allow_multifile);
        assert!(!config.codec.pretty_xml);
        assert_eq!(config.publish.document, "sitemap.xml");
        assert_eq!(config.simulate.resources, 100);
        assert_eq!(config.simulate.event_types.len(), 3);
    }

    #[test]
    fn test_load_missing_explicit_path_fails() {
        let err = Config::load(Some(Path::new("/no/such/resync.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Io(..)));
    }

    #[test]
    fn test_load_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("resync.toml");
        let mut f = fs::File::create(&path).unwrap();
        write!(
            f,
            r#"
[codec]
max_entries = 10
pretty_xml = true

[simulate]
event_types = ["create", "delete"]
max_events = 50
"#
        )
        .unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.codec.max_entries, 10);
        assert!(config.codec.pretty_xml);
        assert!(config.codec.allow_multifile); // untouched default
        assert_eq!(
            config.simulate.event_types,
            [EventType::Create, EventType::Delete]
        );
        assert_eq!(config.simulate.max_events, Some(50));
        assert_eq!(config.publish.interval, 10);
    }

    #[test]
    fn test_validation_rejects_zero_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("resync.toml");
        fs::write(&path, "[codec]\nmax_entries = 0\n").unwrap();

        let err = Config::load(Some(&path)).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn test_validation_rejects_bad_frequency() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("resync.toml");
        fs::write(&path, "[simulate]\nfrequency = 0.0\n").unwrap();

        let err = Config::load(Some(&path)).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn test_unknown_event_type_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("resync.toml");
        fs::write(&path, "[simulate]\nevent_types = [\"rename\"]\n").unwrap();

        let err = Config::load(Some(&path)).unwrap_err();
        assert!(matches!(err, ConfigError::Toml(_)));
    }
}
