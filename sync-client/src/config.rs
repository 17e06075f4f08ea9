//! Configuration loading for the sync engine.
//!
//! Configuration is loaded from a TOML file (for example `notesync.toml`).
//! Every section and every field is optional.

use notesync_types::ResourceKind;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration for the sync engine.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SyncConfig {
    /// Queue persistence.
    #[serde(default)]
    pub queue: QueueConfig,
    /// Outbound dispatch.
    #[serde(default)]
    pub dispatch: DispatchConfig,
    /// Sync response reconciliation.
    #[serde(default)]
    pub reconcile: ReconcileConfig,
    /// Realtime change notifications.
    #[serde(default)]
    pub realtime: RealtimeConfig,
    /// Periodic polling.
    #[serde(default)]
    pub polling: PollingConfig,
}

/// Queue persistence configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueueConfig {
    /// Directory for per-account queue mirror files. Queues are kept in
    /// memory only when unset.
    pub data_dir: Option<PathBuf>,
}

/// Outbound dispatch configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DispatchConfig {
    /// Fixed delay before retrying a transient failure (default: 5000).
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Fail loudly on HTTP 400 instead of dropping the entry
    /// (default: on in debug builds).
    #[serde(default = "default_strict_bad_request")]
    pub strict_bad_request: bool,
}

/// Reconciliation configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ReconcileConfig {
    /// Entities larger than this are not stored (default: 2MB).
    #[serde(default = "default_max_entity_bytes")]
    pub max_entity_bytes: usize,
}

/// Realtime channel configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RealtimeConfig {
    /// Open a realtime channel per account (default: true).
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Added to the reconnect delay after each failure (default: 5000).
    #[serde(default = "default_backoff_step_ms")]
    pub backoff_step_ms: u64,
    /// Upper bound of the reconnect delay (default: 60000).
    #[serde(default = "default_backoff_ceiling_ms")]
    pub backoff_ceiling_ms: u64,
}

/// Poll period for one resource kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct PollPeriod {
    /// Period in normal mode.
    pub normal_ms: u64,
    /// Period in fast mode.
    pub fast_ms: u64,
}

/// Periodic polling configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PollingConfig {
    /// Poll at all (default: true).
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Use the fast periods (default: false).
    #[serde(default)]
    pub fast_mode: bool,
    /// Primary notes (default: 60s, fast 15s).
    #[serde(default = "default_notes_period")]
    pub notes: PollPeriod,
    /// Note references (default: 5min, fast 1min).
    #[serde(default = "default_note_references_period")]
    pub note_references: PollPeriod,
    /// Secondary-source notes (default: 5min, fast 1min).
    #[serde(default = "default_secondary_notes_period")]
    pub secondary_notes: PollPeriod,
    /// Meeting notes (default: 10min, fast 2min).
    #[serde(default = "default_meeting_notes_period")]
    pub meeting_notes: PollPeriod,
}

// Default value functions
fn default_retry_delay_ms() -> u64 {
    5000
}

fn default_strict_bad_request() -> bool {
    cfg!(debug_assertions)
}

fn default_max_entity_bytes() -> usize {
    2 * 1024 * 1024 // 2MB
}

fn default_enabled() -> bool {
    true
}

fn default_backoff_step_ms() -> u64 {
    5000
}

fn default_backoff_ceiling_ms() -> u64 {
    60_000
}

fn default_notes_period() -> PollPeriod {
    PollPeriod {
        normal_ms: 60_000,
        fast_ms: 15_000,
    }
}

fn default_note_references_period() -> PollPeriod {
    PollPeriod {
        normal_ms: 5 * 60_000,
        fast_ms: 60_000,
    }
}

fn default_secondary_notes_period() -> PollPeriod {
    default_note_references_period()
}

fn default_meeting_notes_period() -> PollPeriod {
    PollPeriod {
        normal_ms: 10 * 60_000,
        fast_ms: 2 * 60_000,
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            retry_delay_ms: default_retry_delay_ms(),
            strict_bad_request: default_strict_bad_request(),
        }
    }
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            max_entity_bytes: default_max_entity_bytes(),
        }
    }
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            backoff_step_ms: default_backoff_step_ms(),
            backoff_ceiling_ms: default_backoff_ceiling_ms(),
        }
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            fast_mode: false,
            notes: default_notes_period(),
            note_references: default_note_references_period(),
            secondary_notes: default_secondary_notes_period(),
            meeting_notes: default_meeting_notes_period(),
        }
    }
}

impl DispatchConfig {
    /// Retry delay as a duration.
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

impl RealtimeConfig {
    /// Backoff step as a duration.
    pub fn backoff_step(&self) -> Duration {
        Duration::from_millis(self.backoff_step_ms)
    }

    /// Backoff ceiling as a duration.
    pub fn backoff_ceiling(&self) -> Duration {
        Duration::from_millis(self.backoff_ceiling_ms)
    }
}

impl PollingConfig {
    /// Configured periods for `kind`.
    pub fn periods(&self, kind: ResourceKind) -> PollPeriod {
        match kind {
            ResourceKind::Notes => self.notes,
            ResourceKind::NoteReferences => self.note_references,
            ResourceKind::SecondaryNotes => self.secondary_notes,
            ResourceKind::MeetingNotes => self.meeting_notes,
        }
    }

    /// Effective period for `kind` in the given mode.
    pub fn period(&self, kind: ResourceKind, fast: bool) -> Duration {
        let periods = self.periods(kind);
        Duration::from_millis(if fast {
            periods.fast_ms
        } else {
            periods.normal_ms
        })
    }
}

impl SyncConfig {
    /// Load configuration from a TOML file and validate it.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        let config: SyncConfig = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check values that parse but cannot work.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.dispatch.retry_delay_ms == 0 {
            return Err(ConfigError::Invalid(
                "dispatch.retry_delay_ms must be positive".into(),
            ));
        }
        if self.reconcile.max_entity_bytes == 0 {
            return Err(ConfigError::Invalid(
                "reconcile.max_entity_bytes must be positive".into(),
            ));
        }
        if self.realtime.backoff_step_ms > self.realtime.backoff_ceiling_ms {
            return Err(ConfigError::Invalid(format!(
                "realtime.backoff_step_ms ({}) exceeds backoff_ceiling_ms ({})",
                self.realtime.backoff_step_ms, self.realtime.backoff_ceiling_ms
            )));
        }
        for kind in ResourceKind::ALL {
            let periods = self.polling.periods(kind);
            if periods.normal_ms == 0 || periods.fast_ms == 0 {
                return Err(ConfigError::Invalid(format!(
                    "polling period for {} must be positive",
                    kind
                )));
            }
        }
        Ok(())
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },
    /// Parsed, but a value is out of range.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config_is_valid() {
        let config = SyncConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.dispatch.retry_delay_ms, 5000);
        assert_eq!(config.reconcile.max_entity_bytes, 2 * 1024 * 1024);
        assert_eq!(config.realtime.backoff_ceiling_ms, 60_000);
        assert!(config.queue.data_dir.is_none());
    }

    #[test]
    fn config_from_toml_string() {
        let toml = r#"
[queue]
data_dir = "/var/lib/notesync"

[dispatch]
retry_delay_ms = 1000
strict_bad_request = true

[reconcile]
max_entity_bytes = 4096

[realtime]
enabled = false

[polling]
fast_mode = true
notes = { normal_ms = 30000, fast_ms = 5000 }
"#;

        let config: SyncConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.queue.data_dir, Some(PathBuf::from("/var/lib/notesync")));
        assert_eq!(config.dispatch.retry_delay(), Duration::from_secs(1));
        assert!(config.dispatch.strict_bad_request);
        assert_eq!(config.reconcile.max_entity_bytes, 4096);
        assert!(!config.realtime.enabled);
        assert_eq!(
            config.polling.period(ResourceKind::Notes, true),
            Duration::from_secs(5)
        );
    }

    #[test]
    fn config_missing_fields_use_defaults() {
        let config: SyncConfig = toml::from_str("[polling]\nfast_mode = true\n").unwrap();
        assert_eq!(config.realtime.backoff_step_ms, 5000);
        assert!(config.polling.enabled);
        assert_eq!(
            config.polling.period(ResourceKind::MeetingNotes, false),
            Duration::from_secs(600)
        );
    }

    #[test]
    fn step_above_ceiling_is_invalid() {
        let config: SyncConfig =
            toml::from_str("[realtime]\nbackoff_step_ms = 90000\n").unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn from_file_reports_parse_errors_with_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[dispatch]\nretry_delay_ms = \"soon\"").unwrap();

        let err = SyncConfig::from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
        assert!(err.to_string().contains(&file.path().display().to_string()));
    }

    #[test]
    fn from_file_missing_is_read_error() {
        let err = SyncConfig::from_file(Path::new("/nonexistent/notesync.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::ReadError { .. }));
    }
}
