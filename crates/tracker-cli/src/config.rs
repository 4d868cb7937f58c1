use std::path::PathBuf;
use std::time::Duration;

use accountability::EscalationMode;
use tracing::warn;

/// Runtime configuration for the tracker binary
#[derive(Debug, Clone, PartialEq)]
pub struct TrackerConfig {
    /// JSON snapshot of the memory store
    pub data_path: PathBuf,
    /// Optional TOML policy file applied on startup
    pub policies_path: Option<PathBuf>,
    /// Period of the `watch` loop
    pub check_interval: Duration,
    pub escalation_mode: EscalationMode,
    /// RocksDB directory; when set (and compiled in) it replaces the snapshot
    pub state_path: Option<PathBuf>,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            data_path: PathBuf::from("tracker-data.json"),
            policies_path: None,
            check_interval: Duration::from_secs(300),
            escalation_mode: EscalationMode::default(),
            state_path: None,
        }
    }
}

impl TrackerConfig {
    /// Create config from environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create config from any key lookup; unset or unparsable values keep defaults
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(path) = lookup("TRACKER_DATA_PATH").filter(|s| !s.is_empty()) {
            config.data_path = PathBuf::from(path);
        }
        if let Some(path) = lookup("TRACKER_POLICIES_PATH").filter(|s| !s.is_empty()) {
            config.policies_path = Some(PathBuf::from(path));
        }
        if let Some(secs) = lookup("TRACKER_CHECK_INTERVAL_SECS") {
            match secs.parse::<u64>() {
                Ok(n) if n > 0 => config.check_interval = Duration::from_secs(n),
                _ => warn!(value = %secs, "Ignoring invalid TRACKER_CHECK_INTERVAL_SECS"),
            }
        }
        if let Some(mode) = lookup("TRACKER_ESCALATION_MODE") {
            match mode.parse() {
                Ok(mode) => config.escalation_mode = mode,
                Err(e) => warn!("Ignoring TRACKER_ESCALATION_MODE: {}", e),
            }
        }
        if let Some(path) = lookup("TRACKER_STATE_PATH").filter(|s| !s.is_empty()) {
            config.state_path = Some(PathBuf::from(path));
        }

        config
    }
}
