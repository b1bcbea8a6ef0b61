use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::Capability;
use crate::error::{PlotqError, Result};
use crate::naming::NameConvention;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SessionConfig {
    pub capability: Capability,
    pub naming: NameConvention,
    /// Progress tracker cycle, in milliseconds.
    pub tracker_interval_ms: u64,
    /// Wait-for-drain poll cycle, in milliseconds.
    pub drain_interval_ms: u64,
    /// Payload preview width at the highest detail level.
    pub preview_width: usize,
    /// Start with plot progress tracking enabled.
    pub track_progress: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            capability: Capability::default(),
            naming: NameConvention::default(),
            tracker_interval_ms: 1000,
            drain_interval_ms: 500,
            preview_width: 30,
            track_progress: false,
        }
    }
}

impl SessionConfig {
    pub fn from_json(s: &str) -> Result<Self> {
        let cfg: SessionConfig = serde_json::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn validate(&self) -> Result<()> {
        if self.naming.delimiter.is_alphanumeric() || self.naming.delimiter.is_whitespace() {
            return Err(PlotqError::Config(format!(
                "delimiter {:?} must be a punctuation character",
                self.naming.delimiter
            )));
        }
        if self.tracker_interval_ms == 0 || self.drain_interval_ms == 0 {
            return Err(PlotqError::Config("poll intervals must be non-zero".into()));
        }
        if self.preview_width == 0 {
            return Err(PlotqError::Config("preview width must be non-zero".into()));
        }
        Ok(())
    }

    pub fn tracker_interval(&self) -> Duration {
        Duration::from_millis(self.tracker_interval_ms)
    }

    pub fn drain_interval(&self) -> Duration {
        Duration::from_millis(self.drain_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_keys_take_defaults() {
        let cfg = SessionConfig::from_json(r#"{ "capability": "named-spooler" }"#).unwrap();
        assert_eq!(cfg.capability, Capability::NamedSpooler);
        assert_eq!(cfg.naming, NameConvention::default());
        assert_eq!(cfg.tracker_interval(), Duration::from_secs(1));
        assert_eq!(cfg.preview_width, 30);
    }

    #[test]
    fn rejects_alphanumeric_delimiter() {
        let err = SessionConfig::from_json(r#"{ "naming": { "delimiter": "x", "field": 0 } }"#)
            .unwrap_err();
        assert!(matches!(err, PlotqError::Config(_)));
    }

    #[test]
    fn rejects_zero_interval() {
        let err = SessionConfig::from_json(r#"{ "tracker_interval_ms": 0 }"#).unwrap_err();
        assert!(matches!(err, PlotqError::Config(_)));
    }

    #[test]
    fn malformed_json_is_a_decode_error() {
        let err = SessionConfig::from_json("{ capability").unwrap_err();
        assert!(matches!(err, PlotqError::Json(_)));
    }

    #[test]
    fn loads_from_file() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(f, r#"{{ "preview_width": 12, "track_progress": true }}"#).unwrap();
        let cfg = SessionConfig::load(f.path()).unwrap();
        assert_eq!(cfg.preview_width, 12);
        assert!(cfg.track_progress);
        assert_eq!(cfg.capability, Capability::CountedBuffer);
    }
}
