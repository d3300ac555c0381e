//! Runtime Configuration
//!
//! A [`RuntimeConfig`] is handed to [`Runtime::with_config`] and fixed for the
//! lifetime of that runtime. It can be built in code or loaded from JSON:
//!
//! ```rust
//! use reflux_core::config::RuntimeConfig;
//!
//! let config = RuntimeConfig::from_json_str(r#"{ "ssr": true }"#).unwrap();
//! assert!(config.ssr);
//! assert_eq!(config.max_track_depth, 30);
//! ```
//!
//! [`Runtime::with_config`]: crate::reactive::Runtime::with_config

use serde::{Deserialize, Serialize};

use crate::error::{ReactiveError, Result};

/// Number of recursion levels a `u32` tracking marker can hold.
///
/// Bit 0 is never used: depth `d` owns bit `1 << d`, and the outermost run is
/// depth 1.
pub const MAX_MARKER_BITS: u32 = 31;

/// Default nesting depth tracked with markers.
pub const DEFAULT_MAX_TRACK_DEPTH: u32 = 30;

/// Tunables for a [`Runtime`](crate::reactive::Runtime).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Deepest effect nesting that uses the marker protocol.
    ///
    /// Going deeper is a programming error: debug builds panic, release builds
    /// log and fall back to a full dependency rebuild for the deeper runs.
    pub max_track_depth: u32,

    /// Non-interactive mode. Computed values created through
    /// [`computed`](crate::reactive::computed) are not cached and re-run their
    /// getter on every read.
    pub ssr: bool,

    /// Emit a `warn` event when a read-only computed value is written.
    pub warn_on_readonly_write: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_track_depth: DEFAULT_MAX_TRACK_DEPTH,
            ssr: false,
            warn_on_readonly_write: true,
        }
    }
}

impl RuntimeConfig {
    /// Parse and validate a JSON configuration document.
    ///
    /// Missing fields take their default value.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that every value is within its supported range.
    pub fn validate(&self) -> Result<()> {
        if self.max_track_depth == 0 {
            return Err(ReactiveError::InvalidConfig(
                "max_track_depth must be at least 1".to_string(),
            ));
        }
        if self.max_track_depth > MAX_MARKER_BITS {
            return Err(ReactiveError::RecursionLimit {
                depth: self.max_track_depth,
                max: MAX_MARKER_BITS,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = RuntimeConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_track_depth, DEFAULT_MAX_TRACK_DEPTH);
        assert!(!config.ssr);
        assert!(config.warn_on_readonly_write);
    }

    #[test]
    fn json_fills_missing_fields_with_defaults() {
        let config = RuntimeConfig::from_json_str(r#"{ "max_track_depth": 4 }"#).unwrap();
        assert_eq!(config.max_track_depth, 4);
        assert!(!config.ssr);
        assert!(config.warn_on_readonly_write);
    }

    #[test]
    fn rejects_depth_wider_than_marker() {
        let err = RuntimeConfig::from_json_str(r#"{ "max_track_depth": 32 }"#).unwrap_err();
        assert!(matches!(
            err,
            ReactiveError::RecursionLimit { depth: 32, max: MAX_MARKER_BITS }
        ));
    }

    #[test]
    fn rejects_zero_depth() {
        let config = RuntimeConfig {
            max_track_depth: 0,
            ..RuntimeConfig::default()
        };
        assert!(matches!(config.validate(), Err(ReactiveError::InvalidConfig(_))));
    }

    #[test]
    fn rejects_malformed_json() {
        let err = RuntimeConfig::from_json_str("{ ssr: ").unwrap_err();
        assert!(matches!(err, ReactiveError::Json(_)));
    }
}
