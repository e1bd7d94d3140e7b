//! Session engine configuration.

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Knobs for the session engine.
///
/// Every field has a default, so a partial JSON object (or `{}`) is a
/// valid configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Width of generated session codes, in decimal digits.
    pub code_digits: u32,

    /// How many codes `create_session` tries before giving up.
    pub max_code_attempts: u32,

    /// Allow `register_player` while the session is in progress.
    pub allow_late_registration: bool,

    /// Refuse to start until every registered player is ready.
    pub require_all_ready: bool,
}

impl SessionConfig {
    /// Codes wider than this would overflow the numeric draw.
    pub const MAX_CODE_DIGITS: u32 = 9;

    /// Clamps out-of-range values to something usable.
    pub fn validated(mut self) -> Self {
        if self.code_digits == 0 || self.code_digits > Self::MAX_CODE_DIGITS {
            let clamped = self.code_digits.clamp(1, Self::MAX_CODE_DIGITS);
            warn!(
                digits = self.code_digits,
                clamped, "code_digits out of range, clamping"
            );
            self.code_digits = clamped;
        }
        if self.max_code_attempts == 0 {
            warn!("max_code_attempts is 0, using 1");
            self.max_code_attempts = 1;
        }
        self
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            code_digits: 5,
            max_code_attempts: 32,
            allow_late_registration: false,
            require_all_ready: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_config_default() {
        let config = SessionConfig::default();
        assert_eq!(config.code_digits, 5);
        assert_eq!(config.max_code_attempts, 32);
        assert!(!config.allow_late_registration);
        assert!(!config.require_all_ready);
    }

    #[test]
    fn test_validated_clamps_code_digits() {
        let wide = SessionConfig {
            code_digits: 40,
            ..Default::default()
        };
        assert_eq!(wide.validated().code_digits, 9);

        let empty = SessionConfig {
            code_digits: 0,
            max_code_attempts: 0,
            ..Default::default()
        };
        let empty = empty.validated();
        assert_eq!(empty.code_digits, 1);
        assert_eq!(empty.max_code_attempts, 1);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: SessionConfig =
            serde_json::from_str(r#"{"require_all_ready": true}"#).unwrap();
        assert!(config.require_all_ready);
        assert_eq!(config.code_digits, 5);

        let config: SessionConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, SessionConfig::default());
    }
}
