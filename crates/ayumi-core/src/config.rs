//! Tunable thresholds for the built-in flows.

use crate::validator::{DEFAULT_CODE_LENGTH, DEFAULT_PASSWORD_MIN_SCORE};
use serde::Deserialize;

/// Configuration applied when building the built-in flow tables.
///
/// Missing keys fall back to their defaults, so a partial document is
/// enough:
///
/// ```
/// use ayumi_core::FlowConfig;
///
/// let config = FlowConfig::default();
/// assert_eq!(config.password_min_score, 60);
/// assert_eq!(config.verification_code_length, 6);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FlowConfig {
    /// Lowest password strength score (0-100) accepted by password gates.
    pub password_min_score: u8,
    /// Digit count of emailed verification and reset codes.
    pub verification_code_length: usize,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            password_min_score: DEFAULT_PASSWORD_MIN_SCORE,
            verification_code_length: DEFAULT_CODE_LENGTH,
        }
    }
}
