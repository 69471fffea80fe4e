//! Retention window configuration.
//!
//! Both jobs share a single knob: the number of days an item is kept before it
//! becomes eligible for deletion.
//!
//! ```sh
//! RETENTION_DAYS=90
//! ```

use super::{ConfigError, lookup_var};
use crate::retention::RetentionPolicy;

/// Environment variable holding the retention window in days.
pub const RETENTION_DAYS_VAR: &str = "RETENTION_DAYS";

/// Retention configuration shared by the blob and database jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionConfig {
    /// Days to keep items before they become eligible for deletion.
    /// Default: 90
    pub retention_days: u32,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            retention_days: default_retention_days(),
        }
    }
}

fn default_retention_days() -> u32 {
    90
}

impl RetentionConfig {
    /// Resolve the retention window from an environment lookup.
    ///
    /// Negative or non-numeric values are rejected rather than clamped.
    pub fn from_lookup<F>(lookup: &F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let Some(raw) = lookup_var(lookup, RETENTION_DAYS_VAR) else {
            return Ok(Self::default());
        };

        let retention_days = raw.parse::<u32>().map_err(|_| ConfigError::Invalid {
            name: RETENTION_DAYS_VAR,
            value: raw.clone(),
            reason: "expected a non-negative whole number of days".to_string(),
        })?;

        Ok(Self { retention_days })
    }

    /// The deletion policy for this window.
    pub fn policy(&self) -> RetentionPolicy {
        RetentionPolicy::new(self.retention_days)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn test_default_is_ninety_days() {
        let config = RetentionConfig::from_lookup(&|_: &str| None).unwrap();
        assert_eq!(config.retention_days, 90);
        assert_eq!(config.policy().retention_days(), 90);
    }

    #[rstest]
    #[case("0", 0)]
    #[case("30", 30)]
    #[case(" 365 ", 365)]
    fn test_parses_valid_values(#[case] raw: &str, #[case] expected: u32) {
        let raw = raw.to_string();
        let config = RetentionConfig::from_lookup(&|_: &str| Some(raw.clone())).unwrap();
        assert_eq!(config.retention_days, expected);
    }

    #[rstest]
    #[case("-5")]
    #[case("ninety")]
    #[case("1.5")]
    fn test_rejects_invalid_values(#[case] raw: &str) {
        let raw = raw.to_string();
        let err = RetentionConfig::from_lookup(&|_: &str| Some(raw.clone())).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                name: RETENTION_DAYS_VAR,
                ..
            }
        ));
    }
}
