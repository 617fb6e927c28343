//! Policy configuration.
//!
//! Loaded from `MARKETPLACE_*` environment variables (and a `.env` file when
//! present). Every value has a default; values that are present but invalid
//! are rejected rather than silently replaced.

use chrono::Duration;
use marketplace_core::Money;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// A variable is set to an unusable value
    #[error("invalid value `{value}` for {key}: {reason}")]
    Invalid {
        /// Variable name
        key: &'static str,
        /// Raw value
        value: String,
        /// What is wrong with it
        reason: String,
    },

    /// Values are individually fine but inconsistent together
    #[error("inconsistent risk policy: {0}")]
    InconsistentRisk(String),
}

/// Vendor risk scoring policy.
///
/// `score = refund_weight × refund_rate + response_weight × min(1, avg_response / ceiling)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskPolicy {
    /// Weight of the refund rate
    pub refund_weight: f64,
    /// Weight of the normalised response time
    pub response_weight: f64,
    /// Response time that counts as the worst case
    pub response_ceiling_hours: f64,
    /// Scores strictly above this are HIGH
    pub high_threshold: f64,
    /// Scores strictly above this (and not HIGH) are MEDIUM
    pub medium_threshold: f64,
}

impl Default for RiskPolicy {
    fn default() -> Self {
        Self {
            refund_weight: 0.6,
            response_weight: 0.4,
            response_ceiling_hours: 72.0,
            high_threshold: 0.7,
            medium_threshold: 0.4,
        }
    }
}

impl RiskPolicy {
    /// Checks weights and thresholds
    ///
    /// # Errors
    ///
    /// [`ConfigError::InconsistentRisk`] when weights do not sum to one,
    /// the ceiling is not positive, or thresholds are out of order.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.refund_weight < 0.0 || self.response_weight < 0.0 {
            return Err(ConfigError::InconsistentRisk(
                "weights must not be negative".into(),
            ));
        }
        if (self.refund_weight + self.response_weight - 1.0).abs() > 1e-9 {
            return Err(ConfigError::InconsistentRisk(format!(
                "weights must sum to 1, got {} + {}",
                self.refund_weight, self.response_weight
            )));
        }
        if self.response_ceiling_hours <= 0.0 {
            return Err(ConfigError::InconsistentRisk(
                "response ceiling must be positive".into(),
            ));
        }
        if !(0.0 <= self.medium_threshold
            && self.medium_threshold < self.high_threshold
            && self.high_threshold <= 1.0)
        {
            return Err(ConfigError::InconsistentRisk(format!(
                "need 0 <= medium < high <= 1, got medium {} high {}",
                self.medium_threshold, self.high_threshold
            )));
        }
        Ok(())
    }
}

/// Marketplace policy configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketplaceConfig {
    /// Smallest payout a vendor may request, in cents
    pub min_payout_cents: i64,
    /// Hours after delivery during which a return may be requested
    pub return_window_hours: i64,
    /// Length of pickup and drop-off codes
    pub pickup_code_length: usize,
    /// Candidates tried before code generation fails closed
    pub pickup_code_attempts: u32,
    /// Vendor risk scoring
    pub risk: RiskPolicy,
    /// Automatic retries for conflicts in the retry helper
    pub conflict_retries: u32,
    /// Fallback log filter when `RUST_LOG` is unset
    pub log_level: String,
}

impl Default for MarketplaceConfig {
    fn default() -> Self {
        Self {
            min_payout_cents: 1000,
            return_window_hours: 24,
            pickup_code_length: 6,
            pickup_code_attempts: 8,
            risk: RiskPolicy::default(),
            conflict_retries: 1,
            log_level: "info".to_string(),
        }
    }
}

impl MarketplaceConfig {
    /// Loads configuration from the process environment, reading `.env` first
    /// if one exists.
    ///
    /// # Errors
    ///
    /// [`ConfigError`] if a variable is set but invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration through an arbitrary lookup function.
    ///
    /// # Errors
    ///
    /// [`ConfigError`] if a value is set but invalid.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let config = Self {
            min_payout_cents: parse(&lookup, "MARKETPLACE_MIN_PAYOUT_CENTS", defaults.min_payout_cents)?,
            return_window_hours: parse(
                &lookup,
                "MARKETPLACE_RETURN_WINDOW_HOURS",
                defaults.return_window_hours,
            )?,
            pickup_code_length: parse(
                &lookup,
                "MARKETPLACE_PICKUP_CODE_LENGTH",
                defaults.pickup_code_length,
            )?,
            pickup_code_attempts: parse(
                &lookup,
                "MARKETPLACE_PICKUP_CODE_ATTEMPTS",
                defaults.pickup_code_attempts,
            )?,
            risk: RiskPolicy {
                refund_weight: parse(
                    &lookup,
                    "MARKETPLACE_RISK_REFUND_WEIGHT",
                    defaults.risk.refund_weight,
                )?,
                response_weight: parse(
                    &lookup,
                    "MARKETPLACE_RISK_RESPONSE_WEIGHT",
                    defaults.risk.response_weight,
                )?,
                response_ceiling_hours: parse(
                    &lookup,
                    "MARKETPLACE_RISK_RESPONSE_CEILING_HOURS",
                    defaults.risk.response_ceiling_hours,
                )?,
                high_threshold: parse(
                    &lookup,
                    "MARKETPLACE_RISK_HIGH_THRESHOLD",
                    defaults.risk.high_threshold,
                )?,
                medium_threshold: parse(
                    &lookup,
                    "MARKETPLACE_RISK_MEDIUM_THRESHOLD",
                    defaults.risk.medium_threshold,
                )?,
            },
            conflict_retries: parse(
                &lookup,
                "MARKETPLACE_CONFLICT_RETRIES",
                defaults.conflict_retries,
            )?,
            log_level: lookup("MARKETPLACE_LOG_LEVEL").unwrap_or(defaults.log_level),
        };
        config.validate()?;
        Ok(config)
    }

    /// Checks cross-field constraints
    ///
    /// # Errors
    ///
    /// [`ConfigError`] describing the first violated constraint.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_payout_cents < 0 {
            return Err(invalid(
                "MARKETPLACE_MIN_PAYOUT_CENTS",
                self.min_payout_cents,
                "must not be negative",
            ));
        }
        if self.return_window_hours < 0 {
            return Err(invalid(
                "MARKETPLACE_RETURN_WINDOW_HOURS",
                self.return_window_hours,
                "must not be negative",
            ));
        }
        if !(4..=32).contains(&self.pickup_code_length) {
            return Err(invalid(
                "MARKETPLACE_PICKUP_CODE_LENGTH",
                self.pickup_code_length,
                "must be between 4 and 32",
            ));
        }
        if self.pickup_code_attempts == 0 {
            return Err(invalid(
                "MARKETPLACE_PICKUP_CODE_ATTEMPTS",
                self.pickup_code_attempts,
                "must be at least 1",
            ));
        }
        self.risk.validate()
    }

    /// Minimum payout
    #[must_use]
    pub const fn min_payout(&self) -> Money {
        Money::from_cents(self.min_payout_cents)
    }

    /// Return policy window
    #[must_use]
    pub fn return_window(&self) -> Duration {
        Duration::hours(self.return_window_hours)
    }
}

fn parse<T, F>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            value: raw.clone(),
            reason: e.to_string(),
        }),
    }
}

fn invalid(key: &'static str, value: impl ToString, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        key,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let config = MarketplaceConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config, MarketplaceConfig::default());
        assert_eq!(config.min_payout(), Money::from_cents(1000));
        assert_eq!(config.return_window(), Duration::hours(24));
    }

    #[test]
    fn overrides_are_parsed() {
        let config = MarketplaceConfig::from_lookup(lookup_from(&[
            ("MARKETPLACE_MIN_PAYOUT_CENTS", "2500"),
            ("MARKETPLACE_RISK_REFUND_WEIGHT", "0.5"),
            ("MARKETPLACE_RISK_RESPONSE_WEIGHT", "0.5"),
            ("MARKETPLACE_LOG_LEVEL", "debug"),
        ]))
        .unwrap();
        assert_eq!(config.min_payout_cents, 2500);
        assert!((config.risk.refund_weight - 0.5).abs() < f64::EPSILON);
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn garbage_is_rejected() {
        let error = MarketplaceConfig::from_lookup(lookup_from(&[(
            "MARKETPLACE_RETURN_WINDOW_HOURS",
            "a day",
        )]))
        .unwrap_err();
        assert!(matches!(
            error,
            ConfigError::Invalid {
                key: "MARKETPLACE_RETURN_WINDOW_HOURS",
                ..
            }
        ));
    }

    #[test]
    fn weights_must_sum_to_one() {
        let error = MarketplaceConfig::from_lookup(lookup_from(&[(
            "MARKETPLACE_RISK_REFUND_WEIGHT",
            "0.9",
        )]))
        .unwrap_err();
        assert!(matches!(error, ConfigError::InconsistentRisk(_)));
    }

    #[test]
    fn thresholds_must_be_ordered() {
        let error = MarketplaceConfig::from_lookup(lookup_from(&[
            ("MARKETPLACE_RISK_HIGH_THRESHOLD", "0.3"),
            ("MARKETPLACE_RISK_MEDIUM_THRESHOLD", "0.5"),
        ]))
        .unwrap_err();
        assert!(matches!(error, ConfigError::InconsistentRisk(_)));
    }
}
