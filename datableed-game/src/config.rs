//! Engine tuning configuration.
use crate::constants::{
    EVENT_HISTORY_CAPACITY, OPTIMAL_WINDOW_FRACTION, TIER_EXCELLENT_MIN, TIER_FAIR_MIN,
    TIER_GOOD_MIN, TIME_LIMIT_CRITICAL_SECS, TIME_LIMIT_HIGH_SECS, TIME_LIMIT_LOW_SECS,
    TIME_LIMIT_MEDIUM_SECS, TIMEOUT_PENALTY, TIMER_TICK_MS,
};
use crate::threats::Urgency;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Errors raised when configuration invariants are violated.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("tick interval must be at least 1ms (got {0})")]
    TickInterval(u64),
    #[error("{field} must be between {min:.2} and {max:.2} (got {value:.2})")]
    RangeViolation {
        field: &'static str,
        min: f64,
        max: f64,
        value: f64,
    },
    #[error("tier thresholds must descend (excellent {excellent:.2}, good {good:.2}, fair {fair:.2})")]
    TierOrder { excellent: f64, good: f64, fair: f64 },
    #[error("time limit for {urgency:?} urgency must be positive")]
    ZeroTimeLimit { urgency: Urgency },
    #[error("timeout penalty must not be positive (got {0})")]
    PositivePenalty(i32),
    #[error("invalid engine config JSON: {0}")]
    Parse(String),
}

/// Scenario time limits in whole seconds, keyed by urgency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrgencyLimits {
    #[serde(default = "UrgencyLimits::default_low")]
    pub low: u32,
    #[serde(default = "UrgencyLimits::default_medium")]
    pub medium: u32,
    #[serde(default = "UrgencyLimits::default_high")]
    pub high: u32,
    #[serde(default = "UrgencyLimits::default_critical")]
    pub critical: u32,
}

impl UrgencyLimits {
    const fn default_low() -> u32 {
        TIME_LIMIT_LOW_SECS
    }

    const fn default_medium() -> u32 {
        TIME_LIMIT_MEDIUM_SECS
    }

    const fn default_high() -> u32 {
        TIME_LIMIT_HIGH_SECS
    }

    const fn default_critical() -> u32 {
        TIME_LIMIT_CRITICAL_SECS
    }

    #[must_use]
    pub const fn for_urgency(&self, urgency: Urgency) -> u32 {
        match urgency {
            Urgency::Low => self.low,
            Urgency::Medium => self.medium,
            Urgency::High => self.high,
            Urgency::Critical => self.critical,
        }
    }
}

impl Default for UrgencyLimits {
    fn default() -> Self {
        Self {
            low: Self::default_low(),
            medium: Self::default_medium(),
            high: Self::default_high(),
            critical: Self::default_critical(),
        }
    }
}

/// Minimum fraction of optimal decisions for each performance tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierThresholds {
    #[serde(default = "TierThresholds::default_excellent")]
    pub excellent: f64,
    #[serde(default = "TierThresholds::default_good")]
    pub good: f64,
    #[serde(default = "TierThresholds::default_fair")]
    pub fair: f64,
}

impl TierThresholds {
    const fn default_excellent() -> f64 {
        TIER_EXCELLENT_MIN
    }

    const fn default_good() -> f64 {
        TIER_GOOD_MIN
    }

    const fn default_fair() -> f64 {
        TIER_FAIR_MIN
    }
}

impl Default for TierThresholds {
    fn default() -> Self {
        Self {
            excellent: Self::default_excellent(),
            good: Self::default_good(),
            fair: Self::default_fair(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Timer polling cadence.
    #[serde(default = "EngineConfig::default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    /// Portion of a phase's allowance that still earns a full timing score.
    #[serde(default = "EngineConfig::default_optimal_window")]
    pub optimal_window: f64,
    #[serde(default = "EngineConfig::default_timeout_penalty")]
    pub timeout_penalty: i32,
    #[serde(default)]
    pub tiers: TierThresholds,
    #[serde(default)]
    pub time_limits: UrgencyLimits,
    #[serde(default = "EngineConfig::default_event_history")]
    pub event_history: usize,
}

impl EngineConfig {
    const fn default_tick_interval_ms() -> u64 {
        TIMER_TICK_MS
    }

    const fn default_optimal_window() -> f64 {
        OPTIMAL_WINDOW_FRACTION
    }

    const fn default_timeout_penalty() -> i32 {
        TIMEOUT_PENALTY
    }

    const fn default_event_history() -> usize {
        EVENT_HISTORY_CAPACITY
    }

    /// Parse and validate a configuration document.
    ///
    /// # Errors
    ///
    /// Returns an error when the JSON is malformed or an invariant fails.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let cfg: Self =
            serde_json::from_str(json).map_err(|err| ConfigError::Parse(err.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    #[must_use]
    pub const fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// Check configuration invariants.
    ///
    /// # Errors
    ///
    /// Returns the first violated invariant.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_interval_ms == 0 {
            return Err(ConfigError::TickInterval(self.tick_interval_ms));
        }
        if !(self.optimal_window > 0.0 && self.optimal_window < 1.0) {
            return Err(ConfigError::RangeViolation {
                field: "optimal_window",
                min: 0.0,
                max: 1.0,
                value: self.optimal_window,
            });
        }
        if self.timeout_penalty > 0 {
            return Err(ConfigError::PositivePenalty(self.timeout_penalty));
        }
        let tiers = &self.tiers;
        for (field, value) in [
            ("tiers.excellent", tiers.excellent),
            ("tiers.good", tiers.good),
            ("tiers.fair", tiers.fair),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::RangeViolation {
                    field,
                    min: 0.0,
                    max: 1.0,
                    value,
                });
            }
        }
        if !(tiers.excellent >= tiers.good && tiers.good >= tiers.fair) {
            return Err(ConfigError::TierOrder {
                excellent: tiers.excellent,
                good: tiers.good,
                fair: tiers.fair,
            });
        }
        for urgency in Urgency::ALL {
            if self.time_limits.for_urgency(urgency) == 0 {
                return Err(ConfigError::ZeroTimeLimit { urgency });
            }
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: Self::default_tick_interval_ms(),
            optimal_window: Self::default_optimal_window(),
            timeout_penalty: Self::default_timeout_penalty(),
            tiers: TierThresholds::default(),
            time_limits: UrgencyLimits::default(),
            event_history: Self::default_event_history(),
        }
    }
}
