//! # Workflow Configuration
//!
//! Tunables for the reservation deadline and the background sweeper, with
//! statutory defaults and environment overrides.
//!
//! | Variable | Default | Meaning |
//! |---|---|---|
//! | `CNR_RESERVATION_TTL_HOURS` | 168 (7 days) | reservation window before auto-cancel |
//! | `CNR_SWEEP_INTERVAL_SECS` | 21600 (6 h) | sweeper tick period |
//! | `CNR_WARNING_WINDOW_HOURS` | 48 (2 days) | how early the expiry warning goes out |
//! | `CNR_SWEEP_BATCH_SIZE` | 500 | max requests handled per pass per tick |
//!
//! Hour-valued settings are capped at 8784 (366 days).

use std::time::Duration as StdDuration;

use chrono::Duration;

use crate::error::ConfigError;

const RESERVATION_TTL_VAR: &str = "CNR_RESERVATION_TTL_HOURS";
const SWEEP_INTERVAL_VAR: &str = "CNR_SWEEP_INTERVAL_SECS";
const WARNING_WINDOW_VAR: &str = "CNR_WARNING_WINDOW_HOURS";
const SWEEP_BATCH_VAR: &str = "CNR_SWEEP_BATCH_SIZE";

/// Upper bound for the reservation TTL and the warning window.
const MAX_WINDOW_HOURS: u64 = 24 * 366;

/// Configuration consumed by the workflow engine and the sweeper.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowConfig {
    /// How long a name stays `TemporarilyReserved` before auto-cancellation.
    pub reservation_ttl: Duration,
    /// Period between sweeper ticks.
    pub sweep_interval: StdDuration,
    /// Requests expiring within this window receive a one-time warning.
    pub warning_window: Duration,
    /// Maximum number of requests a single sweeper pass processes.
    pub sweep_batch_size: usize,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            reservation_ttl: Duration::days(7),
            sweep_interval: StdDuration::from_secs(6 * 60 * 60),
            warning_window: Duration::days(2),
            sweep_batch_size: 500,
        }
    }
}

impl WorkflowConfig {
    /// Load configuration from process environment variables, falling back
    /// to defaults for anything unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(raw) = lookup(RESERVATION_TTL_VAR) {
            let hours = parse_positive(RESERVATION_TTL_VAR, &raw)?;
            config.reservation_ttl = hours_to_duration(RESERVATION_TTL_VAR, hours)?;
        }
        if let Some(raw) = lookup(SWEEP_INTERVAL_VAR) {
            let secs = parse_positive(SWEEP_INTERVAL_VAR, &raw)?;
            config.sweep_interval = StdDuration::from_secs(secs);
        }
        if let Some(raw) = lookup(WARNING_WINDOW_VAR) {
            let hours = parse_positive(WARNING_WINDOW_VAR, &raw)?;
            config.warning_window = hours_to_duration(WARNING_WINDOW_VAR, hours)?;
        }
        if let Some(raw) = lookup(SWEEP_BATCH_VAR) {
            let size = parse_positive(SWEEP_BATCH_VAR, &raw)?;
            config.sweep_batch_size = usize::try_from(size).map_err(|_| ConfigError::OutOfRange {
                var: SWEEP_BATCH_VAR,
                reason: format!("{size} does not fit in usize"),
            })?;
        }

        if config.warning_window >= config.reservation_ttl {
            return Err(ConfigError::OutOfRange {
                var: WARNING_WINDOW_VAR,
                reason: "warning window must be shorter than the reservation TTL".to_string(),
            });
        }

        Ok(config)
    }
}

fn parse_positive(var: &'static str, raw: &str) -> Result<u64, ConfigError> {
    let value: u64 = raw.trim().parse().map_err(|_| ConfigError::Malformed {
        var,
        expected: "positive integer",
        value: raw.to_string(),
    })?;
    if value == 0 {
        return Err(ConfigError::OutOfRange {
            var,
            reason: "must be greater than zero".to_string(),
        });
    }
    Ok(value)
}

fn hours_to_duration(var: &'static str, hours: u64) -> Result<Duration, ConfigError> {
    if hours > MAX_WINDOW_HOURS {
        return Err(ConfigError::OutOfRange {
            var,
            reason: format!("{hours} hours exceeds the maximum of {MAX_WINDOW_HOURS}"),
        });
    }
    i64::try_from(hours)
        .ok()
        .and_then(Duration::try_hours)
        .ok_or_else(|| ConfigError::OutOfRange {
            var,
            reason: format!("{hours} hours is not representable"),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_statutory_values() {
        let config = WorkflowConfig::default();
        assert_eq!(config.reservation_ttl, Duration::days(7));
        assert_eq!(config.sweep_interval, StdDuration::from_secs(21_600));
        assert_eq!(config.warning_window, Duration::days(2));
        assert_eq!(config.sweep_batch_size, 500);
    }

    #[test]
    fn empty_environment_yields_defaults() {
        let config = WorkflowConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, WorkflowConfig::default());
    }

    #[test]
    fn overrides_are_applied() {
        let config = WorkflowConfig::from_lookup(lookup(&[
            ("CNR_RESERVATION_TTL_HOURS", "240"),
            ("CNR_SWEEP_INTERVAL_SECS", "60"),
            ("CNR_WARNING_WINDOW_HOURS", "24"),
            ("CNR_SWEEP_BATCH_SIZE", "10"),
        ]))
        .unwrap();
        assert_eq!(config.reservation_ttl, Duration::hours(240));
        assert_eq!(config.sweep_interval, StdDuration::from_secs(60));
        assert_eq!(config.warning_window, Duration::hours(24));
        assert_eq!(config.sweep_batch_size, 10);
    }

    #[test]
    fn malformed_value_is_rejected() {
        let err = WorkflowConfig::from_lookup(lookup(&[("CNR_SWEEP_BATCH_SIZE", "lots")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Malformed { var: "CNR_SWEEP_BATCH_SIZE", .. }));
    }

    #[test]
    fn zero_is_rejected() {
        let err = WorkflowConfig::from_lookup(lookup(&[("CNR_SWEEP_INTERVAL_SECS", "0")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::OutOfRange { .. }));
    }

    #[test]
    fn warning_window_must_fit_inside_ttl() {
        let err = WorkflowConfig::from_lookup(lookup(&[
            ("CNR_RESERVATION_TTL_HOURS", "24"),
            ("CNR_WARNING_WINDOW_HOURS", "48"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::OutOfRange { var: "CNR_WARNING_WINDOW_HOURS", .. }));
    }

    #[test]
    fn oversized_ttl_is_rejected() {
        let err = WorkflowConfig::from_lookup(lookup(&[("CNR_RESERVATION_TTL_HOURS", "2000000000000")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::OutOfRange { var: "CNR_RESERVATION_TTL_HOURS", .. }));

        let err = WorkflowConfig::from_lookup(lookup(&[("CNR_WARNING_WINDOW_HOURS", "8785")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::OutOfRange { var: "CNR_WARNING_WINDOW_HOURS", .. }));
    }

    #[test]
    fn one_year_ttl_is_accepted() {
        let config = WorkflowConfig::from_lookup(lookup(&[("CNR_RESERVATION_TTL_HOURS", "8784")])).unwrap();
        assert_eq!(config.reservation_ttl, Duration::days(366));
    }
}
