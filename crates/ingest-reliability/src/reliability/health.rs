//! Health classification and the rate control law
//!
//! Health is derived from the fraction of critical checks, with no
//! hysteresis: each evaluation stands on its own.
//!
//! ```text
//!  ratio ≥ 75%  ──► Critical   ceiling = max(10, 10% of current)
//!  ratio ≥ 50%  ──► Unhealthy  ceiling = max(25, 25% of current)
//!  ratio ≥ 25%  ──► Degraded   ceiling = max(50, 50% of current)
//!  otherwise    ──► Healthy    ceiling = baseline
//! ```

use serde::{Deserialize, Serialize};

/// Aggregate health of the ingestion system
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    #[default]
    Healthy,
    Degraded,
    Unhealthy,
    Critical,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Degraded => write!(f, "degraded"),
            Self::Unhealthy => write!(f, "unhealthy"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

impl HealthStatus {
    /// Map a critical-failure ratio (0.0-1.0) to a status, boundaries inclusive
    pub fn from_ratio(ratio: f64) -> Self {
        if ratio >= 0.75 {
            Self::Critical
        } else if ratio >= 0.50 {
            Self::Unhealthy
        } else if ratio >= 0.25 {
            Self::Degraded
        } else {
            Self::Healthy
        }
    }

    /// Ceiling the limiter should move to from `current`
    ///
    /// Non-healthy states scale the current ceiling, so repeated checks
    /// compound; the floors keep the rate from reaching zero.
    pub fn target_ceiling(self, current: u32, baseline: u32) -> u32 {
        let scaled = |percent: u64, floor: u32| {
            let reduced = (current as u64 * percent / 100) as u32;
            reduced.max(floor)
        };

        match self {
            Self::Critical => scaled(10, 10),
            Self::Unhealthy => scaled(25, 25),
            Self::Degraded => scaled(50, 50),
            Self::Healthy => baseline,
        }
    }
}

/// Tally of weighted checks for one health evaluation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HealthTally {
    pub critical_failures: u32,
    pub total_checks: u32,
}

impl HealthTally {
    /// Record one check
    pub fn check(&mut self, critical: bool) {
        self.total_checks += 1;
        if critical {
            self.critical_failures += 1;
        }
    }

    pub fn ratio(&self) -> f64 {
        if self.total_checks == 0 {
            return 0.0;
        }
        self.critical_failures as f64 / self.total_checks as f64
    }

    pub fn status(&self) -> HealthStatus {
        HealthStatus::from_ratio(self.ratio())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thresholds_are_inclusive() {
        assert_eq!(HealthStatus::from_ratio(0.0), HealthStatus::Healthy);
        assert_eq!(HealthStatus::from_ratio(0.2499), HealthStatus::Healthy);
        assert_eq!(HealthStatus::from_ratio(0.25), HealthStatus::Degraded);
        assert_eq!(HealthStatus::from_ratio(0.4999), HealthStatus::Degraded);
        assert_eq!(HealthStatus::from_ratio(0.50), HealthStatus::Unhealthy);
        assert_eq!(HealthStatus::from_ratio(0.75), HealthStatus::Critical);
        assert_eq!(HealthStatus::from_ratio(1.0), HealthStatus::Critical);
    }

    #[test]
    fn test_tally_of_four_checks() {
        let expected = [
            HealthStatus::Healthy,
            HealthStatus::Degraded,
            HealthStatus::Unhealthy,
            HealthStatus::Critical,
            HealthStatus::Critical,
        ];
        for (failures, status) in expected.into_iter().enumerate() {
            let mut tally = HealthTally::default();
            for i in 0..4 {
                tally.check(i < failures);
            }
            assert_eq!(tally.status(), status, "{failures} of 4 critical");
        }
    }

    #[test]
    fn test_empty_tally_is_healthy() {
        assert_eq!(HealthTally::default().status(), HealthStatus::Healthy);
    }

    #[test]
    fn test_target_ceiling_floors() {
        assert_eq!(HealthStatus::Critical.target_ceiling(1000, 100), 100);
        assert_eq!(HealthStatus::Critical.target_ceiling(100, 100), 10);
        assert_eq!(HealthStatus::Critical.target_ceiling(10, 100), 10);
        assert_eq!(HealthStatus::Unhealthy.target_ceiling(400, 100), 100);
        assert_eq!(HealthStatus::Unhealthy.target_ceiling(60, 100), 25);
        assert_eq!(HealthStatus::Degraded.target_ceiling(100, 100), 50);
        assert_eq!(HealthStatus::Degraded.target_ceiling(300, 100), 150);
        assert_eq!(HealthStatus::Healthy.target_ceiling(10, 100), 100);
    }

    #[test]
    fn test_critical_decay_never_reaches_zero() {
        let mut ceiling = 100;
        for _ in 0..10 {
            ceiling = HealthStatus::Critical.target_ceiling(ceiling, 100);
            assert!(ceiling >= 10);
        }
        assert_eq!(ceiling, 10);
    }

    #[test]
    fn test_display() {
        assert_eq!(HealthStatus::Healthy.to_string(), "healthy");
        assert_eq!(HealthStatus::Critical.to_string(), "critical");
    }
}
