//! Trend-based load forecast over recent processing times

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Samples required before any forecast is made
const MIN_SAMPLES: usize = 10;

/// Samples needed within the recent window for the trend term
const TREND_SPAN: usize = 5;

/// Weight applied to the trend term
const TREND_DAMPING: f64 = 0.5;

/// Predicted seconds-per-task above which the pool doubles
const SCALE_UP_LOAD: f64 = 10.0;

/// Predicted seconds-per-task below which the pool halves
const SCALE_DOWN_LOAD: f64 = 1.0;

/// One processing-time observation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProcessingSample {
    pub timestamp: DateTime<Utc>,
    pub duration_seconds: f64,
}

/// Worker-count estimator
///
/// Deliberately conservative: it stays silent until it has ten samples and
/// only moves the pool when the forecast leaves the `[1.0, 10.0]` band.
#[derive(Debug)]
pub struct TrendScalingEstimator {
    history_window: usize,
    min_workers: usize,
    max_workers: usize,
    history: Mutex<VecDeque<ProcessingSample>>,
}

impl TrendScalingEstimator {
    /// Create an estimator keeping `history_window` samples, scaling within 1..=20
    pub fn new(history_window: usize) -> Self {
        let history_window = history_window.max(1);
        Self {
            history_window,
            min_workers: 1,
            max_workers: 20,
            history: Mutex::new(VecDeque::with_capacity(history_window + 1)),
        }
    }

    /// Set worker bounds applied by [`Self::optimal_worker_count`]
    pub fn with_worker_bounds(mut self, min: usize, max: usize) -> Self {
        self.min_workers = min.max(1);
        self.max_workers = max.max(self.min_workers);
        self
    }

    /// Append a sample, evicting the oldest beyond the window
    pub fn record_sample(&self, duration_seconds: f64) {
        self.record_sample_at(duration_seconds, Utc::now());
    }

    pub fn record_sample_at(&self, duration_seconds: f64, timestamp: DateTime<Utc>) {
        let mut history = self.history.lock();
        history.push_back(ProcessingSample {
            timestamp,
            duration_seconds,
        });
        while history.len() > self.history_window {
            history.pop_front();
        }
    }

    /// Forecast seconds-per-task for the near term
    ///
    /// Mean of the last ten durations plus half the trend between the newest
    /// sample and the one four places before it, floored at zero.
    pub fn predict_load(&self) -> f64 {
        let history = self.history.lock();
        if history.len() < MIN_SAMPLES {
            return 0.0;
        }

        let recent: Vec<f64> = history
            .iter()
            .skip(history.len() - MIN_SAMPLES)
            .map(|s| s.duration_seconds)
            .collect();

        let mean = recent.iter().sum::<f64>() / recent.len() as f64;
        let predicted = if recent.len() >= TREND_SPAN {
            let trend = recent[recent.len() - 1] - recent[recent.len() - TREND_SPAN];
            mean + TREND_DAMPING * trend
        } else {
            mean
        };

        predicted.max(0.0)
    }

    /// Recommended worker count given the current pool size
    pub fn optimal_worker_count(&self, current: usize) -> usize {
        Self::recommend(self.predict_load(), current, self.min_workers, self.max_workers)
    }

    fn recommend(predicted: f64, current: usize, min: usize, max: usize) -> usize {
        if predicted == 0.0 {
            current
        } else if predicted > SCALE_UP_LOAD {
            (current * 2).min(max)
        } else if predicted < SCALE_DOWN_LOAD {
            (current / 2).max(min)
        } else {
            current
        }
    }

    /// Mean duration across the whole window (0 when empty)
    pub fn average(&self) -> f64 {
        let history = self.history.lock();
        if history.is_empty() {
            return 0.0;
        }
        history.iter().map(|s| s.duration_seconds).sum::<f64>() / history.len() as f64
    }

    /// Snapshot of the history, oldest first
    pub fn samples(&self) -> Vec<ProcessingSample> {
        self.history.lock().iter().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.history.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.lock().is_empty()
    }

    pub fn history_window(&self) -> usize {
        self.history_window
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn estimator_with(durations: &[f64]) -> TrendScalingEstimator {
        let estimator = TrendScalingEstimator::new(100);
        for d in durations {
            estimator.record_sample(*d);
        }
        estimator
    }

    #[test]
    fn test_no_forecast_below_ten_samples() {
        let estimator = estimator_with(&[50.0; 9]);
        assert_eq!(estimator.predict_load(), 0.0);
        assert_eq!(estimator.optimal_worker_count(5), 5);
    }

    #[test]
    fn test_flat_history_predicts_mean() {
        let estimator = estimator_with(&[2.0; 10]);
        assert_eq!(estimator.predict_load(), 2.0);
    }

    #[test]
    fn test_rising_trend_is_damped() {
        // last ten: 1..=10, mean 5.5, trend 10 - 6 = 4
        let durations: Vec<f64> = (1..=10).map(f64::from).collect();
        let estimator = estimator_with(&durations);
        assert!((estimator.predict_load() - 7.5).abs() < 1e-9);
    }

    #[test]
    fn test_only_last_ten_count() {
        let mut durations = vec![1000.0; 20];
        durations.extend([3.0; 10]);
        let estimator = estimator_with(&durations);
        assert_eq!(estimator.predict_load(), 3.0);
    }

    #[test]
    fn test_falling_trend_floored_at_zero() {
        let mut durations = vec![0.0; 5];
        durations.extend([100.0, 0.0, 0.0, 0.0, 0.0]);
        // mean 10, trend 0 - 100 = -100, 10 - 50 < 0
        let estimator = estimator_with(&durations);
        assert_eq!(estimator.predict_load(), 0.0);
    }

    #[test]
    fn test_recommendations() {
        assert_eq!(TrendScalingEstimator::recommend(15.0, 5, 1, 20), 10);
        assert_eq!(TrendScalingEstimator::recommend(0.5, 5, 1, 20), 2);
        assert_eq!(TrendScalingEstimator::recommend(2.0, 5, 1, 20), 5);
        assert_eq!(TrendScalingEstimator::recommend(0.0, 5, 1, 20), 5);
        assert_eq!(TrendScalingEstimator::recommend(15.0, 15, 1, 20), 20);
        assert_eq!(TrendScalingEstimator::recommend(0.5, 1, 1, 20), 1);
        assert_eq!(TrendScalingEstimator::recommend(10.0, 5, 1, 20), 5);
        assert_eq!(TrendScalingEstimator::recommend(1.0, 5, 1, 20), 5);
    }

    #[test]
    fn test_optimal_worker_count_from_history() {
        assert_eq!(estimator_with(&[15.0; 10]).optimal_worker_count(5), 10);
        assert_eq!(estimator_with(&[0.5; 10]).optimal_worker_count(5), 2);
        assert_eq!(estimator_with(&[2.0; 10]).optimal_worker_count(5), 5);
    }

    #[test]
    fn test_worker_bounds() {
        let estimator = TrendScalingEstimator::new(100).with_worker_bounds(3, 8);
        for _ in 0..10 {
            estimator.record_sample(15.0);
        }
        assert_eq!(estimator.optimal_worker_count(5), 8);
    }

    #[test]
    fn test_eviction_keeps_most_recent_in_order() {
        let estimator = TrendScalingEstimator::new(5);
        for i in 0..8 {
            estimator.record_sample(i as f64);
        }

        let kept: Vec<f64> = estimator
            .samples()
            .iter()
            .map(|s| s.duration_seconds)
            .collect();
        assert_eq!(kept, vec![3.0, 4.0, 5.0, 6.0, 7.0]);
        assert_eq!(estimator.len(), 5);
    }

    #[test]
    fn test_average() {
        assert_eq!(TrendScalingEstimator::new(10).average(), 0.0);
        assert_eq!(estimator_with(&[1.0, 2.0, 3.0]).average(), 2.0);
    }
}
