//! Baseline calibration
//!
//! Accumulates raw behavior records during warm-up and derives the baseline
//! by simple averaging once either the time bound or the count bound is hit.

use chrono::{DateTime, Utc};

use crate::baseline::{
    Baseline, DEFAULT_NORMAL_ACCELERATION, DEFAULT_NORMAL_HOVER_TIME, DEFAULT_NORMAL_VELOCITY,
};
use crate::config::CalibrationConfig;
use crate::types::BehaviorFeatureRecord;

/// Outcome of feeding one record to the collector
#[derive(Debug, Clone, PartialEq)]
pub enum CalibrationProgress {
    /// Still warming up
    Collecting { samples: usize, elapsed_ms: i64 },
    /// Bound reached; the buffer has been cleared
    Complete(Baseline),
}

/// Collects warm-up samples until a time or count bound is reached
#[derive(Debug, Clone)]
pub struct CalibrationCollector {
    samples: Vec<BehaviorFeatureRecord>,
    started_at: Option<DateTime<Utc>>,
    config: CalibrationConfig,
}

impl Default for CalibrationCollector {
    fn default() -> Self {
        Self::new(CalibrationConfig::default())
    }
}

impl CalibrationCollector {
    pub fn new(config: CalibrationConfig) -> Self {
        Self {
            samples: Vec::new(),
            started_at: None,
            config,
        }
    }

    /// Buffer one record observed at `now`
    pub fn collect(&mut self, record: &BehaviorFeatureRecord, now: DateTime<Utc>) -> CalibrationProgress {
        let started_at = *self.started_at.get_or_insert(now);
        self.samples.push(record.clone());

        // Negative when the time source jumped back
        let elapsed_ms = (now - started_at).num_milliseconds().max(0);
        if elapsed_ms >= self.config.max_duration_ms || self.samples.len() >= self.config.max_samples {
            let baseline = compute_baseline(&self.samples);
            self.reset();
            return CalibrationProgress::Complete(baseline);
        }

        CalibrationProgress::Collecting {
            samples: self.samples.len(),
            elapsed_ms,
        }
    }

    /// Number of buffered samples
    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    /// When the first sample of the current run arrived
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    /// Drop buffered samples and the start time
    pub fn reset(&mut self) {
        self.samples.clear();
        self.started_at = None;
    }
}

/// Average velocity, acceleration and hover time across samples.
///
/// Absent components count as 0. A component whose mean is not positive falls
/// back to its default so the result can always serve as a denominator.
pub fn compute_baseline(samples: &[BehaviorFeatureRecord]) -> Baseline {
    if samples.is_empty() {
        return Baseline::default();
    }

    let (velocity, acceleration, hover_time) =
        samples.iter().fold((0.0, 0.0, 0.0), |(v, a, h), s| {
            (
                v + s.avg_velocity.unwrap_or(0.0),
                a + s.avg_acceleration.unwrap_or(0.0),
                h + s.hover_time.unwrap_or(0.0),
            )
        });

    let n = samples.len().max(1) as f64;
    Baseline {
        normal_velocity: positive_or(velocity / n, DEFAULT_NORMAL_VELOCITY),
        normal_acceleration: positive_or(acceleration / n, DEFAULT_NORMAL_ACCELERATION),
        normal_hover_time: positive_or(hover_time / n, DEFAULT_NORMAL_HOVER_TIME),
    }
}

fn positive_or(value: f64, fallback: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        fallback
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 14, 0, 0).unwrap()
    }

    fn record(velocity: f64, acceleration: f64, hover: f64) -> BehaviorFeatureRecord {
        BehaviorFeatureRecord {
            avg_velocity: Some(velocity),
            avg_acceleration: Some(acceleration),
            hover_time: Some(hover),
            ..Default::default()
        }
    }

    #[test]
    fn test_unbounded_sample_limit_does_not_preallocate() {
        let mut collector = CalibrationCollector::new(CalibrationConfig {
            max_duration_ms: 120_000,
            max_samples: usize::MAX,
        });
        let progress = collector.collect(&record(1.0, 1.0, 1.0), t0());
        assert!(matches!(progress, CalibrationProgress::Collecting { samples: 1, .. }));
    }

    #[test]
    fn test_completes_at_sample_bound() {
        let mut collector = CalibrationCollector::default();

        for i in 0..299 {
            let progress = collector.collect(&record(2.0, 1.0, 1000.0), t0() + Duration::milliseconds(i));
            assert!(matches!(progress, CalibrationProgress::Collecting { .. }));
        }

        let progress = collector.collect(&record(2.0, 1.0, 1000.0), t0() + Duration::milliseconds(299));
        assert_eq!(
            progress,
            CalibrationProgress::Complete(Baseline::new(2.0, 1.0, 1000.0))
        );
        assert_eq!(collector.sample_count(), 0);
        assert!(collector.started_at().is_none());
    }

    #[test]
    fn test_completes_at_time_bound() {
        let mut collector = CalibrationCollector::default();

        collector.collect(&record(4.0, 2.0, 1000.0), t0());
        let progress = collector.collect(&record(2.0, 4.0, 2000.0), t0() + Duration::milliseconds(119_999));
        assert_eq!(
            progress,
            CalibrationProgress::Collecting {
                samples: 2,
                elapsed_ms: 119_999
            }
        );

        let progress = collector.collect(&record(3.0, 3.0, 3000.0), t0() + Duration::milliseconds(120_000));
        assert_eq!(
            progress,
            CalibrationProgress::Complete(Baseline::new(3.0, 3.0, 2000.0))
        );
    }

    #[test]
    fn test_empty_samples_use_default() {
        assert_eq!(compute_baseline(&[]), Baseline::default());
    }

    #[test]
    fn test_absent_components_count_as_zero() {
        let samples = vec![
            record(4.0, 2.0, 1000.0),
            BehaviorFeatureRecord::default(),
        ];
        let baseline = compute_baseline(&samples);
        assert_eq!(baseline.normal_velocity, 2.0);
        assert_eq!(baseline.normal_acceleration, 1.0);
        assert_eq!(baseline.normal_hover_time, 500.0);
    }

    #[test]
    fn test_zero_mean_falls_back_to_default() {
        let baseline = compute_baseline(&[BehaviorFeatureRecord::default()]);
        assert_eq!(baseline, Baseline::default());
    }

    #[test]
    fn test_custom_bounds() {
        let mut collector = CalibrationCollector::new(CalibrationConfig {
            max_duration_ms: 10_000,
            max_samples: 2,
        });
        collector.collect(&record(1.0, 1.0, 1.0), t0());
        let progress = collector.collect(&record(3.0, 3.0, 3.0), t0());
        assert_eq!(
            progress,
            CalibrationProgress::Complete(Baseline::new(2.0, 2.0, 2.0))
        );
    }
}
