//! Temporal validation (§4.9 step 1). `CandleSeries` already refuses
//! non-chronological or duplicate bars at construction, so this tracker's
//! remaining job is gap accounting and the aggregate pass/fail tag.

use super::config::TemporalValidationConfig;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TemporalStatus {
    Pass,
    FailedTemporalValidation,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TemporalValidation {
    pub status: TemporalStatus,
    pub gap_count: u64,
    pub significant_gap_count: u64,
    pub total_bars: u64,
    pub gap_ratio: f64,
    pub max_gap_ratio: f64,
}

pub struct TemporalValidator {
    config: TemporalValidationConfig,
    timeframe: Duration,
    previous_ts: Option<DateTime<Utc>>,
    gap_count: u64,
    significant_gap_count: u64,
    total_bars: u64,
    significant_gap_elapsed: Duration,
    total_elapsed: Duration,
}

impl TemporalValidator {
    pub fn new(config: TemporalValidationConfig, timeframe: Duration) -> Self {
        Self {
            config,
            timeframe,
            previous_ts: None,
            gap_count: 0,
            significant_gap_count: 0,
            total_bars: 0,
            significant_gap_elapsed: Duration::zero(),
            total_elapsed: Duration::zero(),
        }
    }

    /// Records one bar's timestamp. `CandleSeries` already guarantees
    /// `ts > previous_ts`; this only classifies the gap's size.
    pub fn observe(&mut self, ts: DateTime<Utc>) {
        self.total_bars += 1;
        if let Some(previous) = self.previous_ts {
            let gap = ts - previous;
            self.total_elapsed = self.total_elapsed + gap;
            if gap > self.timeframe {
                self.gap_count += 1;
            }
            let threshold_ms = (self.timeframe.num_milliseconds() as f64 * self.config.significant_gap_multiple) as i64;
            if gap > Duration::milliseconds(threshold_ms) {
                self.significant_gap_count += 1;
                self.significant_gap_elapsed = self.significant_gap_elapsed + gap;
            }
        }
        self.previous_ts = Some(ts);
    }

    pub fn gap_ratio(&self) -> f64 {
        let total_secs = self.total_elapsed.num_milliseconds() as f64;
        if total_secs <= 0.0 {
            0.0
        } else {
            self.significant_gap_elapsed.num_milliseconds() as f64 / total_secs
        }
    }

    pub fn finalize(&self) -> TemporalValidation {
        let gap_ratio = self.gap_ratio();
        let status = if gap_ratio > self.config.max_gap_ratio { TemporalStatus::FailedTemporalValidation } else { TemporalStatus::Pass };
        TemporalValidation {
            status,
            gap_count: self.gap_count,
            significant_gap_count: self.significant_gap_count,
            total_bars: self.total_bars,
            gap_ratio,
            max_gap_ratio: self.config.max_gap_ratio,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn no_gaps_passes() {
        let mut validator = TemporalValidator::new(TemporalValidationConfig::default(), Duration::minutes(1));
        for i in 0..10 {
            validator.observe(ts(i * 60));
        }
        let result = validator.finalize();
        assert_eq!(result.status, TemporalStatus::Pass);
        assert_eq!(result.significant_gap_count, 0);
    }

    #[test]
    fn a_gap_over_k_times_timeframe_is_significant() {
        let mut validator = TemporalValidator::new(TemporalValidationConfig::default(), Duration::minutes(1));
        validator.observe(ts(0));
        validator.observe(ts(60));
        validator.observe(ts(60 + 3 * 60));
        let result = validator.finalize();
        assert_eq!(result.significant_gap_count, 1);
    }

    #[test]
    fn gap_ratio_above_bound_fails_temporal_validation() {
        let config = TemporalValidationConfig { significant_gap_multiple: 2.0, max_gap_ratio: 0.10, abort_on_failure: false };
        let mut validator = TemporalValidator::new(config, Duration::minutes(1));
        validator.observe(ts(0));
        validator.observe(ts(60));
        validator.observe(ts(60 + 10_000 * 60));
        let result = validator.finalize();
        assert_eq!(result.status, TemporalStatus::FailedTemporalValidation);
    }
}
