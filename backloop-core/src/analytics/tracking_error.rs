//! Tracking Error (C8, §4.8) — compares the frictionless (theoretical) and
//! frictional (realistic) equity paths. Zero-variance denominators yield
//! `NaN`, which `serde_json` serialises as `null` per §8's boundary test.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrackingError {
    pub rmse: f64,
    pub max_divergence_bps: f64,
    pub correlation: f64,
    pub annualized_te: f64,
}

fn mean(xs: &[f64]) -> f64 {
    xs.iter().sum::<f64>() / xs.len() as f64
}

fn sample_variance(xs: &[f64]) -> f64 {
    if xs.len() < 2 {
        return f64::NAN;
    }
    let m = mean(xs);
    xs.iter().map(|x| (x - m).powi(2)).sum::<f64>() / (xs.len() - 1) as f64
}

fn pearson(a: &[f64], b: &[f64]) -> f64 {
    if a.len() < 2 || a.len() != b.len() {
        return f64::NAN;
    }
    let ma = mean(a);
    let mb = mean(b);
    let cov: f64 = a.iter().zip(b).map(|(x, y)| (x - ma) * (y - mb)).sum();
    let sa: f64 = a.iter().map(|x| (x - ma).powi(2)).sum::<f64>().sqrt();
    let sb: f64 = b.iter().map(|y| (y - mb).powi(2)).sum::<f64>().sqrt();
    if sa == 0.0 || sb == 0.0 {
        return f64::NAN;
    }
    cov / (sa * sb)
}

fn rmse(theo_returns: &[f64], real_returns: &[f64]) -> f64 {
    let n = theo_returns.len().min(real_returns.len());
    if n == 0 {
        return f64::NAN;
    }
    let sum_sq: f64 = (0..n).map(|i| (theo_returns[i] - real_returns[i]).powi(2)).sum();
    (sum_sq / n as f64).sqrt()
}

fn compute_from_returns(theo_returns: &[f64], real_returns: &[f64], bars_per_year: f64) -> TrackingError {
    let n = theo_returns.len().min(real_returns.len());
    let diffs: Vec<f64> = (0..n).map(|i| theo_returns[i] - real_returns[i]).collect();
    TrackingError {
        rmse: rmse(theo_returns, real_returns),
        max_divergence_bps: f64::NAN,
        correlation: pearson(&theo_returns[..n], &real_returns[..n]),
        annualized_te: sample_variance(&diffs).sqrt() * bars_per_year.sqrt(),
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TrackingErrorPoint {
    pub ts: DateTime<Utc>,
    pub divergence_pct: f64,
    pub cumulative_rmse: f64,
}

/// Bar-by-bar accumulator the Engine feeds equity pairs into; produces both
/// the per-bar series (`tracking_error_series`) and the final aggregate.
#[derive(Debug, Default, Clone)]
pub struct TrackingErrorAccumulator {
    theo_returns: Vec<f64>,
    real_returns: Vec<f64>,
    max_divergence_bps: f64,
    last_theo: Option<f64>,
    last_real: Option<f64>,
}

impl TrackingErrorAccumulator {
    pub fn new() -> Self {
        Self { max_divergence_bps: f64::NAN, ..Default::default() }
    }

    /// Feeds one bar's aligned equity marks; returns a sample once at least
    /// two equity observations exist (§4.9 step 7).
    pub fn observe(&mut self, ts: DateTime<Utc>, theo_equity: f64, real_equity: f64) -> Option<TrackingErrorPoint> {
        let divergence_pct = if theo_equity != 0.0 { (real_equity / theo_equity - 1.0) * 100.0 } else { f64::NAN };
        if theo_equity != 0.0 {
            let bps = (real_equity / theo_equity - 1.0).abs() * 10_000.0;
            self.max_divergence_bps = if self.max_divergence_bps.is_nan() { bps } else { self.max_divergence_bps.max(bps) };
        }

        let point = match (self.last_theo, self.last_real) {
            (Some(lt), Some(lr)) if lt != 0.0 => {
                let theo_ret = theo_equity / lt - 1.0;
                let real_ret = if lr != 0.0 { real_equity / lr - 1.0 } else { f64::NAN };
                self.theo_returns.push(theo_ret);
                self.real_returns.push(real_ret);
                let cumulative_rmse = rmse(&self.theo_returns, &self.real_returns);
                Some(TrackingErrorPoint { ts, divergence_pct, cumulative_rmse })
            }
            _ => None,
        };
        self.last_theo = Some(theo_equity);
        self.last_real = Some(real_equity);
        point
    }

    pub fn finalize(&self, bars_per_year: f64) -> TrackingError {
        let mut result = compute_from_returns(&self.theo_returns, &self.real_returns, bars_per_year);
        result.max_divergence_bps = self.max_divergence_bps;
        result
    }
}
