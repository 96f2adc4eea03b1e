//! Statistic kinds and the one-pass accumulator behind regional reduction.

use std::fmt;
use std::str::FromStr;

use zonalis_core::{Error, Result};

/// A statistic computed over the valid pixels sampled inside a region.
///
/// Result keys combine the band name with [`StatKind::key`], so reducing a
/// band `NDVI` with `Mean` and `StdDev` produces `NDVI_mean` and
/// `NDVI_stdDev`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatKind {
    Sum,
    Mean,
    /// Population standard deviation.
    StdDev,
    Min,
    Max,
    /// Number of valid (non-nodata) samples. Always defined, even when no
    /// sample survived the nodata filter.
    Count,
    /// Shorthand for `Percentile(50)`.
    Median,
    /// Percentile by linear interpolation between closest ranks.
    /// The rank must satisfy `0 < p < 100`.
    Percentile(u8),
}

impl StatKind {
    /// Suffix appended to the band name in result keys.
    pub fn key(&self) -> String {
        match self {
            StatKind::Sum => "sum".to_string(),
            StatKind::Mean => "mean".to_string(),
            StatKind::StdDev => "stdDev".to_string(),
            StatKind::Min => "min".to_string(),
            StatKind::Max => "max".to_string(),
            StatKind::Count => "count".to_string(),
            StatKind::Median => "median".to_string(),
            StatKind::Percentile(p) => format!("p{}", p),
        }
    }

    /// Percentile ranks must fall strictly between 0 and 100.
    pub fn validate(&self) -> Result<()> {
        match self {
            StatKind::Percentile(p) if *p == 0 || *p >= 100 => Err(Error::InvalidParameter {
                name: "percentile",
                value: p.to_string(),
                reason: "rank must satisfy 0 < p < 100".to_string(),
            }),
            _ => Ok(()),
        }
    }

    /// Order statistics need the full sample buffer; moment statistics do not.
    pub(crate) fn needs_values(&self) -> bool {
        matches!(self, StatKind::Median | StatKind::Percentile(_))
    }
}

impl fmt::Display for StatKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

impl FromStr for StatKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let kind = match s {
            "sum" => StatKind::Sum,
            "mean" => StatKind::Mean,
            "stdDev" | "stddev" => StatKind::StdDev,
            "min" => StatKind::Min,
            "max" => StatKind::Max,
            "count" => StatKind::Count,
            "median" => StatKind::Median,
            _ => match s.strip_prefix('p').and_then(|r| r.parse::<u8>().ok()) {
                Some(rank) => StatKind::Percentile(rank),
                None => {
                    return Err(Error::InvalidParameter {
                        name: "statistic",
                        value: s.to_string(),
                        reason: "expected sum, mean, stdDev, min, max, count, median or p<rank>"
                            .to_string(),
                    })
                }
            },
        };
        kind.validate()?;
        Ok(kind)
    }
}

/// Rejects an empty request and out-of-range percentile ranks.
pub(crate) fn validate_statistics(stats: &[StatKind]) -> Result<()> {
    if stats.is_empty() {
        return Err(Error::InvalidParameter {
            name: "statistics",
            value: "[]".to_string(),
            reason: "at least one statistic is required".to_string(),
        });
    }
    for stat in stats {
        stat.validate()?;
    }
    Ok(())
}

/// Running moments for one band of one region.
///
/// Every requested statistic is answered from a single pass over the
/// samples; the raw value buffer is kept only when an order statistic
/// was requested.
#[derive(Debug, Clone)]
pub(crate) struct StatAccumulator {
    count: u64,
    sum: f64,
    sum_sq: f64,
    min: f64,
    max: f64,
    values: Option<Vec<f64>>,
}

impl StatAccumulator {
    pub(crate) fn new(keep_values: bool) -> Self {
        Self {
            count: 0,
            sum: 0.0,
            sum_sq: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            values: keep_values.then(Vec::new),
        }
    }

    /// Callers filter nodata before pushing; `value` is always finite.
    pub(crate) fn push(&mut self, value: f64) {
        self.count += 1;
        self.sum += value;
        self.sum_sq += value * value;
        if value < self.min {
            self.min = value;
        }
        if value > self.max {
            self.max = value;
        }
        if let Some(buf) = &mut self.values {
            buf.push(value);
        }
    }

    /// Answer every requested statistic, in request order.
    pub(crate) fn finalize(mut self, stats: &[StatKind]) -> Vec<Option<f64>> {
        if let Some(buf) = &mut self.values {
            buf.sort_unstable_by(f64::total_cmp);
        }
        stats.iter().map(|stat| self.value_of(*stat)).collect()
    }

    fn value_of(&self, stat: StatKind) -> Option<f64> {
        match stat {
            StatKind::Count => Some(self.count as f64),
            _ if self.count == 0 => None,
            StatKind::Sum => Some(self.sum),
            StatKind::Mean => Some(self.sum / self.count as f64),
            StatKind::StdDev => {
                let n = self.count as f64;
                let mean = self.sum / n;
                // One-pass variance can dip slightly negative from rounding.
                let variance = (self.sum_sq / n - mean * mean).max(0.0);
                Some(variance.sqrt())
            }
            StatKind::Min => Some(self.min),
            StatKind::Max => Some(self.max),
            StatKind::Median => self.percentile(50.0),
            StatKind::Percentile(p) => self.percentile(f64::from(p)),
        }
    }

    /// Linear interpolation between closest ranks; buffer must be sorted.
    fn percentile(&self, p: f64) -> Option<f64> {
        let buf = self.values.as_ref()?;
        if buf.is_empty() {
            return None;
        }
        let rank = p / 100.0 * (buf.len() - 1) as f64;
        let lo = rank.floor() as usize;
        let hi = rank.ceil() as usize;
        if lo == hi {
            return Some(buf[lo]);
        }
        let frac = rank - lo as f64;
        Some(buf[lo] * (1.0 - frac) + buf[hi] * frac)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f64 = 1e-10;

    #[test]
    fn test_stat_keys() {
        assert_eq!(StatKind::Sum.key(), "sum");
        assert_eq!(StatKind::StdDev.key(), "stdDev");
        assert_eq!(StatKind::Median.key(), "median");
        assert_eq!(StatKind::Percentile(25).key(), "p25");
    }

    #[test]
    fn test_stat_parse() {
        assert_eq!("mean".parse::<StatKind>().unwrap(), StatKind::Mean);
        assert_eq!("stdDev".parse::<StatKind>().unwrap(), StatKind::StdDev);
        assert_eq!("p90".parse::<StatKind>().unwrap(), StatKind::Percentile(90));
        assert!("p0".parse::<StatKind>().is_err());
        assert!("p100".parse::<StatKind>().is_err());
        assert!("variance".parse::<StatKind>().is_err());
    }

    #[test]
    fn test_accumulator_moments() {
        let mut acc = StatAccumulator::new(false);
        for v in [1.0, 2.0, 3.0, 4.0, 5.0] {
            acc.push(v);
        }
        let stats = [
            StatKind::Sum,
            StatKind::Mean,
            StatKind::StdDev,
            StatKind::Min,
            StatKind::Max,
            StatKind::Count,
        ];
        let out = acc.finalize(&stats);
        assert!((out[0].unwrap() - 15.0).abs() < EPSILON);
        assert!((out[1].unwrap() - 3.0).abs() < EPSILON);
        assert!((out[2].unwrap() - 2.0_f64.sqrt()).abs() < EPSILON);
        assert!((out[3].unwrap() - 1.0).abs() < EPSILON);
        assert!((out[4].unwrap() - 5.0).abs() < EPSILON);
        assert!((out[5].unwrap() - 5.0).abs() < EPSILON);
    }

    #[test]
    fn test_accumulator_empty() {
        let acc = StatAccumulator::new(true);
        let out = acc.finalize(&[StatKind::Count, StatKind::Mean, StatKind::Median]);
        assert_eq!(out[0], Some(0.0));
        assert_eq!(out[1], None);
        assert_eq!(out[2], None);
    }

    #[test]
    fn test_median_even_count() {
        let mut acc = StatAccumulator::new(true);
        for v in [4.0, 1.0, 3.0, 2.0] {
            acc.push(v);
        }
        let out = acc.finalize(&[StatKind::Median]);
        assert!((out[0].unwrap() - 2.5).abs() < EPSILON);
    }

    #[test]
    fn test_percentile_interpolation() {
        let mut acc = StatAccumulator::new(true);
        for v in 0..=10 {
            acc.push(f64::from(v));
        }
        let out = acc.finalize(&[StatKind::Percentile(90), StatKind::Percentile(25)]);
        assert!((out[0].unwrap() - 9.0).abs() < EPSILON);
        assert!((out[1].unwrap() - 2.5).abs() < EPSILON);
    }

    #[test]
    fn test_median_matches_p50() {
        let mut a = StatAccumulator::new(true);
        let mut b = StatAccumulator::new(true);
        for v in [7.0, 1.5, 9.0, 2.0, 4.0, 4.0, 8.25] {
            a.push(v);
            b.push(v);
        }
        let median = a.finalize(&[StatKind::Median])[0];
        let p50 = b.finalize(&[StatKind::Percentile(50)])[0];
        assert_eq!(median, p50);
    }
}
