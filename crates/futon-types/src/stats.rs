//! Statistics summaries returned by aggregation views.

use serde::{Deserialize, Serialize};

/// Raw statistics tuple as emitted by the store's `_stats` reduce.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct StatsSummary {
    pub sum: f64,
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub sumsqr: f64,
}

impl StatsSummary {
    /// Derive mean, population variance, and standard deviation.
    pub fn enhance(self) -> EnhancedStats {
        // An empty group never reaches here from a real view (the store emits
        // no row for it), but avoid NaN if it does.
        let (mean, variance) = if self.count == 0 {
            (0.0, 0.0)
        } else {
            let n = self.count as f64;
            let mean = self.sum / n;
            (mean, self.sumsqr / n - mean * mean)
        };
        EnhancedStats {
            sum: self.sum,
            count: self.count,
            min: self.min,
            max: self.max,
            sumsqr: self.sumsqr,
            mean,
            variance,
            stddev: variance.sqrt(),
        }
    }
}

/// A [`StatsSummary`] with the derived moments attached.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct EnhancedStats {
    pub sum: f64,
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub sumsqr: f64,
    pub mean: f64,
    pub variance: f64,
    pub stddev: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enhance_derives_mean_variance_stddev() {
        let raw = StatsSummary {
            sum: 281.0,
            count: 4,
            min: 45.0,
            max: 102.0,
            sumsqr: 21857.0,
        };
        let e = raw.enhance();
        assert!((e.mean - 281.0 / 4.0).abs() < 1e-9);
        assert!((e.variance - (21857.0 / 4.0 - e.mean * e.mean)).abs() < 1e-9);
        assert!((e.stddev - e.variance.sqrt()).abs() < 1e-9);
    }

    #[test]
    fn enhance_keeps_raw_fields() {
        let raw = StatsSummary {
            sum: 10.0,
            count: 2,
            min: 4.0,
            max: 6.0,
            sumsqr: 52.0,
        };
        let e = raw.enhance();
        assert_eq!(e.sum, 10.0);
        assert_eq!(e.count, 2);
        assert_eq!(e.min, 4.0);
        assert_eq!(e.max, 6.0);
    }

    #[test]
    fn empty_group_does_not_produce_nan() {
        let raw = StatsSummary {
            sum: 0.0,
            count: 0,
            min: 0.0,
            max: 0.0,
            sumsqr: 0.0,
        };
        let e = raw.enhance();
        assert_eq!(e.mean, 0.0);
        assert_eq!(e.stddev, 0.0);
    }

    #[test]
    fn round_trips_through_json() {
        let raw = StatsSummary {
            sum: 3.0,
            count: 2,
            min: 1.0,
            max: 2.0,
            sumsqr: 5.0,
        };
        let v = serde_json::to_value(raw).unwrap();
        let back: StatsSummary = serde_json::from_value(v).unwrap();
        assert_eq!(back, raw);
    }
}
