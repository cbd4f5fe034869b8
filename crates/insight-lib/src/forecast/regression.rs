//! Ordinary least squares over (hours, value) points

use crate::models::Sample;

/// Fitted line y = slope * x + intercept with its goodness of fit
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearFit {
    /// Change per hour
    pub slope: f64,
    pub intercept: f64,
    /// Coefficient of determination, clamped into [0, 1]
    pub r_squared: f64,
}

impl LinearFit {
    pub fn predict(&self, x: f64) -> f64 {
        self.slope * x + self.intercept
    }
}

/// Convert samples to (hours since first sample, value)
///
/// Anchoring at the first timestamp keeps the sums small.
pub fn to_hours(samples: &[Sample]) -> Vec<(f64, f64)> {
    let Some(first) = samples.first() else {
        return Vec::new();
    };
    let t0 = first.timestamp;
    samples
        .iter()
        .map(|s| {
            let millis = (s.timestamp - t0).num_milliseconds() as f64;
            (millis / 3_600_000.0, s.value)
        })
        .collect()
}

/// Closed-form least-squares fit
///
/// A degenerate x spread (all points at the same instant) yields a flat line
/// through mean(y).
pub fn fit(points: &[(f64, f64)]) -> LinearFit {
    if points.is_empty() {
        return LinearFit {
            slope: 0.0,
            intercept: 0.0,
            r_squared: 0.0,
        };
    }

    let n = points.len() as f64;
    let mut sum_x = 0.0;
    let mut sum_y = 0.0;
    let mut sum_xy = 0.0;
    let mut sum_xx = 0.0;

    for (x, y) in points {
        sum_x += x;
        sum_y += y;
        sum_xy += x * y;
        sum_xx += x * x;
    }

    let mean_y = sum_y / n;
    let denominator = n * sum_xx - sum_x * sum_x;

    let (slope, intercept) = if denominator.abs() < f64::EPSILON {
        (0.0, mean_y)
    } else {
        let slope = (n * sum_xy - sum_x * sum_y) / denominator;
        (slope, (sum_y - slope * sum_x) / n)
    };

    let (slope, intercept) = if slope.is_finite() && intercept.is_finite() {
        (slope, intercept)
    } else {
        (0.0, mean_y)
    };

    LinearFit {
        slope,
        intercept,
        r_squared: r_squared(points, slope, intercept, mean_y),
    }
}

/// R² = 1 − SSres/SStot, floored at 0; a flat series reports 0
fn r_squared(points: &[(f64, f64)], slope: f64, intercept: f64, mean_y: f64) -> f64 {
    let mut ss_res = 0.0;
    let mut ss_tot = 0.0;

    for (x, y) in points {
        let y_pred = slope * x + intercept;
        ss_res += (y - y_pred).powi(2);
        ss_tot += (y - mean_y).powi(2);
    }

    if ss_tot.abs() < f64::EPSILON {
        return 0.0;
    }

    let r2 = 1.0 - ss_res / ss_tot;
    if r2.is_finite() {
        r2.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    #[test]
    fn test_perfect_line() {
        let points: Vec<(f64, f64)> = (0..10).map(|i| (i as f64, 2.0 * i as f64 + 5.0)).collect();
        let f = fit(&points);
        assert!((f.slope - 2.0).abs() < 1e-9);
        assert!((f.intercept - 5.0).abs() < 1e-9);
        assert!((f.r_squared - 1.0).abs() < 1e-9);
        assert!((f.predict(20.0) - 45.0).abs() < 1e-9);
    }

    #[test]
    fn test_degenerate_x_is_flat_through_mean() {
        let points = [(3.0, 10.0), (3.0, 20.0), (3.0, 30.0)];
        let f = fit(&points);
        assert_eq!(f.slope, 0.0);
        assert_eq!(f.intercept, 20.0);
        assert_eq!(f.r_squared, 0.0);
    }

    #[test]
    fn test_r_squared_never_negative() {
        // Zig-zag around a flat line explains nothing
        let points: Vec<(f64, f64)> = (0..12)
            .map(|i| (i as f64, if i % 2 == 0 { 10.0 } else { 90.0 }))
            .collect();
        let f = fit(&points);
        assert!(f.r_squared >= 0.0);
        assert!(f.r_squared <= 1.0);
    }

    #[test]
    fn test_flat_series() {
        let points: Vec<(f64, f64)> = (0..6).map(|i| (i as f64, 42.0)).collect();
        let f = fit(&points);
        assert_eq!(f.slope, 0.0);
        assert_eq!(f.r_squared, 0.0);
    }

    #[test]
    fn test_to_hours_anchors_at_first_sample() {
        let start = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let samples = vec![
            Sample::new(start, 1.0),
            Sample::new(start + Duration::minutes(30), 2.0),
            Sample::new(start + Duration::hours(2), 3.0),
        ];
        assert_eq!(to_hours(&samples), vec![(0.0, 1.0), (0.5, 2.0), (2.0, 3.0)]);
        assert!(to_hours(&[]).is_empty());
    }
}
