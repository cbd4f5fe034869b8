//! Pearson correlation over bucket-aligned series

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::models::Sample;

const RELATIVE_TOLERANCE: f64 = 1e-12;

/// Pair up values that share a bucket timestamp
///
/// Output order follows `a`. Non-finite values are dropped; if a series holds
/// the same timestamp twice the later sample wins.
pub fn align(a: &[Sample], b: &[Sample]) -> (Vec<f64>, Vec<f64>) {
    let lookup: HashMap<DateTime<Utc>, f64> = b
        .iter()
        .filter(|s| s.value.is_finite())
        .map(|s| (s.timestamp, s.value))
        .collect();

    let mut seen: HashMap<DateTime<Utc>, usize> = HashMap::new();
    let mut xs = Vec::new();
    let mut ys = Vec::new();

    for sample in a.iter().filter(|s| s.value.is_finite()) {
        let Some(&y) = lookup.get(&sample.timestamp) else {
            continue;
        };
        match seen.get(&sample.timestamp) {
            Some(&idx) => xs[idx] = sample.value,
            None => {
                seen.insert(sample.timestamp, xs.len());
                xs.push(sample.value);
                ys.push(y);
            }
        }
    }

    (xs, ys)
}

/// Pearson correlation coefficient
///
/// r = (nΣxy − ΣxΣy) / √((nΣx² − (Σx)²)(nΣy² − (Σy)²)), or 0 when either
/// series has no variance. The result is always within [-1, 1].
pub fn pearson(xs: &[f64], ys: &[f64]) -> f64 {
    let n = xs.len().min(ys.len());
    if n < 2 {
        return 0.0;
    }

    let nf = n as f64;
    let mut sum_x = 0.0;
    let mut sum_y = 0.0;
    let mut sum_xy = 0.0;
    let mut sum_xx = 0.0;
    let mut sum_yy = 0.0;

    for (x, y) in xs.iter().zip(ys.iter()).take(n) {
        sum_x += x;
        sum_y += y;
        sum_xy += x * y;
        sum_xx += x * x;
        sum_yy += y * y;
    }

    let den_x = nf * sum_xx - sum_x * sum_x;
    let den_y = nf * sum_yy - sum_y * sum_y;

    // Cancellation noise on flat series must read as zero variance
    if den_x <= RELATIVE_TOLERANCE * nf * sum_xx || den_y <= RELATIVE_TOLERANCE * nf * sum_yy {
        return 0.0;
    }

    let denominator = (den_x * den_y).sqrt();
    if !denominator.is_finite() || denominator == 0.0 {
        return 0.0;
    }

    let r = (nf * sum_xy - sum_x * sum_y) / denominator;
    if r.is_finite() {
        r.clamp(-1.0, 1.0)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn bucketed(values: &[(i64, f64)]) -> Vec<Sample> {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        values
            .iter()
            .map(|(bucket, v)| Sample::new(start + Duration::minutes(bucket * 5), *v))
            .collect()
    }

    #[test]
    fn test_perfect_positive() {
        let xs = [1.0, 2.0, 3.0, 4.0, 5.0];
        let ys = [2.0, 4.0, 6.0, 8.0, 10.0];
        assert!((pearson(&xs, &ys) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_inverse_series() {
        let xs = [10.0, 35.0, 20.0, 80.0, 55.0, 40.0];
        let ys: Vec<f64> = xs.iter().map(|x| 100.0 - x).collect();
        assert!((pearson(&xs, &ys) + 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_symmetry() {
        let xs = [3.0, 7.5, 1.2, 9.9, 4.4, 6.1];
        let ys = [2.0, 8.1, 0.5, 7.7, 5.0, 5.5];
        assert_eq!(pearson(&xs, &ys), pearson(&ys, &xs));
    }

    #[test]
    fn test_flat_series_is_zero() {
        let xs = [0.1, 0.1, 0.1, 0.1, 0.1];
        let ys = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(pearson(&xs, &ys), 0.0);
        assert_eq!(pearson(&[], &[]), 0.0);
    }

    #[test]
    fn test_align_on_shared_buckets() {
        let a = bucketed(&[(0, 1.0), (1, 2.0), (2, 3.0), (4, 5.0)]);
        let b = bucketed(&[(1, 20.0), (2, 30.0), (3, 40.0), (4, 50.0)]);

        let (xs, ys) = align(&a, &b);
        assert_eq!(xs, vec![2.0, 3.0, 5.0]);
        assert_eq!(ys, vec![20.0, 30.0, 50.0]);
    }

    #[test]
    fn test_align_skips_non_finite() {
        let a = bucketed(&[(0, f64::NAN), (1, 2.0)]);
        let b = bucketed(&[(0, 1.0), (1, f64::INFINITY)]);
        let (xs, ys) = align(&a, &b);
        assert!(xs.is_empty());
        assert!(ys.is_empty());
    }
}
