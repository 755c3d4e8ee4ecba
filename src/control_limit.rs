//! Control limits estimated from the empirical statistic distribution.
//!
//! Instead of assuming a parametric distribution for I² or the prediction
//! error, the limit is read off a Gaussian kernel-density estimate of the
//! statistic sequence itself: Silverman's rule picks the bandwidth, the
//! density is accumulated into an empirical CDF over a fixed grid, and the
//! limit is the first grid value at which the CDF reaches the requested
//! confidence.

use crate::error::{IcaError, Result};
use linfa::Float;
use ndarray::Array1;
use ndarray_stats::QuantileExt;

/// Number of evaluation points spanning `[min, max]`.
const GRID_POINTS: usize = 1000;

/// Kernel-density control limit of a statistic sequence at the given
/// confidence level.
///
/// Falls back to the sample maximum when the confidence is never reached on
/// the grid or when the sequence is degenerate (all values equal, or a
/// collapsed bandwidth). Non-decreasing in `confidence` for a fixed
/// sequence.
pub fn kde_control_limit<F: Float>(values: &Array1<F>, confidence: F) -> Result<F> {
    if values.is_empty() {
        return Err(IcaError::InvalidValue(
            "cannot estimate a control limit from an empty sequence".into(),
        ));
    }
    if confidence <= F::zero() || confidence >= F::one() {
        return Err(IcaError::InvalidValue(format!(
            "confidence must lie in (0, 1), got {}",
            confidence
        )));
    }
    if values.iter().any(|v| !v.is_finite()) {
        return Err(IcaError::NumericalInstability(
            "control limit estimation".into(),
        ));
    }

    // safe unwrap: the sequence is non-empty and finite
    let max = *values.max().unwrap();
    let min = *values.min().unwrap();
    if max == min {
        return Ok(max);
    }

    let bandwidth = silverman_bandwidth(values);
    if !bandwidth.is_finite() || bandwidth <= F::zero() {
        return Ok(max);
    }

    let step = (max - min) / F::cast(GRID_POINTS - 1);
    let mut density = Vec::with_capacity(GRID_POINTS);
    let mut total = F::zero();
    for g in 0..GRID_POINTS {
        let x = min + step * F::cast(g);
        let mut d = F::zero();
        for v in values.iter() {
            let z = (x - *v) / bandwidth;
            // unnormalized Gaussian kernel; the normalization cancels in
            // the CDF ratio below
            d += (F::cast(-0.5) * z * z).exp();
        }
        density.push(d);
        total += d;
    }
    if !total.is_finite() || total <= F::zero() {
        return Ok(max);
    }

    let mut cumulative = F::zero();
    for (g, d) in density.iter().enumerate() {
        cumulative += *d;
        if cumulative / total >= confidence {
            return Ok(min + step * F::cast(g));
        }
    }
    Ok(max)
}

/// Silverman's rule of thumb: `1.06 · std · n^(-1/5)`.
fn silverman_bandwidth<F: Float>(values: &Array1<F>) -> F {
    let n = values.len();
    let nf = F::cast(n);
    let mean = values.sum() / nf;
    let denominator = if n > 1 { F::cast(n - 1) } else { F::one() };
    let std = (values.iter().map(|v| (*v - mean) * (*v - mean)).sum::<F>() / denominator).sqrt();
    F::cast(1.06) * std * F::cast((n as f64).powf(-0.2))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array;
    use ndarray_rand::{rand::SeedableRng, rand_distr::Normal, RandomExt};
    use rand_xoshiro::Xoshiro256Plus;

    fn gaussian_statistic(n: usize) -> Array1<f64> {
        let mut rng = Xoshiro256Plus::seed_from_u64(99);
        Array::random_using(n, Normal::new(10.0, 2.0).unwrap(), &mut rng)
    }

    #[test]
    fn limit_lies_inside_the_sample_range() {
        let stat = gaussian_statistic(400);
        let limit = kde_control_limit(&stat, 0.95).unwrap();
        let max = stat.iter().cloned().fold(f64::MIN, f64::max);
        let min = stat.iter().cloned().fold(f64::MAX, f64::min);
        assert!(limit > min && limit <= max);
    }

    #[test]
    fn limit_is_non_decreasing_in_confidence() {
        let stat = gaussian_statistic(400);
        let low = kde_control_limit(&stat, 0.90).unwrap();
        let mid = kde_control_limit(&stat, 0.95).unwrap();
        let high = kde_control_limit(&stat, 0.99).unwrap();
        assert!(low <= mid);
        assert!(mid <= high);
    }

    #[test]
    fn constant_sequence_returns_its_value() {
        let stat = Array1::from_elem(50, 3.25);
        assert_eq!(kde_control_limit(&stat, 0.99).unwrap(), 3.25);
    }

    #[test]
    fn invalid_confidence_is_rejected() {
        let stat = gaussian_statistic(20);
        assert!(matches!(
            kde_control_limit(&stat, 0.0),
            Err(IcaError::InvalidValue(_))
        ));
        assert!(matches!(
            kde_control_limit(&stat, 1.0),
            Err(IcaError::InvalidValue(_))
        ));
    }

    #[test]
    fn empty_and_non_finite_sequences_are_rejected() {
        let empty = Array1::<f64>::zeros(0);
        assert!(matches!(
            kde_control_limit(&empty, 0.95),
            Err(IcaError::InvalidValue(_))
        ));

        let broken = Array1::from(vec![1.0, f64::NAN, 2.0]);
        assert!(matches!(
            kde_control_limit(&broken, 0.95),
            Err(IcaError::NumericalInstability(_))
        ));
    }

    #[test]
    fn roughly_five_percent_exceed_the_95_limit() {
        let stat = gaussian_statistic(1000);
        let limit = kde_control_limit(&stat, 0.95).unwrap();
        let above = stat.iter().filter(|v| **v > limit).count();
        // KDE smoothing makes the quantile approximate; allow a wide band
        assert!(above >= 20 && above <= 90, "{} samples above", above);
    }
}
