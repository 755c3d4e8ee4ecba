//! Per-sample monitoring statistics.
//!
//! Two statistics watch the process from opposite sides: I² measures how far
//! a sample sits inside the independent-source space, the squared prediction
//! error measures what the source space failed to explain. Anything
//! non-finite arriving here is a fatal error; a silently zeroed entry would
//! corrupt the control-limit estimate downstream.

use crate::error::{IcaError, Result};
use linfa::Float;
use ndarray::{Array1, Array2, Axis};

/// I² statistic: per-sample sum of squared independent-source coordinates.
pub fn i_squared<F: Float>(sources: &Array2<F>) -> Result<Array1<F>> {
    if sources.iter().any(|v| !v.is_finite()) {
        return Err(IcaError::NumericalInstability(
            "independent source matrix".into(),
        ));
    }
    Ok(sources.map_axis(Axis(1), |row| row.iter().map(|v| *v * *v).sum()))
}

/// Squared prediction error: per-sample sum of squared residuals between the
/// standardized records and their reconstruction.
pub fn squared_prediction_error<F: Float>(
    original: &Array2<F>,
    reconstructed: &Array2<F>,
) -> Result<Array1<F>> {
    if original.nrows() != reconstructed.nrows() {
        return Err(IcaError::DimensionMismatch {
            expected: original.nrows(),
            actual: reconstructed.nrows(),
        });
    }
    if original.ncols() != reconstructed.ncols() {
        return Err(IcaError::DimensionMismatch {
            expected: original.ncols(),
            actual: reconstructed.ncols(),
        });
    }
    if original.iter().any(|v| !v.is_finite()) || reconstructed.iter().any(|v| !v.is_finite()) {
        return Err(IcaError::NumericalInstability(
            "reconstruction residual".into(),
        ));
    }
    let residual = original - reconstructed;
    Ok(residual.map_axis(Axis(1), |row| row.iter().map(|v| *v * *v).sum()))
}

/// Indices of samples whose statistic exceeds the control limit.
pub fn exceedances<F: Float>(values: &Array1<F>, limit: F) -> Vec<usize> {
    values
        .iter()
        .enumerate()
        .filter(|(_, v)| **v > limit)
        .map(|(i, _)| i)
        .collect()
}
