//! Whitening of centered observation matrices.
//!
//! Whitening rescales (and optionally decorrelates) the variables so that
//! the fixed-point solver iterates on unit-variance data. The monitoring
//! product this crate derives from never performs the full
//! eigendecomposition: it reads the eigenvalue estimates off the covariance
//! diagonal, which is cheap but treats the variables as already
//! near-decorrelated. That behavior is kept as the default
//! [`WhiteningMethod::DiagonalApprox`]; [`WhiteningMethod::Eigh`] is the
//! exact drop-in replacement.

use crate::error::{IcaError, Result};
use linfa::Float;
use linfa_linalg::eigh::Eigh;
use ndarray::{Array1, Array2};

/// Eigenvalue estimates below this floor are boosted before inversion.
const EIGENVALUE_FLOOR: f64 = 1e-10;

/// How the covariance of the centered data is turned into a whitening
/// transform. Both variants produce an `nvariables × nvariables` matrix that
/// right-multiplies the sample vectors, so they substitute for each other
/// without touching the solver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WhiteningMethod {
    /// Use the covariance diagonal as the eigenvalue estimates. This skips
    /// the decorrelation step entirely and only rescales each variable.
    DiagonalApprox,
    /// Exact symmetric eigendecomposition of the covariance,
    /// `U · diag(1/sqrt(λ)) · U^T`.
    Eigh,
}

impl Default for WhiteningMethod {
    fn default() -> Self {
        WhiteningMethod::DiagonalApprox
    }
}

impl WhiteningMethod {
    /// Whitening matrix for the given centered observation matrix.
    ///
    /// Fails with [`IcaError::Whitening`] as soon as any intermediate value
    /// turns non-finite; NaN must not travel past this stage.
    pub fn whitening_matrix<F: Float>(&self, centered: &Array2<F>) -> Result<Array2<F>> {
        let nsamples = centered.nrows();
        if nsamples < 2 {
            return Err(IcaError::InsufficientSamples {
                expected: 2,
                actual: nsamples,
            });
        }
        let cov = covariance(centered);
        if cov.iter().any(|v| !v.is_finite()) {
            return Err(IcaError::Whitening(
                "covariance contains non-finite entries".into(),
            ));
        }

        let matrix = match self {
            WhiteningMethod::DiagonalApprox => diagonal_whitening(&cov)?,
            WhiteningMethod::Eigh => eigh_whitening(&cov)?,
        };
        if matrix.iter().any(|v| !v.is_finite()) {
            return Err(IcaError::Whitening(
                "whitening matrix contains non-finite entries".into(),
            ));
        }
        Ok(matrix)
    }
}

/// Empirical covariance `X^T X / (n - 1)` of an already centered matrix.
fn covariance<F: Float>(centered: &Array2<F>) -> Array2<F> {
    let scale = F::cast(centered.nrows() - 1);
    centered.t().dot(centered).mapv(|v| v / scale)
}

fn diagonal_whitening<F: Float>(cov: &Array2<F>) -> Result<Array2<F>> {
    let floor = F::cast(EIGENVALUE_FLOOR);
    let nvariables = cov.nrows();
    let mut matrix = Array2::zeros((nvariables, nvariables));
    for j in 0..nvariables {
        let mut eigenvalue = cov[(j, j)];
        if eigenvalue.abs() < floor {
            // boost a collapsed diagonal entry from the row's absolute sum
            let row_sum = cov.row(j).iter().map(|v| v.abs()).sum::<F>();
            eigenvalue = row_sum.max(floor);
        }
        let scale = F::one() / eigenvalue.sqrt().max(floor.sqrt());
        if !scale.is_finite() {
            return Err(IcaError::Whitening(format!(
                "variable {} produced a non-finite whitening scale",
                j
            )));
        }
        matrix[(j, j)] = scale;
    }
    Ok(matrix)
}

fn eigh_whitening<F: Float>(cov: &Array2<F>) -> Result<Array2<F>> {
    let floor = F::cast(EIGENVALUE_FLOOR);
    let (eigenvalues, eigenvectors) = cov.eigh()?;
    let scales: Array1<F> = eigenvalues.mapv(|v| F::one() / v.max(floor).sqrt());
    let lambda = Array2::from_diag(&scales);
    Ok(eigenvectors.dot(&lambda).dot(&eigenvectors.t()))
}
