//! Deflation-based fixed-point extraction of independent components.
//!
//! Components are learned one after the other: each candidate weight vector
//! is driven by the standard fixed-point update under the `tanh`
//! nonlinearity, orthogonalized against every previously accepted component
//! (Gram–Schmidt deflation) and renormalized, until its L1 change falls
//! under the tolerance. Each component depends on the orthogonalization
//! state left behind by all prior ones, so the loop is strictly sequential.

use crate::control::CancelToken;
use crate::error::{IcaError, Result};
use crate::hyperparams::{FastIcaParams, FastIcaValidParams};
use linfa::{Float, ParamGuard};
use ndarray::{Array, Array1, Array2, ArrayView1, ArrayView2, Axis, Zip};
use ndarray_rand::{rand::SeedableRng, rand_distr::Uniform, RandomExt};
use rand_xoshiro::Xoshiro256Plus;

/// Fixed-point solver holding the learned unmixing state.
///
/// A fresh solver is unfitted; [`fit`](FastIca::fit) learns the mean vector,
/// the unmixing (components) matrix and its mixing transpose, and every
/// subsequent `fit` overwrites them. [`transform`](FastIca::transform) and
/// [`inverse_transform`](FastIca::inverse_transform) fail with
/// [`IcaError::NotFitted`] until a fit has succeeded.
pub struct FastIca<F: Float> {
    params: FastIcaValidParams<F>,
    cancel: Option<CancelToken>,
    fitted: Option<Fitted<F>>,
}

#[derive(Debug, Clone)]
struct Fitted<F> {
    mean: Array1<F>,
    /// `ncomponents × nvariables`
    components: Array2<F>,
    /// `nvariables × ncomponents`, always the transpose of `components`
    mixing: Array2<F>,
}

impl<F: Float> FastIca<F> {
    /// Create the set of default hyperparameters
    pub fn params() -> FastIcaParams<F> {
        FastIcaParams::new()
    }

    pub fn new(params: FastIcaParams<F>) -> Result<Self> {
        Ok(Self {
            params: params.check()?,
            cancel: None,
            fitted: None,
        })
    }

    /// Attach a token checked once per component and once per iteration;
    /// a cancelled token aborts the fit with [`IcaError::Cancelled`].
    pub fn cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn is_fitted(&self) -> bool {
        self.fitted.is_some()
    }

    /// Learn the independent directions of `records` (`nsamples × nvariables`).
    ///
    /// # Errors
    ///
    /// `InsufficientSamples` below two rows, `InvalidValue` when the
    /// component count does not fit `[2, nvariables]`, `Whitening`/
    /// `NumericalInstability` on non-finite intermediates and
    /// `InvalidMixingMatrix` when the post-fit validation fails.
    pub fn fit(&mut self, records: &Array2<F>) -> Result<&mut Self> {
        let (nsamples, nvariables) = records.dim();
        if nsamples < 2 {
            return Err(IcaError::InsufficientSamples {
                expected: 2,
                actual: nsamples,
            });
        }
        let ncomponents = self.params.ncomponents().unwrap_or(nvariables);
        if ncomponents < 2 || ncomponents > nvariables {
            return Err(IcaError::InvalidValue(format!(
                "ncomponents must lie in [2, {}], got {}",
                nvariables, ncomponents
            )));
        }

        // Center by the per-variable mean, computed once and shared across
        // all components
        // safe unwrap: nsamples >= 2 was checked above
        let mean = records.mean_axis(Axis(0)).unwrap();
        let centered = records - &mean.view().insert_axis(Axis(0));

        // Whitening happens on the centered matrix; anything non-finite
        // must die here instead of polluting the fixed-point loop
        let k = self.params.whitening().whitening_matrix(&centered)?;
        let whitened = centered.dot(&k);
        if whitened.iter().any(|v| !v.is_finite()) {
            return Err(IcaError::Whitening(
                "whitened data contains non-finite entries".into(),
            ));
        }

        let mut rng = self.params.random_state().map(Xoshiro256Plus::seed_from_u64);
        let mut ortho = OrthogonalizationState::new(nvariables);
        for _ in 0..ncomponents {
            self.ensure_live()?;
            let mut w = self.initial_weights(nvariables, rng.as_mut())?;
            for _ in 0..self.params.max_iter() {
                self.ensure_live()?;
                let mut wnew = fixed_point_update(&whitened, &w)?;
                ortho.deflate(&mut wnew);
                normalize(&mut wnew)?;
                let delta = wnew
                    .iter()
                    .zip(w.iter())
                    .map(|(a, b)| (*a - *b).abs())
                    .sum::<F>();
                w = wnew;
                if delta < self.params.tol() {
                    break;
                }
            }
            ortho.push(w);
        }

        let components = ortho.into_matrix();
        let mixing = components.t().to_owned();
        if mixing.dim() != (nvariables, ncomponents) {
            return Err(IcaError::InvalidMixingMatrix(format!(
                "expected {} × {}, got {} × {}",
                nvariables,
                ncomponents,
                mixing.nrows(),
                mixing.ncols()
            )));
        }
        if mixing.iter().any(|v| !v.is_finite()) {
            return Err(IcaError::InvalidMixingMatrix(
                "matrix contains non-finite entries".into(),
            ));
        }

        self.fitted = Some(Fitted {
            mean,
            components,
            mixing,
        });
        Ok(self)
    }

    /// Project records into independent-source space
    /// (`nsamples × ncomponents`).
    pub fn transform(&self, records: &Array2<F>) -> Result<Array2<F>> {
        let fitted = self.fitted.as_ref().ok_or(IcaError::NotFitted)?;
        if records.ncols() != fitted.mean.len() {
            return Err(IcaError::DimensionMismatch {
                expected: fitted.mean.len(),
                actual: records.ncols(),
            });
        }
        let centered = records - &fitted.mean.view().insert_axis(Axis(0));
        Ok(centered.dot(&fitted.components.t()))
    }

    /// Map source-space vectors back into reconstructed observation space.
    pub fn inverse_transform(&self, sources: &Array2<F>) -> Result<Array2<F>> {
        let fitted = self.fitted.as_ref().ok_or(IcaError::NotFitted)?;
        if sources.ncols() != fitted.components.nrows() {
            return Err(IcaError::DimensionMismatch {
                expected: fitted.components.nrows(),
                actual: sources.ncols(),
            });
        }
        let reconstructed =
            sources.dot(&fitted.mixing.t()) + &fitted.mean.view().insert_axis(Axis(0));
        if reconstructed.iter().any(|v| !v.is_finite()) {
            return Err(IcaError::NumericalInstability("reconstruction".into()));
        }
        Ok(reconstructed)
    }

    /// The learned unmixing matrix (`ncomponents × nvariables`).
    pub fn components(&self) -> Result<ArrayView2<F>> {
        self.fitted
            .as_ref()
            .map(|f| f.components.view())
            .ok_or(IcaError::NotFitted)
    }

    /// The mixing matrix (`nvariables × ncomponents`), kept as the exact
    /// transpose of the components.
    pub fn mixing(&self) -> Result<ArrayView2<F>> {
        self.fitted
            .as_ref()
            .map(|f| f.mixing.view())
            .ok_or(IcaError::NotFitted)
    }

    /// The per-variable mean captured at fit time.
    pub fn mean(&self) -> Result<ArrayView1<F>> {
        self.fitted
            .as_ref()
            .map(|f| f.mean.view())
            .ok_or(IcaError::NotFitted)
    }

    fn initial_weights(
        &self,
        nvariables: usize,
        rng: Option<&mut Xoshiro256Plus>,
    ) -> Result<Array1<F>> {
        let w: Array1<f64> = match rng {
            Some(rng) => Array::random_using(nvariables, Uniform::new(-0.5, 0.5), rng),
            None => Array::random(nvariables, Uniform::new(-0.5, 0.5)),
        };
        let mut w = w.mapv(F::cast);
        normalize(&mut w)?;
        Ok(w)
    }

    fn ensure_live(&self) -> Result<()> {
        match &self.cancel {
            Some(token) if token.is_cancelled() => Err(IcaError::Cancelled),
            _ => Ok(()),
        }
    }
}

/// One fixed-point step: `w_j ← mean(x_j · g(p)) − mean(g′(p)) · w_j` with
/// `g = tanh`, `g′ = 1 − tanh²`, `p` the per-sample projection.
fn fixed_point_update<F: Float>(whitened: &Array2<F>, w: &Array1<F>) -> Result<Array1<F>> {
    let nsamples = F::cast(whitened.nrows());
    let projections = whitened.dot(w);
    let g = projections.mapv(|p| p.tanh());
    let gprime_mean = g.iter().map(|v| F::one() - *v * *v).sum::<F>() / nsamples;
    let lhs = whitened.t().dot(&g).mapv(|v| v / nsamples);
    let wnew = lhs - &w.mapv(|v| v * gprime_mean);
    if wnew.iter().any(|v| !v.is_finite()) {
        return Err(IcaError::NumericalInstability("fixed-point update".into()));
    }
    Ok(wnew)
}

fn normalize<F: Float>(w: &mut Array1<F>) -> Result<()> {
    let norm = w.dot(w).sqrt();
    if !norm.is_finite() || norm == F::zero() {
        return Err(IcaError::NumericalInstability(
            "weight normalization".into(),
        ));
    }
    w.mapv_inplace(|v| v / norm);
    Ok(())
}

/// Accumulates accepted directions and removes their span from each new
/// candidate (Gram–Schmidt deflation). Threaded explicitly through the
/// per-component loop so the orthogonality invariant lives in one place.
struct OrthogonalizationState<F> {
    accepted: Vec<Array1<F>>,
    nvariables: usize,
}

impl<F: Float> OrthogonalizationState<F> {
    fn new(nvariables: usize) -> Self {
        Self {
            accepted: Vec::new(),
            nvariables,
        }
    }

    /// Subtract from `w` its projection onto every accepted component.
    fn deflate(&self, w: &mut Array1<F>) {
        for accepted in &self.accepted {
            let projection = w.dot(accepted);
            Zip::from(&mut *w)
                .and(accepted)
                .for_each(|wi, ai| *wi -= projection * *ai);
        }
    }

    fn push(&mut self, w: Array1<F>) {
        self.accepted.push(w);
    }

    /// Stack the accepted directions into the unmixing matrix
    /// (`ncomponents × nvariables`).
    fn into_matrix(self) -> Array2<F> {
        let mut matrix = Array2::zeros((self.accepted.len(), self.nvariables));
        for (i, w) in self.accepted.into_iter().enumerate() {
            matrix.row_mut(i).assign(&w);
        }
        matrix
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::whitening::WhiteningMethod;
    use approx::assert_abs_diff_eq;
    use ndarray_rand::rand_distr::Normal;

    fn random_records(nsamples: usize, nvariables: usize, seed: u64) -> Array2<f64> {
        let mut rng = Xoshiro256Plus::seed_from_u64(seed);
        Array::random_using(
            (nsamples, nvariables),
            Normal::new(0.0, 1.0).unwrap(),
            &mut rng,
        )
    }

    #[test]
    fn autotraits() {
        fn has_autotraits<T: Send + Sync + Sized + Unpin>() {}
        has_autotraits::<FastIca<f64>>();
        has_autotraits::<FastIcaParams<f64>>();
        has_autotraits::<FastIcaValidParams<f64>>();
        has_autotraits::<IcaError>();
    }

    #[test]
    fn transform_before_fit_is_rejected() {
        let solver = FastIca::<f64>::new(FastIca::params()).unwrap();
        let records = random_records(10, 3, 1);
        assert!(matches!(
            solver.transform(&records),
            Err(IcaError::NotFitted)
        ));
        assert!(matches!(
            solver.inverse_transform(&records),
            Err(IcaError::NotFitted)
        ));
    }

    #[test]
    fn too_many_components_is_rejected() {
        let mut solver =
            FastIca::<f64>::new(FastIca::params().ncomponents(8).random_state(3)).unwrap();
        let records = random_records(50, 4, 2);
        assert!(matches!(
            solver.fit(&records),
            Err(IcaError::InvalidValue(_))
        ));
    }

    #[test]
    fn single_row_is_rejected() {
        let mut solver = FastIca::<f64>::new(FastIca::params()).unwrap();
        let records = random_records(1, 4, 2);
        assert!(matches!(
            solver.fit(&records),
            Err(IcaError::InsufficientSamples { .. })
        ));
    }

    #[test]
    fn mismatched_source_width_is_rejected() {
        let mut solver =
            FastIca::<f64>::new(FastIca::params().ncomponents(3).random_state(5)).unwrap();
        let records = random_records(80, 5, 4);
        solver.fit(&records).unwrap();
        let sources = solver.transform(&records).unwrap();
        assert_eq!(sources.ncols(), 3);

        let wrong = random_records(80, 4, 6);
        assert!(matches!(
            solver.inverse_transform(&wrong),
            Err(IcaError::DimensionMismatch {
                expected: 3,
                actual: 4
            })
        ));
    }

    #[test]
    fn components_are_orthonormal() {
        let mut solver =
            FastIca::<f64>::new(FastIca::params().ncomponents(4).random_state(11)).unwrap();
        let records = random_records(300, 4, 12);
        solver.fit(&records).unwrap();
        let w = solver.components().unwrap();
        let gram = w.dot(&w.t());
        for i in 0..4 {
            for j in 0..4 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert_abs_diff_eq!(gram[(i, j)], expected, epsilon = 1e-9);
            }
        }
    }

    // Full-rank extraction keeps the unmixing matrix orthonormal, so the
    // round trip through source space comes back to the data regardless of
    // the whitening approximation
    macro_rules! roundtrip_tests {
        ($($name:ident: $method:expr,)*) => {
            paste::item! {
                $(
                    #[test]
                    fn [<roundtrip_recovers_records_$name>]() {
                        let records = random_records(200, 4, 21);
                        let mut solver = FastIca::<f64>::new(
                            FastIca::params()
                                .ncomponents(4)
                                .whitening($method)
                                .random_state(22),
                        )
                        .unwrap();
                        solver.fit(&records).unwrap();
                        let sources = solver.transform(&records).unwrap();
                        let reconstructed = solver.inverse_transform(&sources).unwrap();
                        let worst = (&records - &reconstructed)
                            .iter()
                            .map(|v| v.abs())
                            .fold(0.0, f64::max);
                        assert!(worst < 1e-8, "round-trip error {}", worst);
                    }
                )*
            }
        }
    }

    roundtrip_tests! {
        diagonal: WhiteningMethod::DiagonalApprox,
        eigh: WhiteningMethod::Eigh,
    }

    #[test]
    fn refit_overwrites_previous_state() {
        let mut solver =
            FastIca::<f64>::new(FastIca::params().ncomponents(2).random_state(31)).unwrap();
        solver.fit(&random_records(60, 4, 32)).unwrap();
        assert_eq!(solver.components().unwrap().dim(), (2, 4));

        solver.fit(&random_records(60, 6, 33)).unwrap();
        assert_eq!(solver.components().unwrap().dim(), (2, 6));
        assert_eq!(solver.mixing().unwrap().dim(), (6, 2));
    }

    #[test]
    fn cancelled_token_aborts_the_fit() {
        let token = CancelToken::new();
        token.cancel();
        let mut solver = FastIca::<f64>::new(FastIca::params().random_state(41))
            .unwrap()
            .cancel_token(token);
        let records = random_records(50, 4, 42);
        assert!(matches!(solver.fit(&records), Err(IcaError::Cancelled)));
    }

    #[test]
    fn mean_is_captured_from_the_data() {
        let mut records = random_records(100, 3, 51);
        for i in 0..records.nrows() {
            records[(i, 0)] += 5.0;
        }
        let mut solver =
            FastIca::<f64>::new(FastIca::params().ncomponents(2).random_state(52)).unwrap();
        solver.fit(&records).unwrap();
        let mean = solver.mean().unwrap();
        assert!((mean[0] - 5.0).abs() < 0.5);
    }
}
