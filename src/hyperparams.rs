use crate::error::IcaError;
use crate::whitening::WhiteningMethod;
use linfa::{Float, ParamGuard};

/// A verified hyperparameter set for the fixed-point solver
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct FastIcaValidParams<F: Float> {
    ncomponents: Option<usize>,
    max_iter: usize,
    tol: F,
    whitening: WhiteningMethod,
    random_state: Option<u64>,
}

impl<F: Float> FastIcaValidParams<F> {
    pub fn ncomponents(&self) -> Option<usize> {
        self.ncomponents
    }

    pub fn max_iter(&self) -> usize {
        self.max_iter
    }

    pub fn tol(&self) -> F {
        self.tol
    }

    pub fn whitening(&self) -> WhiteningMethod {
        self.whitening
    }

    pub fn random_state(&self) -> Option<u64> {
        self.random_state
    }
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct FastIcaParams<F: Float>(FastIcaValidParams<F>);

impl<F: Float> Default for FastIcaParams<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: Float> FastIcaParams<F> {
    /// Create a new parameter set with the product defaults
    pub fn new() -> Self {
        Self(FastIcaValidParams {
            ncomponents: None,
            max_iter: 1000,
            tol: F::cast(1e-4),
            whitening: WhiteningMethod::default(),
            random_state: None,
        })
    }

    /// Number of independent directions to extract; defaults to the number
    /// of variables when not set
    pub fn ncomponents(mut self, ncomponents: usize) -> Self {
        self.0.ncomponents = Some(ncomponents);
        self
    }

    /// Maximum number of fixed-point iterations per component
    pub fn max_iter(mut self, max_iter: usize) -> Self {
        self.0.max_iter = max_iter;
        self
    }

    /// Convergence tolerance on the L1 change of the weight vector
    pub fn tol(mut self, tol: F) -> Self {
        self.0.tol = tol;
        self
    }

    /// How the centered data is whitened before the fixed-point loop
    pub fn whitening(mut self, whitening: WhiteningMethod) -> Self {
        self.0.whitening = whitening;
        self
    }

    /// Seed for the weight initialization, for reproducible runs
    pub fn random_state(mut self, random_state: u64) -> Self {
        self.0.random_state = Some(random_state);
        self
    }
}

impl<F: Float> ParamGuard for FastIcaParams<F> {
    type Checked = FastIcaValidParams<F>;
    type Error = IcaError;

    fn check_ref(&self) -> Result<&Self::Checked, Self::Error> {
        if self.0.tol <= F::zero() {
            return Err(IcaError::InvalidTolerance(self.0.tol.to_f32().unwrap()));
        }
        if self.0.max_iter == 0 {
            return Err(IcaError::InvalidValue(
                "max_iter must be at least 1".to_string(),
            ));
        }
        if let Some(ncomponents) = self.0.ncomponents {
            if ncomponents < 2 {
                return Err(IcaError::InvalidValue(format!(
                    "at least 2 components are required, got {}",
                    ncomponents
                )));
            }
        }
        Ok(&self.0)
    }

    fn check(self) -> Result<Self::Checked, Self::Error> {
        self.check_ref()?;
        Ok(self.0)
    }
}
