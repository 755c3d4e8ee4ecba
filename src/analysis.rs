//! End-to-end orchestration of a monitoring run.
//!
//! The pipeline is fixed: preprocess → resolve the component count → fit the
//! solver → project into source space → I² and its control limit →
//! reconstruct → prediction error and its control limit → contributions for
//! the I² anomaly set → assemble the result and render the report. A run
//! either completes every stage or fails before producing anything; results
//! are never partially populated.
//!
//! [`run`] executes synchronously on the calling thread; [`spawn`] moves the
//! same pipeline onto a background thread and hands back a task handle with
//! a progress channel and a cancel token, so interactive hosts stay
//! responsive while the solver grinds.

use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};

use crate::contribution::{self, Contribution};
use crate::control::{CancelToken, Progress};
use crate::control_limit::kde_control_limit;
use crate::error::{IcaError, Result};
use crate::fast_ica::FastIca;
use crate::preprocessing::{Preprocessor, VariableTable};
use crate::report;
use crate::selection::{self, ComponentCountStrategy, RatioTable};
use crate::stats;
use crate::whitening::WhiteningMethod;
use linfa::{Float, ParamGuard};
use ndarray::Array1;

/// A verified parameter set for a full analysis run
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct AnalysisValidParams<F: Float> {
    ncomponents: Option<usize>,
    max_iter: usize,
    tol: F,
    i2_confidence: F,
    spe_confidence: F,
    whitening: WhiteningMethod,
    filter_outliers: bool,
    random_state: Option<u64>,
}

impl<F: Float> AnalysisValidParams<F> {
    pub fn ncomponents(&self) -> Option<usize> {
        self.ncomponents
    }

    pub fn max_iter(&self) -> usize {
        self.max_iter
    }

    pub fn tol(&self) -> F {
        self.tol
    }

    pub fn i2_confidence(&self) -> F {
        self.i2_confidence
    }

    pub fn spe_confidence(&self) -> F {
        self.spe_confidence
    }

    pub fn whitening(&self) -> WhiteningMethod {
        self.whitening
    }

    pub fn filter_outliers(&self) -> bool {
        self.filter_outliers
    }

    pub fn random_state(&self) -> Option<u64> {
        self.random_state
    }
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct AnalysisParams<F: Float>(AnalysisValidParams<F>);

impl<F: Float> Default for AnalysisParams<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: Float> AnalysisParams<F> {
    /// Product defaults: automatic component count, 1000 iterations,
    /// tolerance `1e-4`, 99% I² confidence, 95% prediction-error confidence,
    /// diagonal whitening, no outlier filtering.
    pub fn new() -> Self {
        Self(AnalysisValidParams {
            ncomponents: None,
            max_iter: 1000,
            tol: F::cast(1e-4),
            i2_confidence: F::cast(0.99),
            spe_confidence: F::cast(0.95),
            whitening: WhiteningMethod::default(),
            filter_outliers: false,
            random_state: None,
        })
    }

    /// Explicit component count; clamped to `[2, nvariables]` at run time
    pub fn ncomponents(mut self, ncomponents: usize) -> Self {
        self.0.ncomponents = Some(ncomponents);
        self
    }

    pub fn max_iter(mut self, max_iter: usize) -> Self {
        self.0.max_iter = max_iter;
        self
    }

    pub fn tol(mut self, tol: F) -> Self {
        self.0.tol = tol;
        self
    }

    /// Confidence level of the I² control limit
    pub fn i2_confidence(mut self, confidence: F) -> Self {
        self.0.i2_confidence = confidence;
        self
    }

    /// Confidence level of the prediction-error control limit
    pub fn spe_confidence(mut self, confidence: F) -> Self {
        self.0.spe_confidence = confidence;
        self
    }

    pub fn whitening(mut self, whitening: WhiteningMethod) -> Self {
        self.0.whitening = whitening;
        self
    }

    /// Replace readings outside the Tukey fences before imputation
    pub fn filter_outliers(mut self, filter_outliers: bool) -> Self {
        self.0.filter_outliers = filter_outliers;
        self
    }

    pub fn random_state(mut self, random_state: u64) -> Self {
        self.0.random_state = Some(random_state);
        self
    }
}

impl<F: Float> ParamGuard for AnalysisParams<F> {
    type Checked = AnalysisValidParams<F>;
    type Error = IcaError;

    fn check_ref(&self) -> Result<&Self::Checked> {
        if self.0.tol <= F::zero() {
            return Err(IcaError::InvalidTolerance(self.0.tol.to_f32().unwrap()));
        }
        for confidence in [self.0.i2_confidence, self.0.spe_confidence] {
            if confidence <= F::zero() || confidence >= F::one() {
                return Err(IcaError::InvalidValue(format!(
                    "confidence must lie in (0, 1), got {}",
                    confidence
                )));
            }
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

    fn check(self) -> Result<Self::Checked> {
        self.check_ref()?;
        Ok(self.0)
    }
}

/// Overall health label derived from the I² anomaly rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Normal,
    Mild,
    Moderate,
    Severe,
}

impl Severity {
    /// `rate` is the fraction of samples flagged on the I² statistic.
    pub fn from_rate(rate: f64) -> Self {
        if rate > 0.10 {
            Severity::Severe
        } else if rate > 0.05 {
            Severity::Moderate
        } else if rate > 0.0 {
            Severity::Mild
        } else {
            Severity::Normal
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Severity::Normal => "normal",
            Severity::Mild => "mild",
            Severity::Moderate => "moderate",
            Severity::Severe => "severe",
        }
    }
}

/// Complete outcome of one monitoring run, read-only to consumers.
#[derive(Debug, Clone)]
pub struct Analysis<F: Float> {
    pub(crate) nsamples: usize,
    pub(crate) ncomponents: usize,
    pub(crate) variable_names: Vec<String>,
    pub(crate) dropped_variables: Vec<String>,
    pub(crate) i_squared: Array1<F>,
    pub(crate) spe: Array1<F>,
    pub(crate) i2_limit: F,
    pub(crate) spe_limit: F,
    pub(crate) i2_anomalies: Vec<usize>,
    pub(crate) spe_anomalies: Vec<usize>,
    pub(crate) contributions: Vec<Contribution<F>>,
    pub(crate) severity: Severity,
    pub(crate) report: String,
}

impl<F: Float> Analysis<F> {
    pub fn nsamples(&self) -> usize {
        self.nsamples
    }

    pub fn nvariables(&self) -> usize {
        self.variable_names.len()
    }

    pub fn ncomponents(&self) -> usize {
        self.ncomponents
    }

    pub fn variable_names(&self) -> &[String] {
        &self.variable_names
    }

    pub fn dropped_variables(&self) -> &[String] {
        &self.dropped_variables
    }

    /// Per-sample I² sequence
    pub fn i_squared(&self) -> &Array1<F> {
        &self.i_squared
    }

    /// Per-sample squared prediction error sequence
    pub fn spe(&self) -> &Array1<F> {
        &self.spe
    }

    pub fn i2_limit(&self) -> F {
        self.i2_limit
    }

    pub fn spe_limit(&self) -> F {
        self.spe_limit
    }

    /// Sample indices flagged on the I² statistic
    pub fn i2_anomalies(&self) -> &[usize] {
        &self.i2_anomalies
    }

    /// Sample indices flagged on the prediction error
    pub fn spe_anomalies(&self) -> &[usize] {
        &self.spe_anomalies
    }

    /// Fraction of samples flagged on I²
    pub fn i2_anomaly_rate(&self) -> f64 {
        self.i2_anomalies.len() as f64 / self.nsamples as f64
    }

    /// Fraction of samples flagged on the prediction error
    pub fn spe_anomaly_rate(&self) -> f64 {
        self.spe_anomalies.len() as f64 / self.nsamples as f64
    }

    /// Ranked variable contributions for the I² anomaly set
    pub fn contributions(&self) -> &[Contribution<F>] {
        &self.contributions
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    /// Rendered plain-text diagnosis, suitable for display or export
    pub fn report(&self) -> &str {
        &self.report
    }
}

/// Hooks threaded through a run: cancellation, progress observation and the
/// component-count strategy.
pub struct RunContext {
    cancel: CancelToken,
    observer: Option<Box<dyn Fn(Progress) + Send>>,
    strategy: Box<dyn ComponentCountStrategy + Send>,
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new()
    }
}

impl RunContext {
    pub fn new() -> Self {
        Self {
            cancel: CancelToken::new(),
            observer: None,
            strategy: Box::new(RatioTable),
        }
    }

    /// A clone of the token that cancels this run.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Observe the [`Progress`] milestones as the run passes them.
    pub fn on_progress(mut self, observer: impl Fn(Progress) + Send + 'static) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    /// Replace the component-count heuristic.
    pub fn strategy(mut self, strategy: impl ComponentCountStrategy + Send + 'static) -> Self {
        self.strategy = Box::new(strategy);
        self
    }

    fn emit(&self, progress: Progress) {
        if let Some(observer) = &self.observer {
            observer(progress);
        }
    }

    fn ensure_live(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            Err(IcaError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Run the full pipeline synchronously on the calling thread.
pub fn run<F: Float>(table: &VariableTable<F>, params: AnalysisParams<F>) -> Result<Analysis<F>> {
    run_with(table, params, &RunContext::new())
}

/// Run the full pipeline with explicit cancellation/progress/strategy hooks.
pub fn run_with<F: Float>(
    table: &VariableTable<F>,
    params: AnalysisParams<F>,
    context: &RunContext,
) -> Result<Analysis<F>> {
    let params = params.check()?;
    context.ensure_live()?;

    let preprocessed = Preprocessor::new()
        .filter_outliers(params.filter_outliers())
        .process(table)?;
    context.emit(Progress::DataReady);
    context.ensure_live()?;

    let ncomponents = selection::resolve(
        params.ncomponents(),
        preprocessed.nvariables(),
        context.strategy.as_ref(),
    );
    context.emit(Progress::ParametersResolved { ncomponents });
    context.ensure_live()?;

    let mut solver_params = FastIca::params()
        .ncomponents(ncomponents)
        .max_iter(params.max_iter())
        .tol(params.tol())
        .whitening(params.whitening());
    if let Some(seed) = params.random_state() {
        solver_params = solver_params.random_state(seed);
    }
    let mut solver = FastIca::new(solver_params)?.cancel_token(context.cancel.clone());

    context.emit(Progress::FittingStarted);
    solver.fit(preprocessed.records())?;
    context.emit(Progress::ModelFitted);
    context.ensure_live()?;

    let sources = solver.transform(preprocessed.records())?;
    let i_squared = stats::i_squared(&sources)?;
    let i2_limit = kde_control_limit(&i_squared, params.i2_confidence())?;
    let i2_anomalies = stats::exceedances(&i_squared, i2_limit);

    let reconstructed = solver.inverse_transform(&sources)?;
    let spe = stats::squared_prediction_error(preprocessed.records(), &reconstructed)?;
    let spe_limit = kde_control_limit(&spe, params.spe_confidence())?;
    let spe_anomalies = stats::exceedances(&spe, spe_limit);

    let contributions = contribution::rank(
        &sources,
        solver.components()?,
        &i2_anomalies,
        preprocessed.variable_names(),
    )?;
    context.ensure_live()?;

    let nsamples = preprocessed.nsamples();
    let severity = Severity::from_rate(i2_anomalies.len() as f64 / nsamples as f64);
    let mut analysis = Analysis {
        nsamples,
        ncomponents,
        variable_names: preprocessed.variable_names().to_vec(),
        dropped_variables: preprocessed.dropped().to_vec(),
        i_squared,
        spe,
        i2_limit,
        spe_limit,
        i2_anomalies,
        spe_anomalies,
        contributions,
        severity,
        report: String::new(),
    };
    analysis.report = report::render(&analysis);
    context.emit(Progress::ReportAssembled);
    Ok(analysis)
}

/// Handle on a background analysis: join for the result, follow the progress
/// channel, or cancel.
pub struct AnalysisTask<F: Float> {
    handle: JoinHandle<Result<Analysis<F>>>,
    progress: Receiver<Progress>,
    cancel: CancelToken,
}

impl<F: Float + 'static> AnalysisTask<F> {
    /// Milestones in the order the run passes them.
    pub fn progress(&self) -> &Receiver<Progress> {
        &self.progress
    }

    /// Request cancellation; the run stops at its next checkpoint.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Block until the run finishes and return its outcome.
    pub fn join(self) -> Result<Analysis<F>> {
        match self.handle.join() {
            Ok(result) => result,
            Err(_) => Err(IcaError::TaskPanicked),
        }
    }
}

/// Run the pipeline on a dedicated background thread.
///
/// The table is moved into the task; each run owns its matrices and nothing
/// is shared with other runs.
pub fn spawn<F: Float + 'static>(
    table: VariableTable<F>,
    params: AnalysisParams<F>,
) -> AnalysisTask<F> {
    let (sender, progress): (Sender<Progress>, Receiver<Progress>) = mpsc::channel();
    let context = RunContext::new().on_progress(move |milestone| {
        // a disconnected receiver only means nobody is watching
        let _ = sender.send(milestone);
    });
    let cancel = context.cancel_token();
    let handle = thread::spawn(move || run_with(&table, params, &context));
    AnalysisTask {
        handle,
        progress,
        cancel,
    }
}
