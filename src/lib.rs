//! # ica-monitor
//!
//! Fault detection for multivariate industrial process data, built on
//! Independent Component Analysis.
//!
//! A monitoring run takes a raw table of named process variables, cleans and
//! standardizes it, extracts statistically independent directions with a
//! deflationary fixed-point solver, and watches two statistics per sample:
//! I² (energy inside the independent-source space) and the squared
//! prediction error (what that space fails to explain). Control limits for
//! both come from a kernel-density estimate of the statistic distribution,
//! flagged samples are attributed back to the process variables, and the
//! whole outcome is summarized in a plain-text diagnosis report.
//!
//! The heavy numeric work is a single synchronous unit; [`spawn`] moves it
//! onto a background thread with a progress channel and a cancel token for
//! interactive hosts.
//!
//! ## Example
//!
//! ```rust
//! use ica_monitor::{run, AnalysisParams, VariableTable};
//!
//! # fn main() -> Result<(), ica_monitor::IcaError> {
//! let mut table = VariableTable::new();
//! for (name, phase) in [
//!     ("temperature", 0.0),
//!     ("pressure", 1.3),
//!     ("flow", 2.1),
//!     ("level", 0.7),
//! ] {
//!     let column: Vec<f64> = (0..200)
//!         .map(|i| (i as f64 * 0.37 + phase).sin() + 0.05 * ((i % 7) as f64))
//!         .collect();
//!     table.insert(name, column);
//! }
//!
//! let analysis = run(&table, AnalysisParams::new().random_state(42))?;
//!
//! assert_eq!(analysis.i_squared().len(), 200);
//! println!("{}", analysis.report());
//! # Ok(())
//! # }
//! ```

pub mod analysis;
pub mod contribution;
pub mod control;
pub mod control_limit;
pub mod error;
pub mod fast_ica;
pub mod hyperparams;
pub mod preprocessing;
mod report;
pub mod selection;
pub mod stats;
pub mod whitening;

pub use analysis::{
    run, run_with, spawn, Analysis, AnalysisParams, AnalysisTask, RunContext, Severity,
};
pub use contribution::Contribution;
pub use control::{CancelToken, Progress};
pub use error::{IcaError, Result};
pub use fast_ica::FastIca;
pub use hyperparams::FastIcaParams;
pub use preprocessing::{Preprocessed, Preprocessor, VariableTable};
pub use selection::{ComponentCountStrategy, RatioTable};
pub use whitening::WhiteningMethod;
