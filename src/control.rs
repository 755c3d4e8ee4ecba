//! Cooperative cancellation and coarse progress reporting.
//!
//! A full monitoring run is a single heavy unit of work. Interactive hosts
//! run it on a background thread (see [`crate::analysis::spawn`]) and follow
//! it through the [`Progress`] milestones; the [`CancelToken`] lets them
//! abandon the run between stages and between solver iterations.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared flag polled by the pipeline at every stage and by the solver at
/// every fixed-point iteration.
///
/// Cloning the token shares the underlying flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation; the running analysis returns
    /// [`IcaError::Cancelled`](crate::IcaError::Cancelled) at its next checkpoint.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Milestones emitted while an analysis run progresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// Preprocessing finished, the cleaned observation matrix exists
    DataReady,
    /// The component count has been resolved
    ParametersResolved { ncomponents: usize },
    /// The solver entered its fixed-point loop
    FittingStarted,
    /// The unmixing and mixing matrices have been learned
    ModelFitted,
    /// Statistics, contributions and the report are assembled
    ReportAssembled,
}

impl Progress {
    /// Coarse completion percentage, suitable for a progress bar.
    pub fn percent(&self) -> u8 {
        match self {
            Progress::DataReady => 10,
            Progress::ParametersResolved { .. } => 20,
            Progress::FittingStarted => 30,
            Progress::ModelFitted => 80,
            Progress::ReportAssembled => 100,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_is_shared_between_clones() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn milestones_are_ordered() {
        let order = [
            Progress::DataReady,
            Progress::ParametersResolved { ncomponents: 4 },
            Progress::FittingStarted,
            Progress::ModelFitted,
            Progress::ReportAssembled,
        ];
        for pair in order.windows(2) {
            assert!(pair[0].percent() < pair[1].percent());
        }
        assert_eq!(Progress::ReportAssembled.percent(), 100);
    }
}
