//! Per-variable fault attribution.
//!
//! Once samples have been flagged, operators need to know which process
//! variables to look at. Each flagged sample spreads its blame through the
//! unmixing weights: variable `j` accumulates `(s_ik · w_kj)²` over every
//! flagged sample `i` and component `k`, and the totals are normalized into
//! shares that sum to one.

use crate::error::{IcaError, Result};
use linfa::Float;
use ndarray::{Array1, Array2, ArrayView2};

/// One variable's share of the blame for the flagged samples.
#[derive(Debug, Clone, PartialEq)]
pub struct Contribution<F> {
    pub variable: String,
    pub score: F,
}

/// Ranked (descending) variable contributions for the given anomaly set.
///
/// Returns an empty ranking when no samples are flagged.
pub fn rank<F: Float>(
    sources: &Array2<F>,
    components: ArrayView2<F>,
    anomalies: &[usize],
    variable_names: &[String],
) -> Result<Vec<Contribution<F>>> {
    let (nsamples, ncomponents) = sources.dim();
    if components.nrows() != ncomponents {
        return Err(IcaError::DimensionMismatch {
            expected: ncomponents,
            actual: components.nrows(),
        });
    }
    let nvariables = components.ncols();
    if variable_names.len() != nvariables {
        return Err(IcaError::DimensionMismatch {
            expected: nvariables,
            actual: variable_names.len(),
        });
    }
    if anomalies.is_empty() {
        return Ok(Vec::new());
    }
    if let Some(&out_of_range) = anomalies.iter().find(|&&i| i >= nsamples) {
        return Err(IcaError::InvalidValue(format!(
            "anomalous sample index {} out of range for {} samples",
            out_of_range, nsamples
        )));
    }

    let mut scores = Array1::<F>::zeros(nvariables);
    for &sample in anomalies {
        for component in 0..ncomponents {
            let source = sources[(sample, component)];
            for variable in 0..nvariables {
                let weighted = source * components[(component, variable)];
                scores[variable] += weighted * weighted;
            }
        }
    }

    let total = scores.sum();
    if !total.is_finite() || total <= F::zero() {
        return Err(IcaError::NumericalInstability(
            "contribution normalization".into(),
        ));
    }

    let mut ranking: Vec<Contribution<F>> = variable_names
        .iter()
        .zip(scores.iter())
        .map(|(name, score)| Contribution {
            variable: name.clone(),
            score: *score / total,
        })
        .collect();
    // scores are finite and non-negative, so the comparison is total
    ranking.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap());
    Ok(ranking)
}
