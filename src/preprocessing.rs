//! Cleaning and standardization of raw process tables.
//!
//! Raw plant data arrives as named columns of unequal length with missing or
//! non-finite readings. Before the solver can touch it, degenerate variables
//! are removed, gaps are mean-imputed, columns are truncated to a common
//! length and every retained variable is standardized to zero mean and unit
//! variance.

use crate::error::{IcaError, Result};
use linfa::Float;
use ndarray::Array2;
use std::iter::FromIterator;

/// Variables with fewer distinct values than this are screened for a
/// near-zero standard deviation.
const DISTINCT_SCREEN: usize = 10;
/// Standard deviation below which a low-cardinality variable is dropped.
const NEAR_CONSTANT_STD: f64 = 1e-6;

/// Ordered variable name → readings table, the raw input of an analysis run.
///
/// Columns may differ in length and may contain NaN or infinite entries;
/// both are resolved during preprocessing.
#[derive(Debug, Clone)]
pub struct VariableTable<F> {
    names: Vec<String>,
    columns: Vec<Vec<F>>,
}

impl<F: Float> VariableTable<F> {
    pub fn new() -> Self {
        Self {
            names: Vec::new(),
            columns: Vec::new(),
        }
    }

    /// Append a variable; a duplicate name replaces the previous column.
    pub fn insert(&mut self, name: impl Into<String>, values: Vec<F>) {
        let name = name.into();
        if let Some(pos) = self.names.iter().position(|n| *n == name) {
            self.columns[pos] = values;
        } else {
            self.names.push(name);
            self.columns.push(values);
        }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<F>)> {
        self.names.iter().zip(self.columns.iter())
    }
}

impl<F: Float> Default for VariableTable<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: Float, S: Into<String>> FromIterator<(S, Vec<F>)> for VariableTable<F> {
    fn from_iter<I: IntoIterator<Item = (S, Vec<F>)>>(iter: I) -> Self {
        let mut table = Self::new();
        for (name, values) in iter {
            table.insert(name, values);
        }
        table
    }
}

/// Cleaned and standardized observation matrix, immutable after creation.
#[derive(Debug, Clone)]
pub struct Preprocessed<F> {
    records: Array2<F>,
    variable_names: Vec<String>,
    dropped: Vec<String>,
    nsamples: usize,
}

impl<F: Float> Preprocessed<F> {
    /// `nsamples × nvariables` matrix of standardized readings.
    pub fn records(&self) -> &Array2<F> {
        &self.records
    }

    /// Names of the retained variables, aligned with the matrix columns.
    pub fn variable_names(&self) -> &[String] {
        &self.variable_names
    }

    /// Names of the variables removed during cleaning.
    pub fn dropped(&self) -> &[String] {
        &self.dropped
    }

    pub fn nsamples(&self) -> usize {
        self.nsamples
    }

    pub fn nvariables(&self) -> usize {
        self.variable_names.len()
    }
}

/// Cleans a [`VariableTable`] into a [`Preprocessed`] observation matrix.
///
/// The screening constants follow the monitoring product this crate was
/// extracted from: variables with a single distinct finite value are
/// degenerate, variables with fewer than ten distinct values and a standard
/// deviation under `1e-6` are near-constant; both are dropped.
#[derive(Debug, Clone, Default)]
pub struct Preprocessor {
    filter_outliers: bool,
}

impl Preprocessor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace readings outside the Tukey fences (1.5 × IQR) with NaN so
    /// they are mean-imputed like any other gap. Off by default.
    pub fn filter_outliers(mut self, filter_outliers: bool) -> Self {
        self.filter_outliers = filter_outliers;
        self
    }

    pub fn process<F: Float>(&self, table: &VariableTable<F>) -> Result<Preprocessed<F>> {
        let mut dropped = Vec::new();

        // Screening pass: degenerate and near-constant variables go first
        let mut kept: Vec<(String, Vec<F>)> = Vec::new();
        for (name, column) in table.iter() {
            let column = if self.filter_outliers {
                fence_outliers(column)
            } else {
                column.clone()
            };
            let finite: Vec<F> = column.iter().copied().filter(|v| v.is_finite()).collect();
            let distinct = distinct_count(&finite);
            if distinct == 1 {
                dropped.push(name.clone());
                continue;
            }
            if distinct > 0 && distinct < DISTINCT_SCREEN {
                let (_, std) = mean_std(&finite);
                if std < F::cast(NEAR_CONSTANT_STD) {
                    dropped.push(name.clone());
                    continue;
                }
            }
            kept.push((name.clone(), column));
        }
        if kept.len() < 2 {
            return Err(IcaError::InsufficientVariables(kept.len()));
        }

        // Imputation pass: fill gaps with the variable mean; a variable with
        // no finite reading at all cannot be imputed and is dropped too
        let mut retained: Vec<(String, Vec<F>)> = Vec::new();
        for (name, mut column) in kept {
            let finite: Vec<F> = column.iter().copied().filter(|v| v.is_finite()).collect();
            if finite.is_empty() {
                dropped.push(name);
                continue;
            }
            let (mean, _) = mean_std(&finite);
            for value in column.iter_mut() {
                if !value.is_finite() {
                    *value = mean;
                }
            }
            retained.push((name, column));
        }
        if retained.len() < 2 {
            return Err(IcaError::InsufficientVariables(retained.len()));
        }

        // Truncate to the common minimum length, then standardize column-wise
        // safe unwrap: at least two variables are retained at this point
        let nsamples = retained.iter().map(|(_, c)| c.len()).min().unwrap();
        let nvariables = retained.len();
        let mut records = Array2::zeros((nsamples, nvariables));
        let mut variable_names = Vec::with_capacity(nvariables);
        for (j, (name, column)) in retained.into_iter().enumerate() {
            let truncated = &column[..nsamples];
            let (mean, std) = mean_std(truncated);
            for (i, value) in truncated.iter().enumerate() {
                // zero column instead of dividing by a zero deviation
                records[(i, j)] = if std > F::zero() {
                    (*value - mean) / std
                } else {
                    F::zero()
                };
            }
            variable_names.push(name);
        }

        Ok(Preprocessed {
            records,
            variable_names,
            dropped,
            nsamples,
        })
    }
}

fn mean_std<F: Float>(values: &[F]) -> (F, F) {
    if values.is_empty() {
        return (F::zero(), F::zero());
    }
    let n = F::cast(values.len());
    let mean = values.iter().copied().sum::<F>() / n;
    let var = values.iter().map(|v| (*v - mean) * (*v - mean)).sum::<F>() / n;
    (mean, var.sqrt())
}

fn distinct_count<F: Float>(finite: &[F]) -> usize {
    let mut sorted = finite.to_vec();
    // finite values only, so the comparison is total
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
    sorted.dedup();
    sorted.len()
}

fn fence_outliers<F: Float>(column: &[F]) -> Vec<F> {
    let mut finite: Vec<F> = column.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.len() < 4 {
        return column.to_vec();
    }
    finite.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let q1 = quantile(&finite, 0.25);
    let q3 = quantile(&finite, 0.75);
    let reach = F::cast(1.5) * (q3 - q1);
    let (low, high) = (q1 - reach, q3 + reach);
    column
        .iter()
        .map(|v| {
            if v.is_finite() && (*v < low || *v > high) {
                F::nan()
            } else {
                *v
            }
        })
        .collect()
}

/// Linear-interpolation quantile of an ascending-sorted slice.
fn quantile<F: Float>(sorted: &[F], q: f64) -> F {
    let position = (sorted.len() - 1) as f64 * q;
    let below = position.floor() as usize;
    let above = position.ceil() as usize;
    if below == above {
        return sorted[below];
    }
    let weight = F::cast(position - below as f64);
    sorted[below] + (sorted[above] - sorted[below]) * weight
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn table(columns: Vec<(&str, Vec<f64>)>) -> VariableTable<f64> {
        columns.into_iter().collect()
    }

    #[test]
    fn drops_exactly_the_constant_column() {
        let table = table(vec![
            ("a", vec![1.0, 2.0, 3.0, 4.0, 5.0]),
            ("b", vec![2.0, 1.0, 4.0, 3.0, 6.0]),
            ("c", vec![7.0, 7.0, 7.0, 7.0, 7.0]),
            ("d", vec![0.1, 0.9, 0.4, 0.8, 0.2]),
            ("e", vec![5.0, 3.0, 8.0, 1.0, 9.0]),
        ]);
        let result = Preprocessor::new().process(&table).unwrap();
        assert_eq!(result.dropped(), &["c".to_string()]);
        assert_eq!(result.nvariables(), 4);
        assert_eq!(result.records().dim(), (5, 4));
    }

    #[test]
    fn near_constant_low_cardinality_column_is_dropped() {
        let jitter: Vec<f64> = (0..8).map(|i| 1.0 + i as f64 * 1e-9).collect();
        let table = table(vec![
            ("flat", jitter),
            ("a", vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0]),
            ("b", vec![8.0, 1.0, 6.0, 3.0, 5.0, 7.0, 2.0, 4.0]),
        ]);
        let result = Preprocessor::new().process(&table).unwrap();
        assert_eq!(result.dropped(), &["flat".to_string()]);
    }

    #[test]
    fn fails_below_two_usable_variables() {
        let table = table(vec![
            ("a", vec![1.0, 2.0, 3.0]),
            ("c", vec![5.0, 5.0, 5.0]),
        ]);
        let err = Preprocessor::new().process(&table).unwrap_err();
        assert!(matches!(err, IcaError::InsufficientVariables(1)));
    }

    #[test]
    fn imputes_missing_readings_with_the_variable_mean() {
        let table = table(vec![
            ("a", vec![1.0, f64::NAN, 3.0, 2.0]),
            ("b", vec![4.0, 2.0, f64::INFINITY, 6.0]),
        ]);
        let result = Preprocessor::new().process(&table).unwrap();
        assert!(result.records().iter().all(|v| v.is_finite()));
        // the imputed entry sits exactly on the column mean, i.e. at zero
        // after standardization
        assert_abs_diff_eq!(result.records()[(1, 0)], 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(result.records()[(2, 1)], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn variable_without_finite_readings_is_dropped() {
        let table = table(vec![
            ("gaps", vec![f64::NAN, f64::NAN, f64::NAN]),
            ("a", vec![1.0, 2.0, 3.0]),
            ("b", vec![3.0, 1.0, 2.0]),
        ]);
        let result = Preprocessor::new().process(&table).unwrap();
        assert_eq!(result.dropped(), &["gaps".to_string()]);
        assert_eq!(result.nvariables(), 2);
    }

    #[test]
    fn truncates_to_the_shortest_column() {
        let table = table(vec![
            ("a", vec![1.0, 2.0, 3.0, 4.0, 5.0]),
            ("b", vec![2.0, 4.0, 1.0]),
        ]);
        let result = Preprocessor::new().process(&table).unwrap();
        assert_eq!(result.nsamples(), 3);
        assert_eq!(result.records().dim(), (3, 2));
    }

    #[test]
    fn standardizes_to_zero_mean_unit_variance() {
        let table = table(vec![
            ("a", vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]),
            ("b", vec![10.0, 30.0, 20.0, 60.0, 40.0, 50.0]),
        ]);
        let result = Preprocessor::new().process(&table).unwrap();
        for j in 0..2 {
            let column = result.records().column(j);
            let mean = column.sum() / 6.0;
            let var = column.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / 6.0;
            assert_abs_diff_eq!(mean, 0.0, epsilon = 1e-12);
            assert_abs_diff_eq!(var, 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn outlier_filter_tames_a_spike() {
        let mut spiky: Vec<f64> = (0..40).map(|i| (i % 7) as f64).collect();
        spiky[20] = 1e6;
        let steady: Vec<f64> = (0..40).map(|i| (i % 5) as f64 + 0.5).collect();
        let table = table(vec![("spiky", spiky), ("steady", steady)]);

        let raw = Preprocessor::new().process(&table).unwrap();
        let filtered = Preprocessor::new()
            .filter_outliers(true)
            .process(&table)
            .unwrap();

        // unfiltered, the spike dominates the column scale; filtered, the
        // spike is imputed away and the column keeps its natural spread
        let raw_max = raw.records().column(0).iter().cloned().fold(0.0, f64::max);
        let filtered_max = filtered
            .records()
            .column(0)
            .iter()
            .cloned()
            .fold(0.0, f64::max);
        assert!(raw_max > 5.0);
        assert!(filtered_max < 5.0);
    }
}
