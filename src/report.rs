//! Plain-text diagnosis rendering.
//!
//! The report is assembled once, at the very end of a completed run, and is
//! consumed verbatim by the surrounding application for display or export.

use crate::analysis::{Analysis, Severity};
use linfa::Float;

/// How many flagged samples are listed individually before eliding the rest.
const DETAIL_LIMIT: usize = 10;
/// How many contributing variables the conclusions section names.
const TOP_CONTRIBUTORS: usize = 5;

pub(crate) fn render<F: Float>(analysis: &Analysis<F>) -> String {
    let mut out = String::new();

    out.push_str("=== Process monitoring diagnosis ===\n\n");

    out.push_str("-- Overall status --\n");
    out.push_str(&format!(
        "Samples analysed: {} across {} variables, {} independent components\n",
        analysis.nsamples(),
        analysis.nvariables(),
        analysis.ncomponents()
    ));
    if analysis.dropped_variables().is_empty() {
        out.push_str("Variables dropped during cleaning: none\n");
    } else {
        out.push_str(&format!(
            "Variables dropped during cleaning: {}\n",
            analysis.dropped_variables().join(", ")
        ));
    }
    out.push_str(&format!(
        "I² control limit: {:.4}, flagged {} samples ({:.1}%)\n",
        analysis.i2_limit(),
        analysis.i2_anomalies().len(),
        analysis.i2_anomaly_rate() * 100.0
    ));
    out.push_str(&format!(
        "SPE control limit: {:.4}, flagged {} samples ({:.1}%)\n",
        analysis.spe_limit(),
        analysis.spe_anomalies().len(),
        analysis.spe_anomaly_rate() * 100.0
    ));
    out.push_str(&format!(
        "Process condition: {}\n",
        analysis.severity().label()
    ));

    out.push_str("\n-- Anomaly detail --\n");
    if analysis.i2_anomalies().is_empty() {
        out.push_str("No samples exceeded the I² control limit.\n");
    } else {
        for &sample in analysis.i2_anomalies().iter().take(DETAIL_LIMIT) {
            out.push_str(&format!(
                "sample {}: I² {:.4} exceeds limit {:.4}\n",
                sample,
                analysis.i_squared()[sample],
                analysis.i2_limit()
            ));
        }
        let elided = analysis.i2_anomalies().len().saturating_sub(DETAIL_LIMIT);
        if elided > 0 {
            out.push_str(&format!("... and {} further flagged samples\n", elided));
        }
    }

    out.push_str("\n-- Conclusions --\n");
    if analysis.contributions().is_empty() {
        out.push_str("No contribution ranking: the anomaly set is empty.\n");
    } else {
        let top: Vec<String> = analysis
            .contributions()
            .iter()
            .take(TOP_CONTRIBUTORS)
            .map(|c| format!("{} ({:.1}%)", c.variable, c.score.to_f64().unwrap() * 100.0))
            .collect();
        out.push_str(&format!("Top contributing variables: {}\n", top.join(", ")));
    }
    out.push_str(&format!("Recommendation: {}\n", recommendation(analysis.severity())));

    out
}

fn recommendation(severity: Severity) -> &'static str {
    match severity {
        Severity::Severe => {
            "anomaly rate above 10%; investigate the top contributing variables \
             and current operating conditions immediately"
        }
        Severity::Moderate => {
            "anomaly rate above 5%; review the flagged intervals and the top \
             contributing variables"
        }
        Severity::Mild => {
            "isolated exceedances; keep watching the flagged samples for \
             recurrence"
        }
        Severity::Normal => "no exceedances; the process is in control",
    }
}

#[cfg(test)]
mod tests {
    use crate::analysis::{run, AnalysisParams};
    use crate::preprocessing::VariableTable;
    use ndarray::Array;
    use ndarray_rand::{rand::SeedableRng, rand_distr::Normal, RandomExt};
    use rand_xoshiro::Xoshiro256Plus;

    fn sample_analysis() -> crate::analysis::Analysis<f64> {
        let mut rng = Xoshiro256Plus::seed_from_u64(5);
        let mut table = VariableTable::new();
        for name in ["temperature", "pressure", "flow"] {
            let column = Array::random_using(150, Normal::new(0.0, 1.0).unwrap(), &mut rng);
            table.insert(name, column.to_vec());
        }
        run(&table, AnalysisParams::new().random_state(6)).unwrap()
    }

    #[test]
    fn report_carries_all_three_sections() {
        let analysis = sample_analysis();
        let report = analysis.report();
        assert!(report.contains("-- Overall status --"));
        assert!(report.contains("-- Anomaly detail --"));
        assert!(report.contains("-- Conclusions --"));
    }

    #[test]
    fn report_names_the_variables_when_samples_are_flagged() {
        let analysis = sample_analysis();
        if !analysis.i2_anomalies().is_empty() {
            assert!(analysis.report().contains("Top contributing variables"));
            assert!(analysis.report().contains("temperature")
                || analysis.report().contains("pressure")
                || analysis.report().contains("flow"));
        } else {
            assert!(analysis.report().contains("anomaly set is empty"));
        }
    }

    #[test]
    fn severity_label_appears_in_the_status_section() {
        let analysis = sample_analysis();
        let expected = format!("Process condition: {}", analysis.severity().label());
        assert!(analysis.report().contains(&expected));
    }
}
