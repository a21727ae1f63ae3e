/// Combine the anomaly score with the rule contribution.
///
/// No clamping: several rules on top of a high anomaly score push the final
/// score past 1.0.
pub fn compute_final_score(anomaly_score: f64, rule_contribution: f64) -> f64 {
    anomaly_score + rule_contribution
}
