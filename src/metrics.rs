use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};

/// Process-wide pipeline counters.
#[derive(Debug, Default)]
pub struct PipelineMetrics {
    /// Transactions accepted by intake and scored.
    pub transactions_processed: AtomicU64,
    /// Alerted transitions, counted whether or not the alert was stored.
    pub alerts_generated: AtomicU64,
    /// Alerts that could not be written to the alert store.
    pub alert_persist_failures: AtomicU64,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_transaction(&self) {
        self.transactions_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_alert(&self) {
        self.alerts_generated.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_alert_persist_failure(&self) {
        self.alert_persist_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Render all counters in Prometheus text format (version 0.0.4).
    pub fn render(&self) -> String {
        let counters = [
            (
                "fincrime_detector_transactions_processed_total",
                "Total number of transactions processed.",
                &self.transactions_processed,
            ),
            (
                "fincrime_detector_alerts_generated_total",
                "Total number of alerts generated.",
                &self.alerts_generated,
            ),
            (
                "fincrime_detector_alert_persist_failures_total",
                "Total number of alerts that failed to persist.",
                &self.alert_persist_failures,
            ),
        ];

        let mut out = String::new();
        for (name, help, value) in counters {
            let _ = writeln!(out, "# HELP {name} {help}");
            let _ = writeln!(out, "# TYPE {name} counter");
            let _ = writeln!(out, "{name} {}", value.load(Ordering::Relaxed));
        }
        out
    }
}
