//! Prometheus metrics for the command service.
//!
//! The store records through the `metrics` facade; without an installed
//! recorder the calls are no-ops. [`MetricsExporter`] installs a Prometheus
//! recorder and renders the text exposition format on demand.
//!
//! # Example
//!
//! ```rust,no_run
//! use marketplace_runtime::metrics::MetricsExporter;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut exporter = MetricsExporter::new();
//! exporter.install()?;
//! // ... run commands ...
//! println!("{}", exporter.render().unwrap_or_default());
//! # Ok(())
//! # }
//! ```

use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;
use thiserror::Error;

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Process-wide Prometheus recorder.
#[derive(Default)]
pub struct MetricsExporter {
    handle: Option<PrometheusHandle>,
}

impl MetricsExporter {
    /// Exporter with no recorder installed yet
    #[must_use]
    pub const fn new() -> Self {
        Self { handle: None }
    }

    /// Registers metric descriptions and installs the global recorder.
    ///
    /// # Errors
    ///
    /// Returns [`MetricsError::Install`] if another recorder is already
    /// installed in this process.
    pub fn install(&mut self) -> Result<(), MetricsError> {
        let builder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        let handle = builder
            .install_recorder()
            .map_err(|e| MetricsError::Install(e.to_string()))?;
        register_metrics();
        self.handle = Some(handle);
        tracing::info!("Prometheus recorder installed");
        Ok(())
    }

    /// Current metrics in Prometheus text format, if installed
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

/// Register descriptions for every metric the store emits.
pub fn register_metrics() {
    describe_counter!(
        "marketplace_commands_total",
        "Commands handled, by command name and outcome"
    );
    describe_histogram!(
        "marketplace_command_duration_seconds",
        "Time from command receipt to commit or rejection"
    );
    describe_counter!(
        "marketplace_events_persisted_total",
        "Ledger events appended to the event store"
    );
    describe_counter!(
        "marketplace_notifications_total",
        "Notifications delivered to inboxes, by kind"
    );
    describe_counter!(
        "marketplace_notifications_deduplicated_total",
        "Notification drafts dropped because their key was already delivered"
    );
}

/// Command outcome recorder.
pub struct CommandMetrics;

impl CommandMetrics {
    /// Record an accepted command and the events it persisted.
    pub fn record_accepted(command: &'static str, events: usize, duration: Duration) {
        counter!("marketplace_commands_total", "command" => command, "outcome" => "accepted")
            .increment(1);
        counter!("marketplace_events_persisted_total").increment(events as u64);
        histogram!("marketplace_command_duration_seconds", "command" => command)
            .record(duration.as_secs_f64());
    }

    /// Record a rejected command, labelled by error code.
    pub fn record_rejected(command: &'static str, code: &'static str, duration: Duration) {
        counter!("marketplace_commands_total", "command" => command, "outcome" => code)
            .increment(1);
        histogram!("marketplace_command_duration_seconds", "command" => command)
            .record(duration.as_secs_f64());
    }
}

/// Notification fan-out recorder.
pub struct NotificationMetrics;

impl NotificationMetrics {
    /// Record a delivered notification.
    pub fn record_delivered(kind: &'static str) {
        counter!("marketplace_notifications_total", "kind" => kind).increment(1);
    }

    /// Record a dedupe hit.
    pub fn record_duplicate() {
        counter!("marketplace_notifications_deduplicated_total").increment(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_without_recorder_is_none() {
        let exporter = MetricsExporter::new();
        assert!(exporter.render().is_none());
    }

    #[test]
    fn test_recording_without_recorder_is_a_no_op() {
        CommandMetrics::record_accepted("place_order", 1, Duration::from_millis(1));
        CommandMetrics::record_rejected("request_payout", "INSUFFICIENT_BALANCE", Duration::ZERO);
        NotificationMetrics::record_delivered("new_order");
        NotificationMetrics::record_duplicate();
    }
}
