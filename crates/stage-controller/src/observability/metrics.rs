//! Metric recording functions.
//!
//! Prometheus conventions: `sc_` prefix, `_total` for counters, `_seconds`
//! for duration histograms.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Install the Prometheus recorder. Must run before anything is recorded.
///
/// # Errors
///
/// Returns an error if a recorder is already installed.
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        // Workflows are a handful of store writes and signals
        .set_buckets_for_metric(
            Matcher::Prefix("sc_workflow".to_string()),
            &[0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000, 2.500],
        )
        .map_err(|e| format!("Failed to set workflow buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus metrics recorder: {e}"))
}

/// Metric: `sc_lock_acquire_total`
/// Labels: `role` (producer, host, celebrity), `outcome` (granted, rejected, error)
pub fn record_lock_acquire(role: &str, outcome: &str) {
    counter!(
        "sc_lock_acquire_total",
        "role" => role.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Metric: `sc_heartbeat_total`
/// Labels: `role`, `status` (success, error)
pub fn record_heartbeat(role: &str, status: &str) {
    counter!(
        "sc_heartbeat_total",
        "role" => role.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Metric: `sc_workflow_duration_seconds`
/// Labels: `workflow`
pub fn record_workflow_duration(workflow: &str, duration: Duration) {
    histogram!("sc_workflow_duration_seconds", "workflow" => workflow.to_string())
        .record(duration.as_secs_f64());
}

/// Metric: `sc_workflow_step_failures_total`
/// Labels: `workflow`, `step`
///
/// Step names are static strings in the workflow code.
pub fn record_workflow_step_failure(workflow: &str, step: &str) {
    counter!(
        "sc_workflow_step_failures_total",
        "workflow" => workflow.to_string(),
        "step" => step.to_string()
    )
    .increment(1);
}

/// Metric: `sc_promotions_total`
/// Labels: `kind` (backstage, stage, kick)
pub fn record_promotion(kind: &str) {
    counter!("sc_promotions_total", "kind" => kind.to_string()).increment(1);
}

/// Metric: `sc_private_call_transitions_total`
/// Labels: `transition` (start, end)
pub fn record_private_call_transition(transition: &str) {
    counter!(
        "sc_private_call_transitions_total",
        "transition" => transition.to_string()
    )
    .increment(1);
}

/// Metric: `sc_screen_share_transitions_total`
/// Labels: `transition` (request, start, end, error)
pub fn record_screen_share_transition(transition: &str) {
    counter!(
        "sc_screen_share_transitions_total",
        "transition" => transition.to_string()
    )
    .increment(1);
}

/// Metric: `sc_signals_sent_total`
/// Labels: `signal` (bounded by the signal catalog), `status` (success, error)
pub fn record_signal_sent(signal: &str, status: &str) {
    counter!(
        "sc_signals_sent_total",
        "signal" => signal.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Metric: `sc_chat_messages_total`
/// Labels: `direction` (sent, received)
pub fn record_chat_message(direction: &str) {
    counter!("sc_chat_messages_total", "direction" => direction.to_string()).increment(1);
}

/// Metric: `sc_active_fans`
pub fn set_active_fans(count: usize) {
    #[allow(clippy::cast_precision_loss)]
    gauge!("sc_active_fans").set(count as f64);
}

/// Metric: `sc_actor_mailbox_depth`
/// Labels: `actor_type`
pub fn set_actor_mailbox_depth(actor_type: &str, depth: usize) {
    #[allow(clippy::cast_precision_loss)]
    gauge!("sc_actor_mailbox_depth", "actor_type" => actor_type.to_string()).set(depth as f64);
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use metrics_util::debugging::{DebugValue, DebuggingRecorder};

    #[test]
    fn test_recording_without_recorder_is_noop() {
        record_lock_acquire("producer", "granted");
        record_heartbeat("host", "error");
        record_workflow_duration("send_to_stage", Duration::from_millis(40));
        record_workflow_step_failure("send_to_backstage", "restore_volume");
        set_active_fans(3);
    }

    #[test]
    fn test_counters_carry_bounded_labels() {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();

        metrics::with_local_recorder(&recorder, || {
            record_lock_acquire("producer", "rejected");
            record_lock_acquire("producer", "rejected");
            record_signal_sent("joinBackstage", "success");
            set_active_fans(4);
        });

        let snapshot = snapshotter.snapshot().into_vec();
        let lock = snapshot
            .iter()
            .find(|(key, _, _, _)| key.key().name() == "sc_lock_acquire_total")
            .expect("lock counter recorded");
        assert_eq!(lock.3, DebugValue::Counter(2));
        let labels: Vec<(&str, &str)> = lock
            .0
            .key()
            .labels()
            .map(|l| (l.key(), l.value()))
            .collect();
        assert!(labels.contains(&("role", "producer")));
        assert!(labels.contains(&("outcome", "rejected")));

        assert!(snapshot
            .iter()
            .any(|(key, _, _, _)| key.key().name() == "sc_signals_sent_total"));
        assert!(snapshot
            .iter()
            .any(|(key, _, _, value)| key.key().name() == "sc_active_fans"
                && *value == DebugValue::Gauge(4.0.into())));
    }
}
