//! Metrics for observability.
//!
//! Exports Prometheus-compatible metrics for:
//! - Registry fetch cycles (mode, outcome, duration)
//! - Generation-counter races and reconciliation resyncs
//! - Replication client requests
//! - Supervisor backoff state
//!
//! # Metric Naming Convention
//!
//! All metrics are prefixed with `registry_` and follow Prometheus
//! conventions: counters end in `_total`, gauges represent current state,
//! histograms track distributions in seconds.
//!
//! Metrics are side-effect only and never affect control flow.

use metrics::{counter, gauge, histogram};
use std::time::Duration;

/// Record the outcome of one registry refresh cycle.
pub fn record_fetch_cycle(region: &str, mode: &str, success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!("registry_fetch_cycles_total", "region" => region.to_string(), "mode" => mode.to_string(), "status" => status).increment(1);
}

/// Record the wall-clock duration of one refresh cycle.
pub fn record_fetch_duration(region: &str, duration: Duration) {
    histogram!("registry_fetch_duration_seconds", "region" => region.to_string())
        .record(duration.as_secs_f64());
}

/// Record a generation-counter CAS loss (benign: another cycle won).
pub fn record_generation_race_lost(region: &str, kind: &str) {
    counter!("registry_generation_races_lost_total", "region" => region.to_string(), "kind" => kind.to_string()).increment(1);
}

/// Record a reconcile-hash divergence that triggered a corrective full resync.
pub fn record_reconciliation(region: &str) {
    counter!("registry_reconciliations_total", "region" => region.to_string()).increment(1);
}

/// Set the currently cached instance count for a region.
pub fn set_cached_instances(region: &str, count: usize) {
    gauge!("registry_cached_instances", "region" => region.to_string()).set(count as f64);
}

/// Record a replication client request by operation and status code.
pub fn record_replication_request(node: &str, operation: &str, status: u16) {
    counter!(
        "registry_replication_requests_total",
        "node" => node.to_string(),
        "operation" => operation.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record a heartbeat conflict (409) that carried a recovery instance.
pub fn record_heartbeat_conflict(node: &str) {
    counter!("registry_heartbeat_conflicts_total", "node" => node.to_string()).increment(1);
}

/// Record one supervised task invocation outcome.
pub fn record_supervisor_run(task: &str, outcome: &str) {
    counter!("registry_supervisor_runs_total", "task" => task.to_string(), "outcome" => outcome.to_string()).increment(1);
}

/// Set the supervisor's current effective delay (grows under backoff).
pub fn set_supervisor_delay(task: &str, delay: Duration) {
    gauge!("registry_supervisor_delay_seconds", "task" => task.to_string()).set(delay.as_secs_f64());
}

/// Record a refresh cycle skipped because all worker slots were busy.
pub fn record_supervisor_rejected(task: &str) {
    counter!("registry_supervisor_rejected_total", "task" => task.to_string()).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    // Metrics calls must never panic even with no recorder installed.
    #[test]
    fn test_metrics_are_safe_without_recorder() {
        record_fetch_cycle("us-east-1", "delta", true);
        record_fetch_duration("us-east-1", Duration::from_millis(42));
        record_generation_race_lost("us-east-1", "full");
        record_reconciliation("us-east-1");
        set_cached_instances("us-east-1", 17);
        record_replication_request("peer-1", "heartbeat", 409);
        record_heartbeat_conflict("peer-1");
        record_supervisor_run("remote-region-fetch", "success");
        set_supervisor_delay("remote-region-fetch", Duration::from_secs(30));
        record_supervisor_rejected("remote-region-fetch");
    }
}
