//! # Orchestration Metrics
//!
//! OpenTelemetry counters for campaign lifecycle events. Every counter is
//! labelled with `kind` (the campaign key prefix). Without a configured meter
//! provider the global no-op provider swallows the measurements.
//!
//! ```rust
//! use docsync_orchestrator::metrics;
//! use opentelemetry::KeyValue;
//!
//! metrics::campaigns_generated_total().add(1, &[KeyValue::new("kind", "documentset")]);
//! ```

use opentelemetry::metrics::{Counter, Meter};
use opentelemetry::KeyValue;
use std::sync::OnceLock;

use crate::campaign::CampaignKind;

static ORCHESTRATION_METER: OnceLock<Meter> = OnceLock::new();

fn meter() -> &'static Meter {
    ORCHESTRATION_METER
        .get_or_init(|| opentelemetry::global::meter_provider().meter("docsync-orchestrator"))
}

pub fn kind_label(kind: CampaignKind) -> [KeyValue; 1] {
    [KeyValue::new("kind", kind.key_prefix())]
}

/// Campaigns whose fence was acquired or armed by a generator
pub fn campaigns_generated_total() -> Counter<u64> {
    meter()
        .u64_counter("docsync.campaigns.generated.total")
        .with_description("Total number of campaigns started by a generator")
        .build()
}

/// Individual work units submitted to the executor
pub fn work_units_emitted_total() -> Counter<u64> {
    meter()
        .u64_counter("docsync.work_units.emitted.total")
        .with_description("Total number of work units submitted to the executor")
        .build()
}

/// Campaigns finalized by the monitor
pub fn campaigns_finalized_total() -> Counter<u64> {
    meter()
        .u64_counter("docsync.campaigns.finalized.total")
        .with_description("Total number of campaigns finalized by the monitor")
        .build()
}

/// Fences cleared by the watchdog
///
/// Labels:
/// - kind
/// - reason: orphaned, unarmed
pub fn fences_reset_total() -> Counter<u64> {
    meter()
        .u64_counter("docsync.fences.reset.total")
        .with_description("Total number of fences reset by the watchdog")
        .build()
}

/// Beats skipped because another instance held the beat lock
///
/// Labels:
/// - lock: beat lock name
pub fn beats_skipped_total() -> Counter<u64> {
    meter()
        .u64_counter("docsync.beats.skipped.total")
        .with_description("Total number of beats skipped due to lock contention")
        .build()
}

/// Indexing runs by outcome
///
/// Labels:
/// - outcome: succeeded, failed, canceled
pub fn indexing_runs_total() -> Counter<u64> {
    meter()
        .u64_counter("docsync.indexing.runs.total")
        .with_description("Total number of supervised indexing runs")
        .build()
}
