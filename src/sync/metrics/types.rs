//! Metric types and snapshots for sync observability

use crate::sync::region::{Region, Table};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// One recorded sync: (source, destination, table, record id, latency,
/// wall-clock time).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncEvent {
	pub source: Region,
	pub destination: Region,
	pub table: Table,
	pub record_id: String,
	pub latency_ms: i64,
	pub timestamp: DateTime<Utc>,
}

/// Aggregates computed on demand from one direction's ring buffer.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectionStats {
	pub total_syncs: usize,
	pub avg_latency_ms: f64,
	pub min_latency_ms: Option<i64>,
	pub max_latency_ms: Option<i64>,
	pub last_sync_time: Option<DateTime<Utc>>,
	pub last_sync_latency_ms: Option<i64>,
	pub syncs_last_minute: usize,
	pub avg_last_minute_ms: f64,
	/// Newest first, at most ten entries.
	pub recent_syncs: Vec<SyncEvent>,
}

/// Response shape served by the read API for the inbound direction.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundSyncStats {
	pub direction: String,
	#[serde(rename = "receives_from")]
	pub receives_from: Region,
	#[serde(flatten)]
	pub stats: DirectionStats,
}

/// Operation counters for the consumer pipeline.
#[derive(Debug, Default)]
pub struct OperationCounters {
	pub changes_received: AtomicU64,
	pub changes_applied: AtomicU64,
	pub changes_skipped: AtomicU64,
	pub changes_rejected: AtomicU64,
	pub sink_errors: AtomicU64,
}

/// Point-in-time copy of the operation counters.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CounterSnapshot {
	pub changes_received: u64,
	pub changes_applied: u64,
	pub changes_skipped: u64,
	pub changes_rejected: u64,
	pub sink_errors: u64,
}

impl OperationCounters {
	pub fn snapshot(&self) -> CounterSnapshot {
		CounterSnapshot {
			changes_received: self.changes_received.load(Ordering::Relaxed),
			changes_applied: self.changes_applied.load(Ordering::Relaxed),
			changes_skipped: self.changes_skipped.load(Ordering::Relaxed),
			changes_rejected: self.changes_rejected.load(Ordering::Relaxed),
			sink_errors: self.sink_errors.load(Ordering::Relaxed),
		}
	}
}
