//! Inbound change processor
//!
//! Drives one message through decode, policy, conflict resolution, privacy
//! filtering, the sink write, and latency bookkeeping. Every failure is
//! terminal for that message only: the consumer always advances.

use crate::sink::writer::SinkWriter;
use crate::sync::envelope::{self, Change, ChangeOp, Decoded};
use crate::sync::metrics::SyncMetrics;
use crate::sync::policy::{self, Gate, PolicyConfig};
use crate::sync::privacy;
use crate::sync::resolver::{self, Resolution};
use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// How one message ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
	Applied(&'static str),
	Skipped(&'static str),
	Rejected(&'static str),
	Tombstone,
}

pub struct InboundProcessor {
	policy: PolicyConfig,
	writer: SinkWriter,
	metrics: Arc<SyncMetrics>,
}

impl InboundProcessor {
	pub fn new(policy: PolicyConfig, writer: SinkWriter, metrics: Arc<SyncMetrics>) -> Self {
		Self {
			policy,
			writer,
			metrics,
		}
	}

	pub fn metrics(&self) -> &Arc<SyncMetrics> {
		&self.metrics
	}

	/// Handle one bus message end to end.
	pub async fn handle(&self, topic: &str, key: Option<&[u8]>, value: Option<&[u8]>) -> Outcome {
		let received = Instant::now();
		self.metrics.record_received();

		let change = match envelope::decode(topic, key, value) {
			Ok(Decoded::Change(change)) => change,
			Ok(Decoded::Tombstone) => {
				debug!(topic, "Ignoring tombstone message");
				return Outcome::Tombstone;
			}
			Err(error) => {
				warn!(topic, %error, "Dropping undecodable change event");
				self.metrics.record_skipped();
				return Outcome::Skipped("decode_error");
			}
		};

		if let Gate::Reject(reason) = policy::evaluate(
			&self.policy,
			change.table,
			&change.origin,
			change.op,
		) {
			info!(
				table = %change.table,
				origin = %change.origin,
				op = change.op.as_str(),
				reason,
				"Change rejected by policy"
			);
			self.metrics.record_rejected();
			return Outcome::Rejected(reason);
		}

		let head = match self.writer.fetch_head(change.table, &change.primary_key).await {
			Ok(head) => head,
			Err(error) => {
				warn!(table = %change.table, %error, "Failed to read local row, dropping change");
				self.metrics.record_sink_error();
				return Outcome::Skipped("sink_error");
			}
		};

		let incoming_version = change
			.after
			.as_ref()
			.and_then(|row| row.get("version"))
			.and_then(Value::as_i64)
			.unwrap_or_default();

		let reason = match resolver::resolve(
			change.op,
			head.as_ref(),
			change.source_timestamp_ms,
			incoming_version,
		) {
			Resolution::Skip(reason) => {
				info!(
					table = %change.table,
					id = %change.primary_key,
					reason = reason.as_str(),
					"Change skipped by conflict resolution"
				);
				self.metrics.record_skipped();
				return Outcome::Skipped(reason.as_str());
			}
			Resolution::Apply(reason) => reason,
		};

		let written = match change.op {
			ChangeOp::Delete => self
				.writer
				.delete(change.table, &change.primary_key)
				.await
				.map(|_| ()),
			_ => {
				let Some(after) = change.after.as_ref() else {
					warn!(table = %change.table, id = %change.primary_key, "Non-delete change without a post-image");
					self.metrics.record_skipped();
					return Outcome::Skipped("missing_after");
				};
				let mut row = privacy::filter_row(after);
				if !row.contains("id") {
					row.columns.insert(0, "id".to_string());
					row.values.insert(0, change.primary_key.clone());
				}
				self.writer.upsert(change.table, &row).await
			}
		};

		if let Err(error) = written {
			warn!(
				table = %change.table,
				id = %change.primary_key,
				%error,
				"Sink write failed, dropping change"
			);
			self.metrics.record_sink_error();
			return Outcome::Skipped("sink_error");
		}

		let latency_ms = change
			.source_timestamp_ms
			.map(|ts| Utc::now().timestamp_millis() - ts)
			.unwrap_or_else(|| received.elapsed().as_millis() as i64);

		self.metrics
			.record(
				change.origin.clone(),
				self.policy.local.clone(),
				change.table,
				record_id_string(&change),
				latency_ms,
			)
			.await;
		self.metrics.record_applied();

		info!(
			table = %change.table,
			id = %change.primary_key,
			op = change.op.as_str(),
			reason = reason.as_str(),
			latency_ms,
			"Change applied"
		);

		Outcome::Applied(reason.as_str())
	}
}

fn record_id_string(change: &Change) -> String {
	match &change.primary_key {
		Value::String(s) => s.clone(),
		other => other.to_string(),
	}
}
