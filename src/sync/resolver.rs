//! Last-write-wins conflict resolution with loop suppression
//!
//! Compares an incoming change against the head of the local row and decides
//! whether to apply it. A near-simultaneous timestamp is assumed to be our
//! own write returning through the CDC pipeline and is skipped.

use crate::sync::envelope::ChangeOp;
use chrono::{DateTime, Utc};
use sqlx::FromRow;

/// Incoming changes whose timestamp is within this window of the local row
/// are treated as CDC echoes of our own writes.
pub const LOOP_WINDOW_MS: i64 = 1000;

/// Window within which an equal-or-older timestamp falls back to the version
/// tie-break. Narrower than the loop window, which is evaluated first.
pub const TIE_WINDOW_MS: i64 = 100;

/// Head of the local row read before resolution: just the columns the
/// decision needs.
#[derive(Debug, Clone, FromRow)]
pub struct LocalHead {
	pub updated_at: Option<DateTime<Utc>>,
	pub version: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyReason {
	NewRecord,
	DeleteOfAbsent,
	DeleteOperation,
	NewerTimestamp,
	HigherVersion,
}

impl ApplyReason {
	pub fn as_str(&self) -> &'static str {
		match self {
			ApplyReason::NewRecord => "new_record",
			ApplyReason::DeleteOfAbsent => "delete_of_absent",
			ApplyReason::DeleteOperation => "delete_operation",
			ApplyReason::NewerTimestamp => "newer_timestamp",
			ApplyReason::HigherVersion => "higher_version",
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
	LoopPreventionRapidUpdate,
	SameOrOlderVersion,
	OlderTimestamp,
}

impl SkipReason {
	pub fn as_str(&self) -> &'static str {
		match self {
			SkipReason::LoopPreventionRapidUpdate => "loop_prevention_rapid_update",
			SkipReason::SameOrOlderVersion => "same_or_older_version",
			SkipReason::OlderTimestamp => "older_timestamp",
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
	Apply(ApplyReason),
	Skip(SkipReason),
}

/// Decide whether an incoming change is applied or skipped.
///
/// Pure: the local head is read by the caller. A missing incoming timestamp
/// counts as epoch zero, landing in `older_timestamp` for existing rows.
pub fn resolve(
	op: ChangeOp,
	local: Option<&LocalHead>,
	incoming_ts_ms: Option<i64>,
	incoming_version: i64,
) -> Resolution {
	let local = match local {
		Some(head) => head,
		None => {
			return match op {
				ChangeOp::Delete => Resolution::Apply(ApplyReason::DeleteOfAbsent),
				_ => Resolution::Apply(ApplyReason::NewRecord),
			}
		}
	};

	if op == ChangeOp::Delete {
		return Resolution::Apply(ApplyReason::DeleteOperation);
	}

	let t_local = local
		.updated_at
		.map(|t| t.timestamp_millis())
		.unwrap_or_default();
	let t_incoming = incoming_ts_ms.unwrap_or_default();
	let delta = (t_incoming - t_local).abs();

	if delta < LOOP_WINDOW_MS {
		return Resolution::Skip(SkipReason::LoopPreventionRapidUpdate);
	}

	if t_incoming > t_local {
		return Resolution::Apply(ApplyReason::NewerTimestamp);
	}

	if delta < TIE_WINDOW_MS {
		if incoming_version > local.version {
			return Resolution::Apply(ApplyReason::HigherVersion);
		}
		return Resolution::Skip(SkipReason::SameOrOlderVersion);
	}

	Resolution::Skip(SkipReason::OlderTimestamp)
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::TimeZone;

	fn head_at(ms: i64, version: i64) -> LocalHead {
		LocalHead {
			updated_at: Some(Utc.timestamp_millis_opt(ms).unwrap()),
			version,
		}
	}

	#[test]
	fn absent_row_is_created() {
		assert_eq!(
			resolve(ChangeOp::Update, None, Some(1_704_067_200_000), 1),
			Resolution::Apply(ApplyReason::NewRecord)
		);
	}

	#[test]
	fn delete_of_absent_row_is_a_noop_apply() {
		assert_eq!(
			resolve(ChangeOp::Delete, None, None, 0),
			Resolution::Apply(ApplyReason::DeleteOfAbsent)
		);
	}

	#[test]
	fn delete_wins_regardless_of_timestamp() {
		// Local row far newer than the delete event.
		let local = head_at(1_704_067_200_000, 5);
		assert_eq!(
			resolve(ChangeOp::Delete, Some(&local), Some(1_600_000_000_000), 0),
			Resolution::Apply(ApplyReason::DeleteOperation)
		);
	}

	#[test]
	fn rapid_echo_is_suppressed() {
		// 300ms apart: assumed to be our own write re-entering via CDC.
		let local = head_at(1_704_067_200_500, 1);
		assert_eq!(
			resolve(ChangeOp::Update, Some(&local), Some(1_704_067_200_800), 2),
			Resolution::Skip(SkipReason::LoopPreventionRapidUpdate)
		);
	}

	#[test]
	fn identical_timestamp_is_suppressed() {
		// Re-delivery of the same event: idempotent no-op.
		let local = head_at(1_704_067_200_000, 1);
		assert_eq!(
			resolve(ChangeOp::Update, Some(&local), Some(1_704_067_200_000), 1),
			Resolution::Skip(SkipReason::LoopPreventionRapidUpdate)
		);
	}

	#[test]
	fn newer_timestamp_wins() {
		let local = head_at(1_704_067_200_000, 1);
		assert_eq!(
			resolve(ChangeOp::Update, Some(&local), Some(1_704_067_205_000), 2),
			Resolution::Apply(ApplyReason::NewerTimestamp)
		);
	}

	#[test]
	fn older_timestamp_is_skipped() {
		let local = head_at(1_704_067_205_000, 2);
		assert_eq!(
			resolve(ChangeOp::Update, Some(&local), Some(1_704_067_200_000), 9),
			Resolution::Skip(SkipReason::OlderTimestamp)
		);
	}

	#[test]
	fn missing_incoming_timestamp_never_overwrites() {
		let local = head_at(1_704_067_200_000, 1);
		assert_eq!(
			resolve(ChangeOp::Update, Some(&local), None, 9),
			Resolution::Skip(SkipReason::OlderTimestamp)
		);
	}

	#[test]
	fn convergence_is_order_independent() {
		// Two updates >= 1s apart converge on the newer one in either order.
		let older = 1_704_067_200_000;
		let newer = older + 5_000;

		// Newer applied first, older arrives second: skipped.
		let local = head_at(newer, 2);
		assert_eq!(
			resolve(ChangeOp::Update, Some(&local), Some(older), 1),
			Resolution::Skip(SkipReason::OlderTimestamp)
		);

		// Older applied first, newer arrives second: applied.
		let local = head_at(older, 1);
		assert_eq!(
			resolve(ChangeOp::Update, Some(&local), Some(newer), 2),
			Resolution::Apply(ApplyReason::NewerTimestamp)
		);
	}
}
