//! Change envelope decoding
//!
//! The CDC producer emits one JSON envelope per row change, in either the
//! wrapped (`{"payload": {...}}`) or flat layout. Both are parsed into a
//! single normalized [`Change`] record before any policy or database work.

use crate::sync::region::{Region, Table};
use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;

/// Operation code carried in the envelope (`c`/`u`/`d`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeOp {
	Create,
	Update,
	Delete,
}

impl ChangeOp {
	pub fn from_code(code: &str) -> Option<ChangeOp> {
		match code {
			"c" => Some(ChangeOp::Create),
			"u" => Some(ChangeOp::Update),
			"d" => Some(ChangeOp::Delete),
			_ => None,
		}
	}

	pub fn as_str(&self) -> &'static str {
		match self {
			ChangeOp::Create => "create",
			ChangeOp::Update => "update",
			ChangeOp::Delete => "delete",
		}
	}
}

/// Normalized change record: the decoder's output and the pipeline's input.
#[derive(Debug, Clone)]
pub struct Change {
	pub table: Table,
	pub primary_key: Value,
	pub op: ChangeOp,
	pub after: Option<Map<String, Value>>,
	pub origin: Region,
	/// Post-image event time in epoch milliseconds, when the payload carries
	/// one. Used for conflict resolution and latency accounting.
	pub source_timestamp_ms: Option<i64>,
}

/// Decode result. A missing or null message value is a compaction tombstone
/// and is ignored rather than treated as an error.
#[derive(Debug)]
pub enum Decoded {
	Change(Change),
	Tombstone,
}

#[derive(Debug, Error)]
pub enum DecodeError {
	#[error("malformed envelope JSON: {0}")]
	MalformedJson(#[from] serde_json::Error),

	#[error("topic '{0}' does not map to a replicated table")]
	UnknownTable(String),

	#[error("unrecognized operation code '{0}'")]
	UnknownOp(String),

	#[error("non-delete change without a primary key")]
	MissingId,

	#[error("change without an explicit sync origin")]
	MissingOrigin,
}

/// Microsecond timestamps exceed this; anything below is already in
/// milliseconds.
const MICROS_THRESHOLD: i64 = 100_000_000_000;

/// Normalize an epoch integer to milliseconds (microseconds divide by 1000).
pub fn normalize_epoch_ms(value: i64) -> i64 {
	if value > MICROS_THRESHOLD {
		value / 1000
	} else {
		value
	}
}

#[derive(Debug, Default, Deserialize)]
struct WireBody {
	op: Option<String>,
	after: Option<Map<String, Value>>,
	#[serde(rename = "_sync_origin")]
	sync_origin: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireEnvelope {
	payload: Option<WireBody>,
	#[serde(flatten)]
	top: WireBody,
}

#[derive(Debug, Deserialize)]
struct WireKey {
	id: Option<Value>,
}

/// Decode one bus message into a normalized change record.
///
/// Field-wise fallback between layouts: each of `op`, `after`, and
/// `_sync_origin` is read from `payload` when present there, else from the
/// top level.
pub fn decode(
	topic: &str,
	key: Option<&[u8]>,
	value: Option<&[u8]>,
) -> Result<Decoded, DecodeError> {
	let value = match value {
		Some(bytes) if !bytes.is_empty() => bytes,
		_ => return Ok(Decoded::Tombstone),
	};

	let table =
		Table::from_topic(topic).ok_or_else(|| DecodeError::UnknownTable(topic.to_string()))?;

	let envelope: WireEnvelope = serde_json::from_slice(value)?;
	let wrapped = envelope.payload.unwrap_or_default();
	let top = envelope.top;

	let op_code = wrapped
		.op
		.or(top.op)
		.ok_or_else(|| DecodeError::UnknownOp(String::new()))?;
	let op = ChangeOp::from_code(&op_code).ok_or(DecodeError::UnknownOp(op_code))?;

	let origin = wrapped
		.sync_origin
		.or(top.sync_origin)
		.ok_or(DecodeError::MissingOrigin)?;

	let after = wrapped.after.or(top.after);

	let key_id = key
		.filter(|bytes| !bytes.is_empty())
		.and_then(|bytes| serde_json::from_slice::<WireKey>(bytes).ok())
		.and_then(|k| k.id);
	let after_id = after
		.as_ref()
		.and_then(|row| row.get("id"))
		.filter(|v| !v.is_null())
		.cloned();
	let primary_key = key_id.or(after_id).ok_or(DecodeError::MissingId)?;

	let source_timestamp_ms = after
		.as_ref()
		.and_then(|row| row.get("updated_at").or_else(|| row.get("created_at")))
		.and_then(Value::as_i64)
		.map(normalize_epoch_ms);

	Ok(Decoded::Change(Change {
		table,
		primary_key,
		op,
		after,
		origin: Region::new(origin),
		source_timestamp_ms,
	}))
}
