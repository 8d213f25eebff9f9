//! Privacy filtering of post-images
//!
//! Applied to the `after` mapping of accepted, non-delete changes before SQL
//! synthesis. Personally identifying columns never cross regions; cross-region
//! user foreign keys are nulled so the row shape survives without the link.

use chrono::DateTime;
use serde_json::{Map, Value};

/// Columns removed outright: never appear in the synthesized column list.
pub const REMOVED_COLUMNS: &[&str] = &[
	"username",
	"email",
	"full_name",
	"phone",
	"user_email",
	"user_phone",
	"user_name",
	"creator_name",
	"creator_email",
	"creator_phone",
	"salesperson_name",
	"salesperson_email",
	"salesperson_phone",
];

/// Columns kept in the column list but written as NULL: they reference users
/// that only exist in the origin region.
pub const NULLED_COLUMNS: &[&str] = &["created_by_user_id", "salesperson_user_id"];

/// Integers below this on a `*date*` column are epoch-day encoded.
const EPOCH_DAY_MAX: i64 = 100_000;

/// Microsecond timestamps exceed this; smaller values pass through.
const MICROS_THRESHOLD: i64 = 100_000_000_000;

/// Filtered `(columns, values)` pair ready for SQL synthesis.
#[derive(Debug, Clone, Default)]
pub struct FilteredRow {
	pub columns: Vec<String>,
	pub values: Vec<Value>,
}

impl FilteredRow {
	pub fn contains(&self, column: &str) -> bool {
		self.columns.iter().any(|c| c == column)
	}
}

/// Filter one post-image: drop removed and metadata columns, null the
/// cross-region FKs, and normalize temporal encodings.
pub fn filter_row(after: &Map<String, Value>) -> FilteredRow {
	let mut row = FilteredRow::default();

	for (column, value) in after {
		if column.starts_with('_') || REMOVED_COLUMNS.contains(&column.as_str()) {
			continue;
		}

		let value = if NULLED_COLUMNS.contains(&column.as_str()) {
			Value::Null
		} else {
			normalize_value(column, value)
		};

		row.columns.push(column.clone());
		row.values.push(value);
	}

	row
}

/// Apply the temporal normalizations: microsecond `*_at` timestamps become
/// milliseconds, epoch-day integers on `*date*` columns become ISO dates.
fn normalize_value(column: &str, value: &Value) -> Value {
	if let Some(raw) = value.as_i64() {
		if column.ends_with("_at") && raw > MICROS_THRESHOLD {
			return Value::from(raw / 1000);
		}
		if column.contains("date") && raw < EPOCH_DAY_MAX {
			if let Some(date) = DateTime::from_timestamp(raw * 86_400, 0) {
				return Value::from(date.date_naive().format("%Y-%m-%d").to_string());
			}
		}
	}
	value.clone()
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	fn as_map(value: Value) -> Map<String, Value> {
		match value {
			Value::Object(map) => map,
			_ => panic!("expected an object"),
		}
	}

	#[test]
	fn removes_identifying_columns() {
		let after = as_map(json!({
			"id": 7,
			"username": "alice",
			"salesperson_email": "a@example.com",
			"stock_quantity": 8,
		}));
		let row = filter_row(&after);

		assert!(row.contains("id"));
		assert!(row.contains("stock_quantity"));
		assert!(!row.contains("username"));
		assert!(!row.contains("salesperson_email"));
	}

	#[test]
	fn nulls_cross_region_foreign_keys() {
		let after = as_map(json!({
			"id": 7,
			"created_by_user_id": 42,
			"salesperson_user_id": 9,
		}));
		let row = filter_row(&after);

		for fk in NULLED_COLUMNS {
			let idx = row.columns.iter().position(|c| c == fk).unwrap();
			assert_eq!(row.values[idx], Value::Null);
		}
	}

	#[test]
	fn strips_metadata_columns() {
		let after = as_map(json!({"id": 1, "_sync_origin": "india", "_lsn": 12345}));
		let row = filter_row(&after);
		assert_eq!(row.columns, vec!["id"]);
	}

	#[test]
	fn normalizes_microsecond_timestamps() {
		let after = as_map(json!({"id": 1, "updated_at": 1704067205000000i64}));
		let row = filter_row(&after);
		let idx = row.columns.iter().position(|c| c == "updated_at").unwrap();
		assert_eq!(row.values[idx], json!(1704067205000i64));
	}

	#[test]
	fn timestamps_below_threshold_pass_through() {
		let after = as_map(json!({"id": 1, "updated_at": 99_999_999_999i64}));
		let row = filter_row(&after);
		let idx = row.columns.iter().position(|c| c == "updated_at").unwrap();
		assert_eq!(row.values[idx], json!(99_999_999_999i64));
	}

	#[test]
	fn converts_epoch_day_dates() {
		let after = as_map(json!({"id": 9, "sale_date": 19723}));
		let row = filter_row(&after);
		let idx = row.columns.iter().position(|c| c == "sale_date").unwrap();
		assert_eq!(row.values[idx], json!("2024-01-04"));
	}

	#[test]
	fn leaves_large_date_integers_alone() {
		// Already a millisecond timestamp, not an epoch-day.
		let after = as_map(json!({"id": 9, "sale_date": 1704067200000i64}));
		let row = filter_row(&after);
		let idx = row.columns.iter().position(|c| c == "sale_date").unwrap();
		assert_eq!(row.values[idx], json!(1704067200000i64));
	}
}
