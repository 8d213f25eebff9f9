//! SQL synthesis and execution against the local store
//!
//! One statement per message: an UPSERT keyed by `id` for inserts/updates, a
//! plain DELETE for deletes. Statements are synthesized from the filtered
//! column set with bound parameters for every value; identifiers only ever
//! come from the static schema descriptors.

use crate::sink::schema::{schema_for, TableSchema};
use crate::sync::privacy::FilteredRow;
use crate::sync::region::Table;
use crate::sync::resolver::LocalHead;
use chrono::{DateTime, NaiveDate};
use serde_json::Value;
use sqlx::{PgPool, Postgres, QueryBuilder};
use thiserror::Error;
use tracing::debug;

/// Columns that keep their stored value on conflict. `updated_at` is instead
/// stamped with the server clock so it reflects local apply time.
const PRESERVED_ON_CONFLICT: &[&str] = &["id", "sync_source", "updated_at"];

#[derive(Debug, Error)]
pub enum SinkError {
	#[error("table '{0}' is not writable by the sync core")]
	UnwritableTable(Table),

	#[error("column '{column}' is not part of the {table} schema")]
	UnknownColumn { table: Table, column: String },

	#[error("unsupported primary key value: {0}")]
	UnsupportedKey(Value),

	#[error("unsupported value for column '{0}'")]
	UnsupportedValue(String),

	#[error(transparent)]
	Db(#[from] sqlx::Error),
}

/// Executes resolver-approved mutations against the sink pool.
pub struct SinkWriter {
	pool: PgPool,
}

impl SinkWriter {
	pub fn new(pool: PgPool) -> Self {
		Self { pool }
	}

	/// Read the conflict-resolution head (`updated_at`, `version`) of the
	/// local row, if it exists.
	pub async fn fetch_head(&self, table: Table, id: &Value) -> Result<Option<LocalHead>, SinkError> {
		let schema = schema_for(table).ok_or(SinkError::UnwritableTable(table))?;
		let sql = format!(
			"SELECT updated_at, COALESCE(version, 0)::BIGINT AS version FROM {} WHERE id = $1",
			schema.table.as_str()
		);
		let query = sqlx::query_as::<_, LocalHead>(&sql);
		let query = match id {
			Value::Number(n) if n.as_i64().is_some() => query.bind(n.as_i64().unwrap_or_default()),
			Value::String(s) => query.bind(s.clone()),
			other => return Err(SinkError::UnsupportedKey(other.clone())),
		};
		Ok(query.fetch_optional(&self.pool).await?)
	}

	/// Apply an insert/update as a single UPSERT statement.
	pub async fn upsert(&self, table: Table, row: &FilteredRow) -> Result<(), SinkError> {
		let schema = schema_for(table).ok_or(SinkError::UnwritableTable(table))?;
		let mut statement = build_upsert(schema, row)?;
		debug!(table = %table, columns = row.columns.len(), "Executing upsert");
		statement.build().execute(&self.pool).await?;
		Ok(())
	}

	/// Delete the local row. Returns whether a row actually existed.
	pub async fn delete(&self, table: Table, id: &Value) -> Result<bool, SinkError> {
		let schema = schema_for(table).ok_or(SinkError::UnwritableTable(table))?;
		let sql = format!("DELETE FROM {} WHERE id = $1", schema.table.as_str());
		let query = sqlx::query(&sql);
		let query = match id {
			Value::Number(n) if n.as_i64().is_some() => query.bind(n.as_i64().unwrap_or_default()),
			Value::String(s) => query.bind(s.clone()),
			other => return Err(SinkError::UnsupportedKey(other.clone())),
		};
		let result = query.execute(&self.pool).await?;
		Ok(result.rows_affected() > 0)
	}
}

/// Synthesize the UPSERT for one filtered row.
///
/// `INSERT INTO <table> (cols) VALUES (binds) ON CONFLICT (id) DO UPDATE SET
/// <cols minus preserved> = EXCLUDED.<col>, updated_at = NOW()`. Every value
/// is a bound parameter or a literal NULL; a column outside the whitelist
/// fails the whole message.
pub fn build_upsert(
	schema: &TableSchema,
	row: &FilteredRow,
) -> Result<QueryBuilder<'static, Postgres>, SinkError> {
	for column in &row.columns {
		if !schema.has_column(column) {
			return Err(SinkError::UnknownColumn {
				table: schema.table,
				column: column.clone(),
			});
		}
	}

	let mut builder: QueryBuilder<'static, Postgres> =
		QueryBuilder::new(format!("INSERT INTO {} (", schema.table.as_str()));
	builder.push(row.columns.join(", "));
	builder.push(") VALUES (");

	for (index, (column, value)) in row.columns.iter().zip(&row.values).enumerate() {
		if index > 0 {
			builder.push(", ");
		}
		push_value(&mut builder, column, value)?;
	}

	builder.push(") ON CONFLICT (id) DO UPDATE SET ");
	for column in row
		.columns
		.iter()
		.filter(|c| !PRESERVED_ON_CONFLICT.contains(&c.as_str()))
	{
		builder.push(format!("{column} = EXCLUDED.{column}, "));
	}
	builder.push("updated_at = NOW()");

	Ok(builder)
}

/// Bind one value with the type its column expects. Integer `*_at` values
/// are epoch milliseconds; ISO strings on `*date*` columns become dates.
fn push_value(
	builder: &mut QueryBuilder<'static, Postgres>,
	column: &str,
	value: &Value,
) -> Result<(), SinkError> {
	match value {
		Value::Null => {
			builder.push("NULL");
		}
		Value::Bool(b) => {
			builder.push_bind(*b);
		}
		Value::Number(n) => {
			if let Some(i) = n.as_i64() {
				if column.ends_with("_at") {
					let ts = DateTime::from_timestamp_millis(i)
						.ok_or_else(|| SinkError::UnsupportedValue(column.to_string()))?;
					builder.push_bind(ts);
				} else {
					builder.push_bind(i);
				}
			} else if let Some(f) = n.as_f64() {
				builder.push_bind(f);
			} else {
				return Err(SinkError::UnsupportedValue(column.to_string()));
			}
		}
		Value::String(s) => {
			if column.contains("date") {
				if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
					builder.push_bind(date);
					return Ok(());
				}
			}
			builder.push_bind(s.clone());
		}
		json @ (Value::Array(_) | Value::Object(_)) => {
			builder.push_bind(json.clone());
		}
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::sync::privacy::{filter_row, REMOVED_COLUMNS};
	use serde_json::{json, Map};

	fn as_map(value: Value) -> Map<String, Value> {
		match value {
			Value::Object(map) => map,
			_ => panic!("expected an object"),
		}
	}

	fn products() -> &'static TableSchema {
		schema_for(Table::Products).unwrap()
	}

	#[test]
	fn upsert_updates_all_but_preserved_columns() {
		let row = filter_row(&as_map(json!({
			"id": 7,
			"stock_quantity": 8,
			"sync_source": "india",
			"version": 2,
			"updated_at": 1704067205000i64,
		})));
		let builder = build_upsert(products(), &row).unwrap();
		let sql = builder.sql();

		assert!(sql.starts_with("INSERT INTO products (id, stock_quantity, sync_source"));
		assert!(sql.contains("ON CONFLICT (id) DO UPDATE SET"));
		assert!(sql.contains("stock_quantity = EXCLUDED.stock_quantity"));
		assert!(sql.contains("version = EXCLUDED.version"));
		// Preserved on conflict: sync_source keeps its stored value and
		// updated_at is stamped server-side.
		assert!(!sql.contains("sync_source = EXCLUDED.sync_source"));
		assert!(!sql.contains("updated_at = EXCLUDED.updated_at"));
		assert!(sql.ends_with("updated_at = NOW()"));
	}

	#[test]
	fn values_are_bound_not_interpolated() {
		let row = filter_row(&as_map(json!({
			"id": 7,
			"product_name": "'; DROP TABLE products; --",
		})));
		let builder = build_upsert(products(), &row).unwrap();
		let sql = builder.sql();

		assert!(sql.contains("$1"));
		assert!(!sql.contains("DROP TABLE"));
	}

	#[test]
	fn filtered_rows_never_leak_private_columns() {
		let row = filter_row(&as_map(json!({
			"id": 7,
			"stock_quantity": 8,
			"username": "alice",
			"creator_email": "a@example.com",
			"created_by_user_id": 42,
		})));
		let builder = build_upsert(products(), &row).unwrap();
		let sql = builder.sql();

		for private in REMOVED_COLUMNS {
			assert!(!sql.contains(private), "{private} leaked into SQL");
		}
		// Nulled FK stays in the column list with a literal NULL value.
		assert!(sql.contains("created_by_user_id"));
		assert!(sql.contains("NULL"));
	}

	#[test]
	fn unknown_column_fails_the_message() {
		let row = filter_row(&as_map(json!({"id": 7, "surprise_column": 1})));
		let result = build_upsert(products(), &row);
		assert!(matches!(result, Err(SinkError::UnknownColumn { .. })));
	}
}
