//! Replicated table schema descriptors
//!
//! The sink never trusts column names from the wire: every synthesized
//! statement is checked against these static descriptors first, and table
//! names only ever come from the closed [`Table`] set.

use crate::sync::region::Table;
use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Columns the sink may write for one table.
#[derive(Debug, Clone)]
pub struct TableSchema {
	pub table: Table,
	pub columns: &'static [&'static str],
}

impl TableSchema {
	pub fn has_column(&self, column: &str) -> bool {
		self.columns.contains(&column)
	}
}

/// Writable tables and their column whitelists.
///
/// `users` has no entry: user rows never cross regions, so the sink refuses
/// the table outright even if a change slips past the policy gate.
static SCHEMAS: Lazy<HashMap<Table, TableSchema>> = Lazy::new(|| {
	let mut schemas = HashMap::new();
	schemas.insert(
		Table::Products,
		TableSchema {
			table: Table::Products,
			columns: &[
				"id",
				"product_name",
				"description",
				"price",
				"stock_quantity",
				"category",
				"manufacturer_country",
				"created_by_user_id",
				"sync_source",
				"version",
				"created_at",
				"updated_at",
			],
		},
	);
	schemas.insert(
		Table::Sales,
		TableSchema {
			table: Table::Sales,
			columns: &[
				"id",
				"sale_date",
				"product_id",
				"product_name",
				"quantity",
				"unit_price",
				"total_amount",
				"customer_name",
				"sale_region",
				"sync_source",
				"salesperson_user_id",
				"version",
				"created_at",
				"updated_at",
			],
		},
	);
	schemas
});

/// Look up the schema for a writable table.
pub fn schema_for(table: Table) -> Option<&'static TableSchema> {
	SCHEMAS.get(&table)
}
