//! Per-table directional and privacy policy
//!
//! Decides, before any database work, whether an inbound change is eligible
//! to be applied in this region. Pure function of the change's table, origin
//! region, and operation code plus the instance's policy configuration.

use crate::sync::envelope::ChangeOp;
use crate::sync::region::{Region, Table};

/// Rejection reasons, logged verbatim.
pub const REASON_USERS_NEVER_SYNC: &str = "privacy_users_never_sync";
pub const REASON_NOT_FOR_LOCAL: &str = "not_for_local";
pub const REASON_PRODUCTS_CREATE_LOCAL_ONLY: &str = "directional_products_create_local_only";
pub const REASON_SALES_ONE_WAY: &str = "directional_sales_one_way";

/// Policy configuration bound at startup.
#[derive(Debug, Clone)]
pub struct PolicyConfig {
	/// Region this instance writes to.
	pub local: Region,
	/// Region whose changes we consume.
	pub peer: Region,
	/// The only region allowed to originate `sales` rows.
	pub sales_origin: Region,
}

/// Gate decision for one change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
	Accept,
	Reject(&'static str),
}

/// Evaluate the policy matrix for one inbound change.
///
/// Check order matters: echoes of our own writes (`origin == local`) are
/// suppressed before the table-specific direction rules, so a local echo is
/// always reported as `not_for_local`.
pub fn evaluate(config: &PolicyConfig, table: Table, origin: &Region, op: ChangeOp) -> Gate {
	if table == Table::Users {
		return Gate::Reject(REASON_USERS_NEVER_SYNC);
	}

	if *origin == config.local {
		return Gate::Reject(REASON_NOT_FOR_LOCAL);
	}

	if table == Table::Products && op == ChangeOp::Create {
		return Gate::Reject(REASON_PRODUCTS_CREATE_LOCAL_ONLY);
	}

	if table == Table::Sales && *origin != config.sales_origin {
		return Gate::Reject(REASON_SALES_ONE_WAY);
	}

	Gate::Accept
}

#[cfg(test)]
mod tests {
	use super::*;

	fn china_local() -> PolicyConfig {
		PolicyConfig {
			local: Region::new("china"),
			peer: Region::new("india"),
			sales_origin: Region::new("india"),
		}
	}

	fn india_local() -> PolicyConfig {
		PolicyConfig {
			local: Region::new("india"),
			peer: Region::new("china"),
			sales_origin: Region::new("india"),
		}
	}

	#[test]
	fn users_never_sync_regardless_of_source() {
		let config = china_local();
		for origin in ["india", "china"] {
			for op in [ChangeOp::Create, ChangeOp::Update, ChangeOp::Delete] {
				assert_eq!(
					evaluate(&config, Table::Users, &Region::new(origin), op),
					Gate::Reject(REASON_USERS_NEVER_SYNC),
				);
			}
		}
	}

	#[test]
	fn own_echo_is_suppressed() {
		// A product update that originated here and came back through CDC.
		let config = china_local();
		assert_eq!(
			evaluate(
				&config,
				Table::Products,
				&Region::new("china"),
				ChangeOp::Update
			),
			Gate::Reject(REASON_NOT_FOR_LOCAL),
		);
	}

	#[test]
	fn peer_product_updates_and_deletes_pass() {
		let config = china_local();
		let india = Region::new("india");
		assert_eq!(
			evaluate(&config, Table::Products, &india, ChangeOp::Update),
			Gate::Accept
		);
		assert_eq!(
			evaluate(&config, Table::Products, &india, ChangeOp::Delete),
			Gate::Accept
		);
	}

	#[test]
	fn peer_product_creates_are_blocked() {
		let config = china_local();
		assert_eq!(
			evaluate(
				&config,
				Table::Products,
				&Region::new("india"),
				ChangeOp::Create
			),
			Gate::Reject(REASON_PRODUCTS_CREATE_LOCAL_ONLY),
		);
	}

	#[test]
	fn sales_flow_one_way() {
		// China-origin sale echoed back to china: caught as an echo first.
		assert_eq!(
			evaluate(
				&china_local(),
				Table::Sales,
				&Region::new("china"),
				ChangeOp::Create
			),
			Gate::Reject(REASON_NOT_FOR_LOCAL),
		);

		// China-origin sale arriving at india: sales only originate in india.
		assert_eq!(
			evaluate(
				&india_local(),
				Table::Sales,
				&Region::new("china"),
				ChangeOp::Create
			),
			Gate::Reject(REASON_SALES_ONE_WAY),
		);

		// India-origin sale arriving at china: the allowed direction.
		assert_eq!(
			evaluate(
				&china_local(),
				Table::Sales,
				&Region::new("india"),
				ChangeOp::Create
			),
			Gate::Accept,
		);
	}
}
