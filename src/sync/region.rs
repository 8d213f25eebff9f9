//! Region tags and sync directions

use serde::{Deserialize, Serialize};
use std::fmt;

/// Tag identifying one replication endpoint.
///
/// The deployed pair is `india`/`china`, but any two-element symmetric set
/// works: each running instance is bound to exactly one local region and one
/// peer region at startup.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Region(String);

impl Region {
	pub fn new(tag: impl Into<String>) -> Self {
		Self(tag.into())
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}

	/// The conventional complement for the built-in region pair, if any.
	pub fn default_peer(&self) -> Option<Region> {
		match self.0.as_str() {
			"india" => Some(Region::new("china")),
			"china" => Some(Region::new("india")),
			_ => None,
		}
	}
}

impl fmt::Display for Region {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl From<&str> for Region {
	fn from(tag: &str) -> Self {
		Self::new(tag)
	}
}

/// Ordered (source, destination) pair used to key sync metrics.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Direction {
	pub source: Region,
	pub destination: Region,
}

impl Direction {
	pub fn new(source: Region, destination: Region) -> Self {
		Self {
			source,
			destination,
		}
	}
}

impl fmt::Display for Direction {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}-to-{}", self.source, self.destination)
	}
}

/// Replicated table identifiers.
///
/// Closed set: topics outside it are skipped before any database work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Table {
	Users,
	Products,
	Sales,
}

/// Topic prefix carrying the table identity.
pub const TOPIC_PREFIX: &str = "sync.";

impl Table {
	/// Derive the table from a bus topic name (`sync.<table>`).
	pub fn from_topic(topic: &str) -> Option<Table> {
		match topic.strip_prefix(TOPIC_PREFIX)? {
			"users" => Some(Table::Users),
			"products" => Some(Table::Products),
			"sales" => Some(Table::Sales),
			_ => None,
		}
	}

	pub fn as_str(&self) -> &'static str {
		match self {
			Table::Users => "users",
			Table::Products => "products",
			Table::Sales => "sales",
		}
	}
}

impl fmt::Display for Table {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}
