//! Environment-driven configuration
//!
//! Every instance is bound to one local region at startup; the peer region
//! defaults to the other half of the built-in india/china pair and must be
//! given explicitly for any other region set.

use crate::sync::policy::PolicyConfig;
use crate::sync::region::Region;
use std::env;
use thiserror::Error;

const DEFAULT_DB_PORT: u16 = 5432;
const DEFAULT_POOL_SIZE: u32 = 20;
const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 30;
const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 2;
const DEFAULT_SALES_ORIGIN: &str = "india";

#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("missing required environment variable {0}")]
	Missing(&'static str),

	#[error("invalid value '{value}' for {var}")]
	Invalid { var: &'static str, value: String },

	#[error("PEER_REGION is required when REGION is not one of the built-in pair")]
	PeerRegionRequired,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
	pub host: String,
	pub port: u16,
	pub name: String,
	pub user: String,
	pub password: String,
	pub pool_size: u32,
	pub idle_timeout_secs: u64,
	pub acquire_timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct BusConfig {
	pub broker: String,
	pub client_id: String,
	pub group_id: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
	pub region: Region,
	pub peer_region: Region,
	pub sales_origin: Region,
	pub database: DatabaseConfig,
	pub bus: BusConfig,
	pub production: bool,
}

impl AppConfig {
	pub fn from_env() -> Result<Self, ConfigError> {
		Self::from_lookup(|var| env::var(var).ok())
	}

	/// Build the config from any variable source. Split out so tests can
	/// exercise the parsing without mutating the process environment.
	pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
		let require = |var: &'static str| lookup(var).ok_or(ConfigError::Missing(var));

		let region = Region::new(require("REGION")?);
		let peer_region = match lookup("PEER_REGION") {
			Some(tag) => Region::new(tag),
			None => region.default_peer().ok_or(ConfigError::PeerRegionRequired)?,
		};
		let sales_origin = Region::new(
			lookup("SALES_ORIGIN").unwrap_or_else(|| DEFAULT_SALES_ORIGIN.to_string()),
		);

		let port = match lookup("DB_PORT") {
			Some(raw) => raw.parse().map_err(|_| ConfigError::Invalid {
				var: "DB_PORT",
				value: raw,
			})?,
			None => DEFAULT_DB_PORT,
		};

		Ok(Self {
			region,
			peer_region,
			sales_origin,
			database: DatabaseConfig {
				host: require("DB_HOST")?,
				port,
				name: require("DB_NAME")?,
				user: require("DB_USER")?,
				password: require("DB_PASSWORD")?,
				pool_size: DEFAULT_POOL_SIZE,
				idle_timeout_secs: DEFAULT_IDLE_TIMEOUT_SECS,
				acquire_timeout_secs: DEFAULT_ACQUIRE_TIMEOUT_SECS,
			},
			bus: BusConfig {
				broker: require("KAFKA_BROKER")?,
				client_id: require("CLIENT_ID")?,
				group_id: require("GROUP_ID")?,
			},
			production: lookup("NODE_ENV").as_deref() == Some("production"),
		})
	}

	/// Policy configuration derived from the region bindings.
	pub fn policy(&self) -> PolicyConfig {
		PolicyConfig {
			local: self.region.clone(),
			peer: self.peer_region.clone(),
			sales_origin: self.sales_origin.clone(),
		}
	}
}
