//! Postgres sink connection pool

use crate::config::DatabaseConfig;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgSslMode};
use sqlx::PgPool;
use std::time::Duration;
use tracing::info;

/// Build the sink connection pool.
///
/// The pool is shared with the outward API: size and timeouts are chosen to
/// fail fast rather than queue behind a stuck database.
pub async fn connect(config: &DatabaseConfig, production: bool) -> Result<PgPool, sqlx::Error> {
	let mut options = PgConnectOptions::new()
		.host(&config.host)
		.port(config.port)
		.database(&config.name)
		.username(&config.user)
		.password(&config.password);

	if production {
		// Managed Postgres requires TLS but presents a certificate chain we
		// do not pin, so the connection is encrypted without verification.
		options = options.ssl_mode(PgSslMode::Require);
	}

	let pool = PgPoolOptions::new()
		.max_connections(config.pool_size)
		.idle_timeout(Duration::from_secs(config.idle_timeout_secs))
		.acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
		.connect_with(options)
		.await?;

	info!(
		host = %config.host,
		database = %config.name,
		pool_size = config.pool_size,
		tls = production,
		"Connected to sink database"
	);

	Ok(pool)
}

/// Startup probe: the sink must be reachable before consuming anything.
pub async fn health_check(pool: &PgPool) -> Result<(), sqlx::Error> {
	sqlx::query("SELECT 1").execute(pool).await?;
	Ok(())
}
