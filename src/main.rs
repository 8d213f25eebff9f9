//! Sync daemon entrypoint
//!
//! Startup order matters: the sink database must be reachable (fatal if not),
//! while the message bus may be down — the region then keeps serving its own
//! store and sync resumes on the next restart.

use std::sync::Arc;
use syncbridge::infra::{bus, db};
use syncbridge::sink::writer::SinkWriter;
use syncbridge::{AppConfig, ConsumerService, InboundProcessor, Service, SyncMetrics};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
	tracing_subscriber::fmt()
		.with_env_filter(
			EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("syncbridge=info")),
		)
		.init();

	let config = match AppConfig::from_env() {
		Ok(config) => config,
		Err(error) => {
			error!(%error, "Invalid configuration");
			std::process::exit(2);
		}
	};

	info!(
		region = %config.region,
		peer = %config.peer_region,
		broker = %config.bus.broker,
		"Starting sync daemon"
	);

	let pool = match db::connect(&config.database, config.production).await {
		Ok(pool) => pool,
		Err(error) => {
			error!(%error, "Sink database unreachable at startup");
			std::process::exit(1);
		}
	};
	if let Err(error) = db::health_check(&pool).await {
		error!(%error, "Sink database failed health check");
		std::process::exit(1);
	}

	let metrics = Arc::new(SyncMetrics::new());
	let processor = InboundProcessor::new(
		config.policy(),
		SinkWriter::new(pool.clone()),
		metrics.clone(),
	);

	let service = match bus::connect_with_retry(&config.bus).await {
		Ok(consumer) => {
			let service = ConsumerService::new(consumer, processor);
			if let Err(error) = service.start().await {
				error!(%error, "Failed to start consumer service");
				std::process::exit(1);
			}
			Some(service)
		}
		Err(error) => {
			error!(%error, "Message bus unreachable, continuing without sync");
			None
		}
	};

	wait_for_shutdown().await;

	if let Some(service) = service {
		if let Err(error) = service.stop().await {
			error!(%error, "Consumer service did not stop cleanly");
		}
	}
	pool.close().await;

	info!("Shutdown complete");
}

async fn wait_for_shutdown() {
	let ctrl_c = tokio::signal::ctrl_c();

	#[cfg(unix)]
	{
		use tokio::signal::unix::{signal, SignalKind};

		match signal(SignalKind::terminate()) {
			Ok(mut sigterm) => {
				tokio::select! {
					_ = ctrl_c => info!("Received interrupt"),
					_ = sigterm.recv() => info!("Received SIGTERM"),
				}
			}
			Err(error) => {
				error!(%error, "Failed to install SIGTERM handler");
				let _ = ctrl_c.await;
			}
		}
	}

	#[cfg(not(unix))]
	{
		let _ = ctrl_c.await;
	}
}
