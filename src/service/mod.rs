//! Long-running services

pub mod consumer;

use anyhow::Result;
use async_trait::async_trait;

/// Start/stop lifecycle for background services.
#[async_trait]
pub trait Service {
	fn name(&self) -> &'static str;

	fn is_running(&self) -> bool;

	async fn start(&self) -> Result<()>;

	async fn stop(&self) -> Result<()>;
}
