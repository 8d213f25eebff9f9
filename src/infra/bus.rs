//! Message bus consumer client
//!
//! Wraps the Kafka stream consumer: configuration, a startup reachability
//! probe with exponential backoff, and subscription to the sync topics.
//! Offsets are committed manually by the consumer loop after each message is
//! fully handled.

use crate::config::BusConfig;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

/// Topics subscribed at startup, live tail only.
pub const SYNC_TOPICS: &[&str] = &["sync.users", "sync.products", "sync.sales"];

const RETRY_INITIAL: Duration = Duration::from_millis(300);
const RETRY_CAP: Duration = Duration::from_secs(30);
const RETRY_MAX_ATTEMPTS: u32 = 15;
const METADATA_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum BusError {
	#[error(transparent)]
	Kafka(#[from] rdkafka::error::KafkaError),

	#[error("message bus unreachable after {attempts} attempts")]
	RetriesExhausted { attempts: u32 },
}

/// Create the consumer and wait for the broker to become reachable.
///
/// Backoff: 300 ms doubling up to 30 s, 15 attempts. Exhaustion is surfaced
/// to the caller, which decides whether to run without sync.
pub async fn connect_with_retry(config: &BusConfig) -> Result<StreamConsumer, BusError> {
	let consumer: StreamConsumer = ClientConfig::new()
		.set("bootstrap.servers", config.broker.as_str())
		.set("group.id", config.group_id.as_str())
		.set("client.id", config.client_id.as_str())
		// Offsets are committed manually after each handled message.
		.set("enable.auto.commit", "false")
		// Live tail only: no replay of topic history on first subscribe.
		.set("auto.offset.reset", "latest")
		.create()?;

	let mut delay = RETRY_INITIAL;
	for attempt in 1..=RETRY_MAX_ATTEMPTS {
		match consumer.fetch_metadata(None, METADATA_TIMEOUT) {
			Ok(_) => {
				consumer.subscribe(SYNC_TOPICS)?;
				info!(
					broker = %config.broker,
					group = %config.group_id,
					topics = ?SYNC_TOPICS,
					"Connected to message bus"
				);
				return Ok(consumer);
			}
			Err(error) => {
				warn!(
					attempt,
					max_attempts = RETRY_MAX_ATTEMPTS,
					delay_ms = delay.as_millis() as u64,
					%error,
					"Message bus unreachable, retrying"
				);
				tokio::time::sleep(delay).await;
				delay = (delay * 2).min(RETRY_CAP);
			}
		}
	}

	Err(BusError::RetriesExhausted {
		attempts: RETRY_MAX_ATTEMPTS,
	})
}
