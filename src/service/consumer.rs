//! Consumer service driving the inbound change pipeline
//!
//! One cooperative worker per partition assignment: messages are pulled and
//! handled strictly in order, and the offset is committed only after the
//! message has been fully handled (applied or deliberately skipped).

use crate::service::Service;
use crate::sync::processor::InboundProcessor;
use anyhow::Result;
use async_trait::async_trait;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::Message;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

/// Bound on handling a single message. A poison message must not wedge the
/// partition, and shutdown waits at most this long for in-flight work.
const HANDLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Inbound change consumer service.
pub struct ConsumerService {
	consumer: Arc<StreamConsumer>,
	processor: Arc<InboundProcessor>,
	is_running: Arc<AtomicBool>,
	shutdown_tx: Mutex<Option<broadcast::Sender<()>>>,
}

impl ConsumerService {
	pub fn new(consumer: StreamConsumer, processor: InboundProcessor) -> Self {
		Self {
			consumer: Arc::new(consumer),
			processor: Arc::new(processor),
			is_running: Arc::new(AtomicBool::new(false)),
			shutdown_tx: Mutex::new(None),
		}
	}

	pub fn processor(&self) -> &Arc<InboundProcessor> {
		&self.processor
	}

	async fn run_loop(
		consumer: Arc<StreamConsumer>,
		processor: Arc<InboundProcessor>,
		is_running: Arc<AtomicBool>,
		mut shutdown_rx: broadcast::Receiver<()>,
	) {
		info!("Starting inbound change consumer loop");

		loop {
			tokio::select! {
				biased;

				_ = shutdown_rx.recv() => {
					info!("Consumer loop shutdown signal received");
					break;
				}

				received = consumer.recv() => match received {
					Ok(message) => {
						let handled = tokio::time::timeout(
							HANDLE_TIMEOUT,
							processor.handle(message.topic(), message.key(), message.payload()),
						)
						.await;

						match handled {
							Ok(outcome) => debug!(
								topic = message.topic(),
								partition = message.partition(),
								offset = message.offset(),
								?outcome,
								"Handled change event"
							),
							Err(_) => warn!(
								topic = message.topic(),
								offset = message.offset(),
								"Change handler timed out, advancing past message"
							),
						}

						// Handled either way: the offset advances so a poison
						// message is never redelivered forever.
						if let Err(error) = consumer.commit_message(&message, CommitMode::Async) {
							warn!(%error, "Failed to commit offset");
						}
					}
					Err(error) => {
						warn!(%error, "Bus receive error");
						tokio::time::sleep(Duration::from_millis(500)).await;
					}
				}
			}
		}

		is_running.store(false, Ordering::SeqCst);
		info!("Consumer loop stopped");
	}
}

#[async_trait]
impl Service for ConsumerService {
	fn name(&self) -> &'static str {
		"sync_consumer"
	}

	fn is_running(&self) -> bool {
		self.is_running.load(Ordering::SeqCst)
	}

	async fn start(&self) -> Result<()> {
		if self.is_running.load(Ordering::SeqCst) {
			warn!("Consumer service already running");
			return Ok(());
		}

		let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
		*self.shutdown_tx.lock().await = Some(shutdown_tx);
		self.is_running.store(true, Ordering::SeqCst);

		let consumer = self.consumer.clone();
		let processor = self.processor.clone();
		let is_running = self.is_running.clone();
		tokio::spawn(async move {
			Self::run_loop(consumer, processor, is_running, shutdown_rx).await;
		});

		info!("Consumer service started");
		Ok(())
	}

	async fn stop(&self) -> Result<()> {
		if !self.is_running.load(Ordering::SeqCst) {
			return Ok(());
		}

		info!("Stopping consumer service");

		if let Some(shutdown_tx) = self.shutdown_tx.lock().await.as_ref() {
			let _ = shutdown_tx.send(());
		}

		// Let the in-flight message finish before the caller closes the sink
		// pool, bounded by the same per-message timeout.
		let deadline = tokio::time::Instant::now() + HANDLE_TIMEOUT;
		while self.is_running.load(Ordering::SeqCst) && tokio::time::Instant::now() < deadline {
			tokio::time::sleep(Duration::from_millis(50)).await;
		}

		info!("Consumer service stopped");
		Ok(())
	}
}
