//! Process-local sync metrics store
//!
//! Mutated by the consumer, read by the stats API. Bounded everywhere: each
//! direction keeps a fixed-size ring of recent sync events and the per-record
//! index evicts oldest-inserted entries once full, so memory stays flat no
//! matter how long the consumer runs.

pub mod types;

pub use types::{
	CounterSnapshot, DirectionStats, InboundSyncStats, OperationCounters, SyncEvent,
};

use crate::sync::region::{Direction, Region, Table};
use chrono::{Duration, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::Ordering;
use tokio::sync::RwLock;

/// Per-direction ring capacity.
const RING_CAPACITY: usize = 100;

/// Per-record index capacity (FIFO eviction on insert overflow).
const RECORD_CAPACITY: usize = 1000;

/// How many events `stats` reports as recent.
const RECENT_LIMIT: usize = 10;

#[derive(Default)]
struct RecordIndex {
	by_record: HashMap<(Table, String), SyncEvent>,
	insertion_order: VecDeque<(Table, String)>,
}

/// Thread-safe, in-process metrics store for sync observability.
pub struct SyncMetrics {
	ring_capacity: usize,
	record_capacity: usize,
	rings: RwLock<HashMap<Direction, VecDeque<SyncEvent>>>,
	records: RwLock<RecordIndex>,
	pub counters: OperationCounters,
}

impl SyncMetrics {
	pub fn new() -> Self {
		Self::with_capacities(RING_CAPACITY, RECORD_CAPACITY)
	}

	pub fn with_capacities(ring_capacity: usize, record_capacity: usize) -> Self {
		Self {
			ring_capacity,
			record_capacity,
			rings: RwLock::new(HashMap::new()),
			records: RwLock::new(RecordIndex::default()),
			counters: OperationCounters::default(),
		}
	}

	/// Record one completed sync.
	pub async fn record(
		&self,
		source: Region,
		destination: Region,
		table: Table,
		record_id: impl Into<String>,
		latency_ms: i64,
	) {
		let event = SyncEvent {
			source: source.clone(),
			destination: destination.clone(),
			table,
			record_id: record_id.into(),
			latency_ms,
			timestamp: Utc::now(),
		};

		{
			let mut rings = self.rings.write().await;
			let ring = rings
				.entry(Direction::new(source, destination))
				.or_insert_with(|| VecDeque::with_capacity(self.ring_capacity));
			while ring.len() >= self.ring_capacity {
				ring.pop_front();
			}
			ring.push_back(event.clone());
		}

		{
			let mut records = self.records.write().await;
			let key = (table, event.record_id.clone());
			if !records.by_record.contains_key(&key) {
				while records.insertion_order.len() >= self.record_capacity {
					if let Some(evicted) = records.insertion_order.pop_front() {
						records.by_record.remove(&evicted);
					}
				}
				records.insertion_order.push_back(key.clone());
			}
			records.by_record.insert(key, event);
		}
	}

	/// Aggregate stats for one direction, computed from the ring contents.
	pub async fn stats(&self, direction: &Direction) -> DirectionStats {
		let rings = self.rings.read().await;
		let Some(ring) = rings.get(direction) else {
			return DirectionStats::default();
		};

		let total = ring.len();
		let sum: i64 = ring.iter().map(|e| e.latency_ms).sum();
		let minute_ago = Utc::now() - Duration::seconds(60);
		let last_minute: Vec<&SyncEvent> = ring
			.iter()
			.filter(|e| e.timestamp > minute_ago)
			.collect();
		let minute_sum: i64 = last_minute.iter().map(|e| e.latency_ms).sum();

		DirectionStats {
			total_syncs: total,
			avg_latency_ms: if total > 0 {
				sum as f64 / total as f64
			} else {
				0.0
			},
			min_latency_ms: ring.iter().map(|e| e.latency_ms).min(),
			max_latency_ms: ring.iter().map(|e| e.latency_ms).max(),
			last_sync_time: ring.back().map(|e| e.timestamp),
			last_sync_latency_ms: ring.back().map(|e| e.latency_ms),
			syncs_last_minute: last_minute.len(),
			avg_last_minute_ms: if last_minute.is_empty() {
				0.0
			} else {
				minute_sum as f64 / last_minute.len() as f64
			},
			recent_syncs: ring.iter().rev().take(RECENT_LIMIT).cloned().collect(),
		}
	}

	/// The most recent sync event for one row, if any.
	pub async fn last_sync_for(&self, table: Table, record_id: &str) -> Option<SyncEvent> {
		let records = self.records.read().await;
		records
			.by_record
			.get(&(table, record_id.to_string()))
			.cloned()
	}

	/// Stats for the inbound direction in the shape the read API serves.
	pub async fn inbound_stats(&self, local: &Region, peer: &Region) -> InboundSyncStats {
		let direction = Direction::new(peer.clone(), local.clone());
		InboundSyncStats {
			direction: direction.to_string(),
			receives_from: peer.clone(),
			stats: self.stats(&direction).await,
		}
	}

	pub fn record_received(&self) {
		self.counters.changes_received.fetch_add(1, Ordering::Relaxed);
	}

	pub fn record_applied(&self) {
		self.counters.changes_applied.fetch_add(1, Ordering::Relaxed);
	}

	pub fn record_skipped(&self) {
		self.counters.changes_skipped.fetch_add(1, Ordering::Relaxed);
	}

	pub fn record_rejected(&self) {
		self.counters.changes_rejected.fetch_add(1, Ordering::Relaxed);
	}

	pub fn record_sink_error(&self) {
		self.counters.sink_errors.fetch_add(1, Ordering::Relaxed);
	}
}

impl Default for SyncMetrics {
	fn default() -> Self {
		Self::new()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn india() -> Region {
		Region::new("india")
	}

	fn china() -> Region {
		Region::new("china")
	}

	#[tokio::test]
	async fn ring_is_bounded() {
		let metrics = SyncMetrics::with_capacities(100, 1000);
		for i in 0..150 {
			metrics
				.record(india(), china(), Table::Products, i.to_string(), i)
				.await;
		}

		let stats = metrics
			.stats(&Direction::new(india(), china()))
			.await;
		assert_eq!(stats.total_syncs, 100);
		// Oldest 50 were evicted.
		assert_eq!(stats.min_latency_ms, Some(50));
		assert_eq!(stats.max_latency_ms, Some(149));
	}

	#[tokio::test]
	async fn record_index_evicts_fifo() {
		let metrics = SyncMetrics::with_capacities(10, 2);
		metrics.record(india(), china(), Table::Products, "1", 5).await;
		metrics.record(india(), china(), Table::Products, "2", 5).await;
		metrics.record(india(), china(), Table::Products, "3", 5).await;

		assert!(metrics.last_sync_for(Table::Products, "1").await.is_none());
		assert!(metrics.last_sync_for(Table::Products, "2").await.is_some());
		assert!(metrics.last_sync_for(Table::Products, "3").await.is_some());
	}

	#[tokio::test]
	async fn re_syncing_a_record_does_not_evict() {
		let metrics = SyncMetrics::with_capacities(10, 2);
		metrics.record(india(), china(), Table::Products, "1", 5).await;
		metrics.record(india(), china(), Table::Products, "1", 7).await;
		metrics.record(india(), china(), Table::Products, "2", 5).await;

		let event = metrics.last_sync_for(Table::Products, "1").await.unwrap();
		assert_eq!(event.latency_ms, 7);
		assert!(metrics.last_sync_for(Table::Products, "2").await.is_some());
	}

	#[tokio::test]
	async fn stats_aggregates_and_recency() {
		let metrics = SyncMetrics::new();
		for latency in [10, 20, 30] {
			metrics
				.record(india(), china(), Table::Sales, "9", latency)
				.await;
		}

		let stats = metrics.stats(&Direction::new(india(), china())).await;
		assert_eq!(stats.total_syncs, 3);
		assert_eq!(stats.avg_latency_ms, 20.0);
		assert_eq!(stats.min_latency_ms, Some(10));
		assert_eq!(stats.max_latency_ms, Some(30));
		assert_eq!(stats.last_sync_latency_ms, Some(30));
		assert_eq!(stats.syncs_last_minute, 3);
		// Newest first.
		assert_eq!(stats.recent_syncs[0].latency_ms, 30);
	}

	#[tokio::test]
	async fn recent_syncs_capped_at_ten() {
		let metrics = SyncMetrics::new();
		for i in 0..25 {
			metrics
				.record(india(), china(), Table::Products, i.to_string(), i)
				.await;
		}

		let stats = metrics.stats(&Direction::new(india(), china())).await;
		assert_eq!(stats.recent_syncs.len(), 10);
		assert_eq!(stats.recent_syncs[0].latency_ms, 24);
	}

	#[tokio::test]
	async fn unknown_direction_is_empty() {
		let metrics = SyncMetrics::new();
		let stats = metrics.stats(&Direction::new(china(), india())).await;
		assert_eq!(stats.total_syncs, 0);
		assert!(stats.last_sync_time.is_none());
	}
}
