//! Cross-region database synchronization core.
//!
//! Consumes row-level change events produced by the peer region's CDC
//! pipeline, applies per-table directional and privacy policy, resolves
//! conflicts against local state with last-write-wins semantics, and
//! materializes accepted changes into the local Postgres store.

pub mod config;
pub mod infra;
pub mod service;
pub mod sink;
pub mod sync;

pub use config::AppConfig;
pub use service::consumer::ConsumerService;
pub use service::Service;
pub use sync::metrics::SyncMetrics;
pub use sync::processor::InboundProcessor;
