//! CloudWatch Logs Tailing Module
//!
//! Streams log events of one log group to a consumer, either continuously
//! (tailing) or for a fixed time range, delivering every event at most once
//! per session.
//!
//! ## Features
//!
//! - Stream discovery ordered by recency, with early termination
//! - Periodic stream-set renewal while tailing
//! - Single-page fetch cycles advanced by a deduplication high-water mark
//! - Bounded output channel providing backpressure
//! - Steady-state error reporting on a side channel
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use cwtail::app::cloudwatch_logs::{CloudWatchLogsClient, TailController};
//! use cwtail::app::config::TailConfig;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let client = Arc::new(CloudWatchLogsClient::from_env(None, Some("us-east-1")).await);
//! let config = TailConfig::default();
//! let (tx, mut rx) = tokio::sync::mpsc::channel(config.channel_capacity());
//!
//! let session = TailController::new(client, config)
//!     .begin(tx, &["/aws/lambda/my-function".to_string()], None, None)
//!     .await?;
//!
//! while let Some(event) = rx.recv().await {
//!     println!("{}: {}", event.timestamp(), event.message());
//! }
//! session.join().await;
//! # Ok(())
//! # }
//! ```

#![warn(clippy::all, rust_2018_idioms)]

pub mod client;
pub mod dedup;
pub mod discovery;
pub mod errors;
#[cfg(any(test, feature = "test-support"))]
pub mod fake;
pub mod fetcher;
pub mod registry;
pub mod service;
pub mod tail;
pub mod types;

// Re-export commonly used types
pub use client::CloudWatchLogsClient;
pub use dedup::Deduplicator;
pub use discovery::StreamDiscovery;
pub use errors::{ConsumerClosed, MalformedRecord, TailError};
#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeLogService;
pub use fetcher::EventFetcher;
pub use registry::StreamRegistry;
pub use service::LogService;
pub use tail::{begin, TailController, TailSession, TailState};
pub use types::{
    EventPage, FilterRequest, FilteredEvent, LogEvent, StreamPage, StreamSet, StreamSummary,
    TimeWindow, MAX_STREAMS,
};
