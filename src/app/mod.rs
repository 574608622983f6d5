//! Core application modules for cwtail.
//!
//! # Module Organization
//!
//! - [`data_plane`] - Log service integrations and the tailing engine
//! - [`config`] - Session timing and sizing configuration
//! - [`sdk_errors`] - AWS SDK error categorization for diagnostics
//!
//! # Architecture
//!
//! - [`data_plane::cloudwatch_logs::service::LogService`] is the only
//!   boundary to AWS; everything above it runs against any implementation
//! - [`data_plane::cloudwatch_logs::tail::TailController`] owns one session:
//!   stream discovery, renewal, fetching and deduplication
//! - The output channel is the only handoff to whatever displays the events

pub mod config;
pub mod data_plane;
pub mod sdk_errors;

pub use data_plane::cloudwatch_logs;
