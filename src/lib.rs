//! cwtail - CloudWatch Logs tailing engine
//!
//! cwtail follows one CloudWatch Logs log group, either continuously or for
//! a fixed time range, and hands every event to a consumer exactly once per
//! session, despite overlapping queries and the service's eventual
//! consistency.
//!
//! # Core Features
//!
//! - **Stream Discovery**: Picks the most recently active streams of a log group
//! - **Stream Renewal**: Refreshes the stream set while tailing without disturbing fetches
//! - **Deduplication**: Time-limited set of seen event ids gatekeeping delivery
//! - **Tailing and Ranged Modes**: Unbounded polling or a single bounded query
//! - **Backpressure**: Bounded output channel stalls fetching, never discovery
//!
//! # Architecture Overview
//!
//! - **Service Boundary** ([`app::cloudwatch_logs::LogService`]): paginated stream
//!   listing and event filtering, implemented for AWS by
//!   [`app::cloudwatch_logs::CloudWatchLogsClient`]
//! - **Engine** ([`app::cloudwatch_logs::TailController`]): seeding, renewal and
//!   fetch loops for one session, cancellable through a token
//! - **Configuration** ([`app::config::TailConfig`]): intervals and limits, from TOML
//!
//! # Getting Started
//!
//! Create a [`app::cloudwatch_logs::TailController`], call `begin` with the
//! sending half of a channel, and read [`app::cloudwatch_logs::LogEvent`]s from
//! the receiving half. A ranged session closes the channel when done; a
//! tailing session runs until [`app::cloudwatch_logs::TailSession::stop`].

#![warn(clippy::all, rust_2018_idioms)]

// Include logging macros first
#[macro_use]
pub mod logging_macros;

pub mod app;
pub use app::cloudwatch_logs::{LogEvent, TailController, TailSession};
