//! Log service boundary
//!
//! The tailing engine talks to the remote log service only through
//! [`LogService`]. [`super::client::CloudWatchLogsClient`] implements it
//! against AWS; [`super::fake::FakeLogService`] serves scripted pages for
//! tests.

#![warn(clippy::all, rust_2018_idioms)]

use anyhow::Result;
use async_trait::async_trait;

use super::types::{EventPage, FilterRequest, StreamPage};

/// Paginated access to log streams and filtered events
///
/// Both calls may be rate limited and may fail transiently; callers decide
/// whether a failure is fatal.
#[async_trait]
pub trait LogService: Send + Sync {
    /// One page of the streams of `log_group`, most recently active first
    async fn list_streams_page(
        &self,
        log_group: &str,
        next_token: Option<String>,
    ) -> Result<StreamPage>;

    /// One page of events matching `request`
    async fn filter_events_page(&self, request: &FilterRequest) -> Result<EventPage>;
}
