//! Log stream discovery
//!
//! Selects the streams of a log group worth querying for a time window.
//! Streams arrive most-recently-active first, which lets discovery stop at
//! the first stream that falls outside the window instead of listing the
//! whole group.

#![warn(clippy::all, rust_2018_idioms)]

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use super::service::LogService;
use super::types::{StreamSet, StreamSummary, TimeWindow, MAX_STREAMS};

/// Streams without events for this long before the window start are cold
pub const COLD_STREAM_THRESHOLD_MS: i64 = 3_600_000;

/// Pause between listing pages, keeping discovery under the API rate limit
pub const DEFAULT_PAGE_DELAY: Duration = Duration::from_millis(100);

/// Finds candidate streams of a log group
#[derive(Clone)]
pub struct StreamDiscovery {
    service: Arc<dyn LogService>,
    page_delay: Duration,
}

impl StreamDiscovery {
    pub fn new(service: Arc<dyn LogService>, page_delay: Duration) -> Self {
        Self {
            service,
            page_delay,
        }
    }

    /// Discover the streams of `log_group` that can hold events in `window`
    ///
    /// Returns at most [`MAX_STREAMS`] names. A listing error aborts the
    /// whole call; no partial set is ever returned.
    pub async fn discover(&self, log_group: &str, window: &TimeWindow) -> Result<StreamSet> {
        let mut names: Vec<String> = Vec::new();
        let mut next_token: Option<String> = None;

        'pages: loop {
            trace_trace!("Next page within log group {}", log_group);
            let page = self
                .service
                .list_streams_page(log_group, next_token.take())
                .await
                .with_context(|| format!("Failed to list log streams for log group: {}", log_group))?;

            for stream in &page.streams {
                if !is_candidate(stream, window) {
                    trace_trace!(
                        "Stream {} is outside the window, ending discovery for {}",
                        stream.name,
                        log_group
                    );
                    break 'pages;
                }
                if names.len() >= MAX_STREAMS {
                    trace_trace!("Too many streams for {}, ignoring the rest", log_group);
                    break 'pages;
                }
                names.push(stream.name.clone());
            }

            trace_trace!("Total streams for {}: {}", log_group, names.len());
            match page.next_token {
                Some(token) if !token.is_empty() => {
                    next_token = Some(token);
                    tokio::time::sleep(self.page_delay).await;
                }
                _ => break,
            }
        }

        trace_debug!("Group: {}, Streams: {}", log_group, names.len());
        Ok(StreamSet::new(log_group, names))
    }
}

/// Whether `stream` may contain events for `window`
///
/// Streams that never received an event have no timestamps and sort last;
/// they are treated as having timestamp 0.
fn is_candidate(stream: &StreamSummary, window: &TimeWindow) -> bool {
    let last = stream.last_event_time.unwrap_or(0);
    match window.end {
        Some(end) => {
            let first = stream.first_event_time.unwrap_or(0);
            last >= window.start && first <= end
        }
        None => window.start - last <= COLD_STREAM_THRESHOLD_MS,
    }
}
