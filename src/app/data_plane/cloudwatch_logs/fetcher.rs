//! Event fetching
//!
//! One call to [`EventFetcher::fetch_once`] is one fetch cycle: a single
//! filter page against the current stream set, deduplicated and pushed to
//! the output channel in page order. Further pages are left for later
//! cycles; the high-water mark moves the next query window forward.

#![warn(clippy::all, rust_2018_idioms)]

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::mpsc;

use super::dedup::Deduplicator;
use super::errors::ConsumerClosed;
use super::registry::StreamRegistry;
use super::service::LogService;
use super::types::{FilterRequest, LogEvent, TimeWindow};

/// Runs fetch cycles for one session
pub struct EventFetcher {
    service: Arc<dyn LogService>,
    registry: Arc<StreamRegistry>,
    dedup: Arc<Deduplicator>,
    output: mpsc::Sender<LogEvent>,
    filter_pattern: Option<String>,
}

impl EventFetcher {
    pub fn new(
        service: Arc<dyn LogService>,
        registry: Arc<StreamRegistry>,
        dedup: Arc<Deduplicator>,
        output: mpsc::Sender<LogEvent>,
    ) -> Self {
        Self {
            service,
            registry,
            dedup,
            output,
            filter_pattern: None,
        }
    }

    /// Restrict fetched events with a CloudWatch Logs filter pattern
    pub fn with_filter_pattern(mut self, pattern: Option<String>) -> Self {
        self.filter_pattern = pattern.filter(|p| !p.trim().is_empty());
        self
    }

    /// Start of the next query: the high-water mark, never before the window
    pub fn effective_start(&self, window: &TimeWindow) -> i64 {
        self.dedup.last_timestamp().max(window.start)
    }

    /// Run one fetch cycle; returns the number of events delivered
    ///
    /// Errors leave the deduplicator untouched, so the next cycle queries
    /// the same window again.
    pub async fn fetch_once(&self, window: &TimeWindow) -> Result<usize> {
        let Some(streams) = self.registry.current() else {
            trace_trace!("No streams found");
            return Ok(0);
        };
        if streams.is_empty() {
            trace_trace!("No active streams in {}", streams.log_group());
            return Ok(0);
        }

        let request = FilterRequest::new(&streams, self.effective_start(window))
            .with_end_time(window.end)
            .with_filter_pattern(self.filter_pattern.clone());
        trace_trace!(
            "Get events from group {}, # of streams: {}, start: {}",
            request.log_group,
            request.stream_names.len(),
            request.start_time
        );

        let page = self
            .service
            .filter_events_page(&request)
            .await
            .with_context(|| {
                format!(
                    "Failed to query log events from log group: {}",
                    request.log_group
                )
            })?;
        trace_trace!(
            "Got {} events from {} (more pages: {})",
            page.events.len(),
            request.log_group,
            page.next_token.is_some()
        );

        let events = page
            .events
            .into_iter()
            .map(|raw| LogEvent::from_filtered(&request.log_group, raw))
            .collect::<Result<Vec<_>, _>>()
            .with_context(|| {
                format!(
                    "Failed to read filter results from log group: {}",
                    request.log_group
                )
            })?;

        let mut delivered = 0;
        for event in events {
            if !self.dedup.observe(event.event_id(), event.timestamp()) {
                continue;
            }
            self.output
                .send(event)
                .await
                .map_err(|_| ConsumerClosed)?;
            delivered += 1;
        }

        trace_trace!("Stream read done, delivered {}", delivered);
        Ok(delivered)
    }
}

#[cfg(test)]
mod tests {
    use super::super::errors::MalformedRecord;
    use super::super::fake::FakeLogService;
    use super::super::types::{EventPage, FilteredEvent, StreamSet};
    use super::*;
    use pretty_assertions::assert_eq;

    struct Harness {
        service: Arc<FakeLogService>,
        dedup: Arc<Deduplicator>,
        fetcher: EventFetcher,
        events: mpsc::Receiver<LogEvent>,
    }

    fn harness(streams: Option<StreamSet>) -> Harness {
        let service = Arc::new(FakeLogService::new());
        let registry = Arc::new(StreamRegistry::new());
        if let Some(streams) = streams {
            registry.replace(streams);
        }
        let dedup = Arc::new(Deduplicator::default());
        let (tx, rx) = mpsc::channel(100);
        let fetcher = EventFetcher::new(service.clone(), registry, dedup.clone(), tx);
        Harness {
            service,
            dedup,
            fetcher,
            events: rx,
        }
    }

    fn streams() -> Option<StreamSet> {
        Some(StreamSet::new(
            "/aws/lambda/app",
            vec!["s1".to_string(), "s2".to_string()],
        ))
    }

    fn drain(rx: &mut mpsc::Receiver<LogEvent>) -> Vec<String> {
        let mut ids = Vec::new();
        while let Ok(event) = rx.try_recv() {
            ids.push(event.event_id().to_string());
        }
        ids
    }

    #[tokio::test]
    async fn test_duplicates_within_page_are_dropped_in_order() {
        let mut h = harness(streams());
        h.service.push_events(vec![
            FilteredEvent::new("e1", "s1", 1000, "first"),
            FilteredEvent::new("e2", "s2", 1001, "second"),
            FilteredEvent::new("e1", "s1", 1000, "first"),
        ]);

        let delivered = h.fetcher.fetch_once(&TimeWindow::tailing(0)).await.unwrap();

        assert_eq!(delivered, 2);
        assert_eq!(drain(&mut h.events), vec!["e1", "e2"]);
    }

    #[tokio::test]
    async fn test_overlapping_cycles_deliver_once() {
        let mut h = harness(streams());
        h.service.push_events(vec![
            FilteredEvent::new("e1", "s1", 1000, "a"),
            FilteredEvent::new("e2", "s1", 2000, "b"),
        ]);
        h.service.push_events(vec![
            FilteredEvent::new("e2", "s1", 2000, "b"),
            FilteredEvent::new("e3", "s2", 2000, "c"),
        ]);

        let window = TimeWindow::tailing(500);
        h.fetcher.fetch_once(&window).await.unwrap();
        h.fetcher.fetch_once(&window).await.unwrap();

        assert_eq!(drain(&mut h.events), vec!["e1", "e2", "e3"]);
        let requests = h.service.filter_requests();
        assert_eq!(requests[0].start_time, 500);
        assert_eq!(requests[1].start_time, 2000);
    }

    #[tokio::test]
    async fn test_request_targets_current_streams_and_window() {
        let h = harness(streams());

        h.fetcher
            .fetch_once(&TimeWindow::ranged(5000, 9000))
            .await
            .unwrap();

        let requests = h.service.filter_requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].log_group, "/aws/lambda/app");
        assert_eq!(requests[0].stream_names, vec!["s1", "s2"]);
        assert_eq!(requests[0].start_time, 5000);
        assert_eq!(requests[0].end_time, Some(9000));
        assert_eq!(requests[0].next_token, None);
    }

    #[tokio::test]
    async fn test_only_first_page_is_consumed() {
        let mut h = harness(streams());
        h.service.push_event_page(EventPage {
            events: vec![FilteredEvent::new("e1", "s1", 1000, "a")],
            next_token: Some("more".to_string()),
        });

        h.fetcher.fetch_once(&TimeWindow::tailing(0)).await.unwrap();

        assert_eq!(h.service.filter_requests().len(), 1);
        assert_eq!(drain(&mut h.events), vec!["e1"]);
    }

    #[tokio::test]
    async fn test_no_streams_skips_the_query() {
        let h = harness(None);
        assert_eq!(h.fetcher.fetch_once(&TimeWindow::tailing(0)).await.unwrap(), 0);

        let empty = harness(Some(StreamSet::new("group", Vec::new())));
        assert_eq!(
            empty.fetcher.fetch_once(&TimeWindow::tailing(0)).await.unwrap(),
            0
        );
        assert!(empty.service.filter_requests().is_empty());
    }

    #[tokio::test]
    async fn test_fetch_error_does_not_advance_start() {
        let mut h = harness(streams());
        h.service.push_events(vec![FilteredEvent::new("e1", "s1", 4000, "a")]);
        h.service.push_event_error("ServiceUnavailableException: try again");

        let window = TimeWindow::tailing(1000);
        h.fetcher.fetch_once(&window).await.unwrap();
        assert!(h.fetcher.fetch_once(&window).await.is_err());
        h.fetcher.fetch_once(&window).await.unwrap();

        let starts: Vec<i64> = h
            .service
            .filter_requests()
            .iter()
            .map(|r| r.start_time)
            .collect();
        assert_eq!(starts, vec![1000, 4000, 4000]);
        assert_eq!(drain(&mut h.events), vec!["e1"]);
    }

    #[tokio::test]
    async fn test_malformed_record_fails_whole_cycle() {
        let mut h = harness(streams());
        h.service.push_events(vec![
            FilteredEvent::new("e1", "s1", 1000, "ok"),
            FilteredEvent {
                event_id: Some("e2".to_string()),
                stream_name: Some("s1".to_string()),
                timestamp: None,
                message: Some("broken".to_string()),
            },
        ]);

        let err = h
            .fetcher
            .fetch_once(&TimeWindow::tailing(0))
            .await
            .unwrap_err();

        assert_eq!(
            err.downcast_ref::<MalformedRecord>().map(|m| m.field()),
            Some("timestamp")
        );
        assert!(drain(&mut h.events).is_empty());
        assert_eq!(h.dedup.last_timestamp(), 0);
    }

    #[tokio::test]
    async fn test_closed_consumer_is_reported() {
        let h = harness(streams());
        h.service.push_events(vec![FilteredEvent::new("e1", "s1", 1000, "a")]);
        drop(h.events);

        let err = h
            .fetcher
            .fetch_once(&TimeWindow::tailing(0))
            .await
            .unwrap_err();

        assert!(err.downcast_ref::<ConsumerClosed>().is_some());
    }

    #[tokio::test]
    async fn test_blank_filter_pattern_is_ignored() {
        let h = harness(streams());
        let fetcher = EventFetcher::new(
            h.service.clone(),
            Arc::new(StreamRegistry::new()),
            h.dedup.clone(),
            mpsc::channel(1).0,
        )
        .with_filter_pattern(Some("  ".to_string()));

        assert_eq!(fetcher.filter_pattern, None);
    }
}
