//! CloudWatch Logs Data Types
//!
//! Data structures shared by the tailing engine: delivered events, the
//! selected stream set, the query window, and the raw records returned by
//! the log service.

#![warn(clippy::all, rust_2018_idioms)]

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use super::errors::MalformedRecord;

/// Maximum number of stream names a single filter request may carry
pub const MAX_STREAMS: usize = 100;

/// A single log event delivered to the consumer
///
/// Events are immutable once built; the fetcher constructs them from raw
/// service records and hands them off through the output channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEvent {
    event_id: String,
    timestamp: i64,
    message: String,
    log_group: String,
    log_stream: String,
}

impl LogEvent {
    /// Create a new log event
    pub fn new(
        event_id: impl Into<String>,
        timestamp: i64,
        message: impl Into<String>,
        log_group: impl Into<String>,
        log_stream: impl Into<String>,
    ) -> Self {
        Self {
            event_id: event_id.into(),
            timestamp,
            message: message.into(),
            log_group: log_group.into(),
            log_stream: log_stream.into(),
        }
    }

    /// Build an event from a raw filter result
    ///
    /// Every field of the raw record is required; a missing one means the
    /// service broke its contract and the whole fetch cycle is abandoned.
    pub fn from_filtered(log_group: &str, raw: FilteredEvent) -> Result<Self, MalformedRecord> {
        let event_id = raw.event_id.ok_or(MalformedRecord::new("eventId"))?;
        let timestamp = raw.timestamp.ok_or(MalformedRecord::new("timestamp"))?;
        let log_stream = raw
            .stream_name
            .ok_or(MalformedRecord::new("logStreamName"))?;
        let message = raw.message.ok_or(MalformedRecord::new("message"))?;

        Ok(Self::new(event_id, timestamp, message, log_group, log_stream))
    }

    /// Service-unique event identifier
    pub fn event_id(&self) -> &str {
        &self.event_id
    }

    /// Event timestamp (Unix milliseconds)
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    /// Event timestamp as a UTC date-time
    pub fn time(&self) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(self.timestamp)
            .single()
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Message with trailing line terminators removed
    pub fn message(&self) -> &str {
        self.message.trim_end_matches(['\n', '\r'])
    }

    /// Message exactly as returned by the service
    pub fn raw_message(&self) -> &str {
        &self.message
    }

    /// Name of the log group the event was read from
    pub fn log_group(&self) -> &str {
        &self.log_group
    }

    /// Name of the log stream the event belongs to
    pub fn log_stream(&self) -> &str {
        &self.log_stream
    }

    /// Last six characters of the stream name, used as a compact tag
    pub fn short_stream_name(&self) -> &str {
        let count = self.log_stream.chars().count();
        if count <= 6 {
            return &self.log_stream;
        }
        let skip = count - 6;
        match self.log_stream.char_indices().nth(skip) {
            Some((idx, _)) => &self.log_stream[idx..],
            None => &self.log_stream,
        }
    }
}

/// The set of streams currently targeted for one log group
///
/// Stream sets are replaced wholesale on every renewal and never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamSet {
    log_group: String,
    stream_names: Vec<String>,
}

impl StreamSet {
    /// Create a stream set, keeping only the last [`MAX_STREAMS`] names
    pub fn new(log_group: impl Into<String>, mut stream_names: Vec<String>) -> Self {
        if stream_names.len() > MAX_STREAMS {
            trace_trace!(
                "Too many stream names {}, taking last {}",
                stream_names.len(),
                MAX_STREAMS
            );
            stream_names.drain(..stream_names.len() - MAX_STREAMS);
        }
        Self {
            log_group: log_group.into(),
            stream_names,
        }
    }

    pub fn log_group(&self) -> &str {
        &self.log_group
    }

    pub fn stream_names(&self) -> &[String] {
        &self.stream_names
    }

    pub fn len(&self) -> usize {
        self.stream_names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stream_names.is_empty()
    }
}

/// Query window; an absent end selects tailing mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    /// Start time (Unix timestamp in milliseconds)
    pub start: i64,
    /// End time (Unix timestamp in milliseconds)
    pub end: Option<i64>,
}

impl TimeWindow {
    /// Unbounded window starting at `start`
    pub fn tailing(start: i64) -> Self {
        Self { start, end: None }
    }

    /// Bounded window from `start` to `end`
    pub fn ranged(start: i64, end: i64) -> Self {
        Self {
            start,
            end: Some(end),
        }
    }

    pub fn is_tailing(&self) -> bool {
        self.end.is_none()
    }
}

/// One entry of a stream listing page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamSummary {
    pub name: String,
    /// Timestamp of the first event (Unix milliseconds), absent for empty streams
    pub first_event_time: Option<i64>,
    /// Timestamp of the last event (Unix milliseconds), absent for empty streams
    pub last_event_time: Option<i64>,
}

impl StreamSummary {
    pub fn new(name: impl Into<String>, first_event_time: i64, last_event_time: i64) -> Self {
        Self {
            name: name.into(),
            first_event_time: Some(first_event_time),
            last_event_time: Some(last_event_time),
        }
    }
}

/// A page of streams ordered by last event time, most recent first
#[derive(Debug, Clone, Default)]
pub struct StreamPage {
    pub streams: Vec<StreamSummary>,
    pub next_token: Option<String>,
}

/// A raw event as returned by a filter query
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilteredEvent {
    pub event_id: Option<String>,
    pub stream_name: Option<String>,
    pub timestamp: Option<i64>,
    pub message: Option<String>,
}

impl FilteredEvent {
    pub fn new(
        event_id: impl Into<String>,
        stream_name: impl Into<String>,
        timestamp: i64,
        message: impl Into<String>,
    ) -> Self {
        Self {
            event_id: Some(event_id.into()),
            stream_name: Some(stream_name.into()),
            timestamp: Some(timestamp),
            message: Some(message.into()),
        }
    }
}

/// A page of filtered events
#[derive(Debug, Clone, Default)]
pub struct EventPage {
    pub events: Vec<FilteredEvent>,
    /// Token for pagination (if more results available)
    pub next_token: Option<String>,
}

/// Parameters of a single filter query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterRequest {
    pub log_group: String,
    pub stream_names: Vec<String>,
    /// Start time (Unix timestamp in milliseconds)
    pub start_time: i64,
    /// End time (Unix timestamp in milliseconds)
    pub end_time: Option<i64>,
    /// Filter pattern (CloudWatch Logs filter syntax)
    pub filter_pattern: Option<String>,
    pub next_token: Option<String>,
}

impl FilterRequest {
    /// Create a request covering every stream in `streams`
    pub fn new(streams: &StreamSet, start_time: i64) -> Self {
        Self {
            log_group: streams.log_group().to_string(),
            stream_names: streams.stream_names().to_vec(),
            start_time,
            end_time: None,
            filter_pattern: None,
            next_token: None,
        }
    }

    /// Set end time
    pub fn with_end_time(mut self, end_time: Option<i64>) -> Self {
        self.end_time = end_time;
        self
    }

    /// Set filter pattern
    pub fn with_filter_pattern(mut self, pattern: Option<String>) -> Self {
        self.filter_pattern = pattern;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_log_event_trims_line_terminators() {
        let event = LogEvent::new("e1", 1000, "hello\r\n\n", "group", "stream");

        assert_eq!(event.message(), "hello");
        assert_eq!(event.raw_message(), "hello\r\n\n");
    }

    #[test]
    fn test_short_stream_name() {
        let long = LogEvent::new("e1", 0, "m", "g", "ecs/web/0123456789abcdef");
        let short = LogEvent::new("e2", 0, "m", "g", "abc");

        assert_eq!(long.short_stream_name(), "abcdef");
        assert_eq!(short.short_stream_name(), "abc");
    }

    #[test]
    fn test_log_event_time_conversion() {
        let event = LogEvent::new("e1", 1_700_000_000_123, "m", "g", "s");

        assert_eq!(event.time().timestamp_millis(), 1_700_000_000_123);
    }

    #[test]
    fn test_from_filtered_requires_every_field() {
        let mut raw = FilteredEvent::new("e1", "stream-1", 42, "msg");
        let event = LogEvent::from_filtered("group", raw.clone()).unwrap();
        assert_eq!(event.log_group(), "group");
        assert_eq!(event.log_stream(), "stream-1");

        raw.timestamp = None;
        let err = LogEvent::from_filtered("group", raw).unwrap_err();
        assert_eq!(err.field(), "timestamp");
    }

    #[test]
    fn test_stream_set_keeps_last_hundred_names() {
        let names: Vec<String> = (0..150).map(|i| format!("stream-{i}")).collect();
        let set = StreamSet::new("group", names);

        assert_eq!(set.len(), MAX_STREAMS);
        assert_eq!(set.stream_names()[0], "stream-50");
        assert_eq!(set.stream_names()[99], "stream-149");
    }

    #[test]
    fn test_time_window_modes() {
        assert!(TimeWindow::tailing(10).is_tailing());
        assert!(!TimeWindow::ranged(10, 20).is_tailing());
    }

    #[test]
    fn test_log_event_serialization() {
        let event = LogEvent::new("e1", 1000, "msg1", "group", "stream1");

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("msg1"));

        let deserialized: LogEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, event);
    }
}
