//! Tailing error taxonomy
//!
//! Seeding failures are returned from `TailController::begin`. Everything
//! that goes wrong afterwards is recovered locally and reported as a
//! [`TailError`] on the session's diagnostics channel.

#![warn(clippy::all, rust_2018_idioms)]

use thiserror::Error;
use tokio::sync::mpsc;

use crate::app::sdk_errors::{categorize_error, ErrorCategory};

/// Capacity of the steady-state diagnostics channel
pub const ERROR_CHANNEL_CAPACITY: usize = 64;

/// A raw record was missing a field the engine requires
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed log service record: missing required field `{field}`")]
pub struct MalformedRecord {
    field: &'static str,
}

impl MalformedRecord {
    pub const fn new(field: &'static str) -> Self {
        Self { field }
    }

    pub fn field(&self) -> &'static str {
        self.field
    }
}

/// The consumer dropped the receiving end of the output channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("event consumer closed the output channel")]
pub struct ConsumerClosed;

/// A recovered steady-state failure
#[derive(Debug, Clone, Error)]
pub enum TailError {
    /// Stream renewal failed; the previous stream set stays in effect
    #[error("stream renewal for {log_group} failed ({}): {message}", .category.short_label())]
    Renewal {
        log_group: String,
        category: ErrorCategory,
        message: String,
    },
    /// A fetch cycle failed; the next cycle retries the same window
    #[error("event fetch for {log_group} failed ({}): {message}", .category.short_label())]
    Fetch {
        log_group: String,
        category: ErrorCategory,
        message: String,
    },
    /// The service returned a record the engine cannot interpret
    #[error("event fetch for {log_group} returned malformed data: {source}")]
    Malformed {
        log_group: String,
        source: MalformedRecord,
    },
}

impl TailError {
    /// Classify a renewal failure
    pub fn renewal(log_group: &str, error: &anyhow::Error) -> Self {
        Self::Renewal {
            log_group: log_group.to_string(),
            category: categorize_error(error, "CloudWatchLogs", "DescribeLogStreams"),
            message: format!("{:#}", error),
        }
    }

    /// Classify a fetch failure, singling out contract violations
    pub fn fetch(log_group: &str, error: &anyhow::Error) -> Self {
        if let Some(malformed) = error.downcast_ref::<MalformedRecord>() {
            return Self::Malformed {
                log_group: log_group.to_string(),
                source: malformed.clone(),
            };
        }
        Self::Fetch {
            log_group: log_group.to_string(),
            category: categorize_error(error, "CloudWatchLogs", "FilterLogEvents"),
            message: format!("{:#}", error),
        }
    }

    pub fn log_group(&self) -> &str {
        match self {
            Self::Renewal { log_group, .. }
            | Self::Fetch { log_group, .. }
            | Self::Malformed { log_group, .. } => log_group,
        }
    }

    /// Whether retrying the same request may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Renewal { category, .. } | Self::Fetch { category, .. } => {
                category.is_retryable()
            }
            Self::Malformed { .. } => false,
        }
    }
}

/// Non-blocking sender for steady-state diagnostics
///
/// Reports are dropped when the channel is full or nobody listens, so a
/// slow or absent diagnostics reader never stalls tailing.
#[derive(Debug, Clone)]
pub struct ErrorReporter {
    sender: mpsc::Sender<TailError>,
}

impl ErrorReporter {
    pub fn channel() -> (Self, mpsc::Receiver<TailError>) {
        let (sender, receiver) = mpsc::channel(ERROR_CHANNEL_CAPACITY);
        (Self { sender }, receiver)
    }

    pub fn report(&self, error: TailError) {
        if let Err(e) = self.sender.try_send(error) {
            trace_trace!("Dropping tail diagnostic: {}", e);
        }
    }
}
