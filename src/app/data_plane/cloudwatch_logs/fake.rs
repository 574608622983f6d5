//! In-memory log service
//!
//! Serves pre-scripted stream pages and event pages and records every
//! request it receives, so discovery and fetch behaviour can be exercised
//! without AWS.

#![warn(clippy::all, rust_2018_idioms)]

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use super::service::LogService;
use super::types::{EventPage, FilterRequest, FilteredEvent, StreamPage, StreamSummary};

#[derive(Debug, Default)]
struct FakeState {
    stream_pages: Vec<StreamPage>,
    stream_failures: u32,
    stream_calls: u32,
    event_responses: VecDeque<Result<EventPage, String>>,
    filter_requests: Vec<FilterRequest>,
}

/// Scripted [`LogService`] implementation
#[derive(Debug, Default)]
pub struct FakeLogService {
    state: Mutex<FakeState>,
}

impl FakeLogService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `streams` as a single listing page
    pub fn with_streams(self, streams: Vec<StreamSummary>) -> Self {
        self.with_stream_pages(vec![streams])
    }

    /// Serve each entry of `pages` as one listing page, linked by tokens
    pub fn with_stream_pages(self, pages: Vec<Vec<StreamSummary>>) -> Self {
        self.set_stream_pages(pages);
        self
    }

    /// Replace the listing served from now on with a single page
    pub fn set_streams(&self, streams: Vec<StreamSummary>) {
        self.set_stream_pages(vec![streams]);
    }

    fn set_stream_pages(&self, pages: Vec<Vec<StreamSummary>>) {
        let count = pages.len();
        let pages = pages
            .into_iter()
            .enumerate()
            .map(|(idx, streams)| StreamPage {
                streams,
                next_token: (idx + 1 < count).then(|| (idx + 1).to_string()),
            })
            .collect();
        self.lock().stream_pages = pages;
    }

    /// Make the next `count` listing calls fail
    pub fn fail_stream_listing(&self, count: u32) {
        self.lock().stream_failures = count;
    }

    /// Queue a page of events for the next filter call
    pub fn push_events(&self, events: Vec<FilteredEvent>) {
        self.push_event_page(EventPage {
            events,
            next_token: None,
        });
    }

    /// Queue a full event page for the next filter call
    pub fn push_event_page(&self, page: EventPage) {
        self.lock().event_responses.push_back(Ok(page));
    }

    /// Queue a failure for the next filter call
    pub fn push_event_error(&self, message: impl Into<String>) {
        self.lock().event_responses.push_back(Err(message.into()));
    }

    /// Every filter request received so far
    pub fn filter_requests(&self) -> Vec<FilterRequest> {
        self.lock().filter_requests.clone()
    }

    /// Number of listing pages requested so far
    pub fn stream_calls(&self) -> u32 {
        self.lock().stream_calls
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl LogService for FakeLogService {
    async fn list_streams_page(
        &self,
        log_group: &str,
        next_token: Option<String>,
    ) -> Result<StreamPage> {
        let mut state = self.lock();
        state.stream_calls += 1;
        if state.stream_failures > 0 {
            state.stream_failures -= 1;
            return Err(anyhow!(
                "ThrottlingException: Rate exceeded listing streams of {}",
                log_group
            ));
        }

        let index = match next_token {
            Some(token) => token
                .parse::<usize>()
                .map_err(|_| anyhow!("InvalidParameterException: bad token {}", token))?,
            None => 0,
        };
        Ok(state.stream_pages.get(index).cloned().unwrap_or_default())
    }

    async fn filter_events_page(&self, request: &FilterRequest) -> Result<EventPage> {
        let mut state = self.lock();
        state.filter_requests.push(request.clone());
        match state.event_responses.pop_front() {
            Some(Ok(page)) => Ok(page),
            Some(Err(message)) => Err(anyhow!(message)),
            None => Ok(EventPage::default()),
        }
    }
}
