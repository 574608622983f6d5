//! Tail session control
//!
//! [`TailController::begin`] seeds the stream set, then either keeps a
//! session tailing with two periodic tasks or runs one bounded fetch.
//!
//! ```text
//! Seeding ──(no end time)──► Tailing ──(stop)──► Completed
//!    │
//!    └──(end time)──► RangedActive ──(one fetch cycle)──► Completed
//! ```
//!
//! Tailing runs a renewal task (re-discovers streams) and a fetch task
//! (delivers new events). Both loops stop on the session's
//! [`CancellationToken`]; the engine never closes the output channel of a
//! tailing session on its own. A ranged session closes the channel after
//! its single fetch cycle by dropping the only engine-held sender.

#![warn(clippy::all, rust_2018_idioms)]

use std::sync::{Arc, PoisonError, RwLock};

use anyhow::{bail, Context, Result};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::app::config::TailConfig;

use super::dedup::Deduplicator;
use super::discovery::StreamDiscovery;
use super::errors::{ConsumerClosed, ErrorReporter, TailError};
use super::fetcher::EventFetcher;
use super::registry::StreamRegistry;
use super::service::LogService;
use super::types::{LogEvent, StreamSet, TimeWindow};

/// Lifecycle of a tail session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TailState {
    /// Initial stream discovery is running
    Seeding,
    /// Periodic renewal and fetching, unbounded end
    Tailing,
    /// The single fetch cycle of a ranged query is running
    RangedActive,
    /// No further fetch or renewal activity
    Completed,
}

#[derive(Debug, Clone)]
struct SharedState(Arc<RwLock<TailState>>);

impl SharedState {
    fn new() -> Self {
        Self(Arc::new(RwLock::new(TailState::Seeding)))
    }

    fn get(&self) -> TailState {
        *self.0.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn set(&self, state: TailState) {
        *self.0.write().unwrap_or_else(PoisonError::into_inner) = state;
        trace_debug!("Tail session state: {:?}", state);
    }
}

/// Starts tail sessions against one log service
#[derive(Clone)]
pub struct TailController {
    service: Arc<dyn LogService>,
    config: TailConfig,
}

impl TailController {
    pub fn new(service: Arc<dyn LogService>, config: TailConfig) -> Self {
        Self { service, config }
    }

    /// Seed the stream set and start delivering events on `output`
    ///
    /// Returns once seeding has finished; all further work happens on
    /// spawned tasks. Only the first log group is read, further groups are
    /// ignored. A missing `start` means now. A discovery failure during
    /// seeding fails the whole session.
    pub async fn begin(
        &self,
        output: mpsc::Sender<LogEvent>,
        log_groups: &[String],
        start: Option<i64>,
        end: Option<i64>,
    ) -> Result<TailSession> {
        let Some(log_group) = log_groups.first().cloned() else {
            bail!("No log group given");
        };
        if log_groups.len() > 1 {
            trace_warn!(
                "Only the first log group is read; ignoring {:?}",
                &log_groups[1..]
            );
        }

        let window = TimeWindow {
            start: start.unwrap_or_else(|| chrono::Utc::now().timestamp_millis()),
            end,
        };
        if let Some(end) = window.end {
            if end < window.start {
                bail!("End time {} precedes start time {}", end, window.start);
            }
        }

        let state = SharedState::new();
        let registry = Arc::new(StreamRegistry::new());
        let dedup = Arc::new(Deduplicator::new(
            self.config.dedup_size_limit,
            self.config.dedup_ttl(),
        ));
        let discovery =
            StreamDiscovery::new(self.service.clone(), self.config.discovery_page_delay());

        let streams = discovery
            .discover(&log_group, &window)
            .await
            .with_context(|| format!("Failed to discover streams of {}", log_group))?;
        trace_info!("Seeded {} with {} streams", log_group, streams.len());
        registry.replace(streams);

        let fetcher = EventFetcher::new(
            self.service.clone(),
            registry.clone(),
            dedup.clone(),
            output,
        )
        .with_filter_pattern(self.config.filter_pattern.clone());

        let token = CancellationToken::new();
        let (reporter, errors) = ErrorReporter::channel();

        let tasks = if window.is_tailing() {
            trace_info!("Tailing {}", log_group);
            state.set(TailState::Tailing);
            vec![
                tokio::spawn(renewal_loop(
                    discovery,
                    registry.clone(),
                    log_group.clone(),
                    window,
                    self.config.clone(),
                    reporter.clone(),
                    token.clone(),
                )),
                tokio::spawn(fetch_loop(
                    fetcher,
                    log_group.clone(),
                    window,
                    self.config.clone(),
                    reporter,
                    state.clone(),
                    token.clone(),
                )),
            ]
        } else {
            trace_info!("Reading {} for range {:?}", log_group, window);
            state.set(TailState::RangedActive);
            vec![tokio::spawn(ranged_fetch(
                fetcher,
                log_group.clone(),
                window,
                reporter,
                state.clone(),
            ))]
        };

        Ok(TailSession {
            log_group,
            window,
            state,
            token,
            registry,
            dedup,
            tasks,
            errors: Some(errors),
        })
    }
}

/// Start a session with the default configuration
pub async fn begin(
    service: Arc<dyn LogService>,
    output: mpsc::Sender<LogEvent>,
    log_groups: &[String],
    start: Option<i64>,
    end: Option<i64>,
) -> Result<TailSession> {
    TailController::new(service, TailConfig::default())
        .begin(output, log_groups, start, end)
        .await
}

/// Handle to a running tail session
pub struct TailSession {
    log_group: String,
    window: TimeWindow,
    state: SharedState,
    token: CancellationToken,
    registry: Arc<StreamRegistry>,
    dedup: Arc<Deduplicator>,
    tasks: Vec<JoinHandle<()>>,
    errors: Option<mpsc::Receiver<TailError>>,
}

impl TailSession {
    pub fn state(&self) -> TailState {
        self.state.get()
    }

    /// The log group being read
    pub fn log_group(&self) -> &str {
        &self.log_group
    }

    pub fn window(&self) -> TimeWindow {
        self.window
    }

    /// Stream set the next fetch cycle will query
    pub fn current_streams(&self) -> Option<Arc<StreamSet>> {
        self.registry.current()
    }

    /// Latest event timestamp delivered so far
    pub fn last_timestamp(&self) -> i64 {
        self.dedup.last_timestamp()
    }

    /// Receiver of recovered steady-state errors; available once
    pub fn take_errors(&mut self) -> Option<mpsc::Receiver<TailError>> {
        self.errors.take()
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Stop renewal and fetching; a ranged cycle already running completes
    pub fn stop(&self) {
        trace_info!("Stopping tail session for {}", self.log_group);
        self.token.cancel();
    }

    /// Wait until every task of the session has finished
    pub async fn join(self) {
        for task in self.tasks {
            if let Err(e) = task.await {
                trace_warn!("Tail task for {} failed: {}", self.log_group, e);
            }
        }
    }
}

async fn renewal_loop(
    discovery: StreamDiscovery,
    registry: Arc<StreamRegistry>,
    log_group: String,
    window: TimeWindow,
    config: TailConfig,
    reporter: ErrorReporter,
    token: CancellationToken,
) {
    let period = config.renewal_interval();
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = ticker.tick() => {}
        }

        trace_trace!("Stream renewal time for {}", log_group);
        let result = tokio::select! {
            biased;
            _ = token.cancelled() => break,
            result = discovery.discover(&log_group, &window) => result,
        };
        match result {
            Ok(streams) if streams.is_empty() => {
                trace_debug!("Renewal found no streams in {}, keeping previous set", log_group);
            }
            Ok(streams) => registry.replace(streams),
            Err(e) => {
                trace_warn!("Stream renewal for {} failed: {:#}", log_group, e);
                reporter.report(TailError::renewal(&log_group, &e));
            }
        }
    }
    trace_debug!("Renewal loop for {} stopped", log_group);
}

async fn fetch_loop(
    fetcher: EventFetcher,
    log_group: String,
    window: TimeWindow,
    config: TailConfig,
    reporter: ErrorReporter,
    state: SharedState,
    token: CancellationToken,
) {
    let mut ticker = tokio::time::interval(config.fetch_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let result = tokio::select! {
            biased;
            _ = token.cancelled() => break,
            result = fetcher.fetch_once(&window) => result,
        };
        match result {
            Ok(delivered) => {
                trace_trace!("Fetch cycle for {} delivered {}", log_group, delivered);
            }
            Err(e) if e.downcast_ref::<ConsumerClosed>().is_some() => {
                trace_info!("Consumer of {} went away, stopping tail", log_group);
                token.cancel();
                break;
            }
            Err(e) => {
                trace_warn!("Fetch cycle for {} failed: {:#}", log_group, e);
                reporter.report(TailError::fetch(&log_group, &e));
            }
        }
    }

    state.set(TailState::Completed);
    trace_debug!("Fetch loop for {} stopped", log_group);
}

async fn ranged_fetch(
    fetcher: EventFetcher,
    log_group: String,
    window: TimeWindow,
    reporter: ErrorReporter,
    state: SharedState,
) {
    match fetcher.fetch_once(&window).await {
        Ok(delivered) => {
            trace_debug!("Ranged fetch for {} delivered {}", log_group, delivered);
        }
        Err(e) => {
            trace_warn!("Ranged fetch for {} failed: {:#}", log_group, e);
            reporter.report(TailError::fetch(&log_group, &e));
        }
    }

    trace_debug!("Closing event channel for {}", log_group);
    drop(fetcher);
    state.set(TailState::Completed);
}

#[cfg(test)]
mod tests {
    use super::super::fake::FakeLogService;
    use super::super::types::{FilteredEvent, StreamSummary};
    use super::*;
    use pretty_assertions::assert_eq;
    use std::time::Duration;
    use tokio::time::timeout;

    const NOW: i64 = 1_700_000_000_000;
    const WAIT: Duration = Duration::from_secs(5);

    fn fast_config() -> TailConfig {
        TailConfig::default()
            .with_intervals(Duration::from_millis(30), Duration::from_millis(5))
            .with_page_delay(Duration::ZERO)
    }

    fn groups(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    fn service_with_stream() -> Arc<FakeLogService> {
        Arc::new(
            FakeLogService::new().with_streams(vec![StreamSummary::new("web-1", NOW - 500, NOW)]),
        )
    }

    #[tokio::test]
    async fn test_ranged_runs_one_cycle_then_closes() {
        let service = service_with_stream();
        service.push_events(vec![
            FilteredEvent::new("e1", "web-1", NOW - 100, "one"),
            FilteredEvent::new("e2", "web-1", NOW - 50, "two"),
        ]);
        let (tx, mut rx) = mpsc::channel(100);

        let session = TailController::new(service.clone(), fast_config())
            .begin(tx, &groups(&["app"]), Some(NOW - 1_000), Some(NOW))
            .await
            .unwrap();

        let mut ids = Vec::new();
        while let Some(event) = timeout(WAIT, rx.recv()).await.unwrap() {
            ids.push(event.event_id().to_string());
        }
        assert_eq!(ids, vec!["e1", "e2"]);

        session.join().await;
        assert_eq!(service.filter_requests().len(), 1);
    }

    #[tokio::test]
    async fn test_ranged_state_reaches_completed() {
        let service = service_with_stream();
        let (tx, mut rx) = mpsc::channel(100);

        let session = TailController::new(service, fast_config())
            .begin(tx, &groups(&["app"]), Some(NOW - 1_000), Some(NOW))
            .await
            .unwrap();
        assert!(matches!(
            session.state(),
            TailState::RangedActive | TailState::Completed
        ));

        assert!(timeout(WAIT, rx.recv()).await.unwrap().is_none());
        let state = session.state.clone();
        session.join().await;
        assert_eq!(state.get(), TailState::Completed);
    }

    #[tokio::test]
    async fn test_seeding_failure_is_fatal() {
        let service = service_with_stream();
        service.fail_stream_listing(1);
        let (tx, _rx) = mpsc::channel(100);

        let result = TailController::new(service.clone(), fast_config())
            .begin(tx, &groups(&["app"]), Some(NOW), None)
            .await;

        let err = result.err().expect("seeding should fail");
        assert!(format!("{:#}", err).contains("Failed to discover streams of app"));
        assert!(service.filter_requests().is_empty());
    }

    #[tokio::test]
    async fn test_empty_group_list_is_rejected() {
        let (tx, _rx) = mpsc::channel(1);
        let result = TailController::new(service_with_stream(), fast_config())
            .begin(tx, &[], None, None)
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_only_first_group_is_read() {
        let service = service_with_stream();
        let (tx, mut rx) = mpsc::channel(100);

        let session = TailController::new(service.clone(), fast_config())
            .begin(tx, &groups(&["first", "second"]), Some(NOW - 1_000), Some(NOW))
            .await
            .unwrap();
        assert!(timeout(WAIT, rx.recv()).await.unwrap().is_none());
        session.join().await;

        assert_eq!(service.filter_requests()[0].log_group, "first");
    }

    #[tokio::test]
    async fn test_tailing_delivers_across_cycles_until_stopped() {
        let service = service_with_stream();
        service.push_events(vec![FilteredEvent::new("e1", "web-1", NOW + 10, "a")]);
        service.push_events(vec![
            FilteredEvent::new("e1", "web-1", NOW + 10, "a"),
            FilteredEvent::new("e2", "web-1", NOW + 20, "b"),
        ]);
        let (tx, mut rx) = mpsc::channel(100);

        let session = TailController::new(service.clone(), fast_config())
            .begin(tx, &groups(&["app"]), Some(NOW), None)
            .await
            .unwrap();
        assert_eq!(session.state(), TailState::Tailing);

        let first = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
        let second = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
        assert_eq!(first.event_id(), "e1");
        assert_eq!(second.event_id(), "e2");

        // Still open: nothing more arrives, but the channel is not closed
        assert!(timeout(Duration::from_millis(100), rx.recv()).await.is_err());
        assert_eq!(session.last_timestamp(), NOW + 20);

        session.stop();
        let state = session.state.clone();
        session.join().await;
        assert_eq!(state.get(), TailState::Completed);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_renewal_swaps_in_new_streams() {
        let service = service_with_stream();
        let (tx, _rx) = mpsc::channel(100);

        let session = TailController::new(service.clone(), fast_config())
            .begin(tx, &groups(&["app"]), Some(NOW), None)
            .await
            .unwrap();
        service.set_streams(vec![
            StreamSummary::new("web-2", NOW, NOW + 5_000),
            StreamSummary::new("web-1", NOW - 500, NOW),
        ]);

        let renewed = timeout(WAIT, async {
            loop {
                if session.current_streams().map(|s| s.len()) == Some(2) {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await;
        assert!(renewed.is_ok());

        session.stop();
        session.join().await;
    }

    #[tokio::test]
    async fn test_renewal_error_keeps_streams_and_is_reported() {
        let service = service_with_stream();
        let (tx, _rx) = mpsc::channel(100);

        let mut session = TailController::new(service.clone(), fast_config())
            .begin(tx, &groups(&["app"]), Some(NOW), None)
            .await
            .unwrap();
        let mut errors = session.take_errors().unwrap();
        assert!(session.take_errors().is_none());
        service.fail_stream_listing(1);

        let report = timeout(WAIT, errors.recv()).await.unwrap().unwrap();
        assert!(matches!(report, TailError::Renewal { .. }));
        assert!(report.is_retryable());
        assert_eq!(
            session.current_streams().unwrap().stream_names(),
            ["web-1".to_string()]
        );

        session.stop();
        session.join().await;
    }

    #[tokio::test]
    async fn test_fetch_error_is_reported_and_tailing_continues() {
        let service = service_with_stream();
        service.push_event_error("ServiceUnavailableException: down");
        service.push_events(vec![FilteredEvent::new("e1", "web-1", NOW + 1, "after")]);
        let (tx, mut rx) = mpsc::channel(100);

        let mut session = TailController::new(service.clone(), fast_config())
            .begin(tx, &groups(&["app"]), Some(NOW), None)
            .await
            .unwrap();
        let mut errors = session.take_errors().unwrap();

        let report = timeout(WAIT, errors.recv()).await.unwrap().unwrap();
        assert!(matches!(report, TailError::Fetch { .. }));
        let event = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
        assert_eq!(event.event_id(), "e1");

        let requests = service.filter_requests();
        assert_eq!(requests[0].start_time, NOW);
        assert_eq!(requests[1].start_time, NOW);

        session.stop();
        session.join().await;
    }

    #[tokio::test]
    async fn test_dropped_consumer_ends_session() {
        let service = service_with_stream();
        service.push_events(vec![FilteredEvent::new("e1", "web-1", NOW + 1, "a")]);
        let (tx, rx) = mpsc::channel(100);
        drop(rx);

        let session = TailController::new(service, fast_config())
            .begin(tx, &groups(&["app"]), Some(NOW), None)
            .await
            .unwrap();
        let token = session.cancellation_token();

        timeout(WAIT, session.join()).await.unwrap();
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn test_end_before_start_is_rejected() {
        let (tx, _rx) = mpsc::channel(1);
        let result = begin(service_with_stream(), tx, &groups(&["app"]), Some(NOW), Some(NOW - 1))
            .await;
        assert!(result.is_err());
    }
}
