use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::client::StatusSource;
use crate::config::PollerConfig;
use crate::monitor::error::{FailureRing, PollError, PollFailure};
use crate::monitor::event::{ChangeRing, StatusChange};
use crate::monitor::state::{PollCursor, PollState};
use crate::monitor::tracker::StatusTracker;
use crate::monitor::validate::{current_date, validate};
use crate::notify::Notifier;

#[derive(Debug)]
pub enum PollOutcome {
    /// The payload carried no status changes.
    Unchanged,
    Notified { delivered: usize, failed: usize },
    Faulted(PollError),
}

#[derive(Debug)]
pub struct PollReport {
    pub iteration: u64,
    pub cursor_used: i64,
    pub next_cursor: i64,
    pub outcome: PollOutcome,
}

impl PollReport {
    pub fn is_faulted(&self) -> bool {
        matches!(self.outcome, PollOutcome::Faulted(_))
    }
}

/// Drives the fetch → validate → diff → notify cycle.
///
/// Every method that touches the cycle takes `&mut self`, so two cycles can
/// never overlap.
pub struct Poller {
    config: PollerConfig,
    source: Arc<dyn StatusSource>,
    notifier: Notifier,
    tracker: StatusTracker,
    cursor: PollCursor,
    state: PollState,
    failures: FailureRing,
    changes: ChangeRing,
    consecutive_failures: u32,
    alerts: u64,
    iterations: u64,
}

impl Poller {
    pub fn new(source: Arc<dyn StatusSource>, notifier: Notifier, config: PollerConfig) -> Self {
        let cursor = PollCursor::new(config.cursor_start.resolve(Utc::now()));
        Self {
            failures: FailureRing::new(config.failure_limit),
            changes: ChangeRing::new(config.change_limit),
            config,
            source,
            notifier,
            tracker: StatusTracker::new(),
            cursor,
            state: PollState::Idle,
            consecutive_failures: 0,
            alerts: 0,
            iterations: 0,
        }
    }

    pub fn with_tracker(mut self, tracker: StatusTracker) -> Self {
        self.tracker = tracker;
        self
    }

    pub fn with_cursor(mut self, cursor: i64) -> Self {
        self.cursor = PollCursor::new(cursor);
        self
    }

    pub fn config(&self) -> &PollerConfig {
        &self.config
    }

    pub fn cursor(&self) -> i64 {
        self.cursor.value()
    }

    pub fn state(&self) -> PollState {
        self.state
    }

    pub fn tracker(&self) -> &StatusTracker {
        &self.tracker
    }

    pub fn iterations(&self) -> u64 {
        self.iterations
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Repeated-failure alerts raised so far, at most one per failure streak.
    pub fn alerts(&self) -> u64 {
        self.alerts
    }

    /// True while the current failure streak has reached the alert threshold.
    pub fn is_alerting(&self) -> bool {
        let threshold = self.config.failure_alert_threshold;
        threshold > 0 && self.consecutive_failures >= threshold
    }

    /// Recent faulted cycles, newest first.
    pub fn failures(&self) -> Vec<PollFailure> {
        self.failures.list()
    }

    /// Recent detected changes, newest first.
    pub fn changes(&self) -> Vec<StatusChange> {
        self.changes.list()
    }

    /// Recent detected changes, oldest first.
    pub fn changes_chronological(&self) -> Vec<StatusChange> {
        self.changes.list_chronological()
    }

    pub async fn poll_once(&mut self) -> PollReport {
        self.poll_once_at(Utc::now().timestamp()).await
    }

    /// Runs one cycle as if it started at `now` (Unix seconds). The cursor
    /// advances to `now` whether or not the cycle succeeds.
    pub async fn poll_once_at(&mut self, now: i64) -> PollReport {
        if self.state == PollState::Sleeping {
            self.transition(PollState::Idle);
        }
        self.iterations += 1;
        let cursor_used = self.cursor.value();

        let result = self.cycle(cursor_used).await;
        self.cursor.advance_to(now);

        let outcome = match result {
            Ok(outcome) => {
                self.record_success();
                outcome
            }
            Err(e) => {
                self.transition(PollState::Faulted);
                self.record_failure(&e, cursor_used);
                PollOutcome::Faulted(e)
            }
        };
        self.transition(PollState::Sleeping);

        PollReport {
            iteration: self.iterations,
            cursor_used,
            next_cursor: self.cursor.value(),
            outcome,
        }
    }

    /// Polls forever, sleeping `poll_interval` between cycles, until `shutdown`
    /// resolves. Shutdown is only observed between cycles.
    pub async fn run(&mut self, shutdown: impl Future<Output = ()>) {
        info!(
            endpoint = %self.config.endpoint,
            interval_secs = self.config.poll_interval.as_secs(),
            cursor = self.cursor.value(),
            cursor_start = %self.config.cursor_start,
            "Starting poller"
        );

        tokio::pin!(shutdown);

        loop {
            let report = self.poll_once().await;
            debug!(
                iteration = report.iteration,
                next_cursor = report.next_cursor,
                faulted = report.is_faulted(),
                "Poll cycle finished"
            );

            tokio::select! {
                _ = tokio::time::sleep(self.config.poll_interval) => {}
                _ = &mut shutdown => {
                    info!(iterations = self.iterations, "Shutdown requested, poller stopped");
                    return;
                }
            }
        }
    }

    async fn cycle(&mut self, cursor: i64) -> Result<PollOutcome, PollError> {
        self.transition(PollState::Fetching);
        let raw = self.source.fetch(cursor).await?;

        self.transition(PollState::Validating);
        let items = validate(&raw)?;
        debug!(
            items = items.len(),
            server_date = current_date(&raw),
            "Response validated"
        );

        self.transition(PollState::Diffing);
        let transitions = self.tracker.transitions(&items)?;

        self.transition(PollState::Notifying);
        if transitions.is_empty() {
            debug!("Homework status has not changed");
            return Ok(PollOutcome::Unchanged);
        }

        let mut delivered = 0;
        let mut failed = 0;
        for transition in transitions {
            let ok = match self.notifier.notify(&transition.homework).await {
                Ok(_) => {
                    delivered += 1;
                    true
                }
                Err(e) => {
                    error!(homework = %transition.homework.name, error = %e, "Notification dropped");
                    failed += 1;
                    false
                }
            };
            self.changes
                .push(StatusChange::new(&transition.homework, transition.previous, ok));
        }

        Ok(PollOutcome::Notified { delivered, failed })
    }

    fn transition(&mut self, next: PollState) {
        if !self.state.can_transition_to(next) {
            warn!(from = %self.state, to = %next, "Unexpected poll state transition");
        }
        self.state = next;
    }

    fn record_failure(&mut self, e: &PollError, cursor: i64) {
        error!(kind = %e.kind(), cursor, error = %e, "Poll cycle failed");
        self.failures.push(PollFailure::from_error(e, cursor));
        self.consecutive_failures += 1;

        let threshold = self.config.failure_alert_threshold;
        if threshold > 0 && self.consecutive_failures == threshold {
            self.alerts += 1;
            error!(
                consecutive_failures = self.consecutive_failures,
                "Repeated poll failures, endpoint or credentials may need attention"
            );
        }
    }

    fn record_success(&mut self) {
        if self.is_alerting() {
            info!(
                failed_cycles = self.consecutive_failures,
                "Polling recovered"
            );
        }
        self.consecutive_failures = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::FetchError;
    use crate::monitor::error::FailureKind;
    use crate::notify::{Messenger, SendError};
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    struct ScriptedSource {
        responses: Mutex<VecDeque<Result<Value, FetchError>>>,
        cursors: Mutex<Vec<i64>>,
    }

    impl ScriptedSource {
        fn new(responses: Vec<Result<Value, FetchError>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                cursors: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl StatusSource for ScriptedSource {
        async fn fetch(&self, cursor: i64) -> Result<Value, FetchError> {
            self.cursors.lock().unwrap().push(cursor);
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(json!({"homeworks": [], "current_date": 0})))
        }
    }

    struct NullMessenger;

    #[async_trait]
    impl Messenger for NullMessenger {
        fn type_name(&self) -> &str {
            "null"
        }

        async fn send(&self, _chat_id: &str, _text: &str) -> Result<(), SendError> {
            Ok(())
        }
    }

    fn poller(source: Arc<ScriptedSource>) -> Poller {
        let notifier = Notifier::new(Arc::new(NullMessenger), "1");
        Poller::new(source, notifier, PollerConfig::default().with_failure_alert_threshold(2))
            .with_cursor(100)
    }

    fn server_error() -> Result<Value, FetchError> {
        Err(FetchError::Endpoint {
            url: "http://x".into(),
            status: 500,
        })
    }

    #[tokio::test]
    async fn state_ends_in_sleeping() {
        let source = Arc::new(ScriptedSource::new(vec![]));
        let mut p = poller(source);
        assert_eq!(p.state(), PollState::Idle);
        p.poll_once_at(200).await;
        assert_eq!(p.state(), PollState::Sleeping);
        p.poll_once_at(300).await;
        assert_eq!(p.state(), PollState::Sleeping);
        assert_eq!(p.iterations(), 2);
    }

    #[tokio::test]
    async fn cursor_advances_on_failure_too() {
        let source = Arc::new(ScriptedSource::new(vec![server_error()]));
        let mut p = poller(source.clone());

        let report = p.poll_once_at(200).await;
        assert!(report.is_faulted());
        assert_eq!(report.cursor_used, 100);
        assert_eq!(report.next_cursor, 200);

        p.poll_once_at(300).await;
        assert_eq!(*source.cursors.lock().unwrap(), vec![100, 200]);
    }

    #[tokio::test]
    async fn consecutive_failures_reset_on_success() {
        let source = Arc::new(ScriptedSource::new(vec![
            server_error(),
            server_error(),
            server_error(),
        ]));
        let mut p = poller(source);
        for now in [200, 300, 400] {
            p.poll_once_at(now).await;
        }
        assert_eq!(p.consecutive_failures(), 3);
        assert_eq!(p.failures().len(), 3);
        assert_eq!(p.failures()[0].kind, FailureKind::Endpoint);
        assert_eq!(p.failures()[0].status_code, Some(500));

        p.poll_once_at(500).await;
        assert_eq!(p.consecutive_failures(), 0);
        assert_eq!(p.failures().len(), 3);
    }

    #[tokio::test]
    async fn alert_fires_once_per_streak() {
        let source = Arc::new(ScriptedSource::new(vec![
            server_error(),
            server_error(),
            server_error(),
            Ok(json!({"homeworks": [], "current_date": 0})),
            server_error(),
            server_error(),
        ]));
        let mut p = poller(source);

        p.poll_once_at(200).await;
        assert_eq!(p.alerts(), 0);
        assert!(!p.is_alerting());

        p.poll_once_at(300).await;
        assert_eq!(p.alerts(), 1);
        assert!(p.is_alerting());

        p.poll_once_at(400).await;
        assert_eq!(p.alerts(), 1);

        p.poll_once_at(500).await;
        assert!(!p.is_alerting());
        assert_eq!(p.consecutive_failures(), 0);

        p.poll_once_at(600).await;
        p.poll_once_at(700).await;
        assert_eq!(p.alerts(), 2);
        assert!(p.is_alerting());
    }

    #[tokio::test]
    async fn changes_listed_in_both_orders() {
        let source = Arc::new(ScriptedSource::new(vec![Ok(json!({
            "homeworks": [
                {"homework_name": "hw1", "status": "reviewing"},
                {"homework_name": "hw2", "status": "approved"}
            ],
            "current_date": 1
        }))]));
        let mut p = poller(source);
        p.poll_once_at(200).await;

        let oldest_first: Vec<String> =
            p.changes_chronological().into_iter().map(|c| c.name).collect();
        let newest_first: Vec<String> = p.changes().into_iter().map(|c| c.name).collect();
        assert_eq!(oldest_first, vec!["hw1", "hw2"]);
        assert_eq!(newest_first, vec!["hw2", "hw1"]);
    }

    #[tokio::test]
    async fn zero_threshold_never_alerts() {
        let source = Arc::new(ScriptedSource::new((0..5).map(|_| server_error()).collect()));
        let notifier = Notifier::new(Arc::new(NullMessenger), "1");
        let mut p = Poller::new(
            source,
            notifier,
            PollerConfig::default().with_failure_alert_threshold(0),
        );

        for now in [200, 300, 400, 500, 600] {
            p.poll_once_at(now).await;
        }
        assert_eq!(p.consecutive_failures(), 5);
        assert_eq!(p.alerts(), 0);
        assert!(!p.is_alerting());
    }

    #[tokio::test]
    async fn malformed_item_does_not_poison_tracker() {
        let source = Arc::new(ScriptedSource::new(vec![
            Ok(json!({
                "homeworks": [
                    {"homework_name": "hw1", "status": "approved"},
                    {"homework_name": "hw2", "status": "graded"}
                ],
                "current_date": 1
            })),
            Ok(json!({
                "homeworks": [{"homework_name": "hw1", "status": "approved"}],
                "current_date": 2
            })),
        ]));
        let mut p = poller(source);

        let first = p.poll_once_at(200).await;
        match first.outcome {
            PollOutcome::Faulted(e) => assert_eq!(e.kind(), FailureKind::UnknownStatus),
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert!(p.tracker().is_empty());

        let second = p.poll_once_at(300).await;
        assert!(matches!(
            second.outcome,
            PollOutcome::Notified { delivered: 1, failed: 0 }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn run_polls_every_interval_until_shutdown() {
        let source = Arc::new(ScriptedSource::new(vec![]));
        let notifier = Notifier::new(Arc::new(NullMessenger), "1");
        let mut p = Poller::new(source.clone(), notifier, PollerConfig::default());

        p.run(tokio::time::sleep(Duration::from_secs(1250))).await;

        assert_eq!(source.cursors.lock().unwrap().len(), 3);
        assert_eq!(p.iterations(), 3);
        assert_eq!(p.state(), PollState::Sleeping);
    }

    #[tokio::test(start_paused = true)]
    async fn run_keeps_going_after_failures() {
        let source = Arc::new(ScriptedSource::new(vec![
            server_error(),
            Ok(json!("not a payload")),
        ]));
        let notifier = Notifier::new(Arc::new(NullMessenger), "1");
        let mut p = Poller::new(source.clone(), notifier, PollerConfig::default());

        p.run(tokio::time::sleep(Duration::from_secs(1250))).await;

        assert_eq!(p.iterations(), 3);
        let kinds: Vec<_> = p.failures().iter().map(|f| f.kind).collect();
        assert_eq!(kinds, vec![FailureKind::SchemaType, FailureKind::Endpoint]);
        assert_eq!(p.consecutive_failures(), 0);
    }
}
