use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::{sleep, Instant};

use feedback_queue::{
    FeedbackAction, FeedbackConfig, FeedbackQueue, FeedbackRequest, FeedbackStatus,
    SubmitOutcome,
};
use relay_bridge::{
    FeedbackPayload, FeedbackRelay, InMemoryStore, OnlineFlag, RelayError, ReportType,
    SharedStore,
};
use sentinel_core_types::Notification;
use sentinel_event_bus::{drain, EventBus, InMemoryBus};

struct ScriptedRelay {
    rejection: Option<RelayError>,
    failures_left: AtomicUsize,
    calls: AtomicUsize,
    latency: Duration,
    delivered: Mutex<Vec<FeedbackPayload>>,
}

impl ScriptedRelay {
    fn new(failures: usize, latency: Duration) -> Arc<Self> {
        Arc::new(Self {
            rejection: None,
            failures_left: AtomicUsize::new(failures),
            calls: AtomicUsize::new(0),
            latency,
            delivered: Mutex::new(Vec::new()),
        })
    }

    fn healthy() -> Arc<Self> {
        Self::new(0, Duration::ZERO)
    }

    fn broken() -> Arc<Self> {
        Self::new(usize::MAX, Duration::ZERO)
    }

    fn rejecting(status: u16) -> Arc<Self> {
        Arc::new(Self {
            rejection: Some(RelayError::Rejected {
                status,
                message: "malformed report".into(),
            }),
            failures_left: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
            latency: Duration::ZERO,
            delivered: Mutex::new(Vec::new()),
        })
    }

    fn heal(&self) {
        self.failures_left.store(0, Ordering::SeqCst);
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FeedbackRelay for ScriptedRelay {
    async fn submit_feedback(&self, payload: &FeedbackPayload) -> Result<(), RelayError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(rejection) = &self.rejection {
            return Err(rejection.clone());
        }
        if !self.latency.is_zero() {
            sleep(self.latency).await;
        }
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if failing {
            return Err(RelayError::Transport("connection reset".into()));
        }
        self.delivered.lock().push(payload.clone());
        Ok(())
    }
}

struct Harness {
    queue: Arc<FeedbackQueue>,
    relay: Arc<ScriptedRelay>,
    online: Arc<OnlineFlag>,
    bus: Arc<InMemoryBus<Notification>>,
}

fn harness_with(
    relay: Arc<ScriptedRelay>,
    store: Option<SharedStore>,
    online: bool,
    config: FeedbackConfig,
) -> Harness {
    let online = OnlineFlag::new(online);
    let bus = InMemoryBus::<Notification>::new(256);
    let queue = FeedbackQueue::new(config, relay.clone(), store, online.clone(), bus.clone());
    Harness {
        queue,
        relay,
        online,
        bus,
    }
}

fn harness(relay: Arc<ScriptedRelay>, online: bool) -> Harness {
    let store: SharedStore = InMemoryStore::new();
    harness_with(relay, Some(store), online, FeedbackConfig::default())
}

fn request(signature: &str, action: FeedbackAction) -> FeedbackRequest {
    FeedbackRequest {
        action,
        signature: Some(signature.to_string()),
        text: "You are scum.".into(),
        score: Some(0.91),
    }
}

fn kinds(events: &[Notification]) -> Vec<&'static str> {
    events.iter().map(Notification::kind).collect()
}

#[tokio::test(start_paused = true)]
async fn immediate_delivery_records_sent_history() {
    let h = harness(ScriptedRelay::healthy(), true);
    let mut rx = h.bus.subscribe();

    let outcome = h
        .queue
        .submit(request("x.com:data-id:7", FeedbackAction::Flag))
        .await;

    assert!(outcome.is_sent());
    assert!(outcome.entry_id().starts_with("x.com:data-id:7:flag:"));
    assert_eq!(h.relay.calls(), 1);
    assert_eq!(h.relay.delivered.lock()[0].report_type, ReportType::Flag);
    assert!(h.queue.pending().await.is_empty());

    let history = h.queue.history().await;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, FeedbackStatus::Sent);
    assert!(history[0].sent_at.is_some());

    let events = drain(&mut rx);
    assert_eq!(kinds(&events), vec!["feedback-history-updated", "feedback-sent"]);
}

#[tokio::test(start_paused = true)]
async fn three_failures_queue_once_then_flush_delivers() {
    let h = harness(ScriptedRelay::broken(), true);
    let started = Instant::now();

    let outcome = h
        .queue
        .submit(request("x.com:id:42", FeedbackAction::Dismiss))
        .await;

    assert!(matches!(outcome, SubmitOutcome::Queued { .. }));
    assert_eq!(h.relay.calls(), 3);
    assert!(started.elapsed() >= Duration::from_millis(4_000));

    let pending = h.queue.pending().await;
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].retry_count, 0);
    assert_eq!(pending[0].payload.report_type, ReportType::NotHate);
    let history = h.queue.history().await;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, FeedbackStatus::Queued);
    assert!(history[0].queued_at.is_some());

    h.queue.shutdown();
    h.relay.heal();
    let report = h.queue.flush().await;
    assert_eq!(report.sent, 1);
    assert_eq!(report.remaining, 0);
    assert!(h.queue.pending().await.is_empty());

    let history = h.queue.history().await;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, FeedbackStatus::Sent);
    assert_eq!(history[0].last_error, None);
    assert!(!h.queue.has_armed_timer());
}

#[tokio::test(start_paused = true)]
async fn rejected_report_is_queued_after_a_single_attempt() {
    let h = harness(ScriptedRelay::rejecting(400), true);
    let started = Instant::now();

    let outcome = h
        .queue
        .submit(request("x.com:id:43", FeedbackAction::Flag))
        .await;

    assert!(matches!(outcome, SubmitOutcome::Queued { .. }));
    assert_eq!(h.relay.calls(), 1);
    assert!(started.elapsed() < Duration::from_millis(1_000));
    let pending = h.queue.pending().await;
    assert_eq!(pending.len(), 1);
    let history = h.queue.history().await;
    assert_eq!(history[0].status, FeedbackStatus::Queued);
    assert!(history[0]
        .last_error
        .as_deref()
        .is_some_and(|error| error.contains("400")));
    h.queue.shutdown();
}

#[tokio::test(start_paused = true)]
async fn offline_submission_skips_the_network() {
    let h = harness(ScriptedRelay::healthy(), false);
    let mut rx = h.bus.subscribe();

    let outcome = h
        .queue
        .submit(request("x.com:id:1", FeedbackAction::Flag))
        .await;

    assert_eq!(
        outcome,
        SubmitOutcome::Queued {
            entry_id: outcome.entry_id().to_string(),
            reason: "Offline".into(),
        }
    );
    assert_eq!(h.relay.calls(), 0);
    let pending = h.queue.pending().await;
    assert_eq!(pending[0].last_error.as_deref(), Some("Offline"));
    assert_eq!(
        h.queue.history().await[0].last_error.as_deref(),
        Some("Offline")
    );

    let events = drain(&mut rx);
    assert_eq!(
        kinds(&events),
        vec!["feedback-pending", "feedback-history-updated", "feedback-queued"]
    );
    assert!(h.queue.has_armed_timer());
}

#[tokio::test(start_paused = true)]
async fn queued_items_flush_after_the_delay() {
    let h = harness(ScriptedRelay::healthy(), false);
    h.queue
        .submit(request("x.com:id:1", FeedbackAction::Flag))
        .await;
    h.online.set_online(true);

    sleep(Duration::from_millis(4_990)).await;
    assert_eq!(h.relay.calls(), 0);

    sleep(Duration::from_millis(20)).await;
    assert_eq!(h.relay.calls(), 1);
    assert!(h.queue.pending().await.is_empty());
    assert_eq!(h.queue.history().await[0].status, FeedbackStatus::Sent);
}

#[tokio::test(start_paused = true)]
async fn online_transition_flushes_immediately() {
    let h = harness(ScriptedRelay::healthy(), false);
    h.queue
        .submit(request("x.com:id:1", FeedbackAction::Flag))
        .await;

    assert!(h.online.set_online(true));
    h.queue.on_online();
    sleep(Duration::from_millis(1)).await;

    assert_eq!(h.relay.calls(), 1);
    assert!(h.queue.pending().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn failed_flush_counts_retries_and_rearms() {
    let h = harness(ScriptedRelay::broken(), false);
    h.queue
        .submit(request("x.com:id:9", FeedbackAction::Dismiss))
        .await;
    h.queue.shutdown();

    let report = h.queue.flush().await;
    assert_eq!(report.attempted, 1);
    assert_eq!(report.remaining, 1);

    let pending = h.queue.pending().await;
    assert_eq!(pending[0].retry_count, 1);
    assert_eq!(
        pending[0].last_error.as_deref(),
        Some("transport error: connection reset")
    );
    let history = h.queue.history().await;
    assert_eq!(history[0].status, FeedbackStatus::Queued);
    assert_eq!(history[0].retries, 1);
    assert!(h.queue.has_armed_timer());

    // the retry timer runs 15 s later and fails again
    sleep(Duration::from_millis(15_001)).await;
    assert_eq!(h.relay.calls(), 2);
    assert_eq!(h.queue.pending().await[0].retry_count, 2);
    h.queue.shutdown();
}

#[tokio::test(start_paused = true)]
async fn overlapping_flush_is_skipped() {
    let h = harness(ScriptedRelay::new(0, Duration::from_secs(1)), false);
    h.queue
        .submit(request("x.com:id:3", FeedbackAction::Flag))
        .await;
    h.queue.shutdown();

    let queue = h.queue.clone();
    let first = tokio::spawn(async move { queue.flush().await });
    tokio::task::yield_now().await;

    let second = h.queue.flush().await;
    assert!(second.skipped);

    let first = first.await.unwrap();
    assert_eq!(first.sent, 1);
    assert_eq!(h.relay.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn items_queued_during_a_flush_survive_it() {
    let h = harness(ScriptedRelay::new(0, Duration::from_secs(1)), false);
    h.queue
        .submit(request("x.com:id:a", FeedbackAction::Flag))
        .await;
    h.queue.shutdown();

    let queue = h.queue.clone();
    let flush = tokio::spawn(async move { queue.flush().await });
    tokio::task::yield_now().await;

    let late = h
        .queue
        .submit(request("x.com:id:b", FeedbackAction::Flag))
        .await;
    let report = flush.await.unwrap();
    assert_eq!(report.sent, 1);

    let pending = h.queue.pending().await;
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, late.entry_id());
    h.queue.shutdown();
}

#[tokio::test(start_paused = true)]
async fn missing_store_reports_feedback_error() {
    let h = harness_with(ScriptedRelay::broken(), None, true, FeedbackConfig::default());
    let mut rx = h.bus.subscribe();

    let outcome = h
        .queue
        .submit(request("x.com:id:5", FeedbackAction::Flag))
        .await;

    let SubmitOutcome::Failed { message, .. } = &outcome else {
        panic!("expected failure, got {outcome:?}");
    };
    assert!(message.contains("unavailable"));
    assert!(h.queue.history().await.is_empty());
    assert_eq!(h.queue.initialize().await, 0);
    assert!(!h.queue.has_armed_timer());

    let events = drain(&mut rx);
    assert!(matches!(
        events.last(),
        Some(Notification::FeedbackError { entry_id, .. }) if entry_id == outcome.entry_id()
    ));
}

#[tokio::test(start_paused = true)]
async fn history_is_capped_most_recent_first() {
    let config = FeedbackConfig {
        history_limit: 3,
        ..FeedbackConfig::default()
    };
    let store: SharedStore = InMemoryStore::new();
    let h = harness_with(ScriptedRelay::healthy(), Some(store), true, config);

    for n in 0..5 {
        h.queue
            .submit(request(&format!("x.com:id:{n}"), FeedbackAction::Flag))
            .await;
    }

    let history = h.queue.history().await;
    assert_eq!(history.len(), 3);
    assert!(history[0].id.starts_with("x.com:id:4:"));
    assert!(history[2].id.starts_with("x.com:id:2:"));
}

#[tokio::test(start_paused = true)]
async fn initialize_flushes_a_persisted_backlog() {
    let store = InMemoryStore::new();
    let shared: SharedStore = store.clone();
    let offline = harness_with(
        ScriptedRelay::healthy(),
        Some(shared.clone()),
        false,
        FeedbackConfig::default(),
    );
    offline
        .queue
        .submit(request("x.com:id:7", FeedbackAction::Dismiss))
        .await;
    offline.queue.shutdown();

    let restarted = harness_with(
        ScriptedRelay::healthy(),
        Some(shared),
        true,
        FeedbackConfig::default(),
    );
    let mut rx = restarted.bus.subscribe();
    assert_eq!(restarted.queue.initialize().await, 1);
    assert!(matches!(
        drain(&mut rx).first(),
        Some(Notification::FeedbackPending { count: 1 })
    ));

    sleep(Duration::from_millis(1)).await;
    assert_eq!(restarted.relay.calls(), 1);
    assert_eq!(store.get("sentinelPendingReports"), Some(serde_json::json!([])));
}

#[tokio::test(start_paused = true)]
async fn anonymous_reports_get_random_ids_and_truncated_text() {
    let h = harness(ScriptedRelay::healthy(), true);
    let outcome = h
        .queue
        .submit(FeedbackRequest {
            action: FeedbackAction::Dismiss,
            signature: None,
            text: "x".repeat(5_000),
            score: None,
        })
        .await;

    assert!(outcome.entry_id().starts_with("anon-"));
    assert!(outcome.entry_id().contains(":not_hate:"));
    assert_eq!(h.relay.delivered.lock()[0].text.chars().count(), 4_000);
    let snippet = &h.queue.history().await[0].snippet;
    assert_eq!(snippet.chars().count(), 180);
    assert!(snippet.ends_with('…'));
}
