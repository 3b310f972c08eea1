use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::{sleep, sleep_until, Instant};
use tracing::{debug, info, warn};

use relay_bridge::{
    Connectivity, FeedbackPayload, FeedbackRelay, RelayError, SharedStore, StoreError,
};
use segmenter::truncate_chars;
use sentinel_core_types::{now_millis, Notification};
use sentinel_event_bus::NotificationBus;

use crate::model::{
    FeedbackConfig, FeedbackEntry, FeedbackQueueItem, FeedbackRequest, FeedbackStatus,
    FlushReport, SubmitOutcome,
};

const SNIPPET_SUFFIX: &str = "…";

struct ArmedTimer {
    id: u64,
    deadline: Instant,
    handle: JoinHandle<()>,
}

/// Delivers user feedback, falling back to a persisted queue that is flushed in the background.
///
/// Without a store the queue and history degrade to no-ops; immediate delivery still works.
pub struct FeedbackQueue {
    config: FeedbackConfig,
    relay: Arc<dyn FeedbackRelay>,
    store: Option<SharedStore>,
    connectivity: Arc<dyn Connectivity>,
    bus: NotificationBus,
    flushing: AtomicBool,
    timer: Mutex<Option<ArmedTimer>>,
    timer_seq: AtomicU64,
    // Serialises read-modify-write cycles on the persisted keys.
    store_lock: tokio::sync::Mutex<()>,
}

struct FlushGuard<'a>(&'a AtomicBool);

impl Drop for FlushGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl FeedbackQueue {
    pub fn new(
        config: FeedbackConfig,
        relay: Arc<dyn FeedbackRelay>,
        store: Option<SharedStore>,
        connectivity: Arc<dyn Connectivity>,
        bus: NotificationBus,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            relay,
            store,
            connectivity,
            bus,
            flushing: AtomicBool::new(false),
            timer: Mutex::new(None),
            timer_seq: AtomicU64::new(0),
            store_lock: tokio::sync::Mutex::new(()),
        })
    }

    pub fn config(&self) -> &FeedbackConfig {
        &self.config
    }

    /// Reports the persisted backlog and arms an immediate flush when there is one.
    pub async fn initialize(self: &Arc<Self>) -> usize {
        if self.store.is_none() {
            return 0;
        }
        let count = self.pending().await.len();
        self.bus.emit(Notification::FeedbackPending { count });
        if count > 0 {
            info!(target: "feedback.queue", count, "pending feedback found at startup");
            self.schedule_flush(Duration::ZERO);
        }
        count
    }

    /// Host signalled an offline -> online transition.
    pub fn on_online(self: &Arc<Self>) {
        self.schedule_flush(Duration::ZERO);
    }

    pub async fn submit(self: &Arc<Self>, request: FeedbackRequest) -> SubmitOutcome {
        let created_at = now_millis();
        let report_type = request.action.report_type();
        let owner = request
            .signature
            .filter(|sig| !sig.is_empty())
            .unwrap_or_else(|| format!("anon-{}", uuid::Uuid::new_v4().simple()));
        let entry_id = format!("{owner}:{report_type}:{created_at}");

        let payload = FeedbackPayload {
            text: truncate_chars(&request.text, self.config.payload_chars, ""),
            report_type,
        };
        let base = FeedbackEntry {
            id: entry_id.clone(),
            action: request.action,
            report_type,
            snippet: truncate_chars(&request.text, self.config.snippet_chars, SNIPPET_SUFFIX),
            score: request.score,
            status: FeedbackStatus::Pending,
            created_at,
            queued_at: None,
            sent_at: None,
            retries: 0,
            last_error: None,
        };

        if !self.connectivity.is_online() {
            debug!(target: "feedback.queue", entry = %entry_id, "offline, queueing without sending");
            return self
                .queue_report(payload, base, RelayError::Offline.to_string())
                .await;
        }

        match self.send_with_retry(&payload).await {
            Ok(()) => {
                let mut entry = base;
                entry.status = FeedbackStatus::Sent;
                entry.sent_at = Some(now_millis());
                self.add_history(entry).await;
                self.bus.emit(Notification::FeedbackSent {
                    entry_id: entry_id.clone(),
                });
                info!(target: "feedback.queue", entry = %entry_id, action = request.action.as_str(), "feedback sent");
                SubmitOutcome::Sent { entry_id }
            }
            Err(err) => {
                warn!(target: "feedback.queue", entry = %entry_id, error = %err, "feedback delivery failed, queueing");
                self.queue_report(payload, base, err.to_string()).await
            }
        }
    }

    async fn send_with_retry(&self, payload: &FeedbackPayload) -> Result<(), RelayError> {
        let mut last_error = RelayError::Internal("no delivery attempt made".into());
        for attempt in 0..self.config.retry_attempts {
            let delay = self.config.delay_before(attempt);
            if !delay.is_zero() {
                sleep(delay).await;
            }
            match self.relay.submit_feedback(payload).await {
                Ok(()) => return Ok(()),
                Err(err) => {
                    debug!(target: "feedback.queue", attempt = attempt + 1, error = %err, "feedback attempt failed");
                    let transient = err.is_transient();
                    last_error = err;
                    if !transient {
                        break;
                    }
                }
            }
        }
        Err(last_error)
    }

    async fn queue_report(
        self: &Arc<Self>,
        payload: FeedbackPayload,
        base: FeedbackEntry,
        reason: String,
    ) -> SubmitOutcome {
        let entry_id = base.id.clone();
        let item = FeedbackQueueItem {
            id: entry_id.clone(),
            payload,
            history_snapshot: base.clone(),
            retry_count: 0,
            last_error: Some(reason.clone()),
        };
        match self.enqueue(item).await {
            Ok(count) => {
                self.bus.emit(Notification::FeedbackPending { count });
                self.schedule_flush(self.config.flush_after_queue);
                let mut entry = base;
                entry.status = FeedbackStatus::Queued;
                entry.queued_at = Some(now_millis());
                entry.last_error = Some(reason.clone());
                self.add_history(entry).await;
                self.bus.emit(Notification::FeedbackQueued {
                    entry_id: entry_id.clone(),
                });
                SubmitOutcome::Queued { entry_id, reason }
            }
            Err(err) => {
                let message = err.to_string();
                warn!(target: "feedback.queue", entry = %entry_id, error = %message, "unable to queue feedback");
                let mut entry = base;
                entry.status = FeedbackStatus::Error;
                entry.last_error = Some(message.clone());
                self.add_history(entry).await;
                self.bus.emit(Notification::FeedbackError {
                    entry_id: entry_id.clone(),
                    message: message.clone(),
                });
                SubmitOutcome::Failed { entry_id, message }
            }
        }
    }

    async fn enqueue(&self, item: FeedbackQueueItem) -> Result<usize, StoreError> {
        let Some(store) = self.store.as_ref() else {
            return Err(StoreError::Unavailable("no persisted store".into()));
        };
        let _io = self.store_lock.lock().await;
        let mut queue: Vec<FeedbackQueueItem> =
            read_list(store, &self.config.pending_key).await?;
        if !queue.iter().any(|existing| existing.id == item.id) {
            queue.push(item);
        }
        write_list(store, &self.config.pending_key, &queue).await?;
        Ok(queue.len())
    }

    /// Arms the flush timer. An armed timer is only replaced by an earlier deadline.
    pub fn schedule_flush(self: &Arc<Self>, delay: Duration) {
        if self.store.is_none() {
            return;
        }
        let deadline = Instant::now() + delay;
        let mut slot = self.timer.lock();
        if let Some(armed) = slot.as_ref() {
            if !armed.handle.is_finished() && armed.deadline <= deadline {
                return;
            }
            armed.handle.abort();
        }
        let id = self.timer_seq.fetch_add(1, Ordering::Relaxed);
        let queue = Arc::clone(self);
        let handle = tokio::spawn(async move {
            sleep_until(deadline).await;
            queue.disarm(id);
            queue.flush().await;
        });
        *slot = Some(ArmedTimer {
            id,
            deadline,
            handle,
        });
    }

    fn disarm(&self, id: u64) {
        let mut slot = self.timer.lock();
        if slot.as_ref().is_some_and(|armed| armed.id == id) {
            slot.take();
        }
    }

    /// Cancels any armed flush timer.
    pub fn shutdown(&self) {
        if let Some(armed) = self.timer.lock().take() {
            armed.handle.abort();
        }
    }

    pub fn has_armed_timer(&self) -> bool {
        self.timer
            .lock()
            .as_ref()
            .is_some_and(|armed| !armed.handle.is_finished())
    }

    /// Attempts every queued item once. Overlapping calls return a skipped report.
    pub async fn flush(self: &Arc<Self>) -> FlushReport {
        let Some(store) = self.store.as_ref() else {
            return FlushReport::default();
        };
        if self.flushing.swap(true, Ordering::SeqCst) {
            debug!(target: "feedback.queue", "flush already running");
            return FlushReport {
                skipped: true,
                ..FlushReport::default()
            };
        }
        let _guard = FlushGuard(&self.flushing);

        let queue = self.pending().await;
        if queue.is_empty() {
            self.bus.emit(Notification::FeedbackPending { count: 0 });
            return FlushReport::default();
        }

        let mut report = FlushReport {
            attempted: queue.len(),
            ..FlushReport::default()
        };
        let mut handled = HashSet::new();
        let mut remaining = Vec::new();
        for mut item in queue {
            handled.insert(item.id.clone());
            match self.relay.submit_feedback(&item.payload).await {
                Ok(()) => {
                    report.sent += 1;
                    let sent_at = now_millis();
                    self.update_history(&item.history_snapshot, |entry| {
                        entry.status = FeedbackStatus::Sent;
                        entry.sent_at = Some(sent_at);
                        entry.last_error = None;
                    })
                    .await;
                    self.bus.emit(Notification::FeedbackSent {
                        entry_id: item.id.clone(),
                    });
                }
                Err(err) => {
                    item.retry_count += 1;
                    item.last_error = Some(err.to_string());
                    let retries = item.retry_count;
                    let last_error = item.last_error.clone();
                    self.update_history(&item.history_snapshot, |entry| {
                        entry.status = FeedbackStatus::Queued;
                        entry.retries = retries;
                        entry.last_error = last_error;
                    })
                    .await;
                    remaining.push(item);
                }
            }
        }

        let persisted = {
            let _io = self.store_lock.lock().await;
            // Items queued while this cycle was sending are kept.
            match read_list::<FeedbackQueueItem>(store, &self.config.pending_key).await {
                Ok(current) => remaining.extend(
                    current
                        .into_iter()
                        .filter(|item| !handled.contains(&item.id)),
                ),
                Err(err) => {
                    warn!(target: "feedback.queue", error = %err, "failed to re-read pending queue")
                }
            }
            write_list(store, &self.config.pending_key, &remaining).await
        };
        if let Err(err) = persisted {
            warn!(target: "feedback.queue", error = %err, "failed to persist pending queue");
        }

        report.remaining = remaining.len();
        self.bus.emit(Notification::FeedbackPending {
            count: report.remaining,
        });
        info!(
            target: "feedback.queue",
            attempted = report.attempted,
            sent = report.sent,
            remaining = report.remaining,
            "flush cycle finished"
        );
        if report.remaining > 0 {
            self.schedule_flush(self.config.flush_retry);
        }
        report
    }

    /// Persisted queue contents; empty when the store is missing or unreadable.
    pub async fn pending(&self) -> Vec<FeedbackQueueItem> {
        let Some(store) = self.store.as_ref() else {
            return Vec::new();
        };
        match read_list(store, &self.config.pending_key).await {
            Ok(items) => items,
            Err(err) => {
                warn!(target: "feedback.queue", error = %err, "failed to read pending queue");
                Vec::new()
            }
        }
    }

    /// Most-recent-first history log.
    pub async fn history(&self) -> Vec<FeedbackEntry> {
        let Some(store) = self.store.as_ref() else {
            return Vec::new();
        };
        match read_list(store, &self.config.history_key).await {
            Ok(entries) => entries,
            Err(err) => {
                warn!(target: "feedback.queue", error = %err, "failed to read feedback history");
                Vec::new()
            }
        }
    }

    async fn add_history(&self, entry: FeedbackEntry) {
        self.modify_history(&entry.id.clone(), move |history| {
            history.retain(|existing| existing.id != entry.id);
            history.insert(0, entry);
        })
        .await;
    }

    async fn update_history<F>(&self, fallback: &FeedbackEntry, update: F)
    where
        F: FnOnce(&mut FeedbackEntry),
    {
        let fallback = fallback.clone();
        self.modify_history(&fallback.id.clone(), move |history| {
            match history.iter_mut().find(|entry| entry.id == fallback.id) {
                Some(entry) => update(entry),
                None => {
                    let mut entry = fallback;
                    update(&mut entry);
                    history.insert(0, entry);
                }
            }
        })
        .await;
    }

    async fn modify_history<F>(&self, entry_id: &str, change: F)
    where
        F: FnOnce(&mut Vec<FeedbackEntry>),
    {
        let Some(store) = self.store.as_ref() else {
            return;
        };
        let result = {
            let _io = self.store_lock.lock().await;
            let mut history = read_list::<FeedbackEntry>(store, &self.config.history_key)
                .await
                .unwrap_or_else(|err| {
                    warn!(target: "feedback.queue", error = %err, "discarding unreadable feedback history");
                    Vec::new()
                });
            change(&mut history);
            history.truncate(self.config.history_limit);
            write_list(store, &self.config.history_key, &history).await
        };
        match result {
            Ok(()) => self.bus.emit(Notification::FeedbackHistoryUpdated {
                entry_id: entry_id.to_string(),
            }),
            Err(err) => {
                warn!(target: "feedback.queue", entry = %entry_id, error = %err, "failed to persist feedback history")
            }
        }
    }
}

impl Drop for FeedbackQueue {
    fn drop(&mut self) {
        if let Some(armed) = self.timer.get_mut().take() {
            armed.handle.abort();
        }
    }
}

async fn read_list<T>(store: &SharedStore, key: &str) -> Result<Vec<T>, StoreError>
where
    T: DeserializeOwned,
{
    match store.read(key).await? {
        None => Ok(Vec::new()),
        Some(value) if value.is_array() => Ok(serde_json::from_value(value)?),
        Some(_) => {
            warn!(target: "feedback.queue", key, "persisted value is not a list, ignoring it");
            Ok(Vec::new())
        }
    }
}

async fn write_list<T>(store: &SharedStore, key: &str, items: &[T]) -> Result<(), StoreError>
where
    T: Serialize,
{
    store.write(key, serde_json::to_value(items)?).await
}
