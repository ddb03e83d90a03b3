//! Outbox Dispatcher (C13): recovers stuck items, claims a batch of pending
//! ones, and attempts delivery with exponential backoff and quiet-hours
//! deferral.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use tracing::instrument;

use lifeplan_state::{FailureClass as StoreFailureClass, NotificationStore, OutboxRecord, OutboxStatus};

use crate::notifications::provider::{EmailProvider, SendStatus};
use crate::notifications::templates::render_task_due_soon;
use crate::notifications::time::{is_within_send_window, next_send_window_start};

const BACKOFF_LADDER_MINUTES: [i64; 5] = [1, 5, 15, 60, 180];
const MAX_ATTEMPTS: i32 = 5;
const STUCK_SENDING_THRESHOLD_MINUTES: i64 = 15;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    pub picked: u32,
    pub sent: u32,
    pub retried: u32,
    pub dead: u32,
    pub recovered_stuck: u32,
    pub skipped_quiet_hours: u32,
}

pub struct OutboxDispatcher {
    store: Arc<dyn NotificationStore>,
    provider: Arc<dyn EmailProvider>,
    batch_size: u32,
}

impl OutboxDispatcher {
    pub fn new(store: Arc<dyn NotificationStore>, provider: Arc<dyn EmailProvider>, batch_size: u32) -> Self {
        Self { store, provider, batch_size }
    }

    pub async fn dispatch_pending_outbox(&self) -> DispatchSummary {
        self.dispatch_pending_outbox_at(Utc::now()).await
    }

    /// [`dispatch_pending_outbox`](Self::dispatch_pending_outbox) with an
    /// explicit clock.
    #[instrument(skip(self))]
    pub async fn dispatch_pending_outbox_at(&self, now: DateTime<Utc>) -> DispatchSummary {
        let mut summary = DispatchSummary::default();

        let threshold = now - Duration::minutes(STUCK_SENDING_THRESHOLD_MINUTES);
        match self.store.recover_stuck_sending(threshold, next_send_window_start(now), now).await {
            Ok(recovered) => summary.recovered_stuck = recovered as u32,
            Err(e) => tracing::warn!(error = %e, "failed to recover stuck sending items"),
        }

        let batch = match self.store.lock_pending_batch(now, self.batch_size).await {
            Ok(b) => b,
            Err(e) => {
                tracing::error!(error = %e, "failed to claim outbox batch");
                return summary;
            }
        };
        summary.picked = batch.len() as u32;

        for item in batch {
            self.dispatch_one(&item, now, &mut summary).await;
        }

        tracing::info!(?summary, "outbox dispatch pass complete");
        summary
    }

    async fn dispatch_one(&self, item: &OutboxRecord, now: DateTime<Utc>, summary: &mut DispatchSummary) {
        if !is_within_send_window(now) {
            let next = next_send_window_start(now);
            let _ = self.store.reschedule_quiet_hours(item.id, next, now).await;
            summary.skipped_quiet_hours += 1;
            return;
        }

        let to_email = item.payload.get("to_email").and_then(|v| v.as_str()).unwrap_or("");
        let rendered = render_task_due_soon(&item.payload);
        let result = self.provider.send(to_email, &rendered).await;

        match result.status {
            SendStatus::Sent => {
                let _ = self.store.mark_sent(item.id, result.provider_message_id, now).await;
                summary.sent += 1;
            }
            SendStatus::Dead => {
                self.mark_failed(item, now, StoreFailureClass::Permanent, result.error_code, result.error_message).await;
                summary.dead += 1;
            }
            SendStatus::Pending => {
                let attempt_count = item.attempt_count + 1;
                if attempt_count >= MAX_ATTEMPTS {
                    self.mark_failed(
                        item,
                        now,
                        StoreFailureClass::Permanent,
                        Some("retry_exhausted".to_string()),
                        Some("max retry attempts exceeded".to_string()),
                    )
                    .await;
                    summary.dead += 1;
                } else {
                    self.retry_with_backoff(item, now, attempt_count, result.error_code, result.error_message).await;
                    summary.retried += 1;
                }
            }
        }
    }

    async fn mark_failed(
        &self,
        item: &OutboxRecord,
        now: DateTime<Utc>,
        failure_class: StoreFailureClass,
        error_code: Option<String>,
        error_message: Option<String>,
    ) {
        let _ = self
            .store
            .mark_failed_or_retry(
                item.id,
                OutboxStatus::Dead,
                failure_class,
                error_code.unwrap_or_else(|| "UNKNOWN".to_string()),
                error_message.unwrap_or_default(),
                now,
                now,
            )
            .await;
    }

    async fn retry_with_backoff(
        &self,
        item: &OutboxRecord,
        now: DateTime<Utc>,
        attempt_count: i32,
        error_code: Option<String>,
        error_message: Option<String>,
    ) {
        let mut next_attempt_at = compute_backoff(now, attempt_count);
        if !is_within_send_window(next_attempt_at) {
            next_attempt_at = next_send_window_start(next_attempt_at);
        }

        let _ = self
            .store
            .mark_failed_or_retry(
                item.id,
                OutboxStatus::Pending,
                StoreFailureClass::Retryable,
                error_code.unwrap_or_else(|| "UNKNOWN".to_string()),
                error_message.unwrap_or_default(),
                next_attempt_at,
                now,
            )
            .await;
    }
}

fn compute_backoff(now: DateTime<Utc>, attempt_count: i32) -> DateTime<Utc> {
    let rung = ((attempt_count - 1).max(0) as usize).min(BACKOFF_LADDER_MINUTES.len() - 1);
    let base_minutes = BACKOFF_LADDER_MINUTES[rung] as f64;
    let jitter = rand::thread_rng().gen_range(0.9..=1.1);
    let delay_seconds = (base_minutes * 60.0 * jitter) as i64;
    now + Duration::seconds(delay_seconds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifications::provider::fake::FakeEmailProvider;
    use crate::notifications::provider::{FailureClass as ProviderFailureClass, ProviderSendResult};
    use lifeplan_state::{MemoryNotificationStore, NewOutboxItem};
    use serde_json::json;
    use uuid::Uuid;

    /// 2026-02-25T08:05Z is 09:05 Berlin (CET), inside the send window.
    fn in_window_now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-02-25T08:05:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    /// 2026-02-25T21:30Z is 22:30 Berlin (CET), outside the send window.
    fn quiet_now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-02-25T21:30:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    async fn seed_item(store: &MemoryNotificationStore, now: DateTime<Utc>) -> OutboxRecord {
        store
            .enqueue_due_soon(
                NewOutboxItem {
                    profile_id: Uuid::new_v4(),
                    dedupe_key_raw: format!("key-{}", Uuid::new_v4()),
                    payload: json!({"to_email": "a@example.com", "tasks": []}),
                },
                now,
            )
            .await
            .unwrap()
            .unwrap()
    }

    fn sent_result() -> ProviderSendResult {
        ProviderSendResult {
            status: SendStatus::Sent,
            failure_class: None,
            error_code: None,
            error_message: None,
            provider_message_id: Some("id-1".into()),
        }
    }

    #[tokio::test]
    async fn successful_send_marks_item_sent() {
        let store = Arc::new(MemoryNotificationStore::new());
        let provider = Arc::new(FakeEmailProvider::always(sent_result()));
        let dispatcher = OutboxDispatcher::new(store.clone(), provider, 10);
        seed_item(&store, in_window_now()).await;

        let summary = dispatcher.dispatch_pending_outbox_at(in_window_now()).await;
        assert_eq!(summary.picked, 1);
        assert_eq!(summary.sent, 1);

        let item = &store.outbox_snapshot()[0];
        assert_eq!(item.status, lifeplan_state::OutboxStatus::Sent);
        assert!(item.sent_at.is_some());
        assert_eq!(item.provider_message_id.as_deref(), Some("id-1"));
    }

    #[tokio::test]
    async fn permanent_failure_marks_item_dead() {
        let store = Arc::new(MemoryNotificationStore::new());
        let provider = Arc::new(FakeEmailProvider::always(ProviderSendResult {
            status: SendStatus::Dead,
            failure_class: Some(ProviderFailureClass::Permanent),
            error_code: Some("BREVO_API_KEY_MISSING".into()),
            error_message: Some("missing key".into()),
            provider_message_id: None,
        }));
        let dispatcher = OutboxDispatcher::new(store.clone(), provider, 10);
        seed_item(&store, in_window_now()).await;

        let summary = dispatcher.dispatch_pending_outbox_at(in_window_now()).await;
        assert_eq!(summary.picked, 1);
        assert_eq!(summary.dead, 1);

        let item = &store.outbox_snapshot()[0];
        assert_eq!(item.status, lifeplan_state::OutboxStatus::Dead);
        assert_eq!(item.attempt_count, 1);
    }

    #[tokio::test]
    async fn quiet_hours_reschedules_without_counting_an_attempt() {
        let store = Arc::new(MemoryNotificationStore::new());
        let provider = Arc::new(FakeEmailProvider::always(sent_result()));
        let dispatcher = OutboxDispatcher::new(store.clone(), provider.clone(), 10);
        // Enqueued at 06:00 Berlin, dispatched at 22:30 Berlin the same day.
        let enqueued_at = DateTime::parse_from_rfc3339("2026-02-25T05:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        seed_item(&store, enqueued_at).await;

        let summary = dispatcher.dispatch_pending_outbox_at(quiet_now()).await;
        assert_eq!(summary.picked, 1);
        assert_eq!(summary.skipped_quiet_hours, 1);
        assert_eq!(summary.sent, 0);
        assert!(provider.sent.lock().unwrap().is_empty(), "no send may happen in quiet hours");

        let item = &store.outbox_snapshot()[0];
        assert_eq!(item.status, lifeplan_state::OutboxStatus::Pending);
        assert_eq!(item.attempt_count, 0);
        assert_eq!(item.last_error_code.as_deref(), Some("QUIET_HOURS"));
        assert_eq!(item.next_attempt_at, next_send_window_start(quiet_now()));
    }

    #[tokio::test]
    async fn retryable_failure_backs_off_and_stays_pending() {
        let store = Arc::new(MemoryNotificationStore::new());
        let provider = Arc::new(FakeEmailProvider::always(ProviderSendResult {
            status: SendStatus::Pending,
            failure_class: Some(ProviderFailureClass::Retryable),
            error_code: Some("HTTP_503".into()),
            error_message: Some("upstream unavailable".into()),
            provider_message_id: None,
        }));
        let dispatcher = OutboxDispatcher::new(store.clone(), provider, 10);
        seed_item(&store, in_window_now()).await;

        let summary = dispatcher.dispatch_pending_outbox_at(in_window_now()).await;
        assert_eq!(summary.retried, 1);

        let item = &store.outbox_snapshot()[0];
        assert_eq!(item.status, lifeplan_state::OutboxStatus::Pending);
        assert_eq!(item.attempt_count, 1);
        assert!(item.next_attempt_at > in_window_now());
    }

    #[tokio::test]
    async fn fifth_retryable_failure_exhausts_retries_and_goes_dead() {
        let store = Arc::new(MemoryNotificationStore::new());
        let provider = Arc::new(FakeEmailProvider::always(ProviderSendResult {
            status: SendStatus::Pending,
            failure_class: Some(ProviderFailureClass::Retryable),
            error_code: Some("TIMEOUT".into()),
            error_message: Some("timed out".into()),
            provider_message_id: None,
        }));
        let dispatcher = OutboxDispatcher::new(store.clone(), provider, 10);
        let start = DateTime::parse_from_rfc3339("2026-02-25T07:30:00Z")
            .unwrap()
            .with_timezone(&Utc);
        seed_item(&store, start).await;

        // Each pass lands after the previous backoff (max rung 60min * 1.1
        // jitter) while staying inside the Berlin send window.
        let mut dead = 0;
        for hours in [0i64, 1, 2, 3, 5] {
            let summary = dispatcher.dispatch_pending_outbox_at(start + Duration::hours(hours)).await;
            dead += summary.dead;
        }
        assert_eq!(dead, 1);

        let item = &store.outbox_snapshot()[0];
        assert_eq!(item.status, lifeplan_state::OutboxStatus::Dead);
        assert_eq!(item.attempt_count, 5);
        assert_eq!(item.last_error_code.as_deref(), Some("retry_exhausted"));
    }

    #[test]
    fn backoff_ladder_indexes_by_attempt_count_minus_one_capped_at_four() {
        let now = Utc::now();
        for (attempt, expected_minutes) in [(1, 1), (2, 5), (3, 15), (4, 60), (5, 180), (9, 180)] {
            let next = compute_backoff(now, attempt);
            let delta = (next - now).num_seconds() as f64;
            let expected = expected_minutes as f64 * 60.0;
            assert!(
                delta >= expected * 0.85 && delta <= expected * 1.15,
                "attempt {attempt}: expected ~{expected}s, got {delta}s"
            );
        }
    }
}
