//! SurrealDB-backed `NotificationStore`.
//!
//! `lock_pending_batch` emulates `SELECT ... FOR UPDATE SKIP LOCKED` with a
//! conditional claim per candidate row (`UPDATE ... WHERE status = 'pending'`)
//! since SurrealDB has no native row-lock primitive: a row another dispatcher
//! already claimed simply fails the `WHERE` and is dropped from the batch.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use uuid::Uuid;

use crate::error::{StorageError, StorageResult};
use crate::schema::NotificationProfileRow;
use crate::storage_traits::*;

pub struct SurrealNotificationStore {
    db: Surreal<Any>,
}

impl SurrealNotificationStore {
    pub fn new(db: Surreal<Any>) -> Self {
        Self { db }
    }

    async fn fetch_profile_by_plan(&self, plan_id: Uuid) -> StorageResult<Option<NotificationProfileRow>> {
        let mut res = self
            .db
            .query("SELECT * FROM notification_profiles WHERE plan_id = $id")
            .bind(("id", plan_id))
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        let rows: Vec<NotificationProfileRow> = res.take(0).map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(rows.into_iter().next())
    }
}

fn db_profile_to_record(row: NotificationProfileRow) -> NotificationProfileRecord {
    NotificationProfileRecord {
        id: row.profile_id,
        plan_id: row.plan_id,
        email: row.email,
        email_consent: row.email_consent,
        locale: row.locale,
        timezone: row.timezone,
        reminder_due_soon_enabled: row.reminder_due_soon_enabled,
        max_reminders_per_day: row.max_reminders_per_day,
        unsubscribed_at: row.unsubscribed_at,
        unsubscribe_token_hash: row.unsubscribe_token_hash,
        unsubscribe_token_version: row.unsubscribe_token_version,
        created_at: row.created_at,
        updated_at: row.updated_at,
    }
}

fn db_outbox_to_record(row: crate::schema::NotificationOutboxRow) -> StorageResult<OutboxRecord> {
    let status = match row.status.as_str() {
        "pending" => OutboxStatus::Pending,
        "sending" => OutboxStatus::Sending,
        "sent" => OutboxStatus::Sent,
        "dead" => OutboxStatus::Dead,
        other => return Err(StorageError::Backend(format!("unknown outbox status: {other}"))),
    };
    let failure_class = match row.failure_class.as_deref() {
        Some("retryable") => Some(FailureClass::Retryable),
        Some("permanent") => Some(FailureClass::Permanent),
        Some(other) => return Err(StorageError::Backend(format!("unknown failure class: {other}"))),
        None => None,
    };
    Ok(OutboxRecord {
        id: row.outbox_id,
        profile_id: row.profile_id,
        channel: row.channel,
        kind: row.kind,
        dedupe_key_raw: row.dedupe_key_raw,
        payload: row.payload,
        status,
        failure_class,
        next_attempt_at: row.next_attempt_at,
        attempt_count: row.attempt_count,
        last_error_code: row.last_error_code,
        last_error_message: row.last_error_message,
        provider_message_id: row.provider_message_id,
        sent_at: row.sent_at,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}

#[async_trait]
impl NotificationStore for SurrealNotificationStore {
    async fn get_or_create_profile(&self, plan_id: Uuid) -> StorageResult<NotificationProfileRecord> {
        if let Some(row) = self.fetch_profile_by_plan(plan_id).await? {
            return Ok(db_profile_to_record(row));
        }
        let row = NotificationProfileRow::new(plan_id);
        let created: Option<NotificationProfileRow> = self
            .db
            .create("notification_profiles")
            .content(row)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        let row = created.ok_or_else(|| StorageError::Backend("failed to create notification profile".into()))?;
        Ok(db_profile_to_record(row))
    }

    async fn upsert_profile(&self, plan_id: Uuid, patch: ProfilePatch) -> StorageResult<NotificationProfileRecord> {
        self.get_or_create_profile(plan_id).await?;
        let now = Utc::now();
        let mut res = self
            .db
            .query(
                "UPDATE notification_profiles SET \
                 email = $email ?? email, \
                 email_consent = $email_consent ?? email_consent, \
                 locale = $locale ?? locale, \
                 timezone = $timezone ?? timezone, \
                 reminder_due_soon_enabled = $reminder_due_soon_enabled ?? reminder_due_soon_enabled, \
                 updated_at = $now \
                 WHERE plan_id = $plan_id",
            )
            .bind(("plan_id", plan_id))
            .bind(("email", patch.email))
            .bind(("email_consent", patch.email_consent))
            .bind(("locale", patch.locale))
            .bind(("timezone", patch.timezone))
            .bind(("reminder_due_soon_enabled", patch.reminder_due_soon_enabled))
            .bind(("now", surrealdb::sql::Datetime::from(now)))
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        let rows: Vec<NotificationProfileRow> = res.take(0).map_err(|e| StorageError::Backend(e.to_string()))?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| StorageError::ProfileNotFound(plan_id.to_string()))?;
        Ok(db_profile_to_record(row))
    }

    async fn set_unsubscribe_token(
        &self,
        profile_id: Uuid,
        token_hash: String,
        version: i32,
    ) -> StorageResult<NotificationProfileRecord> {
        let now = Utc::now();
        let mut res = self
            .db
            .query(
                "UPDATE notification_profiles SET \
                 unsubscribe_token_hash = $hash, unsubscribe_token_version = $version, updated_at = $now \
                 WHERE profile_id = $id",
            )
            .bind(("id", profile_id))
            .bind(("hash", token_hash))
            .bind(("version", version))
            .bind(("now", surrealdb::sql::Datetime::from(now)))
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        let rows: Vec<NotificationProfileRow> = res.take(0).map_err(|e| StorageError::Backend(e.to_string()))?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| StorageError::ProfileNotFound(profile_id.to_string()))?;
        Ok(db_profile_to_record(row))
    }

    async fn find_profile_by_token_hash(
        &self,
        token_hash: &str,
    ) -> StorageResult<Option<NotificationProfileRecord>> {
        let mut res = self
            .db
            .query("SELECT * FROM notification_profiles WHERE unsubscribe_token_hash = $hash")
            .bind(("hash", token_hash.to_string()))
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        let rows: Vec<NotificationProfileRow> = res.take(0).map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(rows.into_iter().next().map(db_profile_to_record))
    }

    async fn mark_unsubscribed(&self, profile_id: Uuid, at: DateTime<Utc>) -> StorageResult<()> {
        self.db
            .query(
                "UPDATE notification_profiles SET unsubscribed_at = $at, updated_at = $at \
                 WHERE profile_id = $id AND unsubscribed_at = NONE",
            )
            .bind(("id", profile_id))
            .bind(("at", surrealdb::sql::Datetime::from(at)))
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn count_created_today(
        &self,
        profile_id: Uuid,
        start_utc: DateTime<Utc>,
        end_utc: DateTime<Utc>,
    ) -> StorageResult<i64> {
        let mut res = self
            .db
            .query(
                "SELECT count() AS total FROM notification_outbox \
                 WHERE profile_id = $id AND created_at >= $start AND created_at < $end GROUP ALL",
            )
            .bind(("id", profile_id))
            .bind(("start", surrealdb::sql::Datetime::from(start_utc)))
            .bind(("end", surrealdb::sql::Datetime::from(end_utc)))
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        #[derive(serde::Deserialize)]
        struct Count {
            total: i64,
        }
        let rows: Vec<Count> = res.take(0).map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(rows.into_iter().next().map(|c| c.total).unwrap_or(0))
    }

    async fn due_soon_tasks(
        &self,
        plan_id: Uuid,
        start: NaiveDate,
        end: NaiveDate,
    ) -> StorageResult<Vec<TaskRecord>> {
        let mut res = self
            .db
            .query(
                "SELECT * FROM tasks WHERE plan_id = $plan_id AND status = 'todo' \
                 AND due_date != NONE AND due_date >= $start AND due_date <= $end \
                 ORDER BY due_date ASC, sort_key ASC",
            )
            .bind(("plan_id", plan_id))
            .bind(("start", start))
            .bind(("end", end))
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        let rows: Vec<crate::schema::TaskRow> = res.take(0).map_err(|e| StorageError::Backend(e.to_string()))?;
        rows.into_iter()
            .map(|row| {
                let status = TaskStatus::parse(&row.status)
                    .ok_or_else(|| StorageError::Backend(format!("unknown task status: {}", row.status)))?;
                Ok(TaskRecord {
                    id: row.task_id,
                    plan_id: row.plan_id,
                    task_key: row.task_key,
                    title: row.title,
                    description: row.description,
                    status,
                    due_date: row.due_date,
                    metadata: row.metadata,
                    sort_key: row.sort_key,
                    completed_at: row.completed_at,
                    created_at: row.created_at,
                    updated_at: row.updated_at,
                })
            })
            .collect()
    }

    async fn enqueue_due_soon(&self, item: NewOutboxItem, now: DateTime<Utc>) -> StorageResult<Option<OutboxRecord>> {
        let row = crate::schema::NotificationOutboxRow::new(item.profile_id, item.dedupe_key_raw.clone(), item.payload, now);
        let result: Result<Option<crate::schema::NotificationOutboxRow>, surrealdb::Error> =
            self.db.create("notification_outbox").content(row).await;
        match result {
            Ok(created) => Ok(match created {
                Some(row) => Some(db_outbox_to_record(row)?),
                None => None,
            }),
            Err(e) => {
                let msg = e.to_string();
                if msg.contains("already contains") || msg.contains("idx_outbox_dedupe_key") {
                    Ok(None)
                } else {
                    Err(StorageError::Backend(msg))
                }
            }
        }
    }

    async fn lock_pending_batch(&self, now: DateTime<Utc>, limit: u32) -> StorageResult<Vec<OutboxRecord>> {
        let mut res = self
            .db
            .query(
                "SELECT * FROM notification_outbox WHERE status = 'pending' AND next_attempt_at <= $now \
                 ORDER BY next_attempt_at ASC LIMIT $limit",
            )
            .bind(("now", surrealdb::sql::Datetime::from(now)))
            .bind(("limit", limit))
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        let candidates: Vec<crate::schema::NotificationOutboxRow> =
            res.take(0).map_err(|e| StorageError::Backend(e.to_string()))?;

        let mut claimed = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            let mut res = self
                .db
                .query(
                    "UPDATE notification_outbox SET status = 'sending', updated_at = $now \
                     WHERE outbox_id = $id AND status = 'pending'",
                )
                .bind(("id", candidate.outbox_id))
                .bind(("now", surrealdb::sql::Datetime::from(now)))
                .await
                .map_err(|e| StorageError::Backend(e.to_string()))?;
            let rows: Vec<crate::schema::NotificationOutboxRow> =
                res.take(0).map_err(|e| StorageError::Backend(e.to_string()))?;
            if let Some(row) = rows.into_iter().next() {
                claimed.push(db_outbox_to_record(row)?);
            }
        }
        Ok(claimed)
    }

    async fn mark_sent(&self, outbox_id: Uuid, provider_message_id: Option<String>, now: DateTime<Utc>) -> StorageResult<()> {
        self.db
            .query(
                "UPDATE notification_outbox SET status = 'sent', provider_message_id = $pmid, \
                 sent_at = $now, updated_at = $now WHERE outbox_id = $id",
            )
            .bind(("id", outbox_id))
            .bind(("pmid", provider_message_id))
            .bind(("now", surrealdb::sql::Datetime::from(now)))
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn mark_failed_or_retry(
        &self,
        outbox_id: Uuid,
        status: OutboxStatus,
        failure_class: FailureClass,
        error_code: String,
        error_message: String,
        next_attempt_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> StorageResult<()> {
        let truncated: String = error_message.chars().take(500).collect();
        self.db
            .query(
                "UPDATE notification_outbox SET status = $status, failure_class = $fc, \
                 last_error_code = $code, last_error_message = $msg, next_attempt_at = $next, \
                 attempt_count = attempt_count + 1, updated_at = $now WHERE outbox_id = $id",
            )
            .bind(("id", outbox_id))
            .bind(("status", status.as_str().to_string()))
            .bind(("fc", failure_class.as_str().to_string()))
            .bind(("code", error_code))
            .bind(("msg", truncated))
            .bind(("next", surrealdb::sql::Datetime::from(next_attempt_at)))
            .bind(("now", surrealdb::sql::Datetime::from(now)))
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn reschedule_quiet_hours(&self, outbox_id: Uuid, next_attempt_at: DateTime<Utc>, now: DateTime<Utc>) -> StorageResult<()> {
        self.db
            .query(
                "UPDATE notification_outbox SET status = 'pending', last_error_code = 'QUIET_HOURS', \
                 next_attempt_at = $next, updated_at = $now WHERE outbox_id = $id",
            )
            .bind(("id", outbox_id))
            .bind(("next", surrealdb::sql::Datetime::from(next_attempt_at)))
            .bind(("now", surrealdb::sql::Datetime::from(now)))
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn recover_stuck_sending(
        &self,
        threshold: DateTime<Utc>,
        next_attempt_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> StorageResult<u64> {
        let mut res = self
            .db
            .query(
                "UPDATE notification_outbox SET status = 'pending', failure_class = 'retryable', \
                 last_error_code = 'stuck_sending_recovered', last_error_message = 'Recovered stale sending item', \
                 next_attempt_at = $next, updated_at = $now \
                 WHERE status = 'sending' AND updated_at < $threshold",
            )
            .bind(("threshold", surrealdb::sql::Datetime::from(threshold)))
            .bind(("next", surrealdb::sql::Datetime::from(next_attempt_at)))
            .bind(("now", surrealdb::sql::Datetime::from(now)))
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        let rows: Vec<crate::schema::NotificationOutboxRow> = res.take(0).map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(rows.len() as u64)
    }
}
