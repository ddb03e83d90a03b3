//! Backend-agnostic persistence traits.
//!
//! `PlanStore` covers plans and their owned tasks (plan-create and
//! recompute are transactionally coupled across both tables). `NotificationStore`
//! covers notification profiles and the reminder outbox, which the scanner
//! and dispatcher routinely touch together. Domain-facing record types here
//! are distinct from the `schema::*Row` DB rows callers never see.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;
use uuid::Uuid;

use crate::error::StorageResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanStatus {
    Creating,
    Active,
    Archived,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Todo,
    InProgress,
    Done,
    Blocked,
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutboxStatus {
    Pending,
    Sending,
    Sent,
    Dead,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    Retryable,
    Permanent,
}

impl PlanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanStatus::Creating => "creating",
            PlanStatus::Active => "active",
            PlanStatus::Archived => "archived",
        }
    }
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Todo => "todo",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Done => "done",
            TaskStatus::Blocked => "blocked",
            TaskStatus::Skipped => "skipped",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "todo" => Some(TaskStatus::Todo),
            "in_progress" => Some(TaskStatus::InProgress),
            "done" => Some(TaskStatus::Done),
            "blocked" => Some(TaskStatus::Blocked),
            "skipped" => Some(TaskStatus::Skipped),
            _ => None,
        }
    }
}

impl OutboxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutboxStatus::Pending => "pending",
            OutboxStatus::Sending => "sending",
            OutboxStatus::Sent => "sent",
            OutboxStatus::Dead => "dead",
        }
    }
}

impl FailureClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureClass::Retryable => "retryable",
            FailureClass::Permanent => "permanent",
        }
    }
}

#[derive(Debug, Clone)]
pub struct PlanRecord {
    pub id: Uuid,
    pub template_key: String,
    pub facts: Value,
    pub snapshot: Value,
    pub status: PlanStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewTask {
    pub task_key: String,
    pub title: String,
    pub description: Option<String>,
    pub due_date: Option<NaiveDate>,
    pub metadata: Value,
    pub sort_key: i64,
    /// Set by the caller (the plan service) when recompute is preserving a
    /// previously-completed task.
    pub restore_done_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct TaskRecord {
    pub id: Uuid,
    pub plan_id: Uuid,
    pub task_key: String,
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub due_date: Option<NaiveDate>,
    pub metadata: Value,
    pub sort_key: i64,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Plan and task persistence (C8/C9's storage half).
#[async_trait]
pub trait PlanStore: Send + Sync {
    async fn create_plan(
        &self,
        template_key: &str,
        facts: Value,
        snapshot: Value,
        tasks: Vec<NewTask>,
    ) -> StorageResult<(PlanRecord, Vec<TaskRecord>)>;

    async fn get_plan(&self, plan_id: Uuid) -> StorageResult<PlanRecord>;

    /// Ids of every plan in `active` status, for the periodic driver to feed
    /// into the reminder scanner.
    async fn list_active_plan_ids(&self) -> StorageResult<Vec<Uuid>>;

    /// Overwrite `facts` alone, leaving `snapshot` and the task set untouched.
    /// Used when a fact patch is persisted without triggering a recompute.
    async fn update_facts(&self, plan_id: Uuid, facts: Value) -> StorageResult<PlanRecord>;

    /// Overwrite `facts`/`snapshot` and replace all tasks in one transaction.
    /// Tasks whose `restore_done_at` is set are inserted as `done` with that
    /// `completed_at`; all others are inserted as `todo`.
    async fn replace_plan_and_tasks(
        &self,
        plan_id: Uuid,
        facts: Value,
        snapshot: Value,
        tasks: Vec<NewTask>,
    ) -> StorageResult<(PlanRecord, Vec<TaskRecord>)>;

    async fn list_tasks(&self, plan_id: Uuid) -> StorageResult<Vec<TaskRecord>>;

    async fn get_task(&self, plan_id: Uuid, task_id: Uuid) -> StorageResult<TaskRecord>;

    async fn update_task_status(
        &self,
        plan_id: Uuid,
        task_id: Uuid,
        status: TaskStatus,
        completed_at: Option<DateTime<Utc>>,
    ) -> StorageResult<TaskRecord>;
}

#[derive(Debug, Clone)]
pub struct ProfilePatch {
    pub email: Option<String>,
    pub email_consent: Option<bool>,
    pub locale: Option<String>,
    pub timezone: Option<String>,
    pub reminder_due_soon_enabled: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct NotificationProfileRecord {
    pub id: Uuid,
    pub plan_id: Uuid,
    pub email: Option<String>,
    pub email_consent: bool,
    pub locale: String,
    pub timezone: String,
    pub reminder_due_soon_enabled: bool,
    pub max_reminders_per_day: i32,
    pub unsubscribed_at: Option<DateTime<Utc>>,
    pub unsubscribe_token_hash: Option<String>,
    pub unsubscribe_token_version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewOutboxItem {
    pub profile_id: Uuid,
    pub dedupe_key_raw: String,
    pub payload: Value,
}

#[derive(Debug, Clone)]
pub struct OutboxRecord {
    pub id: Uuid,
    pub profile_id: Uuid,
    pub channel: String,
    pub kind: String,
    pub dedupe_key_raw: String,
    pub payload: Value,
    pub status: OutboxStatus,
    pub failure_class: Option<FailureClass>,
    pub next_attempt_at: DateTime<Utc>,
    pub attempt_count: i32,
    pub last_error_code: Option<String>,
    pub last_error_message: Option<String>,
    pub provider_message_id: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Notification profile and outbox persistence (C10/C11's storage half).
#[async_trait]
pub trait NotificationStore: Send + Sync {
    async fn get_or_create_profile(&self, plan_id: Uuid) -> StorageResult<NotificationProfileRecord>;

    async fn upsert_profile(
        &self,
        plan_id: Uuid,
        patch: ProfilePatch,
    ) -> StorageResult<NotificationProfileRecord>;

    async fn set_unsubscribe_token(
        &self,
        profile_id: Uuid,
        token_hash: String,
        version: i32,
    ) -> StorageResult<NotificationProfileRecord>;

    async fn find_profile_by_token_hash(
        &self,
        token_hash: &str,
    ) -> StorageResult<Option<NotificationProfileRecord>>;

    async fn mark_unsubscribed(&self, profile_id: Uuid, at: DateTime<Utc>) -> StorageResult<()>;

    async fn count_created_today(
        &self,
        profile_id: Uuid,
        start_utc: DateTime<Utc>,
        end_utc: DateTime<Utc>,
    ) -> StorageResult<i64>;

    /// Tasks for `plan_id` with `status=todo`, non-null `due_date` within
    /// `[start, end]`, ordered by `(due_date asc, sort_key asc)`.
    async fn due_soon_tasks(
        &self,
        plan_id: Uuid,
        start: NaiveDate,
        end: NaiveDate,
    ) -> StorageResult<Vec<TaskRecord>>;

    /// Insert a pending row with `next_attempt_at = now` and zero attempts.
    /// `Ok(None)` on a `dedupe_key_raw` collision — the caller treats that
    /// as a successful no-op, not an error.
    async fn enqueue_due_soon(
        &self,
        item: NewOutboxItem,
        now: DateTime<Utc>,
    ) -> StorageResult<Option<OutboxRecord>>;

    async fn lock_pending_batch(&self, now: DateTime<Utc>, limit: u32) -> StorageResult<Vec<OutboxRecord>>;

    async fn mark_sent(
        &self,
        outbox_id: Uuid,
        provider_message_id: Option<String>,
        now: DateTime<Utc>,
    ) -> StorageResult<()>;

    async fn mark_failed_or_retry(
        &self,
        outbox_id: Uuid,
        status: OutboxStatus,
        failure_class: FailureClass,
        error_code: String,
        error_message: String,
        next_attempt_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> StorageResult<()>;

    async fn reschedule_quiet_hours(
        &self,
        outbox_id: Uuid,
        next_attempt_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> StorageResult<()>;

    /// Resets rows stuck in `sending` past `threshold` back to `pending`.
    /// Returns the number recovered.
    async fn recover_stuck_sending(
        &self,
        threshold: DateTime<Utc>,
        next_attempt_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> StorageResult<u64>;
}
