//! In-memory fakes for `PlanStore`/`NotificationStore` (testing only).

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::error::{StorageError, StorageResult};
use crate::storage_traits::*;

#[derive(Default)]
pub struct MemoryPlanStore {
    plans: Mutex<HashMap<Uuid, PlanRecord>>,
    tasks: Mutex<HashMap<Uuid, Vec<TaskRecord>>>,
}

impl MemoryPlanStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn materialize(plan_id: Uuid, tasks: Vec<NewTask>) -> Vec<TaskRecord> {
    let now = Utc::now();
    tasks
        .into_iter()
        .map(|t| TaskRecord {
            id: Uuid::new_v4(),
            plan_id,
            task_key: t.task_key,
            title: t.title,
            description: t.description,
            status: if t.restore_done_at.is_some() { TaskStatus::Done } else { TaskStatus::Todo },
            due_date: t.due_date,
            metadata: t.metadata,
            sort_key: t.sort_key,
            completed_at: t.restore_done_at,
            created_at: now,
            updated_at: now,
        })
        .collect()
}

#[async_trait]
impl PlanStore for MemoryPlanStore {
    async fn create_plan(
        &self,
        template_key: &str,
        facts: serde_json::Value,
        snapshot: serde_json::Value,
        tasks: Vec<NewTask>,
    ) -> StorageResult<(PlanRecord, Vec<TaskRecord>)> {
        let now = Utc::now();
        let plan_id = Uuid::new_v4();
        let plan = PlanRecord {
            id: plan_id,
            template_key: template_key.to_string(),
            facts,
            snapshot,
            status: PlanStatus::Active,
            created_at: now,
            updated_at: now,
        };
        let task_records = materialize(plan_id, tasks);
        self.plans.lock().unwrap().insert(plan_id, plan.clone());
        self.tasks.lock().unwrap().insert(plan_id, task_records.clone());
        Ok((plan, task_records))
    }

    async fn get_plan(&self, plan_id: Uuid) -> StorageResult<PlanRecord> {
        self.plans
            .lock()
            .unwrap()
            .get(&plan_id)
            .cloned()
            .ok_or_else(|| StorageError::PlanNotFound(plan_id.to_string()))
    }

    async fn list_active_plan_ids(&self) -> StorageResult<Vec<Uuid>> {
        Ok(self
            .plans
            .lock()
            .unwrap()
            .values()
            .filter(|p| p.status == PlanStatus::Active)
            .map(|p| p.id)
            .collect())
    }

    async fn update_facts(&self, plan_id: Uuid, facts: serde_json::Value) -> StorageResult<PlanRecord> {
        let mut plans = self.plans.lock().unwrap();
        let plan = plans
            .get_mut(&plan_id)
            .ok_or_else(|| StorageError::PlanNotFound(plan_id.to_string()))?;
        plan.facts = facts;
        plan.updated_at = Utc::now();
        Ok(plan.clone())
    }

    async fn replace_plan_and_tasks(
        &self,
        plan_id: Uuid,
        facts: serde_json::Value,
        snapshot: serde_json::Value,
        tasks: Vec<NewTask>,
    ) -> StorageResult<(PlanRecord, Vec<TaskRecord>)> {
        let mut plans = self.plans.lock().unwrap();
        let plan = plans
            .get_mut(&plan_id)
            .ok_or_else(|| StorageError::PlanNotFound(plan_id.to_string()))?;
        plan.facts = facts;
        plan.snapshot = snapshot;
        plan.updated_at = Utc::now();
        let updated = plan.clone();
        drop(plans);

        let task_records = materialize(plan_id, tasks);
        self.tasks.lock().unwrap().insert(plan_id, task_records.clone());
        Ok((updated, task_records))
    }

    async fn list_tasks(&self, plan_id: Uuid) -> StorageResult<Vec<TaskRecord>> {
        Ok(self.tasks.lock().unwrap().get(&plan_id).cloned().unwrap_or_default())
    }

    async fn get_task(&self, plan_id: Uuid, task_id: Uuid) -> StorageResult<TaskRecord> {
        self.tasks
            .lock()
            .unwrap()
            .get(&plan_id)
            .and_then(|ts| ts.iter().find(|t| t.id == task_id).cloned())
            .ok_or_else(|| StorageError::TaskNotFound {
                plan_id: plan_id.to_string(),
                task_id: task_id.to_string(),
            })
    }

    async fn update_task_status(
        &self,
        plan_id: Uuid,
        task_id: Uuid,
        status: TaskStatus,
        completed_at: Option<DateTime<Utc>>,
    ) -> StorageResult<TaskRecord> {
        let mut tasks = self.tasks.lock().unwrap();
        let list = tasks
            .get_mut(&plan_id)
            .ok_or_else(|| StorageError::TaskNotFound { plan_id: plan_id.to_string(), task_id: task_id.to_string() })?;
        let task = list
            .iter_mut()
            .find(|t| t.id == task_id)
            .ok_or_else(|| StorageError::TaskNotFound { plan_id: plan_id.to_string(), task_id: task_id.to_string() })?;
        task.status = status;
        task.completed_at = completed_at;
        task.updated_at = Utc::now();
        Ok(task.clone())
    }
}

#[derive(Default)]
pub struct MemoryNotificationStore {
    profiles: Mutex<HashMap<Uuid, NotificationProfileRecord>>,
    profile_by_plan: Mutex<HashMap<Uuid, Uuid>>,
    outbox: Mutex<HashMap<Uuid, OutboxRecord>>,
    dedupe_index: Mutex<HashMap<String, Uuid>>,
    plan_tasks: Mutex<HashMap<Uuid, Vec<TaskRecord>>>,
}

impl MemoryNotificationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test seam: register tasks a `due_soon_tasks` query should find.
    pub fn seed_tasks(&self, plan_id: Uuid, tasks: Vec<TaskRecord>) {
        self.plan_tasks.lock().unwrap().insert(plan_id, tasks);
    }

    /// Test seam: every outbox row, in insertion-independent order.
    pub fn outbox_snapshot(&self) -> Vec<OutboxRecord> {
        self.outbox.lock().unwrap().values().cloned().collect()
    }
}

#[async_trait]
impl NotificationStore for MemoryNotificationStore {
    async fn get_or_create_profile(&self, plan_id: Uuid) -> StorageResult<NotificationProfileRecord> {
        if let Some(&id) = self.profile_by_plan.lock().unwrap().get(&plan_id) {
            return Ok(self.profiles.lock().unwrap().get(&id).unwrap().clone());
        }
        let now = Utc::now();
        let profile = NotificationProfileRecord {
            id: Uuid::new_v4(),
            plan_id,
            email: None,
            email_consent: false,
            locale: "de-DE".to_string(),
            timezone: "Europe/Berlin".to_string(),
            reminder_due_soon_enabled: true,
            max_reminders_per_day: 1,
            unsubscribed_at: None,
            unsubscribe_token_hash: None,
            unsubscribe_token_version: 1,
            created_at: now,
            updated_at: now,
        };
        self.profile_by_plan.lock().unwrap().insert(plan_id, profile.id);
        self.profiles.lock().unwrap().insert(profile.id, profile.clone());
        Ok(profile)
    }

    async fn upsert_profile(&self, plan_id: Uuid, patch: ProfilePatch) -> StorageResult<NotificationProfileRecord> {
        let existing = self.get_or_create_profile(plan_id).await?;
        let mut profiles = self.profiles.lock().unwrap();
        let profile = profiles.get_mut(&existing.id).unwrap();
        if let Some(email) = patch.email {
            profile.email = Some(email);
        }
        if let Some(consent) = patch.email_consent {
            profile.email_consent = consent;
        }
        if let Some(locale) = patch.locale {
            profile.locale = locale;
        }
        if let Some(tz) = patch.timezone {
            profile.timezone = tz;
        }
        if let Some(enabled) = patch.reminder_due_soon_enabled {
            profile.reminder_due_soon_enabled = enabled;
        }
        profile.updated_at = Utc::now();
        Ok(profile.clone())
    }

    async fn set_unsubscribe_token(
        &self,
        profile_id: Uuid,
        token_hash: String,
        version: i32,
    ) -> StorageResult<NotificationProfileRecord> {
        let mut profiles = self.profiles.lock().unwrap();
        let profile = profiles
            .get_mut(&profile_id)
            .ok_or_else(|| StorageError::ProfileNotFound(profile_id.to_string()))?;
        profile.unsubscribe_token_hash = Some(token_hash);
        profile.unsubscribe_token_version = version;
        profile.updated_at = Utc::now();
        Ok(profile.clone())
    }

    async fn find_profile_by_token_hash(&self, token_hash: &str) -> StorageResult<Option<NotificationProfileRecord>> {
        Ok(self
            .profiles
            .lock()
            .unwrap()
            .values()
            .find(|p| p.unsubscribe_token_hash.as_deref() == Some(token_hash))
            .cloned())
    }

    async fn mark_unsubscribed(&self, profile_id: Uuid, at: DateTime<Utc>) -> StorageResult<()> {
        let mut profiles = self.profiles.lock().unwrap();
        let profile = profiles
            .get_mut(&profile_id)
            .ok_or_else(|| StorageError::ProfileNotFound(profile_id.to_string()))?;
        if profile.unsubscribed_at.is_none() {
            profile.unsubscribed_at = Some(at);
            profile.updated_at = at;
        }
        Ok(())
    }

    async fn count_created_today(&self, profile_id: Uuid, start_utc: DateTime<Utc>, end_utc: DateTime<Utc>) -> StorageResult<i64> {
        Ok(self
            .outbox
            .lock()
            .unwrap()
            .values()
            .filter(|o| o.profile_id == profile_id && o.created_at >= start_utc && o.created_at < end_utc)
            .count() as i64)
    }

    async fn due_soon_tasks(&self, plan_id: Uuid, start: NaiveDate, end: NaiveDate) -> StorageResult<Vec<TaskRecord>> {
        let mut tasks: Vec<TaskRecord> = self
            .plan_tasks
            .lock()
            .unwrap()
            .get(&plan_id)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .filter(|t| {
                matches!(t.status, TaskStatus::Todo)
                    && t.due_date.is_some_and(|d| d >= start && d <= end)
            })
            .collect();
        tasks.sort_by(|a, b| a.due_date.cmp(&b.due_date).then(a.sort_key.cmp(&b.sort_key)));
        Ok(tasks)
    }

    async fn enqueue_due_soon(&self, item: NewOutboxItem, now: DateTime<Utc>) -> StorageResult<Option<OutboxRecord>> {
        let mut dedupe = self.dedupe_index.lock().unwrap();
        if dedupe.contains_key(&item.dedupe_key_raw) {
            return Ok(None);
        }
        let record = OutboxRecord {
            id: Uuid::new_v4(),
            profile_id: item.profile_id,
            channel: "email".to_string(),
            kind: "task_due_soon".to_string(),
            dedupe_key_raw: item.dedupe_key_raw.clone(),
            payload: item.payload,
            status: OutboxStatus::Pending,
            failure_class: None,
            next_attempt_at: now,
            attempt_count: 0,
            last_error_code: None,
            last_error_message: None,
            provider_message_id: None,
            sent_at: None,
            created_at: now,
            updated_at: now,
        };
        dedupe.insert(item.dedupe_key_raw, record.id);
        self.outbox.lock().unwrap().insert(record.id, record.clone());
        Ok(Some(record))
    }

    async fn lock_pending_batch(&self, now: DateTime<Utc>, limit: u32) -> StorageResult<Vec<OutboxRecord>> {
        let mut outbox = self.outbox.lock().unwrap();
        let mut ready: Vec<Uuid> = outbox
            .values()
            .filter(|o| matches!(o.status, OutboxStatus::Pending) && o.next_attempt_at <= now)
            .map(|o| o.id)
            .collect();
        ready.sort_by_key(|id| outbox[id].next_attempt_at);
        ready.truncate(limit as usize);
        for id in &ready {
            let o = outbox.get_mut(id).unwrap();
            o.status = OutboxStatus::Sending;
            o.updated_at = now;
        }
        Ok(ready.into_iter().map(|id| outbox[&id].clone()).collect())
    }

    async fn mark_sent(&self, outbox_id: Uuid, provider_message_id: Option<String>, now: DateTime<Utc>) -> StorageResult<()> {
        let mut outbox = self.outbox.lock().unwrap();
        let o = outbox
            .get_mut(&outbox_id)
            .ok_or_else(|| StorageError::OutboxItemNotFound(outbox_id.to_string()))?;
        o.status = OutboxStatus::Sent;
        o.failure_class = None;
        o.provider_message_id = provider_message_id;
        o.sent_at = Some(now);
        o.updated_at = now;
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
        let mut outbox = self.outbox.lock().unwrap();
        let o = outbox
            .get_mut(&outbox_id)
            .ok_or_else(|| StorageError::OutboxItemNotFound(outbox_id.to_string()))?;
        o.attempt_count += 1;
        o.status = status;
        o.failure_class = Some(failure_class);
        o.last_error_code = Some(error_code);
        o.last_error_message = Some(error_message.chars().take(500).collect());
        o.next_attempt_at = next_attempt_at;
        o.updated_at = now;
        Ok(())
    }

    async fn reschedule_quiet_hours(&self, outbox_id: Uuid, next_attempt_at: DateTime<Utc>, now: DateTime<Utc>) -> StorageResult<()> {
        let mut outbox = self.outbox.lock().unwrap();
        let o = outbox
            .get_mut(&outbox_id)
            .ok_or_else(|| StorageError::OutboxItemNotFound(outbox_id.to_string()))?;
        o.status = OutboxStatus::Pending;
        o.last_error_code = Some("QUIET_HOURS".to_string());
        o.next_attempt_at = next_attempt_at;
        o.updated_at = now;
        Ok(())
    }

    async fn recover_stuck_sending(&self, threshold: DateTime<Utc>, next_attempt_at: DateTime<Utc>, now: DateTime<Utc>) -> StorageResult<u64> {
        let mut outbox = self.outbox.lock().unwrap();
        let mut recovered = 0u64;
        for o in outbox.values_mut() {
            if matches!(o.status, OutboxStatus::Sending) && o.updated_at < threshold {
                o.status = OutboxStatus::Pending;
                o.failure_class = Some(FailureClass::Retryable);
                o.last_error_code = Some("stuck_sending_recovered".to_string());
                o.last_error_message = Some("Recovered stale sending item".to_string());
                o.next_attempt_at = next_attempt_at;
                o.updated_at = now;
                recovered += 1;
            }
        }
        Ok(recovered)
    }
}
