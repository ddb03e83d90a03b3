//! Reminder Scanner (C12): finds tasks due soon and enqueues idempotent
//! outbox entries, one per profile per day, under the daily cap.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::instrument;
use uuid::Uuid;

use lifeplan_state::{NewOutboxItem, NotificationStore, TaskRecord};

use crate::config::AppConfig;
use crate::domain::error::Result;
use crate::notifications::{
    build_due_soon_dedupe_key_raw, due_soon_window, local_day_utc_bounds, local_today, now_utc,
};
use crate::services::profile_service::{is_sendable, ProfileService};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanSummary {
    pub profiles_scanned: u32,
    pub tasks_matched: u32,
    pub outbox_created: u32,
    pub skipped_not_sendable: u32,
    pub skipped_daily_cap: u32,
    pub errors: u32,
}

pub struct ReminderScanner {
    notification_store: Arc<dyn NotificationStore>,
    profiles: Arc<ProfileService>,
    config: AppConfig,
}

impl ReminderScanner {
    pub fn new(notification_store: Arc<dyn NotificationStore>, profiles: Arc<ProfileService>, config: AppConfig) -> Self {
        Self { notification_store, profiles, config }
    }

    /// Scans every sendable profile for its owning plan's due-soon tasks.
    ///
    /// `plan_ids` is the set of plans to consider this pass — callers
    /// typically pass every active plan. A single profile's failure is
    /// isolated: it is counted in `errors` and does not abort the scan.
    pub async fn scan_due_soon(&self, plan_ids: &[Uuid]) -> ScanSummary {
        self.scan_due_soon_at(plan_ids, now_utc()).await
    }

    /// [`scan_due_soon`](Self::scan_due_soon) with an explicit clock.
    #[instrument(skip(self, plan_ids), fields(plan_count = plan_ids.len()))]
    pub async fn scan_due_soon_at(&self, plan_ids: &[Uuid], now: chrono::DateTime<chrono::Utc>) -> ScanSummary {
        let mut summary = ScanSummary::default();
        let (window_start, window_end) = due_soon_window(now);
        let today = local_today(now);

        for &plan_id in plan_ids {
            summary.profiles_scanned += 1;
            match self.scan_one_plan(plan_id, window_start, window_end, today, now).await {
                Ok(outcome) => {
                    summary.tasks_matched += outcome.tasks_matched;
                    summary.outbox_created += outcome.outbox_created;
                    summary.skipped_not_sendable += outcome.skipped_not_sendable;
                    summary.skipped_daily_cap += outcome.skipped_daily_cap;
                }
                Err(e) => {
                    tracing::warn!(plan_id = %plan_id, error = %e, "scan of plan failed, isolated");
                    summary.errors += 1;
                }
            }
        }

        tracing::info!(?summary, "due-soon scan complete");
        summary
    }

    async fn scan_one_plan(
        &self,
        plan_id: Uuid,
        window_start: chrono::NaiveDate,
        window_end: chrono::NaiveDate,
        today: chrono::NaiveDate,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Result<PlanScanOutcome> {
        let mut outcome = PlanScanOutcome::default();

        let profile = self.profiles.get_or_create(plan_id).await?;
        if !is_sendable(&profile) {
            outcome.skipped_not_sendable += 1;
            return Ok(outcome);
        }

        let (day_start, day_end) = local_day_utc_bounds(now);
        let sent_today = self.notification_store.count_created_today(profile.id, day_start, day_end).await?;
        if sent_today >= profile.max_reminders_per_day as i64 {
            outcome.skipped_daily_cap += 1;
            return Ok(outcome);
        }

        let tasks = self.notification_store.due_soon_tasks(plan_id, window_start, window_end).await?;
        outcome.tasks_matched += tasks.len() as u32;
        if tasks.is_empty() {
            return Ok(outcome);
        }

        let token = self.profiles.issue_token(&profile).await?;
        let dedupe_key = build_due_soon_dedupe_key_raw(profile.id, today);
        let payload = build_payload(&self.config, plan_id, &profile, &tasks, today, &token);

        let created = self
            .notification_store
            .enqueue_due_soon(NewOutboxItem { profile_id: profile.id, dedupe_key_raw: dedupe_key, payload }, now)
            .await?;
        if created.is_some() {
            outcome.outbox_created += 1;
        }

        Ok(outcome)
    }
}

#[derive(Default)]
struct PlanScanOutcome {
    tasks_matched: u32,
    outbox_created: u32,
    skipped_not_sendable: u32,
    skipped_daily_cap: u32,
}

fn build_payload(
    config: &AppConfig,
    plan_id: Uuid,
    profile: &lifeplan_state::NotificationProfileRecord,
    tasks: &[TaskRecord],
    today: chrono::NaiveDate,
    unsubscribe_token: &str,
) -> Value {
    let task_payloads: Vec<Value> = tasks
        .iter()
        .map(|t| {
            let due_in_days = t.due_date.map(|d| (d - today).num_days()).unwrap_or(0);
            json!({
                "task_key": t.task_key,
                "task_instance_id": t.id,
                "title": t.title,
                "due_date": t.due_date.map(|d| d.format("%Y-%m-%d").to_string()),
                "due_in_days": due_in_days,
                "category": t.metadata.get("category").cloned().unwrap_or(Value::Null),
                "priority": t.metadata.get("priority").cloned().unwrap_or(Value::Null),
            })
        })
        .collect();

    json!({
        "profile_id": profile.id,
        "plan_id": plan_id,
        "to_email": profile.email,
        "locale": profile.locale,
        "timezone": profile.timezone,
        "tasks": task_payloads,
        "plan_url": format!("{}/app/plan/{}", config.app_base_url, plan_id),
        "settings_url": format!("{}/app/plan/{}/notifications", config.app_base_url, plan_id),
        "unsubscribe_url": format!("{}/notifications/unsubscribe?token={}", config.app_base_url, unsubscribe_token),
    })
}
