//! Contract tests against the in-memory fakes, exercising the cross-table
//! invariants the Surreal-backed stores must also uphold.

use chrono::{Duration, NaiveDate, Utc};
use lifeplan_state::{
    MemoryNotificationStore, MemoryPlanStore, NewOutboxItem, NewTask, NotificationStore,
    OutboxStatus, PlanStore, ProfilePatch, TaskStatus,
};
use serde_json::json;
use uuid::Uuid;

fn sample_task(key: &str, sort_key: i64) -> NewTask {
    NewTask {
        task_key: key.to_string(),
        title: format!("Task {key}"),
        description: None,
        due_date: None,
        metadata: json!({}),
        sort_key,
        restore_done_at: None,
    }
}

#[tokio::test]
async fn create_plan_persists_plan_and_tasks() {
    let store = MemoryPlanStore::new();
    let (plan, tasks) = store
        .create_plan("wedding_planning", json!({"guest_count": 50}), json!({}), vec![sample_task("book_venue", 0), sample_task("send_invites", 1)])
        .await
        .unwrap();

    assert_eq!(tasks.len(), 2);
    let reloaded = store.get_plan(plan.id).await.unwrap();
    assert_eq!(reloaded.template_key, "wedding_planning");
    let reloaded_tasks = store.list_tasks(plan.id).await.unwrap();
    assert_eq!(reloaded_tasks.len(), 2);
}

#[tokio::test]
async fn get_plan_on_unknown_id_is_not_found() {
    let store = MemoryPlanStore::new();
    let err = store.get_plan(Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, lifeplan_state::StorageError::PlanNotFound(_)));
}

#[tokio::test]
async fn replace_plan_and_tasks_restores_completed_at_for_surviving_done_tasks() {
    let store = MemoryPlanStore::new();
    let (plan, _) = store
        .create_plan("job_change", json!({}), json!({}), vec![sample_task("notify_employer", 0)])
        .await
        .unwrap();

    let completed_at = Utc::now() - Duration::days(2);
    let mut restore = sample_task("notify_employer", 0);
    restore.restore_done_at = Some(completed_at);
    let fresh = sample_task("update_insurance", 1);

    let (_, tasks) = store
        .replace_plan_and_tasks(plan.id, json!({"changed": true}), json!({}), vec![restore, fresh])
        .await
        .unwrap();

    let restored = tasks.iter().find(|t| t.task_key == "notify_employer").unwrap();
    assert_eq!(restored.status, TaskStatus::Done);
    assert_eq!(restored.completed_at, Some(completed_at));

    let new_task = tasks.iter().find(|t| t.task_key == "update_insurance").unwrap();
    assert_eq!(new_task.status, TaskStatus::Todo);
    assert!(new_task.completed_at.is_none());
}

#[tokio::test]
async fn update_task_status_rejects_unknown_task() {
    let store = MemoryPlanStore::new();
    let (plan, _) = store.create_plan("t", json!({}), json!({}), vec![sample_task("a", 0)]).await.unwrap();
    let err = store
        .update_task_status(plan.id, Uuid::new_v4(), TaskStatus::Done, None)
        .await
        .unwrap_err();
    assert!(matches!(err, lifeplan_state::StorageError::TaskNotFound { .. }));
}

#[tokio::test]
async fn upsert_profile_does_not_toggle_unsubscribed_at() {
    let store = MemoryNotificationStore::new();
    let plan_id = Uuid::new_v4();
    let profile = store.get_or_create_profile(plan_id).await.unwrap();
    store.mark_unsubscribed(profile.id, Utc::now()).await.unwrap();

    let patched = store
        .upsert_profile(
            plan_id,
            ProfilePatch {
                email: Some("person@example.com".to_string()),
                email_consent: Some(true),
                locale: None,
                timezone: None,
                reminder_due_soon_enabled: None,
            },
        )
        .await
        .unwrap();

    assert!(patched.unsubscribed_at.is_some(), "consent/email patch must not resurrect the profile");
}

#[tokio::test]
async fn enqueue_due_soon_is_idempotent_on_dedupe_key_collision() {
    let store = MemoryNotificationStore::new();
    let profile_id = Uuid::new_v4();
    let item = NewOutboxItem {
        profile_id,
        dedupe_key_raw: "task_due_soon|email|profile:x|2026-08-01".to_string(),
        payload: json!({}),
    };
    let now = Utc::now();
    let first = store.enqueue_due_soon(item.clone(), now).await.unwrap();
    assert!(first.is_some());

    let second = store.enqueue_due_soon(item, now).await.unwrap();
    assert!(second.is_none(), "duplicate dedupe key must be a no-op, not an error");
}

#[tokio::test]
async fn lock_pending_batch_only_claims_due_items_up_to_the_limit() {
    let store = MemoryNotificationStore::new();
    let profile_id = Uuid::new_v4();
    let now = Utc::now();
    for i in 0..3 {
        store
            .enqueue_due_soon(
                NewOutboxItem {
                    profile_id,
                    dedupe_key_raw: format!("key-{i}"),
                    payload: json!({}),
                },
                now,
            )
            .await
            .unwrap();
    }

    let batch = store.lock_pending_batch(now, 2).await.unwrap();
    assert_eq!(batch.len(), 2);
    for item in &batch {
        assert_eq!(item.status, OutboxStatus::Sending);
    }

    let remaining = store.lock_pending_batch(now, 10).await.unwrap();
    assert_eq!(remaining.len(), 1, "items already claimed as sending must not be claimed again");
}

#[tokio::test]
async fn recover_stuck_sending_resets_only_stale_rows() {
    let store = MemoryNotificationStore::new();
    let profile_id = Uuid::new_v4();
    let now = Utc::now();
    store
        .enqueue_due_soon(NewOutboxItem { profile_id, dedupe_key_raw: "k1".to_string(), payload: json!({}) }, now)
        .await
        .unwrap();
    let claimed = store.lock_pending_batch(now, 10).await.unwrap();
    assert_eq!(claimed.len(), 1);

    let threshold = now + Duration::minutes(1);
    let recovered = store
        .recover_stuck_sending(threshold, now + Duration::minutes(5), now + Duration::minutes(16))
        .await
        .unwrap();
    assert_eq!(recovered, 1);
}

#[tokio::test]
async fn due_soon_tasks_excludes_non_todo_and_out_of_window_dates() {
    let store = MemoryNotificationStore::new();
    let plan_id = Uuid::new_v4();
    let today = NaiveDate::from_ymd_opt(2026, 8, 1).unwrap();

    let mut in_window = sample_task_record(plan_id, "in_window", TaskStatus::Todo, Some(today));
    let mut done = sample_task_record(plan_id, "done_task", TaskStatus::Done, Some(today));
    let mut far_future = sample_task_record(plan_id, "far_future", TaskStatus::Todo, Some(today + Duration::days(30)));
    in_window.sort_key = 0;
    done.sort_key = 1;
    far_future.sort_key = 2;

    store.seed_tasks(plan_id, vec![in_window, done, far_future]);

    let matched = store.due_soon_tasks(plan_id, today, today + Duration::days(3)).await.unwrap();
    assert_eq!(matched.len(), 1);
    assert_eq!(matched[0].task_key, "in_window");
}

fn sample_task_record(
    plan_id: Uuid,
    key: &str,
    status: TaskStatus,
    due_date: Option<NaiveDate>,
) -> lifeplan_state::TaskRecord {
    let now = Utc::now();
    lifeplan_state::TaskRecord {
        id: Uuid::new_v4(),
        plan_id,
        task_key: key.to_string(),
        title: key.to_string(),
        description: None,
        status,
        due_date,
        metadata: json!({}),
        sort_key: 0,
        completed_at: None,
        created_at: now,
        updated_at: now,
    }
}
