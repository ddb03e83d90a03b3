//! SurrealDB schema migrations and initialization.
//!
//! One `init_X_table` function per table; all are idempotent `DEFINE`
//! statements, safe to call on every startup.

use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::{debug, info};

use crate::error::Result;

/// Initialize all tables. Safe to call multiple times.
pub async fn init_schema(db: &Surreal<Any>) -> Result<()> {
    info!("initializing lifeplan SurrealDB schema");

    init_plans_table(db).await?;
    init_tasks_table(db).await?;
    init_notification_profiles_table(db).await?;
    init_notification_outbox_table(db).await?;

    info!("lifeplan schema initialization complete");
    Ok(())
}

/// `plans`: one row per materialized plan.
///
/// Constraints:
/// - `plan_id` is unique.
async fn init_plans_table(db: &Surreal<Any>) -> Result<()> {
    debug!("initializing plans table");
    let sql = r#"
        DEFINE TABLE plans SCHEMALESS
            PERMISSIONS
                FOR create FULL
                FOR select FULL
                FOR update FULL
                FOR delete FULL;

        DEFINE INDEX idx_plans_plan_id ON TABLE plans COLUMNS plan_id UNIQUE;
        DEFINE INDEX idx_plans_template_key ON TABLE plans COLUMNS template_key;
        DEFINE INDEX idx_plans_status ON TABLE plans COLUMNS status;
    "#;
    db.query(sql).await?;
    info!("plans table initialized");
    Ok(())
}

/// `tasks`: owned by a plan, cascade-deleted at the application layer.
///
/// Constraints:
/// - `(plan_id, task_key)` is unique.
async fn init_tasks_table(db: &Surreal<Any>) -> Result<()> {
    debug!("initializing tasks table");
    let sql = r#"
        DEFINE TABLE tasks SCHEMALESS
            PERMISSIONS
                FOR create FULL
                FOR select FULL
                FOR update FULL
                FOR delete FULL;

        DEFINE INDEX idx_tasks_task_id ON TABLE tasks COLUMNS task_id UNIQUE;
        DEFINE INDEX idx_tasks_plan_id ON TABLE tasks COLUMNS plan_id;
        DEFINE INDEX idx_tasks_plan_task_key ON TABLE tasks COLUMNS plan_id, task_key UNIQUE;
        DEFINE INDEX idx_tasks_status ON TABLE tasks COLUMNS status;
        DEFINE INDEX idx_tasks_due_date ON TABLE tasks COLUMNS due_date;
    "#;
    db.query(sql).await?;
    info!("tasks table initialized");
    Ok(())
}

/// `notification_profiles`: 1-to-1 with a plan.
///
/// Constraints:
/// - `plan_id` is unique.
/// - `unsubscribe_token_hash` is unique when present.
async fn init_notification_profiles_table(db: &Surreal<Any>) -> Result<()> {
    debug!("initializing notification_profiles table");
    let sql = r#"
        DEFINE TABLE notification_profiles SCHEMALESS
            PERMISSIONS
                FOR create FULL
                FOR select FULL
                FOR update FULL
                FOR delete FULL;

        DEFINE INDEX idx_profiles_profile_id ON TABLE notification_profiles COLUMNS profile_id UNIQUE;
        DEFINE INDEX idx_profiles_plan_id ON TABLE notification_profiles COLUMNS plan_id UNIQUE;
        DEFINE INDEX idx_profiles_token_hash ON TABLE notification_profiles COLUMNS unsubscribe_token_hash UNIQUE;
    "#;
    db.query(sql).await?;
    info!("notification_profiles table initialized");
    Ok(())
}

/// `notification_outbox`: the reminder pipeline's durable queue.
///
/// Constraints:
/// - `dedupe_key_raw` is unique across the whole table — the sole guard
///   against duplicate due-soon reminders for the same profile/day.
async fn init_notification_outbox_table(db: &Surreal<Any>) -> Result<()> {
    debug!("initializing notification_outbox table");
    let sql = r#"
        DEFINE TABLE notification_outbox SCHEMALESS
            PERMISSIONS
                FOR create FULL
                FOR select FULL
                FOR update FULL
                FOR delete NONE;

        DEFINE INDEX idx_outbox_outbox_id ON TABLE notification_outbox COLUMNS outbox_id UNIQUE;
        DEFINE INDEX idx_outbox_dedupe_key ON TABLE notification_outbox COLUMNS dedupe_key_raw UNIQUE;
        DEFINE INDEX idx_outbox_profile_id ON TABLE notification_outbox COLUMNS profile_id;
        DEFINE INDEX idx_outbox_status_next_attempt ON TABLE notification_outbox COLUMNS status, next_attempt_at;
    "#;
    db.query(sql).await?;
    info!("notification_outbox table initialized");
    Ok(())
}
