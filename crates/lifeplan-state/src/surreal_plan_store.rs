//! SurrealDB-backed `PlanStore`.
//!
//! Converts between `schema::{PlanRow,TaskRow}` (DB rows) and
//! `storage_traits::{PlanRecord,TaskRecord}` (domain types) at the boundary.
//! Plan create and recompute each run as a single SurrealQL transaction so a
//! plan is never visible with a partial or stale task set.

use async_trait::async_trait;
use serde_json::Value;
use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use uuid::Uuid;

use crate::error::{StorageError, StorageResult};
use crate::schema::{PlanRow, TaskRow};
use crate::storage_traits::*;

pub struct SurrealPlanStore {
    db: Surreal<Any>,
}

impl SurrealPlanStore {
    pub fn new(db: Surreal<Any>) -> Self {
        Self { db }
    }

    async fn fetch_plan_row(&self, plan_id: Uuid) -> StorageResult<PlanRow> {
        let mut res = self
            .db
            .query("SELECT * FROM plans WHERE plan_id = $id")
            .bind(("id", plan_id))
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        let rows: Vec<PlanRow> = res.take(0).map_err(|e| StorageError::Backend(e.to_string()))?;
        rows.into_iter()
            .next()
            .ok_or_else(|| StorageError::PlanNotFound(plan_id.to_string()))
    }

    async fn fetch_task_rows(&self, plan_id: Uuid) -> StorageResult<Vec<TaskRow>> {
        let mut res = self
            .db
            .query("SELECT * FROM tasks WHERE plan_id = $id ORDER BY sort_key ASC")
            .bind(("id", plan_id))
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        res.take(0).map_err(|e| StorageError::Backend(e.to_string()))
    }
}

/// One numbered `CREATE tasks CONTENT $task_<n>;` statement per row, for
/// splicing into a transaction.
fn task_create_statements(count: usize) -> String {
    (0..count)
        .map(|idx| format!(" CREATE tasks CONTENT $task_{idx};"))
        .collect()
}

fn build_task_rows(plan_id: Uuid, tasks: Vec<NewTask>) -> Vec<TaskRow> {
    tasks
        .into_iter()
        .map(|t| {
            let mut row = TaskRow::new(plan_id, t.task_key, t.title, t.description, t.due_date, t.metadata, t.sort_key);
            if let Some(completed_at) = t.restore_done_at {
                row.status = "done".to_string();
                row.completed_at = Some(completed_at);
            }
            row
        })
        .collect()
}

fn db_plan_to_record(row: PlanRow) -> StorageResult<PlanRecord> {
    let status = match row.status.as_str() {
        "creating" => PlanStatus::Creating,
        "active" => PlanStatus::Active,
        "archived" => PlanStatus::Archived,
        other => return Err(StorageError::Backend(format!("unknown plan status: {other}"))),
    };
    Ok(PlanRecord {
        id: row.plan_id,
        template_key: row.template_key,
        facts: row.facts,
        snapshot: row.snapshot,
        status,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}

fn db_task_to_record(row: TaskRow) -> StorageResult<TaskRecord> {
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
}

#[async_trait]
impl PlanStore for SurrealPlanStore {
    async fn create_plan(
        &self,
        template_key: &str,
        facts: Value,
        snapshot: Value,
        tasks: Vec<NewTask>,
    ) -> StorageResult<(PlanRecord, Vec<TaskRecord>)> {
        let plan_id = Uuid::new_v4();
        let plan_row = PlanRow::new(plan_id, template_key.to_string(), facts, snapshot);
        let task_rows = build_task_rows(plan_id, tasks);

        // Plan and tasks land together or not at all; `check()` surfaces any
        // statement failure, at which point the whole unit has rolled back.
        let mut sql = String::from("BEGIN TRANSACTION; CREATE plans CONTENT $plan;");
        sql.push_str(&task_create_statements(task_rows.len()));
        sql.push_str(" COMMIT TRANSACTION;");

        let mut query = self.db.query(sql).bind(("plan", plan_row));
        for (idx, row) in task_rows.into_iter().enumerate() {
            query = query.bind((format!("task_{idx}"), row));
        }
        query
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?
            .check()
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        let plan = db_plan_to_record(self.fetch_plan_row(plan_id).await?)?;
        let tasks = self.list_tasks(plan_id).await?;
        Ok((plan, tasks))
    }

    async fn get_plan(&self, plan_id: Uuid) -> StorageResult<PlanRecord> {
        db_plan_to_record(self.fetch_plan_row(plan_id).await?)
    }

    async fn list_active_plan_ids(&self) -> StorageResult<Vec<Uuid>> {
        let mut res = self
            .db
            .query("SELECT * FROM plans WHERE status = 'active'")
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        let rows: Vec<PlanRow> = res.take(0).map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(rows.into_iter().map(|r| r.plan_id).collect())
    }

    async fn update_facts(&self, plan_id: Uuid, facts: Value) -> StorageResult<PlanRecord> {
        let now = chrono::Utc::now();
        let mut res = self
            .db
            .query("UPDATE plans SET facts = $facts, updated_at = $now WHERE plan_id = $id")
            .bind(("id", plan_id))
            .bind(("facts", facts))
            .bind(("now", surrealdb::sql::Datetime::from(now)))
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        let rows: Vec<PlanRow> = res.take(0).map_err(|e| StorageError::Backend(e.to_string()))?;
        let row = rows.into_iter().next().ok_or_else(|| StorageError::PlanNotFound(plan_id.to_string()))?;
        db_plan_to_record(row)
    }

    async fn replace_plan_and_tasks(
        &self,
        plan_id: Uuid,
        facts: Value,
        snapshot: Value,
        tasks: Vec<NewTask>,
    ) -> StorageResult<(PlanRecord, Vec<TaskRecord>)> {
        // Reject unknown plans before mutating anything.
        self.fetch_plan_row(plan_id).await?;

        let now = chrono::Utc::now();
        let task_rows = build_task_rows(plan_id, tasks);

        // Facts/snapshot overwrite, old-task delete, and reinsert commit as
        // one unit; a failure in any statement rolls the whole batch back.
        let mut sql = String::from(
            "BEGIN TRANSACTION; \
             UPDATE plans SET facts = $facts, snapshot = $snapshot, updated_at = $now WHERE plan_id = $id; \
             DELETE tasks WHERE plan_id = $id;",
        );
        sql.push_str(&task_create_statements(task_rows.len()));
        sql.push_str(" COMMIT TRANSACTION;");

        let mut query = self
            .db
            .query(sql)
            .bind(("id", plan_id))
            .bind(("facts", facts))
            .bind(("snapshot", snapshot))
            .bind(("now", surrealdb::sql::Datetime::from(now)));
        for (idx, row) in task_rows.into_iter().enumerate() {
            query = query.bind((format!("task_{idx}"), row));
        }
        query
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?
            .check()
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        let plan = db_plan_to_record(self.fetch_plan_row(plan_id).await?)?;
        let tasks = self.list_tasks(plan_id).await?;
        Ok((plan, tasks))
    }

    async fn list_tasks(&self, plan_id: Uuid) -> StorageResult<Vec<TaskRecord>> {
        self.fetch_task_rows(plan_id)
            .await?
            .into_iter()
            .map(db_task_to_record)
            .collect()
    }

    async fn get_task(&self, plan_id: Uuid, task_id: Uuid) -> StorageResult<TaskRecord> {
        let rows = self.fetch_task_rows(plan_id).await?;
        let row = rows
            .into_iter()
            .find(|r| r.task_id == task_id)
            .ok_or_else(|| StorageError::TaskNotFound { plan_id: plan_id.to_string(), task_id: task_id.to_string() })?;
        db_task_to_record(row)
    }

    async fn update_task_status(
        &self,
        plan_id: Uuid,
        task_id: Uuid,
        status: TaskStatus,
        completed_at: Option<chrono::DateTime<chrono::Utc>>,
    ) -> StorageResult<TaskRecord> {
        let now = chrono::Utc::now();
        let mut res = self
            .db
            .query(
                "UPDATE tasks SET status = $status, completed_at = $completed_at, updated_at = $now \
                 WHERE plan_id = $plan_id AND task_id = $task_id",
            )
            .bind(("plan_id", plan_id))
            .bind(("task_id", task_id))
            .bind(("status", status.as_str().to_string()))
            .bind(("completed_at", completed_at.map(surrealdb::sql::Datetime::from)))
            .bind(("now", surrealdb::sql::Datetime::from(now)))
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        let rows: Vec<TaskRow> = res.take(0).map_err(|e| StorageError::Backend(e.to_string()))?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| StorageError::TaskNotFound { plan_id: plan_id.to_string(), task_id: task_id.to_string() })?;
        db_task_to_record(row)
    }
}
