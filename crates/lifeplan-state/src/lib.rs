//! Persistence layer for the life event planner.
//!
//! Two SurrealDB-backed stores, one in-memory pair of fakes for tests:
//!
//! - [`PlanStore`]: plans and their owned tasks.
//! - [`NotificationStore`]: notification profiles and the reminder outbox.
//!
//! `DATABASE_URL` and schema bootstrap live in [`connection`]; table
//! definitions live in [`migrations`].

pub mod connection;
pub mod error;
pub mod fakes;
pub mod migrations;
pub mod schema;
pub mod storage_traits;
pub mod surreal_notification_store;
pub mod surreal_plan_store;

pub use error::{Result, StateError, StorageError, StorageResult};
pub use fakes::{MemoryNotificationStore, MemoryPlanStore};
pub use storage_traits::{
    FailureClass, NewOutboxItem, NewTask, NotificationProfileRecord, NotificationStore,
    OutboxRecord, OutboxStatus, PlanRecord, PlanStatus, PlanStore, ProfilePatch, TaskRecord,
    TaskStatus,
};
pub use surreal_notification_store::SurrealNotificationStore;
pub use surreal_plan_store::SurrealPlanStore;
