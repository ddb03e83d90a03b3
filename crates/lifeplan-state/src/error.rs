//! Error types for the persistence layer.

use thiserror::Error;

/// Errors that can occur in the connection/schema layer.
#[derive(Error, Debug)]
pub enum StateError {
    /// Database connection error
    #[error("Database connection failed: {0}")]
    Connection(String),

    /// Database query error
    #[error("Database query failed: {0}")]
    Query(String),

    /// Serialization error
    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// Deserialization error
    #[error("Deserialization failed: {0}")]
    Deserialization(String),

    /// Transaction failed
    #[error("Transaction failed: {0}")]
    Transaction(String),

    /// Schema setup error
    #[error("Schema setup failed: {0}")]
    SchemaSetup(String),
}

/// Domain-facing errors returned by `PlanStore`/`NotificationStore`.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Plan id unknown
    #[error("plan not found: {0}")]
    PlanNotFound(String),

    /// Task not in the addressed plan
    #[error("task '{task_id}' not found for plan '{plan_id}'")]
    TaskNotFound { plan_id: String, task_id: String },

    /// Notification profile missing for a plan
    #[error("notification profile not found for plan: {0}")]
    ProfileNotFound(String),

    /// Outbox row id unknown
    #[error("outbox item not found: {0}")]
    OutboxItemNotFound(String),

    /// Backend I/O or query error
    #[error("storage backend error: {0}")]
    Backend(String),
}

impl From<surrealdb::Error> for StateError {
    fn from(err: surrealdb::Error) -> Self {
        StateError::Query(err.to_string())
    }
}

impl From<serde_json::Error> for StateError {
    fn from(err: serde_json::Error) -> Self {
        StateError::Serialization(err.to_string())
    }
}

impl From<StateError> for StorageError {
    fn from(err: StateError) -> Self {
        StorageError::Backend(err.to_string())
    }
}

pub type StorageResult<T> = std::result::Result<T, StorageError>;
pub type Result<T> = std::result::Result<T, StateError>;
