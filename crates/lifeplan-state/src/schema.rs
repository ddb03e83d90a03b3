//! Database row types, one per SurrealDB table.
//!
//! Each row carries an `id: Option<surrealdb::sql::Thing>` (absent until the
//! record has been written) and stores timestamps through the
//! `surreal_datetime`/`surreal_datetime_opt` serde bridges so `chrono` stays
//! at the domain boundary while SurrealDB sees its own datetime type.

mod surreal_datetime {
    use chrono::{DateTime, Utc};
    use serde::{self, Deserialize, Deserializer, Serializer};
    use surrealdb::sql::Datetime as SurrealDatetime;

    pub fn serialize<S>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let sd = SurrealDatetime::from(*date);
        serde::Serialize::serialize(&sd, serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let sd = SurrealDatetime::deserialize(deserializer)?;
        Ok(DateTime::from(sd))
    }
}

mod surreal_datetime_opt {
    use chrono::{DateTime, Utc};
    use serde::{self, Deserialize, Deserializer, Serializer};
    use surrealdb::sql::Datetime as SurrealDatetime;

    pub fn serialize<S>(date: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match date {
            Some(d) => {
                let sd = SurrealDatetime::from(*d);
                serde::Serialize::serialize(&Some(sd), serializer)
            }
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let sd = Option::<SurrealDatetime>::deserialize(deserializer)?;
        Ok(sd.map(DateTime::from))
    }
}

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use surrealdb::sql::Thing;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanRow {
    pub id: Option<Thing>,
    pub plan_id: Uuid,
    pub template_key: String,
    pub facts: Value,
    pub snapshot: Value,
    pub status: String,
    #[serde(with = "surreal_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "surreal_datetime")]
    pub updated_at: DateTime<Utc>,
}

impl PlanRow {
    pub fn new(plan_id: Uuid, template_key: String, facts: Value, snapshot: Value) -> Self {
        let now = Utc::now();
        Self {
            id: None,
            plan_id,
            template_key,
            facts,
            snapshot,
            status: "active".to_string(),
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRow {
    pub id: Option<Thing>,
    pub task_id: Uuid,
    pub plan_id: Uuid,
    pub task_key: String,
    pub title: String,
    pub description: Option<String>,
    pub status: String,
    pub due_date: Option<NaiveDate>,
    pub metadata: Value,
    pub sort_key: i64,
    #[serde(with = "surreal_datetime_opt")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(with = "surreal_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "surreal_datetime")]
    pub updated_at: DateTime<Utc>,
}

impl TaskRow {
    pub fn new(
        plan_id: Uuid,
        task_key: String,
        title: String,
        description: Option<String>,
        due_date: Option<NaiveDate>,
        metadata: Value,
        sort_key: i64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: None,
            task_id: Uuid::new_v4(),
            plan_id,
            task_key,
            title,
            description,
            status: "todo".to_string(),
            due_date,
            metadata,
            sort_key,
            completed_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationProfileRow {
    pub id: Option<Thing>,
    pub profile_id: Uuid,
    pub plan_id: Uuid,
    pub email: Option<String>,
    pub email_consent: bool,
    pub locale: String,
    pub timezone: String,
    pub reminder_due_soon_enabled: bool,
    pub max_reminders_per_day: i32,
    #[serde(with = "surreal_datetime_opt")]
    pub unsubscribed_at: Option<DateTime<Utc>>,
    pub unsubscribe_token_hash: Option<String>,
    pub unsubscribe_token_version: i32,
    #[serde(with = "surreal_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "surreal_datetime")]
    pub updated_at: DateTime<Utc>,
}

impl NotificationProfileRow {
    pub fn new(plan_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id: None,
            profile_id: Uuid::new_v4(),
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
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationOutboxRow {
    pub id: Option<Thing>,
    pub outbox_id: Uuid,
    pub profile_id: Uuid,
    pub channel: String,
    pub kind: String,
    pub dedupe_key_raw: String,
    pub payload: Value,
    pub status: String,
    pub failure_class: Option<String>,
    #[serde(with = "surreal_datetime")]
    pub next_attempt_at: DateTime<Utc>,
    pub attempt_count: i32,
    pub last_error_code: Option<String>,
    pub last_error_message: Option<String>,
    pub provider_message_id: Option<String>,
    #[serde(with = "surreal_datetime_opt")]
    pub sent_at: Option<DateTime<Utc>>,
    #[serde(with = "surreal_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "surreal_datetime")]
    pub updated_at: DateTime<Utc>,
}

impl NotificationOutboxRow {
    pub fn new(profile_id: Uuid, dedupe_key_raw: String, payload: Value, now: DateTime<Utc>) -> Self {
        Self {
            id: None,
            outbox_id: Uuid::new_v4(),
            profile_id,
            channel: "email".to_string(),
            kind: "task_due_soon".to_string(),
            dedupe_key_raw,
            payload,
            status: "pending".to_string(),
            failure_class: None,
            next_attempt_at: now,
            attempt_count: 0,
            last_error_code: None,
            last_error_message: None,
            provider_message_id: None,
            sent_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}
