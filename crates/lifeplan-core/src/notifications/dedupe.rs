//! Outbox dedupe key construction (C11's idempotency anchor).

use chrono::NaiveDate;
use uuid::Uuid;

/// The raw dedupe key for a due-soon reminder, unique per profile per local day.
///
/// A unique constraint on this value at the storage layer is what makes
/// [`crate::services::scanner::scan_due_soon`] idempotent under re-runs.
pub fn build_due_soon_dedupe_key_raw(profile_id: Uuid, local_day: NaiveDate) -> String {
    format!(
        "task_due_soon|email|profile:{profile_id}|{}",
        local_day.format("%Y-%m-%d")
    )
}
