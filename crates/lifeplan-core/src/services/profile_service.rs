//! Notification Profile Service (C10): consent/channel settings and
//! HMAC-signed unsubscribe tokens.
//!
//! Token shape: `"<profile_id>.<version>.<hex_hmac_sha256>"`, signed with the
//! process secret. Only `sha256(token)` is ever persisted — the raw token
//! exists solely in the outgoing email and the caller's hands.

use std::sync::Arc;

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use tracing::instrument;
use uuid::Uuid;

use lifeplan_state::{NotificationProfileRecord, NotificationStore, ProfilePatch};

use crate::domain::error::Result;

type HmacSha256 = Hmac<Sha256>;

pub struct ProfileService {
    store: Arc<dyn NotificationStore>,
    token_secret: String,
}

impl ProfileService {
    pub fn new(store: Arc<dyn NotificationStore>, token_secret: String) -> Self {
        Self { store, token_secret }
    }

    #[instrument(skip(self))]
    pub async fn get_or_create(&self, plan_id: Uuid) -> Result<NotificationProfileRecord> {
        Ok(self.store.get_or_create_profile(plan_id).await?)
    }

    /// Never toggles `unsubscribed_at` — a user-initiated unsubscribe is the
    /// sole setter of that field.
    #[instrument(skip(self, patch))]
    pub async fn upsert(&self, plan_id: Uuid, patch: ProfilePatch) -> Result<NotificationProfileRecord> {
        Ok(self.store.upsert_profile(plan_id, patch).await?)
    }

    /// Issues a fresh unsubscribe token for a profile at its current
    /// version, persisting only the token's hash.
    #[instrument(skip(self, profile), fields(profile_id = %profile.id))]
    pub async fn issue_token(&self, profile: &NotificationProfileRecord) -> Result<String> {
        let token = self.sign(profile.id, profile.unsubscribe_token_version);
        let hash = sha256_hex(&token);
        self.store
            .set_unsubscribe_token(profile.id, hash, profile.unsubscribe_token_version)
            .await?;
        Ok(token)
    }

    /// Invalidates all previously issued tokens by bumping the version and
    /// signing a new one.
    #[instrument(skip(self, profile), fields(profile_id = %profile.id))]
    pub async fn rotate(&self, profile: &NotificationProfileRecord) -> Result<String> {
        let next_version = profile.unsubscribe_token_version + 1;
        let token = self.sign(profile.id, next_version);
        let hash = sha256_hex(&token);
        self.store.set_unsubscribe_token(profile.id, hash, next_version).await?;
        tracing::info!(profile_id = %profile.id, next_version, "unsubscribe token rotated");
        Ok(token)
    }

    /// Idempotent: unsubscribing an already-unsubscribed profile is a no-op,
    /// not an error.
    #[instrument(skip(self, token))]
    pub async fn unsubscribe_by_token(&self, token: &str) -> Result<Option<NotificationProfileRecord>> {
        let hash = sha256_hex(token);
        let Some(profile) = self.store.find_profile_by_token_hash(&hash).await? else {
            tracing::warn!("unsubscribe token did not match any profile");
            return Ok(None);
        };
        self.store.mark_unsubscribed(profile.id, chrono::Utc::now()).await?;
        tracing::info!(profile_id = %profile.id, "profile unsubscribed");
        Ok(Some(profile))
    }

    fn sign(&self, profile_id: Uuid, version: i32) -> String {
        let mut mac = HmacSha256::new_from_slice(self.token_secret.as_bytes()).expect("hmac accepts any key length");
        let message = format!("{profile_id}.{version}");
        mac.update(message.as_bytes());
        let signature = hex::encode(mac.finalize().into_bytes());
        format!("{profile_id}.{version}.{signature}")
    }
}

/// Pure predicate: does this profile currently qualify for reminder sends?
pub fn is_sendable(profile: &NotificationProfileRecord) -> bool {
    profile.email.as_deref().is_some_and(|e| !e.is_empty())
        && profile.email_consent
        && profile.unsubscribed_at.is_none()
        && profile.reminder_due_soon_enabled
}

fn sha256_hex(value: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(value.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use lifeplan_state::MemoryNotificationStore;

    fn service() -> (ProfileService, Arc<MemoryNotificationStore>) {
        let store = Arc::new(MemoryNotificationStore::new());
        (ProfileService::new(store.clone(), "test-secret".to_string()), store)
    }

    #[tokio::test]
    async fn issued_token_round_trips_to_the_same_profile() {
        let (service, _store) = service();
        let plan_id = Uuid::new_v4();
        let profile = service.get_or_create(plan_id).await.unwrap();
        let token = service.issue_token(&profile).await.unwrap();

        let found = service.unsubscribe_by_token(&token).await.unwrap().unwrap();
        assert_eq!(found.id, profile.id);
    }

    #[tokio::test]
    async fn unknown_token_is_not_found() {
        let (service, _store) = service();
        let result = service.unsubscribe_by_token("not-a-real-token").await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn unsubscribing_twice_is_idempotent() {
        let (service, _store) = service();
        let plan_id = Uuid::new_v4();
        let profile = service.get_or_create(plan_id).await.unwrap();
        let token = service.issue_token(&profile).await.unwrap();

        service.unsubscribe_by_token(&token).await.unwrap();
        let second = service.unsubscribe_by_token(&token).await.unwrap().unwrap();
        assert!(second.unsubscribed_at.is_some());
    }

    #[tokio::test]
    async fn rotate_invalidates_the_prior_token() {
        let (service, _store) = service();
        let plan_id = Uuid::new_v4();
        let profile = service.get_or_create(plan_id).await.unwrap();
        let old_token = service.issue_token(&profile).await.unwrap();

        let refreshed = service.get_or_create(plan_id).await.unwrap();
        service.rotate(&refreshed).await.unwrap();

        let result = service.unsubscribe_by_token(&old_token).await.unwrap();
        assert!(result.is_none(), "old token must no longer resolve after rotation");
    }

    #[test]
    fn is_sendable_requires_consent_email_and_no_unsubscribe() {
        let now = chrono::Utc::now();
        let mut profile = NotificationProfileRecord {
            id: Uuid::new_v4(),
            plan_id: Uuid::new_v4(),
            email: Some("a@example.com".into()),
            email_consent: true,
            locale: "de-DE".into(),
            timezone: "Europe/Berlin".into(),
            reminder_due_soon_enabled: true,
            max_reminders_per_day: 1,
            unsubscribed_at: None,
            unsubscribe_token_hash: None,
            unsubscribe_token_version: 1,
            created_at: now,
            updated_at: now,
        };
        assert!(is_sendable(&profile));
        profile.unsubscribed_at = Some(now);
        assert!(!is_sendable(&profile));
    }
}
