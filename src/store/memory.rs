//! In-memory identity store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use super::{Identity, IdentityKey, IdentityStore, StoreError};

/// Identities held in process memory; lost on restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    /// provider_id -> identity
    identities: DashMap<String, Identity>,
    /// username -> provider_id
    usernames: DashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored identities.
    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }
}

#[async_trait]
impl IdentityStore for MemoryStore {
    async fn identity(&self, key: IdentityKey<'_>) -> Result<Option<Identity>, StoreError> {
        let provider_id = match key {
            IdentityKey::ProviderId(id) => id.to_string(),
            IdentityKey::Username(name) => match self.usernames.get(name) {
                Some(id) => id.value().clone(),
                None => return Ok(None),
            },
        };
        Ok(self.identities.get(&provider_id).map(|r| r.value().clone()))
    }

    async fn upsert_identity(&self, identity: &Identity) -> Result<Identity, StoreError> {
        identity.check_domain()?;

        match self.usernames.entry(identity.username.clone()) {
            Entry::Occupied(e) if e.get() != &identity.provider_id => {
                return Err(StoreError::DuplicateUsername(identity.username.clone()));
            }
            Entry::Occupied(_) => {}
            Entry::Vacant(e) => {
                e.insert(identity.provider_id.clone());
            }
        }

        let stored = match self.identities.entry(identity.provider_id.clone()) {
            Entry::Occupied(mut e) => {
                let previous = e.get();
                if previous.username != identity.username {
                    self.usernames.remove(&previous.username);
                }
                let mut next = identity.clone();
                next.last_discharge = previous.last_discharge.max(identity.last_discharge);
                e.insert(next.clone());
                next
            }
            Entry::Vacant(e) => e.insert(identity.clone()).value().clone(),
        };
        Ok(stored)
    }

    async fn touch_last_discharge(
        &self,
        provider_id: &str,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        if let Some(mut identity) = self.identities.get_mut(provider_id) {
            identity.last_discharge = identity.last_discharge.max(Some(at));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn alice() -> Identity {
        Identity {
            provider_id: "static:alice".into(),
            username: "alice".into(),
            groups: vec!["staff".into()],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn lookup_by_either_key() {
        let store = MemoryStore::new();
        store.upsert_identity(&alice()).await.unwrap();

        let by_id = store.identity(IdentityKey::ProviderId("static:alice")).await.unwrap();
        let by_name = store.identity(IdentityKey::Username("alice")).await.unwrap();
        assert_eq!(by_id, by_name);
        assert_eq!(by_id.unwrap().groups, vec!["staff".to_string()]);
        assert!(store.identity(IdentityKey::Username("bob")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn username_belongs_to_one_provider_id() {
        let store = MemoryStore::new();
        store.upsert_identity(&alice()).await.unwrap();
        let mut imposter = alice();
        imposter.provider_id = "other:alice".into();
        assert!(matches!(
            store.upsert_identity(&imposter).await,
            Err(StoreError::DuplicateUsername(_))
        ));
    }

    #[tokio::test]
    async fn last_discharge_never_goes_backwards() {
        let store = MemoryStore::new();
        store.upsert_identity(&alice()).await.unwrap();
        let now = Utc::now();
        store.touch_last_discharge("static:alice", now).await.unwrap();
        store
            .touch_last_discharge("static:alice", now - Duration::seconds(10))
            .await
            .unwrap();

        // A provider re-login carries no discharge time; the stored one survives.
        let stored = store.upsert_identity(&alice()).await.unwrap();
        assert_eq!(stored.last_discharge, Some(now));
    }

    #[tokio::test]
    async fn rename_releases_old_username() {
        let store = MemoryStore::new();
        store.upsert_identity(&alice()).await.unwrap();
        let mut renamed = alice();
        renamed.username = "alice2".into();
        store.upsert_identity(&renamed).await.unwrap();
        assert!(store.identity(IdentityKey::Username("alice")).await.unwrap().is_none());
        assert_eq!(store.len(), 1);
    }
}
