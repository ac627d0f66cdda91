use cached::{Cached, TimedSizedCache};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{state::ListingWizard, WizardError};

/// In-process store of open listing drafts.
///
/// Handlers take a copy out, do their (possibly slow) work on it and write it
/// back with [`put`](DraftStore::put). Concurrent edits of one draft resolve
/// last-writer-wins. Drafts left alone past the TTL, or pushed out by newer
/// ones once the store is full, are dropped.
pub struct DraftStore {
    drafts: Mutex<TimedSizedCache<Uuid, ListingWizard>>,
}

impl DraftStore {
    pub fn new(size: usize, ttl_secs: u64) -> Self {
        Self {
            drafts: Mutex::new(TimedSizedCache::with_size_and_lifespan_and_refresh(
                size.max(1),
                ttl_secs,
                true,
            )),
        }
    }

    pub async fn insert(&self, wizard: ListingWizard) -> ListingWizard {
        self.drafts.lock().await.cache_set(wizard.id, wizard.clone());
        wizard
    }

    /// Returns a copy of the draft if `owner` started it.
    pub async fn get(&self, id: Uuid, owner: &str) -> Result<ListingWizard, WizardError> {
        let mut drafts = self.drafts.lock().await;
        let wizard = drafts.cache_get(&id).ok_or(WizardError::DraftNotFound(id))?;
        if wizard.owner != owner {
            return Err(WizardError::NotOwner);
        }
        Ok(wizard.clone())
    }

    pub async fn put(&self, wizard: &ListingWizard) {
        self.drafts.lock().await.cache_set(wizard.id, wizard.clone());
    }

    pub async fn remove(&self, id: Uuid) -> Option<ListingWizard> {
        self.drafts.lock().await.cache_remove(&id)
    }

    pub async fn len(&self) -> usize {
        self.drafts.lock().await.cache_size()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn drafts_are_private_to_their_owner() {
        let store = DraftStore::new(16, 3_600);
        let draft = store.insert(ListingWizard::new("seller@example.com")).await;

        assert!(store.get(draft.id, "seller@example.com").await.is_ok());
        assert!(matches!(
            store.get(draft.id, "someone@example.com").await,
            Err(WizardError::NotOwner)
        ));
        assert!(matches!(
            store.get(Uuid::new_v4(), "seller@example.com").await,
            Err(WizardError::DraftNotFound(_))
        ));

        let mut changed = draft.clone();
        changed.form.title = "2019 Honda Civic".into();
        store.put(&changed).await;
        let stored = store.get(draft.id, "seller@example.com").await.unwrap();
        assert_eq!(stored.form.title, "2019 Honda Civic");

        assert!(store.remove(draft.id).await.is_some());
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn a_full_store_drops_the_least_recent_draft() {
        let store = DraftStore::new(1, 3_600);
        let first = store.insert(ListingWizard::new("seller@example.com")).await;
        let second = store.insert(ListingWizard::new("seller@example.com")).await;

        assert_eq!(store.len().await, 1);
        assert!(matches!(
            store.get(first.id, "seller@example.com").await,
            Err(WizardError::DraftNotFound(_))
        ));
        assert!(store.get(second.id, "seller@example.com").await.is_ok());
    }
}
