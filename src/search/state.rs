// Per-session marketplace state (filters, search criteria, sort).
// Read when the marketplace page loads, written on every change. Last writer wins.
// Sessions are bounded and expire when idle, since anonymous clients pick their own ids.

use cached::{Cached, TimedSizedCache};
use tokio::sync::Mutex;

use super::criteria::MarketplaceState;

pub struct MarketplaceStateStore {
    sessions: Mutex<TimedSizedCache<String, MarketplaceState>>,
}

impl MarketplaceStateStore {
    pub fn new(size: usize, ttl_secs: u64) -> Self {
        Self {
            sessions: Mutex::new(TimedSizedCache::with_size_and_lifespan_and_refresh(
                size.max(1),
                ttl_secs,
                true,
            )),
        }
    }

    /// Returns the stored state, or the defaults for a new session.
    pub async fn get(&self, session: &str) -> MarketplaceState {
        self.sessions
            .lock()
            .await
            .cache_get(session)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn put(&self, session: &str, state: MarketplaceState) {
        self.sessions.lock().await.cache_set(session.to_string(), state);
    }

    pub async fn clear(&self, session: &str) {
        self.sessions.lock().await.cache_remove(session);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::SortOption;

    fn sorted_by_price() -> MarketplaceState {
        let mut state = MarketplaceState::default();
        state.sort = SortOption::PriceLowToHigh;
        state
    }

    #[tokio::test]
    async fn sessions_are_isolated() {
        let store = MarketplaceStateStore::new(16, 3_600);
        let state = sorted_by_price();
        store.put("a", state.clone()).await;

        assert_eq!(store.get("a").await, state);
        assert_eq!(store.get("b").await, MarketplaceState::default());

        store.clear("a").await;
        assert_eq!(store.get("a").await.sort, SortOption::Newest);
    }

    #[tokio::test]
    async fn oldest_session_is_evicted_when_full() {
        let store = MarketplaceStateStore::new(2, 3_600);
        for session in ["a", "b", "c"] {
            store.put(session, sorted_by_price()).await;
        }

        assert_eq!(store.get("a").await.sort, SortOption::Newest);
        assert_eq!(store.get("b").await.sort, SortOption::PriceLowToHigh);
        assert_eq!(store.get("c").await.sort, SortOption::PriceLowToHigh);
        assert_eq!(store.sessions.lock().await.cache_size(), 2);
    }
}
