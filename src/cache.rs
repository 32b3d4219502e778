//! Explicit TTL cache for the active-assistant list.
//!
//! Assistant configuration changes rarely and is read on every turn, so the
//! list is held for a short TTL with an explicit `invalidate` hook for the
//! admin surface, instead of an ambient always-fresh query.

use once_cell::sync::Lazy;
use std::sync::RwLock;
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::database::models::Assistant;
use crate::database::queries::assistants;

pub struct TtlCache<T> {
    ttl: Duration,
    slot: RwLock<Option<(Instant, T)>>,
}

impl<T: Clone> TtlCache<T> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            slot: RwLock::new(None),
        }
    }

    /// The cached value, if it is still fresh.
    pub fn get(&self) -> Option<T> {
        let slot = self.slot.read().ok()?;
        match slot.as_ref() {
            Some((stored_at, value)) if stored_at.elapsed() < self.ttl => Some(value.clone()),
            _ => None,
        }
    }

    pub fn put(&self, value: T) {
        if let Ok(mut slot) = self.slot.write() {
            *slot = Some((Instant::now(), value));
        }
    }

    pub fn invalidate(&self) {
        if let Ok(mut slot) = self.slot.write() {
            *slot = None;
        }
    }
}

const ASSISTANT_CACHE_TTL: Duration = Duration::from_secs(60);

static ACTIVE_ASSISTANTS: Lazy<TtlCache<Vec<Assistant>>> =
    Lazy::new(|| TtlCache::new(ASSISTANT_CACHE_TTL));

pub async fn active_assistants() -> Result<Vec<Assistant>, sqlx::Error> {
    if let Some(cached) = ACTIVE_ASSISTANTS.get() {
        return Ok(cached);
    }

    let assistants = assistants::list_active_assistants().await?;
    ACTIVE_ASSISTANTS.put(assistants.clone());
    Ok(assistants)
}

pub async fn get_active_assistant(assistant_id: Uuid) -> Result<Option<Assistant>, sqlx::Error> {
    Ok(active_assistants()
        .await?
        .into_iter()
        .find(|a| a.id == assistant_id))
}

/// Drop the cached list; the next read refetches. Called after admin writes.
pub fn invalidate_assistants() {
    ACTIVE_ASSISTANTS.invalidate();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_values_are_served_from_cache() {
        let cache = TtlCache::new(Duration::from_secs(60));
        cache.put(vec![1, 2, 3]);
        assert_eq!(cache.get(), Some(vec![1, 2, 3]));
    }

    #[test]
    fn expired_values_are_dropped() {
        let cache = TtlCache::new(Duration::from_millis(10));
        cache.put("stale");
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(cache.get(), None);
    }

    #[test]
    fn invalidate_clears_immediately() {
        let cache = TtlCache::new(Duration::from_secs(60));
        cache.put("live");
        cache.invalidate();
        assert_eq!(cache.get(), None);
    }

    #[test]
    fn empty_cache_misses() {
        let cache: TtlCache<i32> = TtlCache::new(Duration::from_secs(60));
        assert_eq!(cache.get(), None);
    }
}
