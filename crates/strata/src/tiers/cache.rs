//! In-memory recent-turn cache
//!
//! Per-user deques of recent turns, most recent at the front, trimmed to
//! `max_entries` after every insert and expired after `ttl`. Users themselves
//! are held in an LRU so an idle user is the first dropped when the cache is
//! full.

use std::collections::VecDeque;
use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use lru::LruCache;
use tokio::time::Instant;

use super::{CacheTier, TierKind};
use crate::config::CacheConfig;
use crate::error::{Result, StrataError};
use crate::memory::types::CacheEntry;

/// Fallback user capacity when the configured one is zero
const DEFAULT_MAX_USERS: usize = 10_000;

#[derive(Debug, Clone)]
struct Slot {
    entry: CacheEntry,
    expires_at: Instant,
}

/// Cache tier backed by process memory
#[derive(Debug)]
pub struct InMemoryCache {
    users: Mutex<LruCache<String, VecDeque<Slot>>>,
    max_entries: usize,
    ttl: Duration,
}

impl InMemoryCache {
    pub fn new(config: &CacheConfig) -> Self {
        let cap = NonZeroUsize::new(config.max_users)
            .or_else(|| NonZeroUsize::new(DEFAULT_MAX_USERS))
            .unwrap_or(NonZeroUsize::MIN);
        Self {
            users: Mutex::new(LruCache::new(cap)),
            max_entries: config.max_entries,
            ttl: config.ttl(),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, LruCache<String, VecDeque<Slot>>>> {
        self.users
            .lock()
            .map_err(|e| StrataError::unavailable(TierKind::Cache, format!("lock poisoned: {e}")))
    }

    fn purge_expired(slots: &mut VecDeque<Slot>, now: Instant) {
        slots.retain(|slot| slot.expires_at > now);
    }
}

impl Default for InMemoryCache {
    fn default() -> Self {
        Self::new(&CacheConfig::default())
    }
}

#[async_trait]
impl CacheTier for InMemoryCache {
    async fn append(&self, entry: CacheEntry) -> Result<()> {
        let now = Instant::now();
        let mut users = self.lock()?;
        let user_id = entry.user_id.clone();
        let slot = Slot {
            entry,
            expires_at: now + self.ttl,
        };

        match users.get_mut(&user_id) {
            Some(slots) => {
                Self::purge_expired(slots, now);
                slots.push_front(slot);
                slots.truncate(self.max_entries);
            }
            None => {
                let mut slots = VecDeque::with_capacity(self.max_entries.min(64));
                slots.push_front(slot);
                slots.truncate(self.max_entries);
                if let Some((evicted, _)) = users.push(user_id.clone(), slots) {
                    if evicted != user_id {
                        tracing::debug!(user_id = %evicted, "Evicted idle user from cache");
                    }
                }
            }
        }
        Ok(())
    }

    async fn recent(&self, user_id: &str, limit: usize) -> Result<Vec<CacheEntry>> {
        let now = Instant::now();
        let mut users = self.lock()?;
        let Some(slots) = users.get_mut(user_id) else {
            return Ok(Vec::new());
        };
        Self::purge_expired(slots, now);
        Ok(slots.iter().take(limit).map(|s| s.entry.clone()).collect())
    }

    async fn count(&self, user_id: &str) -> Result<usize> {
        let now = Instant::now();
        let mut users = self.lock()?;
        Ok(users
            .peek_mut(user_id)
            .map(|slots| {
                Self::purge_expired(slots, now);
                slots.len()
            })
            .unwrap_or(0))
    }

    async fn clear(&self, user_id: &str) -> Result<()> {
        self.lock()?.pop(user_id);
        Ok(())
    }

    async fn remove(&self, conversation_id: &str) -> Result<bool> {
        let mut users = self.lock()?;
        let mut removed = false;
        for (_, slots) in users.iter_mut() {
            let before = slots.len();
            slots.retain(|s| s.entry.conversation_id != conversation_id);
            removed |= slots.len() != before;
        }
        Ok(removed)
    }

    async fn ping(&self) -> bool {
        self.users.lock().is_ok()
    }

    fn name(&self) -> &'static str {
        "in-memory-cache"
    }
}
