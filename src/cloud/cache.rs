use log::debug;
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tokio::time::Instant;

use super::models::Page;

struct CacheEntry {
    page: Page,
    expires_at: Instant,
}

struct CacheState {
    entries: HashMap<String, CacheEntry>,
    last_sweep: Instant,
}

/**
 * Memoizes listing pages by the literal text of their query.
 *
 * Entries expire after a global time-to-live; an expired entry reads as a
 * miss and is dropped by the next sweep, which runs at most once per check
 * period when a new page is stored. Values are immutable snapshots, so the
 * last write for a key simply wins.
 */
pub struct QueryCache {
    ttl: Duration,
    check_period: Duration,
    state: RwLock<CacheState>,
}

impl QueryCache {
    pub fn new(ttl: Duration, check_period: Duration) -> Self {
        Self {
            ttl,
            check_period,
            state: RwLock::new(CacheState {
                entries: HashMap::new(),
                last_sweep: Instant::now(),
            }),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, CacheState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, CacheState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    pub fn is_enabled(&self) -> bool {
        !self.ttl.is_zero()
    }

    /// The cached page for `key`, with its entries tagged `from_cache`
    pub fn get(&self, key: &str) -> Option<Page> {
        let state = self.read();
        let cached = state.entries.get(key)?;
        if cached.expires_at <= Instant::now() {
            return None;
        }
        debug!("Cache hit for {}", key);
        Some(cached.page.tagged_from_cache())
    }

    pub fn set(&self, key: &str, page: Page) {
        if !self.is_enabled() {
            return;
        }
        let now = Instant::now();
        let mut state = self.write();
        if now.duration_since(state.last_sweep) >= self.check_period {
            Self::sweep_expired(&mut state, now);
        }
        state.entries.insert(
            key.to_string(),
            CacheEntry {
                page,
                expires_at: now + self.ttl,
            },
        );
    }

    /// Drop expired entries now, returns how many were removed
    pub fn sweep(&self) -> usize {
        Self::sweep_expired(&mut self.write(), Instant::now())
    }

    fn sweep_expired(state: &mut CacheState, now: Instant) -> usize {
        let before = state.entries.len();
        state.entries.retain(|_, cached| cached.expires_at > now);
        state.last_sweep = now;
        let removed = before - state.entries.len();
        if removed > 0 {
            debug!("Swept {} expired cache entries", removed);
        }
        removed
    }

    /// Forget every page that mentions the entry `id`
    pub fn invalidate_entry(&self, id: &str) {
        self.write()
            .entries
            .retain(|_, cached| !cached.page.entries.iter().any(|entry| entry.id == id));
    }

    pub fn clear(&self) {
        self.write().entries.clear();
    }

    /// Number of stored pages, expired ones included until swept
    pub fn len(&self) -> usize {
        self.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
