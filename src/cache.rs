use crate::permission::TargetKey;
use crate::resolver::DetailedPermissions;
use lru::LruCache;
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};

type CacheKey = (i64, TargetKey);

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Arc<DetailedPermissions>,
    expires_at: Instant,
}

/// Bookkeeping for a principal that has at least one cached entry.
#[derive(Debug, Default)]
struct Resident {
    entries: usize,
    roles: BTreeSet<i64>,
}

#[derive(Debug)]
struct CacheState {
    entries: LruCache<CacheKey, CacheEntry>,
    /// Advances on every invalidation. Tickets carry the value they saw.
    clock: u64,
    /// Tickets issued before this tick are stale for every principal.
    floor: u64,
    /// Tick of the last invalidation per principal, only above `floor`.
    /// Folded into `floor` once it outgrows the entry capacity.
    invalidated_at: HashMap<i64, u64>,
    residents: HashMap<i64, Resident>,
    /// role id -> resident principals whose cached snapshot held that role.
    role_members: HashMap<i64, BTreeSet<i64>>,
}

impl CacheState {
    fn advance_floor(&mut self) {
        self.clock += 1;
        self.floor = self.clock;
        self.invalidated_at.clear();
    }

    fn is_stale(&self, ticket: &CacheTicket) -> bool {
        ticket.issued < self.floor
            || self
                .invalidated_at
                .get(&ticket.principal_id)
                .is_some_and(|&at| at > ticket.issued)
    }

    fn admit(&mut self, principal_id: i64, role_ids: impl IntoIterator<Item = i64>) {
        let resident = self.residents.entry(principal_id).or_default();
        resident.entries += 1;
        for role_id in role_ids {
            if resident.roles.insert(role_id) {
                self.role_members
                    .entry(role_id)
                    .or_default()
                    .insert(principal_id);
            }
        }
    }

    /// Accounts for one entry of `principal_id` leaving the LRU.
    fn release(&mut self, principal_id: i64) {
        let Some(resident) = self.residents.get_mut(&principal_id) else {
            return;
        };
        resident.entries = resident.entries.saturating_sub(1);
        if resident.entries == 0 {
            self.evict_resident(principal_id);
        }
    }

    fn evict_resident(&mut self, principal_id: i64) {
        let Some(resident) = self.residents.remove(&principal_id) else {
            return;
        };
        for role_id in resident.roles {
            if let Some(members) = self.role_members.get_mut(&role_id) {
                members.remove(&principal_id);
                if members.is_empty() {
                    self.role_members.remove(&role_id);
                }
            }
        }
    }

    fn drop_principal(&mut self, principal_id: i64) -> usize {
        let stale: Vec<CacheKey> = self
            .entries
            .iter()
            .filter(|((cached_principal, _), _)| *cached_principal == principal_id)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &stale {
            self.entries.pop(key);
        }
        self.evict_resident(principal_id);
        stale.len()
    }
}

/// Proof of the invalidation clock at the moment a resolution started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheTicket {
    principal_id: i64,
    issued: u64,
}

/// Resolved permissions keyed by `(principal, schema, table, view)`.
///
/// Invalidation is always principal-wide: a broader grant change can alter
/// the answer for any narrower target, so no entry of an affected principal
/// survives. A resolution that began before an invalidation is dropped instead
/// of being inserted after it.
///
/// Role membership and invalidation bookkeeping only track principals that
/// still have entries, so memory follows `max_entries` rather than the number
/// of principals ever seen.
#[derive(Debug)]
pub struct PermissionCache {
    state: Mutex<CacheState>,
    ttl: Duration,
}

impl PermissionCache {
    pub fn new(max_entries: usize, ttl: Duration) -> Self {
        let cap = NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::MIN);
        Self {
            state: Mutex::new(CacheState {
                entries: LruCache::new(cap),
                clock: 0,
                floor: 0,
                invalidated_at: HashMap::new(),
                residents: HashMap::new(),
                role_members: HashMap::new(),
            }),
            ttl,
        }
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(
        &self,
        principal_id: i64,
        key: &TargetKey,
        now: Instant,
    ) -> Option<Arc<DetailedPermissions>> {
        let mut state = self.state.lock();
        let cache_key = (principal_id, key.clone());
        let entry = state.entries.get(&cache_key)?;
        if entry.expires_at > now {
            tracing::debug!(principal_id, target = ?key, "permission cache hit");
            return Some(Arc::clone(&entry.value));
        }
        state.entries.pop(&cache_key);
        state.release(principal_id);
        tracing::debug!(principal_id, target = ?key, "permission cache entry expired");
        None
    }

    pub fn ticket(&self, principal_id: i64) -> CacheTicket {
        let state = self.state.lock();
        CacheTicket {
            principal_id,
            issued: state.clock,
        }
    }

    /// Stores a resolution. Returns `false` when the principal was invalidated
    /// after `ticket` was taken, in which case nothing is stored.
    pub fn put(
        &self,
        ticket: CacheTicket,
        key: TargetKey,
        role_ids: impl IntoIterator<Item = i64>,
        value: Arc<DetailedPermissions>,
        now: Instant,
    ) -> bool {
        let mut state = self.state.lock();
        if state.is_stale(&ticket) {
            tracing::debug!(
                principal_id = ticket.principal_id,
                target = ?key,
                "dropping resolution that raced an invalidation"
            );
            return false;
        }
        let cache_key = (ticket.principal_id, key);
        let entry = CacheEntry {
            value,
            expires_at: now + self.ttl,
        };
        let replaced = state.entries.contains(&cache_key);
        // Count the new entry before releasing the evicted one, which may
        // belong to the same principal.
        state.admit(ticket.principal_id, role_ids);
        if let Some((evicted, _)) = state.entries.push(cache_key, entry) {
            if replaced {
                state.release(ticket.principal_id);
            } else {
                state.release(evicted.0);
            }
        }
        true
    }

    /// Drops every cached target of one principal.
    pub fn invalidate_principal(&self, principal_id: i64) {
        let mut state = self.state.lock();
        let dropped = state.drop_principal(principal_id);
        if state.invalidated_at.len() >= state.entries.cap().get() {
            state.advance_floor();
        } else {
            state.clock += 1;
            let at = state.clock;
            state.invalidated_at.insert(principal_id, at);
        }
        tracing::debug!(
            principal_id,
            dropped,
            "invalidated cached permissions for principal"
        );
    }

    /// Drops every principal whose cached snapshot held `role_id`. Returns the
    /// affected principal ids. Resolutions in flight for any principal are
    /// discarded too, since their snapshot may predate the role change.
    pub fn invalidate_role(&self, role_id: i64) -> Vec<i64> {
        let mut state = self.state.lock();
        state.advance_floor();
        let members = state.role_members.remove(&role_id).unwrap_or_default();
        for principal_id in &members {
            let dropped = state.drop_principal(*principal_id);
            tracing::debug!(
                principal_id = *principal_id,
                role_id,
                dropped,
                "invalidated cached permissions for role member"
            );
        }
        members.into_iter().collect()
    }

    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.entries.clear();
        state.residents.clear();
        state.role_members.clear();
        state.advance_floor();
    }

    /// (resident principals, role memberships, invalidation stamps)
    #[cfg(test)]
    fn bookkeeping(&self) -> (usize, usize, usize) {
        let state = self.state.lock();
        (
            state.residents.len(),
            state.role_members.values().map(BTreeSet::len).sum(),
            state.invalidated_at.len(),
        )
    }
}
