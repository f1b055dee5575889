use crate::domain_model::*;
use crate::domain_port::*;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

struct Expiring<T> {
    value: T,
    evict_at: Instant,
}

impl<T> Expiring<T> {
    fn is_live(&self, now: Instant) -> bool {
        now < self.evict_at
    }
}

#[derive(Default)]
struct State {
    families: HashMap<FamilyId, Expiring<SessionFamily>>,
    user_index: HashMap<UserId, Expiring<HashSet<FamilyId>>>,
}

impl State {
    fn live_family(&mut self, family_id: &FamilyId, now: Instant) -> Option<&mut SessionFamily> {
        if self
            .families
            .get(family_id)
            .is_some_and(|entry| !entry.is_live(now))
        {
            self.families.remove(family_id);
        }
        self.families.get_mut(family_id).map(|entry| &mut entry.value)
    }

    /// Drop every entry past its eviction time, then index members whose family is gone.
    fn sweep(&mut self, now: Instant) {
        self.families.retain(|_, entry| entry.is_live(now));

        let families = &self.families;
        self.user_index.retain(|_, index| {
            index.value.retain(|family_id| families.contains_key(family_id));
            index.is_live(now) && !index.value.is_empty()
        });
    }

    fn unindex(&mut self, user_id: UserId, family_id: &FamilyId) {
        if let Some(entry) = self.user_index.get_mut(&user_id) {
            entry.value.remove(family_id);
            if entry.value.is_empty() {
                self.user_index.remove(&user_id);
            }
        }
    }
}

/// Process-local family store for tests and single-node development.
///
/// NOT for production: rotation is a read-modify-write under one coarse mutex, which
/// only serialises callers inside this process. Expired entries are dropped on access
/// and swept on every `create`.
pub struct InMemorySessionFamilyStore {
    state: Mutex<State>,
    retention: Duration,
}

impl InMemorySessionFamilyStore {
    pub fn new(retention: Duration) -> Self {
        Self {
            state: Mutex::new(State::default()),
            retention,
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>, SessionStoreError> {
        self.state
            .lock()
            .map_err(|e| SessionStoreError::Store(format!("state lock poisoned: {}", e)))
    }

    fn evict_at(&self, ttl: Duration) -> Instant {
        Instant::now() + ttl + self.retention
    }
}

impl Default for InMemorySessionFamilyStore {
    fn default() -> Self {
        Self::new(Duration::ZERO)
    }
}

#[async_trait::async_trait]
impl SessionFamilyStore for InMemorySessionFamilyStore {
    async fn create(
        &self,
        family_id: &FamilyId,
        record: &SessionFamily,
        ttl: Duration,
    ) -> Result<(), SessionStoreError> {
        let evict_at = self.evict_at(ttl);
        let now = Instant::now();
        let mut state = self.lock()?;
        state.sweep(now);

        state.families.insert(
            family_id.clone(),
            Expiring {
                value: record.clone(),
                evict_at,
            },
        );

        let index = state
            .user_index
            .entry(record.user_id)
            .or_insert_with(|| Expiring {
                value: HashSet::new(),
                evict_at,
            });
        if !index.is_live(now) {
            index.value.clear();
        }
        index.value.insert(family_id.clone());
        index.evict_at = index.evict_at.max(evict_at);

        Ok(())
    }

    async fn get(&self, family_id: &FamilyId) -> Result<Option<SessionFamily>, SessionStoreError> {
        let mut state = self.lock()?;
        Ok(state.live_family(family_id, Instant::now()).cloned())
    }

    async fn rotate(
        &self,
        family_id: &FamilyId,
        expected_current: &TokenHash,
        new_token_hash: &TokenHash,
        ttl: Duration,
    ) -> Result<DateTime<Utc>, SessionStoreError> {
        let evict_at = self.evict_at(ttl);
        let mut state = self.lock()?;

        let record = state
            .live_family(family_id, Instant::now())
            .ok_or(SessionStoreError::FamilyNotFound)?;
        if record.current_token_hash != *expected_current {
            return Err(SessionStoreError::RotationConflict);
        }
        let expires_at = Utc::now() + ttl;
        let rotated = record.rotated(new_token_hash.clone(), expires_at);
        let user_id = rotated.user_id;

        state.families.insert(
            family_id.clone(),
            Expiring {
                value: rotated,
                evict_at,
            },
        );
        if let Some(index) = state.user_index.get_mut(&user_id) {
            index.evict_at = index.evict_at.max(evict_at);
        }

        Ok(expires_at)
    }

    async fn delete(&self, family_id: &FamilyId) -> Result<(), SessionStoreError> {
        let mut state = self.lock()?;

        if let Some(entry) = state.families.remove(family_id) {
            state.unindex(entry.value.user_id, family_id);
        }

        Ok(())
    }

    async fn delete_all_by_user_id(&self, user_id: UserId) -> Result<(), SessionStoreError> {
        let mut state = self.lock()?;

        if let Some(index) = state.user_index.remove(&user_id) {
            for family_id in index.value {
                state.families.remove(&family_id);
            }
        }

        Ok(())
    }

    async fn family_ids_by_user_id(
        &self,
        user_id: UserId,
    ) -> Result<Vec<FamilyId>, SessionStoreError> {
        let state = self.lock()?;
        let now = Instant::now();

        Ok(state
            .user_index
            .get(&user_id)
            .filter(|index| index.is_live(now))
            .map(|index| index.value.iter().cloned().collect())
            .unwrap_or_default())
    }
}
