//! Bounded cache of current contract storage.
//!
//! An outer LRU keyed by contract holds one inner LRU of slots per contract,
//! each behind its own lock. Entries leave only through capacity or
//! expiry; deleting the backing rows never removes a cached value.

use std::{
    num::NonZeroUsize,
    sync::Arc,
    time::{Duration, Instant},
};

use alloy_primitives::B256;
use lru::LruCache;
use parking_lot::Mutex;
use tracing::trace;

use crate::{common::EntityId, config::CacheConfig};

struct Slot {
    value: B256,
    accessed: Instant,
}

struct ContractSlots {
    values: LruCache<B256, Slot>,
    /// Keys requested recently, the candidates for a batch prefetch.
    known: LruCache<B256, ()>,
}

impl ContractSlots {
    fn new(capacity: NonZeroUsize, batch_size: NonZeroUsize) -> Self {
        Self {
            values: LruCache::new(capacity),
            known: LruCache::new(batch_size),
        }
    }

    fn get(&mut self, slot: &B256, ttl: Duration) -> Option<B256> {
        let entry = self.values.get_mut(slot)?;
        if entry.accessed.elapsed() > ttl {
            self.values.pop(slot);
            return None;
        }
        entry.accessed = Instant::now();
        Some(entry.value)
    }

    fn insert(&mut self, slot: B256, value: B256) {
        self.values.put(
            slot,
            Slot {
                value,
                accessed: Instant::now(),
            },
        );
    }
}

fn non_zero(n: usize) -> NonZeroUsize {
    NonZeroUsize::new(n).unwrap_or(NonZeroUsize::MIN)
}

pub struct ContractStorageCache {
    config: CacheConfig,
    contracts: Mutex<LruCache<EntityId, Arc<Mutex<ContractSlots>>>>,
}

impl ContractStorageCache {
    pub fn new(config: CacheConfig) -> Self {
        let contracts = Mutex::new(LruCache::new(non_zero(config.max_contracts)));
        Self { config, contracts }
    }

    fn slots(&self, contract: EntityId) -> Arc<Mutex<ContractSlots>> {
        let mut contracts = self.contracts.lock();
        contracts
            .get_or_insert(contract, || {
                Arc::new(Mutex::new(ContractSlots::new(
                    non_zero(self.config.max_entries_per_contract),
                    non_zero(self.config.batch_size),
                )))
            })
            .clone()
    }

    pub fn get(&self, contract: EntityId, slot: &B256) -> Option<B256> {
        let slots = self.contracts.lock().get(&contract).cloned()?;
        let mut slots = slots.lock();
        slots.get(slot, self.config.expire_after_access)
    }

    pub fn insert(&self, contract: EntityId, slot: B256, value: B256) {
        self.slots(contract).lock().insert(slot, value);
    }

    /// Cached value of `slot`, or the result of `load` on a miss.
    ///
    /// `load` receives the keys to fetch: just `slot`, or with batching
    /// enabled up to `batch_size` recently requested keys of the contract.
    /// Everything it returns is cached; a slot it omits is unset.
    pub fn get_or_load<E>(
        &self,
        contract: EntityId,
        slot: B256,
        load: impl FnOnce(&[B256]) -> Result<Vec<(B256, B256)>, E>,
    ) -> Result<Option<B256>, E> {
        let slots = self.slots(contract);
        let keys = {
            let mut slots = slots.lock();
            if let Some(value) = slots.get(&slot, self.config.expire_after_access) {
                return Ok(Some(value));
            }
            slots.known.put(slot, ());
            if self.config.batch_enabled {
                let mut keys = vec![slot];
                keys.extend(
                    slots
                        .known
                        .iter()
                        .map(|(key, _)| *key)
                        .filter(|key| *key != slot && !slots.values.contains(key))
                        .take(self.config.batch_size.saturating_sub(1)),
                );
                keys
            } else {
                vec![slot]
            }
        };

        trace!(%contract, %slot, keys = keys.len(), "storage cache miss");
        let loaded = load(&keys)?;

        let mut slots = slots.lock();
        let mut found = None;
        for (key, value) in loaded {
            if key == slot {
                found = Some(value);
            }
            slots.insert(key, value);
        }
        Ok(found)
    }

    /// Cached slots of `contract`.
    pub fn len(&self, contract: EntityId) -> usize {
        self.contracts
            .lock()
            .peek(&contract)
            .map(|slots| slots.lock().values.len())
            .unwrap_or_default()
    }

    pub fn contracts(&self) -> usize {
        self.contracts.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.contracts.lock().is_empty()
    }
}
