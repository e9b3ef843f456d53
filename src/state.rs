//! The VM's view of the ledger at one snapshot.

use std::{collections::HashMap, time::Instant};

use alloy_primitives::{Address, B256, Bytes, U256};
use parking_lot::Mutex;
use revm::{
    bytecode::Bytecode,
    database_interface::DatabaseRef,
    primitives::KECCAK_EMPTY,
    state::AccountInfo,
};
use tracing::trace;

use crate::{
    cache::ContractStorageCache,
    common::{Entity, EntityId, EntityKind, Nft, Token},
    error::RepositoryError,
    repository::{RepoResult, Repository},
    snapshot::Snapshot,
};

/// Code reported for token accounts so that `EXTCODESIZE` sees a contract.
/// Never executed: token calls are answered by the token facade.
pub const TOKEN_PLACEHOLDER_CODE: [u8; 1] = [0xfe];

pub struct StateProvider<'a, R: ?Sized> {
    repository: &'a R,
    cache: &'a ContractStorageCache,
    snapshot: &'a Snapshot,
    entities: Mutex<HashMap<Address, Option<Entity>>>,
    codes: Mutex<HashMap<B256, Bytecode>>,
}

impl<'a, R: Repository + ?Sized> StateProvider<'a, R> {
    pub fn new(repository: &'a R, cache: &'a ContractStorageCache, snapshot: &'a Snapshot) -> Self {
        Self {
            repository,
            cache,
            snapshot,
            entities: Mutex::new(HashMap::new()),
            codes: Mutex::new(HashMap::new()),
        }
    }

    pub fn snapshot(&self) -> &Snapshot {
        self.snapshot
    }

    /// Entity behind `address` at this snapshot, by long-zero id or alias.
    /// Deleted entities do not exist.
    pub fn entity(&self, address: &Address) -> RepoResult<Option<Entity>> {
        if let Some(entity) = self.entities.lock().get(address) {
            return Ok(entity.clone());
        }
        let id = if EntityId::is_default_long_zero(address) {
            EntityId::from_long_zero(address)
        } else {
            match self.repository.find_entity_by_alias(address)? {
                Some(id) => id,
                None => EntityId::from_long_zero(address),
            }
        };
        let entity = self.entity_by_id(id)?;
        self.entities.lock().insert(*address, entity.clone());
        Ok(entity)
    }

    pub fn entity_by_id(&self, id: EntityId) -> RepoResult<Option<Entity>> {
        let entity = if self.snapshot.historical {
            self.repository.find_entity_at(id, self.snapshot.read_point())?
        } else {
            self.repository.find_entity(id)?
        };
        Ok(entity.filter(|entity| !entity.deleted))
    }

    pub fn account_exists(&self, address: &Address) -> RepoResult<bool> {
        Ok(self.entity(address)?.is_some())
    }

    pub fn is_token(&self, address: &Address) -> RepoResult<bool> {
        Ok(self.entity(address)?.is_some_and(|entity| entity.is_token()))
    }

    pub fn balance(&self, address: &Address) -> RepoResult<U256> {
        Ok(self
            .entity(address)?
            .map(|entity| entity.balance)
            .unwrap_or_default())
    }

    pub fn code(&self, address: &Address) -> RepoResult<Option<Bytes>> {
        let Some(entity) = self.entity(address)? else {
            return Ok(None);
        };
        match entity.kind {
            EntityKind::Account => Ok(None),
            EntityKind::Token => Ok(Some(Bytes::from_static(&TOKEN_PLACEHOLDER_CODE))),
            EntityKind::Contract => Ok(self
                .repository
                .find_runtime_bytecode(entity.id)?
                .filter(|code| !code.is_empty())),
        }
    }

    /// Slot value at this snapshot; unset slots read as zero.
    ///
    /// Latest snapshots read current storage through the cache. Historical
    /// ones take the latest change at or before the read point, bypassing it.
    pub fn storage(&self, contract: EntityId, slot: B256) -> RepoResult<B256> {
        let now = Instant::now();
        let value = if self.snapshot.historical {
            self.repository
                .find_storage_change_at(contract, slot, self.snapshot.read_point())?
                .map(|change| change.value_written.unwrap_or(change.value_read))
        } else {
            self.cache.get_or_load(contract, slot, |keys| -> RepoResult<_> {
                match keys {
                    [key] => Ok(self
                        .repository
                        .find_storage(contract, *key)?
                        .map(|value| vec![(*key, value)])
                        .unwrap_or_default()),
                    keys => self.repository.find_storage_batch(contract, keys),
                }
            })?
        };
        let value = value.unwrap_or_default();
        let us = now.elapsed().as_micros();
        trace!(%contract, %slot, %value, historical = self.snapshot.historical, "SLOAD: [{us} us]");
        Ok(value)
    }

    pub fn token(&self, id: EntityId) -> RepoResult<Option<Token>> {
        if self.snapshot.historical {
            self.repository.find_token_at(id, self.snapshot.read_point())
        } else {
            self.repository.find_token(id)
        }
    }

    pub fn token_balance(&self, token: EntityId, account: EntityId) -> RepoResult<U256> {
        let balance = if self.snapshot.historical {
            self.repository
                .find_token_balance_at(token, account, self.snapshot.read_point())?
        } else {
            self.repository.find_token_balance(token, account)?
        };
        Ok(balance.map(|b| b.balance).unwrap_or_default())
    }

    pub fn token_allowance(
        &self,
        token: EntityId,
        owner: EntityId,
        spender: EntityId,
    ) -> RepoResult<U256> {
        let allowance = if self.snapshot.historical {
            self.repository.find_token_allowance_at(
                token,
                owner,
                spender,
                self.snapshot.read_point(),
            )?
        } else {
            self.repository.find_token_allowance(token, owner, spender)?
        };
        Ok(allowance.map(|a| a.amount).unwrap_or_default())
    }

    pub fn nft(&self, token: EntityId, serial: u64) -> RepoResult<Option<Nft>> {
        if self.snapshot.historical {
            self.repository
                .find_nft_at(token, serial, self.snapshot.read_point())
        } else {
            self.repository.find_nft(token, serial)
        }
    }
}

impl<R: Repository + ?Sized> DatabaseRef for StateProvider<'_, R> {
    type Error = RepositoryError;

    fn basic_ref(&self, address: Address) -> Result<Option<AccountInfo>, Self::Error> {
        let Some(entity) = self.entity(&address)? else {
            return Ok(None);
        };
        let info = match self.code(&address)? {
            Some(code) => {
                let bytecode = Bytecode::new_raw(code);
                let hash = bytecode.hash_slow();
                self.codes.lock().insert(hash, bytecode.clone());
                AccountInfo::new(entity.balance, entity.nonce, hash, bytecode)
            }
            None => AccountInfo::new(entity.balance, entity.nonce, KECCAK_EMPTY, Bytecode::default()),
        };
        Ok(Some(info))
    }

    fn code_by_hash_ref(&self, code_hash: B256) -> Result<Bytecode, Self::Error> {
        Ok(self.codes.lock().get(&code_hash).cloned().unwrap_or_default())
    }

    fn storage_ref(&self, address: Address, index: U256) -> Result<U256, Self::Error> {
        let contract = match self.entity(&address)? {
            Some(entity) if entity.kind == EntityKind::Contract => entity.id,
            _ => return Ok(U256::ZERO),
        };
        let value = self.storage(contract, B256::from(index))?;
        Ok(U256::from_be_bytes(value.0))
    }

    fn block_hash_ref(&self, number: u64) -> Result<B256, Self::Error> {
        Ok(self
            .repository
            .find_record_file(number)?
            .map(|file| file.hash)
            .unwrap_or_default())
    }
}
