use std::{
    collections::{BTreeMap, HashMap},
    fmt::Debug,
    hash::Hash,
    path::Path,
    sync::atomic::{AtomicUsize, Ordering},
};

use alloy_primitives::{Address, B256, Bytes};
use parking_lot::RwLock;
use serde::Deserialize;

use crate::{
    common::{
        ContractResult, ContractTransactionHash, Entity, EntityId, EthereumTransaction, Nft,
        RecordFile, TimestampRange, Token, TokenAllowance, TokenBalance, Transaction,
        TransactionId, Versioned,
    },
    error::RepositoryError,
    repository::{
        ContractStateRepository, EntityRepository, RecordFileRepository, RepoResult,
        StorageChange, TokenRepository, TransactionRepository,
    },
};

/// Version history of one logical key; windows are disjoint and ordered.
#[derive(Debug)]
struct History<T> {
    versions: Vec<Versioned<T>>,
}

impl<T> Default for History<T> {
    fn default() -> Self {
        Self {
            versions: Vec::new(),
        }
    }
}

impl<T: Clone> History<T> {
    /// Makes `value` current from `timestamp`, closing the previous version.
    fn put(&mut self, timestamp: u64, value: T) -> Result<(), TimestampRange> {
        let range = TimestampRange::open(timestamp);
        if let Some(last) = self.versions.last_mut() {
            if last.range.start >= timestamp || last.range.end.is_some_and(|end| end > timestamp) {
                return Err(last.range);
            }
            if last.range.is_open() {
                last.range.end = Some(timestamp);
            }
        }
        self.versions.push(Versioned::new(value, range));
        Ok(())
    }

    fn current(&self) -> Option<&T> {
        self.versions
            .last()
            .filter(|version| version.range.is_open())
            .map(|version| &version.value)
    }

    fn at(&self, timestamp: u64) -> Option<&T> {
        let idx = self
            .versions
            .partition_point(|version| version.range.start <= timestamp);
        let version = self.versions.get(idx.checked_sub(1)?)?;
        version.range.contains(timestamp).then_some(&version.value)
    }
}

#[derive(Debug, Default)]
struct Ledger {
    record_files: BTreeMap<u64, RecordFile>,
    entities: HashMap<EntityId, History<Entity>>,
    aliases: HashMap<Address, EntityId>,
    bytecode: HashMap<EntityId, Bytes>,
    tokens: HashMap<EntityId, History<Token>>,
    balances: HashMap<(EntityId, EntityId), History<TokenBalance>>,
    allowances: HashMap<(EntityId, EntityId, EntityId), History<TokenAllowance>>,
    nfts: HashMap<(EntityId, u64), History<Nft>>,
    storage: HashMap<(EntityId, B256), B256>,
    changes: HashMap<(EntityId, B256), Vec<StorageChange>>,
    transactions: BTreeMap<u64, Transaction>,
    transaction_ids: HashMap<TransactionId, u64>,
    results: HashMap<u64, ContractResult>,
    hashes: HashMap<B256, ContractTransactionHash>,
    ethereum: HashMap<u64, EthereumTransaction>,
}

fn put<K, T>(
    map: &mut HashMap<K, History<T>>,
    key: K,
    timestamp: u64,
    value: T,
) -> RepoResult<()>
where
    K: Eq + Hash + Debug,
    T: Clone,
{
    let key_name = format!("{key:?}");
    map.entry(key)
        .or_default()
        .put(timestamp, value)
        .map_err(|existing| RepositoryError::Overlap {
            key: key_name,
            range: format!("{} against {}", TimestampRange::open(timestamp), existing),
        })
}

/// Repository over in-process maps, used by tests and the CLI.
#[derive(Debug, Default)]
pub struct MemRepository {
    ledger: RwLock<Ledger>,
    storage_queries: AtomicUsize,
}

#[derive(Debug, Deserialize)]
pub struct Timestamped<T> {
    pub timestamp: u64,
    #[serde(flatten)]
    pub value: T,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractCode {
    pub contract: EntityId,
    pub runtime: Bytes,
}

/// JSON layout accepted by [`MemRepository::load`].
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Fixture {
    pub record_files: Vec<RecordFile>,
    pub entities: Vec<Timestamped<Entity>>,
    pub bytecode: Vec<ContractCode>,
    pub tokens: Vec<Timestamped<Token>>,
    pub token_balances: Vec<Timestamped<TokenBalance>>,
    pub token_allowances: Vec<Timestamped<TokenAllowance>>,
    pub nfts: Vec<Timestamped<Nft>>,
    pub storage_changes: Vec<StorageChange>,
    pub transactions: Vec<Transaction>,
    pub contract_results: Vec<ContractResult>,
    pub contract_transaction_hashes: Vec<ContractTransactionHash>,
    pub ethereum_transactions: Vec<EthereumTransaction>,
}

impl MemRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(path: impl AsRef<Path>) -> RepoResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| RepositoryError::Fixture(format!("{}: {e}", path.display())))?;
        let fixture: Fixture = serde_json::from_str(&json)
            .map_err(|e| RepositoryError::Fixture(format!("{}: {e}", path.display())))?;
        Self::from_fixture(fixture)
    }

    pub fn from_fixture(fixture: Fixture) -> RepoResult<Self> {
        let repo = Self::new();
        for file in fixture.record_files {
            repo.insert_record_file(file);
        }
        for Timestamped { timestamp, value } in fixture.entities {
            repo.put_entity(timestamp, value)?;
        }
        for code in fixture.bytecode {
            repo.put_bytecode(code.contract, code.runtime);
        }
        for Timestamped { timestamp, value } in fixture.tokens {
            repo.put_token(timestamp, value)?;
        }
        for Timestamped { timestamp, value } in fixture.token_balances {
            repo.put_token_balance(timestamp, value)?;
        }
        for Timestamped { timestamp, value } in fixture.token_allowances {
            repo.put_token_allowance(timestamp, value)?;
        }
        for Timestamped { timestamp, value } in fixture.nfts {
            repo.put_nft(timestamp, value)?;
        }
        let mut changes = fixture.storage_changes;
        changes.sort_by_key(|change| change.consensus_timestamp);
        for change in changes {
            repo.put_storage_change(change)?;
        }
        for tx in fixture.transactions {
            repo.insert_transaction(tx);
        }
        for result in fixture.contract_results {
            repo.insert_contract_result(result);
        }
        for link in fixture.contract_transaction_hashes {
            repo.insert_contract_transaction_hash(link);
        }
        for eth in fixture.ethereum_transactions {
            repo.insert_ethereum_transaction(eth);
        }
        Ok(repo)
    }

    pub fn insert_record_file(&self, file: RecordFile) {
        self.ledger.write().record_files.insert(file.index, file);
    }

    pub fn put_entity(&self, timestamp: u64, entity: Entity) -> RepoResult<()> {
        let mut ledger = self.ledger.write();
        if let Some(alias) = entity.evm_address {
            ledger.aliases.insert(alias, entity.id);
        }
        put(&mut ledger.entities, entity.id, timestamp, entity)
    }

    pub fn put_bytecode(&self, contract: EntityId, runtime: impl Into<Bytes>) {
        self.ledger.write().bytecode.insert(contract, runtime.into());
    }

    pub fn put_token(&self, timestamp: u64, token: Token) -> RepoResult<()> {
        put(&mut self.ledger.write().tokens, token.id, timestamp, token)
    }

    pub fn put_token_balance(&self, timestamp: u64, balance: TokenBalance) -> RepoResult<()> {
        let key = (balance.token, balance.account);
        put(&mut self.ledger.write().balances, key, timestamp, balance)
    }

    pub fn put_token_allowance(&self, timestamp: u64, allowance: TokenAllowance) -> RepoResult<()> {
        let key = (allowance.token, allowance.owner, allowance.spender);
        put(&mut self.ledger.write().allowances, key, timestamp, allowance)
    }

    pub fn put_nft(&self, timestamp: u64, nft: Nft) -> RepoResult<()> {
        let key = (nft.token, nft.serial);
        put(&mut self.ledger.write().nfts, key, timestamp, nft)
    }

    /// Appends a change record and applies any written value to current storage.
    pub fn put_storage_change(&self, change: StorageChange) -> RepoResult<()> {
        let mut ledger = self.ledger.write();
        let key = (change.contract, change.slot);
        let history = ledger.changes.entry(key).or_default();
        if let Some(last) = history.last()
            && last.consensus_timestamp >= change.consensus_timestamp
        {
            return Err(RepositoryError::Overlap {
                key: format!("{}/{}", change.contract, change.slot),
                range: format!(
                    "change at {} is not after {}",
                    change.consensus_timestamp, last.consensus_timestamp
                ),
            });
        }
        history.push(change.clone());
        match change.value_written {
            Some(value) if value.is_zero() => {
                ledger.storage.remove(&key);
            }
            Some(value) => {
                ledger.storage.insert(key, value);
            }
            None => (),
        }
        Ok(())
    }

    /// Drops the current row and the history of one slot, as compaction would.
    pub fn delete_storage(&self, contract: EntityId, slot: B256) {
        let mut ledger = self.ledger.write();
        ledger.storage.remove(&(contract, slot));
        ledger.changes.remove(&(contract, slot));
    }

    pub fn insert_transaction(&self, tx: Transaction) {
        let mut ledger = self.ledger.write();
        ledger.transaction_ids.insert(tx.id(), tx.consensus_timestamp);
        ledger.transactions.insert(tx.consensus_timestamp, tx);
    }

    pub fn insert_contract_result(&self, result: ContractResult) {
        self.ledger
            .write()
            .results
            .insert(result.consensus_timestamp, result);
    }

    pub fn insert_contract_transaction_hash(&self, link: ContractTransactionHash) {
        self.ledger.write().hashes.insert(link.hash, link);
    }

    pub fn insert_ethereum_transaction(&self, eth: EthereumTransaction) {
        self.ledger
            .write()
            .ethereum
            .insert(eth.consensus_timestamp, eth);
    }

    /// Number of current-storage queries served so far.
    pub fn storage_queries(&self) -> usize {
        self.storage_queries.load(Ordering::Relaxed)
    }
}

impl RecordFileRepository for MemRepository {
    fn latest_record_file(&self) -> RepoResult<Option<RecordFile>> {
        Ok(self.ledger.read().record_files.last_key_value().map(|(_, f)| f.clone()))
    }

    fn earliest_record_file(&self) -> RepoResult<Option<RecordFile>> {
        Ok(self.ledger.read().record_files.first_key_value().map(|(_, f)| f.clone()))
    }

    fn find_record_file(&self, index: u64) -> RepoResult<Option<RecordFile>> {
        Ok(self.ledger.read().record_files.get(&index).cloned())
    }

    fn find_record_file_at(&self, timestamp: u64) -> RepoResult<Option<RecordFile>> {
        Ok(self
            .ledger
            .read()
            .record_files
            .values()
            .find(|file| file.contains(timestamp))
            .cloned())
    }
}

impl EntityRepository for MemRepository {
    fn find_entity(&self, id: EntityId) -> RepoResult<Option<Entity>> {
        let ledger = self.ledger.read();
        Ok(ledger.entities.get(&id).and_then(History::current).cloned())
    }

    fn find_entity_at(&self, id: EntityId, timestamp: u64) -> RepoResult<Option<Entity>> {
        let ledger = self.ledger.read();
        Ok(ledger.entities.get(&id).and_then(|h| h.at(timestamp)).cloned())
    }

    fn find_entity_by_alias(&self, address: &Address) -> RepoResult<Option<EntityId>> {
        Ok(self.ledger.read().aliases.get(address).copied())
    }

    fn find_runtime_bytecode(&self, contract: EntityId) -> RepoResult<Option<Bytes>> {
        Ok(self.ledger.read().bytecode.get(&contract).cloned())
    }
}

impl TokenRepository for MemRepository {
    fn find_token(&self, id: EntityId) -> RepoResult<Option<Token>> {
        Ok(self.ledger.read().tokens.get(&id).and_then(History::current).cloned())
    }

    fn find_token_at(&self, id: EntityId, timestamp: u64) -> RepoResult<Option<Token>> {
        let ledger = self.ledger.read();
        Ok(ledger.tokens.get(&id).and_then(|h| h.at(timestamp)).cloned())
    }

    fn find_token_balance(
        &self,
        token: EntityId,
        account: EntityId,
    ) -> RepoResult<Option<TokenBalance>> {
        let ledger = self.ledger.read();
        Ok(ledger
            .balances
            .get(&(token, account))
            .and_then(History::current)
            .cloned())
    }

    fn find_token_balance_at(
        &self,
        token: EntityId,
        account: EntityId,
        timestamp: u64,
    ) -> RepoResult<Option<TokenBalance>> {
        let ledger = self.ledger.read();
        Ok(ledger
            .balances
            .get(&(token, account))
            .and_then(|h| h.at(timestamp))
            .cloned())
    }

    fn find_token_allowance(
        &self,
        token: EntityId,
        owner: EntityId,
        spender: EntityId,
    ) -> RepoResult<Option<TokenAllowance>> {
        let ledger = self.ledger.read();
        Ok(ledger
            .allowances
            .get(&(token, owner, spender))
            .and_then(History::current)
            .cloned())
    }

    fn find_token_allowance_at(
        &self,
        token: EntityId,
        owner: EntityId,
        spender: EntityId,
        timestamp: u64,
    ) -> RepoResult<Option<TokenAllowance>> {
        let ledger = self.ledger.read();
        Ok(ledger
            .allowances
            .get(&(token, owner, spender))
            .and_then(|h| h.at(timestamp))
            .cloned())
    }

    fn find_nft(&self, token: EntityId, serial: u64) -> RepoResult<Option<Nft>> {
        let ledger = self.ledger.read();
        Ok(ledger.nfts.get(&(token, serial)).and_then(History::current).cloned())
    }

    fn find_nft_at(&self, token: EntityId, serial: u64, timestamp: u64) -> RepoResult<Option<Nft>> {
        let ledger = self.ledger.read();
        Ok(ledger
            .nfts
            .get(&(token, serial))
            .and_then(|h| h.at(timestamp))
            .cloned())
    }
}

impl ContractStateRepository for MemRepository {
    fn find_storage(&self, contract: EntityId, slot: B256) -> RepoResult<Option<B256>> {
        self.storage_queries.fetch_add(1, Ordering::Relaxed);
        Ok(self.ledger.read().storage.get(&(contract, slot)).copied())
    }

    fn find_storage_batch(
        &self,
        contract: EntityId,
        slots: &[B256],
    ) -> RepoResult<Vec<(B256, B256)>> {
        self.storage_queries.fetch_add(1, Ordering::Relaxed);
        let ledger = self.ledger.read();
        Ok(slots
            .iter()
            .filter_map(|slot| {
                ledger
                    .storage
                    .get(&(contract, *slot))
                    .map(|value| (*slot, *value))
            })
            .collect())
    }

    fn find_storage_change_at(
        &self,
        contract: EntityId,
        slot: B256,
        timestamp: u64,
    ) -> RepoResult<Option<StorageChange>> {
        let ledger = self.ledger.read();
        let Some(changes) = ledger.changes.get(&(contract, slot)) else {
            return Ok(None);
        };
        let idx = changes.partition_point(|change| change.consensus_timestamp <= timestamp);
        Ok(idx.checked_sub(1).map(|idx| changes[idx].clone()))
    }
}

impl TransactionRepository for MemRepository {
    fn find_transaction(&self, id: &TransactionId) -> RepoResult<Option<Transaction>> {
        let ledger = self.ledger.read();
        Ok(ledger
            .transaction_ids
            .get(id)
            .and_then(|ts| ledger.transactions.get(ts))
            .cloned())
    }

    fn find_transaction_at(&self, consensus_timestamp: u64) -> RepoResult<Option<Transaction>> {
        Ok(self
            .ledger
            .read()
            .transactions
            .get(&consensus_timestamp)
            .cloned())
    }

    fn find_contract_result(
        &self,
        consensus_timestamp: u64,
    ) -> RepoResult<Option<ContractResult>> {
        Ok(self.ledger.read().results.get(&consensus_timestamp).cloned())
    }

    fn find_contract_transaction_hash(
        &self,
        hash: &B256,
    ) -> RepoResult<Option<ContractTransactionHash>> {
        Ok(self.ledger.read().hashes.get(hash).cloned())
    }

    fn find_ethereum_transaction(
        &self,
        consensus_timestamp: u64,
    ) -> RepoResult<Option<EthereumTransaction>> {
        Ok(self.ledger.read().ethereum.get(&consensus_timestamp).cloned())
    }
}
