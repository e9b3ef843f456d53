//! Read-only access to the ledger's relational history.
//!
//! Methods without a timestamp read the current tables; `*_at` methods read
//! the version valid at the given consensus timestamp.

pub mod mem;

use alloy_primitives::{Address, B256, Bytes};

use crate::{
    common::{
        ContractResult, ContractTransactionHash, Entity, EntityId, EthereumTransaction, Nft,
        RecordFile, Token, TokenAllowance, TokenBalance, Transaction, TransactionId,
    },
    error::RepositoryError,
};

pub use mem::MemRepository;

pub type RepoResult<T> = Result<T, RepositoryError>;

/// Historical change of one storage slot.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageChange {
    pub contract: EntityId,
    pub slot: B256,
    pub consensus_timestamp: u64,
    #[serde(default)]
    pub value_read: B256,
    /// `None` when the slot was only read by the transaction.
    #[serde(default)]
    pub value_written: Option<B256>,
}

pub trait RecordFileRepository {
    fn latest_record_file(&self) -> RepoResult<Option<RecordFile>>;
    fn earliest_record_file(&self) -> RepoResult<Option<RecordFile>>;
    fn find_record_file(&self, index: u64) -> RepoResult<Option<RecordFile>>;
    /// The record file whose window contains `timestamp`.
    fn find_record_file_at(&self, timestamp: u64) -> RepoResult<Option<RecordFile>>;
}

pub trait EntityRepository {
    fn find_entity(&self, id: EntityId) -> RepoResult<Option<Entity>>;
    fn find_entity_at(&self, id: EntityId, timestamp: u64) -> RepoResult<Option<Entity>>;
    /// Resolves an EVM alias (not a long-zero address).
    fn find_entity_by_alias(&self, address: &Address) -> RepoResult<Option<EntityId>>;
    fn find_runtime_bytecode(&self, contract: EntityId) -> RepoResult<Option<Bytes>>;
}

pub trait TokenRepository {
    fn find_token(&self, id: EntityId) -> RepoResult<Option<Token>>;
    fn find_token_at(&self, id: EntityId, timestamp: u64) -> RepoResult<Option<Token>>;
    fn find_token_balance(
        &self,
        token: EntityId,
        account: EntityId,
    ) -> RepoResult<Option<TokenBalance>>;
    fn find_token_balance_at(
        &self,
        token: EntityId,
        account: EntityId,
        timestamp: u64,
    ) -> RepoResult<Option<TokenBalance>>;
    fn find_token_allowance(
        &self,
        token: EntityId,
        owner: EntityId,
        spender: EntityId,
    ) -> RepoResult<Option<TokenAllowance>>;
    fn find_token_allowance_at(
        &self,
        token: EntityId,
        owner: EntityId,
        spender: EntityId,
        timestamp: u64,
    ) -> RepoResult<Option<TokenAllowance>>;
    fn find_nft(&self, token: EntityId, serial: u64) -> RepoResult<Option<Nft>>;
    fn find_nft_at(&self, token: EntityId, serial: u64, timestamp: u64)
    -> RepoResult<Option<Nft>>;
}

pub trait ContractStateRepository {
    fn find_storage(&self, contract: EntityId, slot: B256) -> RepoResult<Option<B256>>;
    /// Current values of whichever of `slots` exist, in one round trip.
    fn find_storage_batch(
        &self,
        contract: EntityId,
        slots: &[B256],
    ) -> RepoResult<Vec<(B256, B256)>>;
    /// Latest change of the slot with `consensus_timestamp <= timestamp`.
    fn find_storage_change_at(
        &self,
        contract: EntityId,
        slot: B256,
        timestamp: u64,
    ) -> RepoResult<Option<StorageChange>>;
}

pub trait TransactionRepository {
    fn find_transaction(&self, id: &TransactionId) -> RepoResult<Option<Transaction>>;
    fn find_transaction_at(&self, consensus_timestamp: u64) -> RepoResult<Option<Transaction>>;
    fn find_contract_result(&self, consensus_timestamp: u64)
    -> RepoResult<Option<ContractResult>>;
    fn find_contract_transaction_hash(
        &self,
        hash: &B256,
    ) -> RepoResult<Option<ContractTransactionHash>>;
    fn find_ethereum_transaction(
        &self,
        consensus_timestamp: u64,
    ) -> RepoResult<Option<EthereumTransaction>>;
}

/// Everything the call engine reads.
pub trait Repository:
    RecordFileRepository
    + EntityRepository
    + TokenRepository
    + ContractStateRepository
    + TransactionRepository
    + Send
    + Sync
{
}

impl<T> Repository for T where
    T: RecordFileRepository
        + EntityRepository
        + TokenRepository
        + ContractStateRepository
        + TransactionRepository
        + Send
        + Sync
{
}
