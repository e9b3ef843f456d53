use std::{fmt, str::FromStr};

use alloy_primitives::{Address, B256, Bytes, U256};
use serde::{Deserialize, Serialize};

use crate::common::address::EntityId;

/// `payer-seconds-nanos`, the ledger's native transaction identity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionId {
    pub payer: EntityId,
    /// Valid-start time in nanoseconds.
    pub valid_start: u64,
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}-{:09}",
            self.payer,
            self.valid_start / 1_000_000_000,
            self.valid_start % 1_000_000_000
        )
    }
}

#[derive(Debug, thiserror::Error)]
#[error("invalid transaction id: '{0}'")]
pub struct InvalidTransactionId(pub String);

impl FromStr for TransactionId {
    type Err = InvalidTransactionId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidTransactionId(s.to_string());
        let (payer, rest) = s.split_once('-').ok_or_else(invalid)?;
        let (secs, nanos) = rest
            .split_once('-')
            .or_else(|| rest.split_once('.'))
            .ok_or_else(invalid)?;
        let payer = payer.parse::<EntityId>().map_err(|_| invalid())?;
        let secs = secs.parse::<u64>().map_err(|_| invalid())?;
        let nanos = nanos.parse::<u64>().map_err(|_| invalid())?;
        if nanos >= 1_000_000_000 {
            return Err(invalid());
        }
        let valid_start = secs
            .checked_mul(1_000_000_000)
            .and_then(|ns| ns.checked_add(nanos))
            .ok_or_else(invalid)?;
        Ok(Self { payer, valid_start })
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionKind {
    #[default]
    ContractCall,
    ContractCreate,
    EthereumTransaction,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub consensus_timestamp: u64,
    pub payer: EntityId,
    pub valid_start: u64,
    #[serde(default)]
    pub entity: Option<EntityId>,
    #[serde(default)]
    pub kind: TransactionKind,
}

impl Transaction {
    pub fn id(&self) -> TransactionId {
        TransactionId {
            payer: self.payer,
            valid_start: self.valid_start,
        }
    }
}

/// Persisted outcome of a contract call or create.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractResult {
    pub consensus_timestamp: u64,
    #[serde(default)]
    pub contract: Option<EntityId>,
    #[serde(default)]
    pub sender: Option<EntityId>,
    #[serde(default)]
    pub amount: U256,
    pub gas_limit: u64,
    #[serde(default)]
    pub gas_used: u64,
    #[serde(default)]
    pub function_parameters: Bytes,
    #[serde(default)]
    pub call_result: Bytes,
}

/// Links an EVM transaction hash to the consensus timestamp it landed at.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractTransactionHash {
    pub hash: B256,
    pub consensus_timestamp: u64,
    pub payer: EntityId,
    #[serde(default)]
    pub entity: Option<EntityId>,
}

/// Raw fields of an Ethereum-encoded transaction submitted to the ledger.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EthereumTransaction {
    pub consensus_timestamp: u64,
    pub hash: B256,
    #[serde(default)]
    pub call_data: Bytes,
    #[serde(default)]
    pub value: U256,
    pub gas_limit: u64,
    #[serde(default)]
    pub to: Option<Address>,
}
