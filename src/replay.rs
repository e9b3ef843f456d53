//! Step-by-step replay of transactions already on the ledger.

use std::{fmt, str::FromStr};

use alloy_primitives::{Address, B256, Bytes, I256};
use evm_tracer::{OpcodeStep, TraceOptions};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    common::{
        CallKind, ContractCallRequest, EntityId, Transaction, TransactionId, TransactionKind,
    },
    error::{Error, NotFound},
    executor::CallExecutor,
    repository::Repository,
    snapshot::BlockReference,
    state::StateProvider,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TransactionRef {
    Hash(B256),
    Id(TransactionId),
}

impl fmt::Display for TransactionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hash(hash) => write!(f, "{hash}"),
            Self::Id(id) => write!(f, "{id}"),
        }
    }
}

impl FromStr for TransactionRef {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.starts_with("0x") && s.len() == 66 {
            return s
                .parse::<B256>()
                .map(Self::Hash)
                .map_err(|e| Error::Config(format!("invalid transaction hash '{s}': {e}")));
        }
        s.parse::<TransactionId>()
            .map(Self::Id)
            .map_err(|e| Error::Config(e.to_string()))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TraceRequest {
    pub transaction: TransactionRef,
    pub options: TraceOptions,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpcodeTrace {
    pub address: Option<Address>,
    pub contract_id: Option<EntityId>,
    pub gas: u64,
    pub failed: bool,
    pub return_value: Bytes,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revert_reason: Option<String>,
    pub opcodes: Vec<OpcodeStep>,
}

pub struct TraceReconstructor<R: ?Sized> {
    executor: CallExecutor<R>,
}

impl<R: Repository + ?Sized> TraceReconstructor<R> {
    pub fn new(executor: CallExecutor<R>) -> Self {
        Self { executor }
    }

    fn find_transaction(&self, transaction: &TransactionRef) -> Result<Transaction, Error> {
        let repository = self.executor.repository();
        match transaction {
            TransactionRef::Hash(hash) => {
                let link = repository
                    .find_contract_transaction_hash(hash)?
                    .ok_or(NotFound::ContractTransactionHash(*hash))?;
                repository
                    .find_transaction_at(link.consensus_timestamp)?
                    .ok_or_else(|| NotFound::Transaction(hash.to_string()).into())
            }
            TransactionRef::Id(id) => repository
                .find_transaction(id)?
                .ok_or_else(|| NotFound::Transaction(id.to_string()).into()),
        }
    }

    /// Rebuilds the call of a recorded transaction and replays it against
    /// the state immediately preceding it. Nothing is written back.
    pub fn trace(&self, request: &TraceRequest) -> Result<OpcodeTrace, Error> {
        let repository = self.executor.repository();
        let transaction = self.find_transaction(&request.transaction)?;
        let timestamp = transaction.consensus_timestamp;
        let result = repository
            .find_contract_result(timestamp)?
            .ok_or(NotFound::ContractResult(timestamp))?;
        let ethereum = repository.find_ethereum_transaction(timestamp)?;

        let snapshot = self.executor.resolver().before_transaction(timestamp)?;
        let provider = StateProvider::new(repository, self.executor.cache(), &snapshot);
        let address_of = |id: EntityId| -> Result<Address, Error> {
            Ok(provider
                .entity_by_id(id)?
                .map(|entity| entity.address())
                .unwrap_or_else(|| id.to_address()))
        };

        let sender = address_of(result.sender.unwrap_or(transaction.payer))?;
        let contract = result.contract.or(transaction.entity);
        let receiver = match (&ethereum, transaction.kind) {
            (Some(eth), _) => eth.to,
            (None, TransactionKind::ContractCreate) => None,
            (None, _) => contract.map(address_of).transpose()?,
        };
        let (data, value, gas) = match ethereum {
            Some(eth) => {
                let data = if eth.call_data.is_empty() {
                    result.function_parameters.clone()
                } else {
                    eth.call_data
                };
                (data, eth.value, eth.gas_limit)
            }
            None => (
                result.function_parameters.clone(),
                result.amount,
                result.gas_limit,
            ),
        };
        let value = I256::try_from(value).map_err(|_| Error::Evm(format!("value {value} out of range")))?;

        let call = ContractCallRequest {
            receiver,
            sender,
            data,
            value,
            gas,
            kind: CallKind::EthCall,
            is_static: false,
            block: BlockReference::Timestamp(timestamp),
        };
        debug!(
            transaction = %request.transaction,
            timestamp,
            ?receiver,
            gas,
            range = %snapshot.range,
            "replaying transaction"
        );
        let execution = self.executor.replay(&call, &snapshot, request.options)?;
        let revert = execution.revert();
        info!(
            transaction = %request.transaction,
            steps = execution.steps.len(),
            gas = execution.gas_used,
            recorded_gas = result.gas_used,
            "replayed transaction"
        );

        Ok(OpcodeTrace {
            address: receiver,
            contract_id: contract,
            gas: execution.gas_used,
            failed: revert.is_some(),
            return_value: execution.output,
            revert_reason: revert.map(|revert| revert.to_string()),
            opcodes: execution.steps,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_transaction_ref() {
        let hash = format!("0x{}", "ab".repeat(32));
        assert!(matches!(hash.parse::<TransactionRef>(), Ok(TransactionRef::Hash(_))));
        assert!(matches!(
            "0.0.2-1700000000-000000001".parse::<TransactionRef>(),
            Ok(TransactionRef::Id(_))
        ));
        assert!("nonsense".parse::<TransactionRef>().is_err());
    }
}
