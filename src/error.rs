use alloy_primitives::{Address, B256, Bytes, U256};
use revm::database_interface::DBErrorMarker;
use thiserror::Error;

use crate::{revert::decode_revert_reason, snapshot::BlockReference};

/// Failure of the storage backend behind the repository traits.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    #[error("Repository unavailable: {0}")]
    Unavailable(String),
    #[error("Conflicting version for {key}: {range} overlaps an existing window")]
    Overlap { key: String, range: String },
    #[error("Invalid fixture: {0}")]
    Fixture(String),
}

impl DBErrorMarker for RepositoryError {}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NotFound {
    #[error("Entity not found: {0}")]
    Entity(String),
    #[error("Transaction not found: {0}")]
    Transaction(String),
    #[error("Contract result not found: {0}")]
    ContractResult(u64),
    #[error("Contract transaction hash not found: {0}")]
    ContractTransactionHash(B256),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevertReason {
    /// The contract executed `REVERT`.
    ContractReverted,
    /// Execution ran out of gas, including failing intrinsic gas checks.
    InsufficientGas,
    /// Any other exceptional halt, e.g. an invalid opcode.
    Halted(String),
}

impl RevertReason {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::ContractReverted => "CONTRACT_REVERT_EXECUTED",
            Self::InsufficientGas => "INSUFFICIENT_GAS",
            Self::Halted(_) => "CONTRACT_EXECUTION_EXCEPTION",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Revert {
    pub reason: RevertReason,
    pub detail: Option<String>,
    pub data: Bytes,
    pub gas_used: u64,
}

impl Revert {
    pub fn new(reason: RevertReason, data: Bytes, gas_used: u64) -> Self {
        let detail = match &reason {
            RevertReason::Halted(halt) => Some(halt.clone()),
            _ => decode_revert_reason(&data),
        };
        Self {
            reason,
            detail,
            data,
            gas_used,
        }
    }
}

impl std::fmt::Display for Revert {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.reason.code())?;
        if let Some(detail) = &self.detail {
            write!(f, ": {detail}")?;
        }
        Ok(())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Block not found: {0}")]
    BlockNotFound(BlockReference),
    #[error(transparent)]
    NotFound(#[from] NotFound),
    #[error("Reverted: {0}")]
    Reverted(Revert),
    #[error("Insufficient balance: {sender} holds {balance}, call sends {value}")]
    InsufficientBalance {
        sender: Address,
        balance: U256,
        value: U256,
    },
    #[error("Negative value")]
    NegativeValue,
    #[error("Invalid sender: {0}")]
    InvalidSender(Address),
    #[error("Throttled: requested {requested} gas, {available} available")]
    Throttled { requested: u64, available: u64 },
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error("EVM error: {0}")]
    Evm(String),
    #[error("Config error: {0}")]
    Config(String),
}

impl Error {
    /// Only throttling clears up by waiting; everything else is final.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Throttled { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_throttled_is_retryable() {
        let throttled = Error::Throttled {
            requested: 10,
            available: 5,
        };
        assert!(throttled.is_retryable());
        assert!(!Error::NegativeValue.is_retryable());
        assert!(!Error::BlockNotFound(BlockReference::Number(51)).is_retryable());
    }

    #[test]
    fn test_not_found_kinds_are_distinct() {
        let a = Error::from(NotFound::Transaction("x".into()));
        let b = Error::from(NotFound::ContractResult(1));
        assert_ne!(a, b);
        assert_eq!(b.to_string(), "Contract result not found: 1");
    }

    #[test]
    fn test_revert_display() {
        let revert = Revert::new(RevertReason::Halted("InvalidFEOpcode".into()), Bytes::new(), 0);
        assert_eq!(
            revert.to_string(),
            "CONTRACT_EXECUTION_EXCEPTION: InvalidFEOpcode"
        );
    }
}
