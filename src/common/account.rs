use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};

use crate::common::address::EntityId;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    #[default]
    Account,
    Contract,
    Token,
}

/// One version of a ledger entity as the state provider sees it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    pub id: EntityId,
    #[serde(default)]
    pub kind: EntityKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evm_address: Option<Address>,
    #[serde(default)]
    pub balance: U256,
    #[serde(default)]
    pub nonce: u64,
    #[serde(default)]
    pub deleted: bool,
}

impl Entity {
    pub fn account(id: EntityId, balance: U256) -> Self {
        Self {
            id,
            kind: EntityKind::Account,
            evm_address: None,
            balance,
            nonce: 0,
            deleted: false,
        }
    }

    pub fn contract(id: EntityId) -> Self {
        Self {
            kind: EntityKind::Contract,
            nonce: 1,
            ..Self::account(id, U256::ZERO)
        }
    }

    pub fn token(id: EntityId) -> Self {
        Self {
            kind: EntityKind::Token,
            ..Self::account(id, U256::ZERO)
        }
    }

    pub fn with_alias(mut self, address: Address) -> Self {
        self.evm_address = Some(address);
        self
    }

    /// The address the EVM sees: the alias when one exists, else long-zero.
    pub fn address(&self) -> Address {
        self.evm_address.unwrap_or_else(|| self.id.to_address())
    }

    pub fn is_token(&self) -> bool {
        self.kind == EntityKind::Token
    }
}
