use alloy_primitives::{Bytes, U256};
use serde::{Deserialize, Serialize};

use crate::common::address::EntityId;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TokenKind {
    #[default]
    FungibleCommon,
    NonFungibleUnique,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Token {
    pub id: EntityId,
    #[serde(default)]
    pub kind: TokenKind,
    pub name: String,
    pub symbol: String,
    #[serde(default)]
    pub decimals: u8,
    #[serde(default)]
    pub total_supply: U256,
}

impl Token {
    pub fn is_fungible(&self) -> bool {
        self.kind == TokenKind::FungibleCommon
    }
}

/// Token relationship: how much of `token` the `account` holds.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenBalance {
    pub token: EntityId,
    pub account: EntityId,
    pub balance: U256,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenAllowance {
    pub token: EntityId,
    pub owner: EntityId,
    pub spender: EntityId,
    pub amount: U256,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Nft {
    pub token: EntityId,
    pub serial: u64,
    #[serde(default)]
    pub owner: Option<EntityId>,
    #[serde(default)]
    pub metadata: Bytes,
}
