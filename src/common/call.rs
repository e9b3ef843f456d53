use alloy_primitives::{Address, Bytes, I256, U256};
use serde::{Deserialize, Serialize};

use crate::snapshot::BlockReference;

pub const DEFAULT_GAS: u64 = 15_000_000;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CallKind {
    #[default]
    EthCall,
    EthEstimateGas,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractCallRequest {
    /// `None` deploys `data` as init code.
    pub receiver: Option<Address>,
    pub sender: Address,
    pub data: Bytes,
    /// Signed so that a negative amount can be rejected rather than wrapped.
    pub value: I256,
    pub gas: u64,
    pub kind: CallKind,
    pub is_static: bool,
    pub block: BlockReference,
}

impl ContractCallRequest {
    pub fn call(receiver: Address, data: impl Into<Bytes>) -> Self {
        Self {
            receiver: Some(receiver),
            sender: Address::ZERO,
            data: data.into(),
            value: I256::ZERO,
            gas: DEFAULT_GAS,
            kind: CallKind::EthCall,
            is_static: false,
            block: BlockReference::LATEST,
        }
    }

    pub fn create(init_code: impl Into<Bytes>) -> Self {
        Self {
            receiver: None,
            ..Self::call(Address::ZERO, init_code)
        }
    }

    pub fn with_sender(mut self, sender: Address) -> Self {
        self.sender = sender;
        self
    }

    pub fn with_value(mut self, value: I256) -> Self {
        self.value = value;
        self
    }

    pub fn with_amount(self, value: U256) -> Self {
        self.with_value(I256::from_raw(value))
    }

    pub fn with_gas(mut self, gas: u64) -> Self {
        self.gas = gas;
        self
    }

    pub fn with_block(mut self, block: BlockReference) -> Self {
        self.block = block;
        self
    }

    pub fn with_static(mut self, is_static: bool) -> Self {
        self.is_static = is_static;
        self
    }

    pub fn estimate(mut self) -> Self {
        self.kind = CallKind::EthEstimateGas;
        self
    }

    pub fn is_create(&self) -> bool {
        self.receiver.is_none()
    }
}
