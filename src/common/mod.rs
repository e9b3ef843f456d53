pub mod account;
pub mod address;
pub mod block;
pub mod call;
pub mod hash;
pub mod range;
pub mod token;
pub mod tx;

pub use account::{Entity, EntityKind};
pub use address::EntityId;
pub use block::RecordFile;
pub use call::{CallKind, ContractCallRequest};
pub use range::{TimestampRange, Versioned};
pub use token::{Nft, Token, TokenAllowance, TokenBalance, TokenKind};
pub use tx::{
    ContractResult, ContractTransactionHash, EthereumTransaction, Transaction, TransactionId,
    TransactionKind,
};
