#![allow(dead_code)]

use std::sync::Arc;

use alloy_primitives::{Address, B256, Bytes, U256};
use retrocall::{
    Config, ContractCallService, EntityId, MemRepository,
    common::{
        ContractResult, ContractTransactionHash, Entity, EthereumTransaction, Nft, RecordFile,
        Token, TokenAllowance, TokenBalance, TokenKind, Transaction, TransactionKind,
    },
    repository::StorageChange,
};

pub const GENESIS: u64 = 1_700_000_000_000_000_000;
pub const BLOCK_SPAN: u64 = 2_000_000_000;
pub const LAST_BLOCK: u64 = 50;

pub const SENDER: EntityId = EntityId::num(1001);
pub const READER: EntityId = EntityId::num(1002);
pub const WRITER: EntityId = EntityId::num(1003);
pub const REVERTER: EntityId = EntityId::num(1004);
pub const TOKEN: EntityId = EntityId::num(1005);
pub const NFT: EntityId = EntityId::num(1006);
pub const SPENDER: EntityId = EntityId::num(1007);
pub const DELEGATOR: EntityId = EntityId::num(1008);

pub const SENDER_BALANCE: u128 = 100_000_000_000_000_000_000;

/// Returns storage slot 0 as a 32-byte word.
pub const READER_CODE: &str = "60005460005260206000f3";
/// Writes 1, 2, 3 into slots 0, 1, 2.
pub const WRITER_CODE: &str = "60016000556002600155600360025500";

/// Replayed call to the writer, recorded in block 30.
pub const WRITE_TX_HASH: B256 = B256::repeat_byte(0xab);
/// Same call submitted as an Ethereum transaction, recorded in block 32.
pub const ETH_TX_HASH: B256 = B256::repeat_byte(0xcd);
/// Hash link without a transaction behind it.
pub const DANGLING_HASH: B256 = B256::repeat_byte(0xee);
/// Transaction without a contract result.
pub const NO_RESULT_HASH: B256 = B256::repeat_byte(0xef);

pub fn block_start(index: u64) -> u64 {
    GENESIS + index * BLOCK_SPAN
}

pub fn write_tx_timestamp() -> u64 {
    block_start(30) + 100
}

pub fn eth_tx_timestamp() -> u64 {
    block_start(32) + 100
}

/// Reverts with `Error("nope")`: CODECOPY the payload after the prefix, then REVERT.
pub fn reverter_code() -> Vec<u8> {
    let mut code = hex::decode("6064600c60003960646000fd").expect("prefix");
    code.extend_from_slice(&retrocall::common::hash::selector("Error(string)"));
    code.extend_from_slice(&U256::from(0x20).to_be_bytes::<32>());
    code.extend_from_slice(&U256::from(4).to_be_bytes::<32>());
    let mut text = [0u8; 32];
    text[..4].copy_from_slice(b"nope");
    code.extend_from_slice(&text);
    code
}

/// DELEGATECALLs `decimals()` on the token and returns the 32-byte answer.
pub fn delegator_code() -> Vec<u8> {
    let mut code = hex::decode("63313ce56760e01b600052602060006004600073").expect("prefix");
    code.extend_from_slice(TOKEN.to_address().as_slice());
    code.extend_from_slice(&hex::decode("5af45060206000f3").expect("suffix"));
    code
}

pub fn word(value: u64) -> Bytes {
    Bytes::copy_from_slice(&U256::from(value).to_be_bytes::<32>())
}

pub fn calldata(signature: &str, args: &[B256]) -> Bytes {
    let mut data = retrocall::common::hash::selector(signature).to_vec();
    for arg in args {
        data.extend_from_slice(arg.as_slice());
    }
    data.into()
}

pub fn address_word(id: EntityId) -> B256 {
    id.to_address().into_word()
}

pub fn ledger() -> eyre::Result<Arc<MemRepository>> {
    let repo = MemRepository::new();

    for index in 0..=LAST_BLOCK {
        repo.insert_record_file(RecordFile {
            index,
            hash: B256::with_last_byte(index as u8),
            consensus_start: block_start(index),
            consensus_end: block_start(index) + BLOCK_SPAN - 1,
            gas_used: 0,
        });
    }

    repo.put_entity(GENESIS, Entity::account(SENDER, U256::from(SENDER_BALANCE)))?;
    repo.put_entity(GENESIS, Entity::account(SPENDER, U256::ZERO))?;
    for (id, code) in [
        (READER, hex::decode(READER_CODE)?),
        (WRITER, hex::decode(WRITER_CODE)?),
        (REVERTER, reverter_code()),
        (DELEGATOR, delegator_code()),
    ] {
        repo.put_entity(GENESIS, Entity::contract(id))?;
        repo.put_bytecode(id, code);
    }

    repo.put_entity(GENESIS, Entity::token(TOKEN))?;
    repo.put_token(
        GENESIS,
        Token {
            id: TOKEN,
            kind: TokenKind::FungibleCommon,
            name: "Retro".to_string(),
            symbol: "RTR".to_string(),
            decimals: 8,
            total_supply: U256::from(1_000_000),
        },
    )?;
    repo.put_token_balance(
        GENESIS,
        TokenBalance {
            token: TOKEN,
            account: SENDER,
            balance: U256::from(250),
        },
    )?;
    repo.put_token_allowance(
        GENESIS,
        TokenAllowance {
            token: TOKEN,
            owner: SENDER,
            spender: SPENDER,
            amount: U256::from(40),
        },
    )?;

    repo.put_entity(GENESIS, Entity::token(NFT))?;
    repo.put_token(
        GENESIS,
        Token {
            id: NFT,
            kind: TokenKind::NonFungibleUnique,
            name: "Retro Art".to_string(),
            symbol: "RART".to_string(),
            decimals: 0,
            total_supply: U256::from(1),
        },
    )?;
    repo.put_nft(
        GENESIS,
        Nft {
            token: NFT,
            serial: 1,
            owner: Some(SENDER),
            metadata: Bytes::from_static(b"ipfs://retro/1"),
        },
    )?;

    // Slot 0 of the reader: 42 from block 10, 43 from block 20.
    repo.put_storage_change(StorageChange {
        contract: READER,
        slot: B256::ZERO,
        consensus_timestamp: block_start(10) + 5,
        value_read: B256::ZERO,
        value_written: Some(B256::with_last_byte(42)),
    })?;
    repo.put_storage_change(StorageChange {
        contract: READER,
        slot: B256::ZERO,
        consensus_timestamp: block_start(20) + 5,
        value_read: B256::with_last_byte(42),
        value_written: Some(B256::with_last_byte(43)),
    })?;

    recorded_transactions(&repo);
    Ok(Arc::new(repo))
}

fn recorded_transactions(repo: &MemRepository) {
    let ts = write_tx_timestamp();
    repo.insert_transaction(Transaction {
        consensus_timestamp: ts,
        payer: SENDER,
        valid_start: ts - 1_000,
        entity: Some(WRITER),
        kind: TransactionKind::ContractCall,
    });
    repo.insert_contract_result(ContractResult {
        consensus_timestamp: ts,
        contract: Some(WRITER),
        sender: Some(SENDER),
        amount: U256::ZERO,
        gas_limit: 200_000,
        gas_used: 87_318,
        function_parameters: Bytes::new(),
        call_result: Bytes::new(),
    });
    repo.insert_contract_transaction_hash(ContractTransactionHash {
        hash: WRITE_TX_HASH,
        consensus_timestamp: ts,
        payer: SENDER,
        entity: Some(WRITER),
    });

    // Recorded against the reader, but the Ethereum payload targets the writer.
    let ts = eth_tx_timestamp();
    repo.insert_transaction(Transaction {
        consensus_timestamp: ts,
        payer: SENDER,
        valid_start: ts - 1_000,
        entity: Some(READER),
        kind: TransactionKind::EthereumTransaction,
    });
    repo.insert_contract_result(ContractResult {
        consensus_timestamp: ts,
        contract: Some(READER),
        sender: Some(SENDER),
        amount: U256::ZERO,
        gas_limit: 50_000,
        gas_used: 0,
        function_parameters: Bytes::new(),
        call_result: Bytes::new(),
    });
    repo.insert_ethereum_transaction(EthereumTransaction {
        consensus_timestamp: ts,
        hash: ETH_TX_HASH,
        call_data: Bytes::new(),
        value: U256::ZERO,
        gas_limit: 200_000,
        to: Some(WRITER.to_address()),
    });
    repo.insert_contract_transaction_hash(ContractTransactionHash {
        hash: ETH_TX_HASH,
        consensus_timestamp: ts,
        payer: SENDER,
        entity: Some(READER),
    });

    repo.insert_contract_transaction_hash(ContractTransactionHash {
        hash: DANGLING_HASH,
        consensus_timestamp: block_start(40) + 1,
        payer: SENDER,
        entity: None,
    });

    let ts = block_start(41) + 1;
    repo.insert_transaction(Transaction {
        consensus_timestamp: ts,
        payer: SENDER,
        valid_start: ts - 1_000,
        entity: Some(WRITER),
        kind: TransactionKind::ContractCall,
    });
    repo.insert_contract_transaction_hash(ContractTransactionHash {
        hash: NO_RESULT_HASH,
        consensus_timestamp: ts,
        payer: SENDER,
        entity: Some(WRITER),
    });
}

pub fn sender() -> Address {
    SENDER.to_address()
}

pub fn service(repo: Arc<MemRepository>) -> ContractCallService<MemRepository> {
    service_with(repo, Config::default())
}

pub fn service_with(
    repo: Arc<MemRepository>,
    config: Config,
) -> ContractCallService<MemRepository> {
    ContractCallService::new(repo, config)
}
