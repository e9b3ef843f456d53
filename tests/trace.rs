mod common;

use common::*;
use pretty_assertions::assert_eq;
use retrocall::{
    Config, Error, NotFound, TraceOptions, TraceRequest, TransactionRef,
    common::TransactionId, config::EstimateConfig,
};

fn by_hash(hash: alloy_primitives::B256, options: TraceOptions) -> TraceRequest {
    TraceRequest {
        transaction: TransactionRef::Hash(hash),
        options,
    }
}

fn storage_steps(trace: &retrocall::OpcodeTrace) -> usize {
    trace
        .opcodes
        .iter()
        .filter(|step| step.storage.is_some())
        .count()
}

#[tokio::test]
async fn test_trace_collects_storage_writes() -> eyre::Result<()> {
    let service = service(ledger()?);
    let trace = service
        .trace(by_hash(
            WRITE_TX_HASH,
            TraceOptions {
                storage: true,
                ..TraceOptions::default()
            },
        ))
        .await?;

    assert!(!trace.failed);
    assert_eq!(trace.contract_id, Some(WRITER));
    assert_eq!(trace.address, Some(WRITER.to_address()));
    assert_eq!(storage_steps(&trace), 3);
    assert_eq!(
        trace.opcodes.iter().filter(|step| step.op == "SSTORE").count(),
        3
    );
    assert!(trace.opcodes.iter().all(|step| step.stack.is_none()));
    Ok(())
}

#[tokio::test]
async fn test_trace_without_storage_snapshots() -> eyre::Result<()> {
    let service = service(ledger()?);
    let trace = service
        .trace(by_hash(WRITE_TX_HASH, TraceOptions::default()))
        .await?;
    assert_eq!(storage_steps(&trace), 0);
    assert!(!trace.opcodes.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_trace_by_transaction_id() -> eyre::Result<()> {
    let service = service(ledger()?);
    let ts = write_tx_timestamp();
    let id = TransactionId {
        payer: SENDER,
        valid_start: ts - 1_000,
    };
    let trace = service
        .trace(TraceRequest {
            transaction: TransactionRef::Id(id),
            options: TraceOptions::all(),
        })
        .await?;
    assert_eq!(storage_steps(&trace), 3);
    assert!(trace.opcodes.iter().all(|step| step.stack.is_some()));
    Ok(())
}

#[tokio::test]
async fn test_ethereum_payload_takes_precedence() -> eyre::Result<()> {
    let service = service(ledger()?);
    let trace = service
        .trace(by_hash(ETH_TX_HASH, TraceOptions::all()))
        .await?;
    assert_eq!(trace.address, Some(WRITER.to_address()));
    assert_eq!(trace.contract_id, Some(READER));
    assert_eq!(storage_steps(&trace), 3);
    Ok(())
}

#[tokio::test]
async fn test_missing_records_are_distinguished() -> eyre::Result<()> {
    let service = service(ledger()?);

    let unknown = alloy_primitives::B256::repeat_byte(0x01);
    assert_eq!(
        service
            .trace(by_hash(unknown, TraceOptions::default()))
            .await
            .unwrap_err(),
        Error::NotFound(NotFound::ContractTransactionHash(unknown))
    );

    assert!(matches!(
        service
            .trace(by_hash(DANGLING_HASH, TraceOptions::default()))
            .await,
        Err(Error::NotFound(NotFound::Transaction(_)))
    ));

    assert_eq!(
        service
            .trace(by_hash(NO_RESULT_HASH, TraceOptions::default()))
            .await
            .unwrap_err(),
        Error::NotFound(NotFound::ContractResult(block_start(41) + 1))
    );

    let id = TransactionId {
        payer: SPENDER,
        valid_start: GENESIS,
    };
    assert!(matches!(
        service
            .trace(TraceRequest {
                transaction: TransactionRef::Id(id),
                options: TraceOptions::default(),
            })
            .await,
        Err(Error::NotFound(NotFound::Transaction(_)))
    ));
    Ok(())
}

#[tokio::test]
async fn test_replay_does_not_write_back() -> eyre::Result<()> {
    let repo = ledger()?;
    let service = service(repo.clone());
    service
        .trace(by_hash(WRITE_TX_HASH, TraceOptions::default()))
        .await?;

    use retrocall::repository::ContractStateRepository;
    assert_eq!(repo.find_storage(WRITER, alloy_primitives::B256::ZERO)?, None);
    Ok(())
}

#[tokio::test]
async fn test_replay_keeps_recorded_gas_limit_above_ceiling() -> eyre::Result<()> {
    let config = Config {
        estimate: EstimateConfig {
            gas_ceiling: 100_000,
            ..EstimateConfig::default()
        },
        ..Config::default()
    };
    let service = service_with(ledger()?, config);
    let trace = service
        .trace(by_hash(WRITE_TX_HASH, TraceOptions::default()))
        .await?;

    assert!(!trace.failed);
    // Recorded limit of 200_000 minus the 21_000 intrinsic cost.
    assert_eq!(trace.opcodes[0].gas, 179_000);
    Ok(())
}
