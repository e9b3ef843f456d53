mod common;

use alloy_primitives::{Address, B256, Bytes, I256, U256};
use common::*;
use pretty_assertions::assert_eq;
use retrocall::{
    BlockReference, CallResponse, Config, ContractCallRequest, Error, RevertReason,
    config::ThrottleConfig,
};

fn read_slot(block: BlockReference) -> ContractCallRequest {
    ContractCallRequest::call(READER.to_address(), Bytes::new())
        .with_sender(sender())
        .with_block(block)
}

#[tokio::test]
async fn test_latest_storage_read() -> eyre::Result<()> {
    let service = service(ledger()?);
    let result = service.call(read_slot(BlockReference::LATEST)).await?;
    assert_eq!(result.return_data, word(43));
    Ok(())
}

#[tokio::test]
async fn test_historical_storage_read() -> eyre::Result<()> {
    let service = service(ledger()?);

    let result = service.call(read_slot(BlockReference::Number(15))).await?;
    assert_eq!(result.return_data, word(42));

    let result = service.call(read_slot(BlockReference::Number(5))).await?;
    assert_eq!(result.return_data, word(0));
    Ok(())
}

#[tokio::test]
async fn test_historical_call_is_deterministic() -> eyre::Result<()> {
    let repo = ledger()?;
    let service = service(repo.clone());
    let request = read_slot(BlockReference::Number(25));

    let first = service.call(request.clone()).await?;
    repo.put_storage_change(retrocall::repository::StorageChange {
        contract: READER,
        slot: B256::ZERO,
        consensus_timestamp: block_start(45),
        value_read: B256::with_last_byte(43),
        value_written: Some(B256::with_last_byte(44)),
    })?;
    let second = service.call(request).await?;

    assert_eq!(first, second);
    assert_eq!(second.return_data, word(43));
    Ok(())
}

#[tokio::test]
async fn test_latest_reads_survive_deletion_through_cache() -> eyre::Result<()> {
    let repo = ledger()?;
    let service = service(repo.clone());

    let first = service.call(read_slot(BlockReference::LATEST)).await?;
    let queries = repo.storage_queries();
    assert!(queries > 0);

    repo.delete_storage(READER, B256::ZERO);
    let second = service.call(read_slot(BlockReference::LATEST)).await?;

    assert_eq!(first.return_data, second.return_data);
    assert_eq!(repo.storage_queries(), queries);
    assert_eq!(service.executor().cache().len(READER), 1);
    Ok(())
}

#[tokio::test]
async fn test_token_views() -> eyre::Result<()> {
    let service = service(ledger()?);
    let call = |token: retrocall::EntityId, data: Bytes| {
        ContractCallRequest::call(token.to_address(), data).with_sender(sender())
    };

    let decimals = service.call(call(TOKEN, calldata("decimals()", &[]))).await?;
    assert_eq!(decimals.return_data, word(8));

    let balance = service
        .call(call(TOKEN, calldata("balanceOf(address)", &[address_word(SENDER)])))
        .await?;
    assert_eq!(balance.return_data, word(250));

    let allowance = service
        .call(call(
            TOKEN,
            calldata(
                "allowance(address,address)",
                &[address_word(SENDER), address_word(SPENDER)],
            ),
        ))
        .await?;
    assert_eq!(allowance.return_data, word(40));

    let owner = service
        .call(call(NFT, calldata("ownerOf(uint256)", &[B256::with_last_byte(1)])))
        .await?;
    assert_eq!(owner.return_data, Bytes::copy_from_slice(address_word(SENDER).as_slice()));
    Ok(())
}

#[tokio::test]
async fn test_fungible_only_view_reverts_on_nft() -> eyre::Result<()> {
    let service = service(ledger()?);
    let request = ContractCallRequest::call(NFT.to_address(), calldata("decimals()", &[]))
        .with_sender(sender());
    match service.call(request).await {
        Err(Error::Reverted(revert)) => assert_eq!(revert.reason, RevertReason::ContractReverted),
        other => panic!("expected revert, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn test_revert_reason_is_decoded() -> eyre::Result<()> {
    let service = service(ledger()?);
    let request =
        ContractCallRequest::call(REVERTER.to_address(), Bytes::new()).with_sender(sender());
    match service.call(request).await {
        Err(Error::Reverted(revert)) => {
            assert_eq!(revert.reason, RevertReason::ContractReverted);
            assert_eq!(revert.detail.as_deref(), Some("nope"));
            assert_eq!(revert.data.len(), 100);
        }
        other => panic!("expected revert, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn test_value_checks() -> eyre::Result<()> {
    let service = service(ledger()?);
    let hollow = Address::repeat_byte(0x77);
    let receiver = Address::repeat_byte(0x42);

    let request = ContractCallRequest::call(receiver, Bytes::new())
        .with_sender(hollow)
        .with_value(I256::ONE);
    assert_eq!(
        service.call(request).await.unwrap_err(),
        Error::InsufficientBalance {
            sender: hollow,
            balance: U256::ZERO,
            value: U256::from(1),
        }
    );

    let request = ContractCallRequest::call(receiver, Bytes::new())
        .with_sender(sender())
        .with_value(I256::MINUS_ONE);
    assert_eq!(service.call(request).await.unwrap_err(), Error::NegativeValue);

    let request = ContractCallRequest::call(receiver, Bytes::new())
        .with_sender(TOKEN.to_address());
    assert_eq!(
        service.call(request).await.unwrap_err(),
        Error::InvalidSender(TOKEN.to_address())
    );
    Ok(())
}

#[tokio::test]
async fn test_transfer_to_hollow_account() -> eyre::Result<()> {
    let service = service(ledger()?);
    let request = ContractCallRequest::call(Address::repeat_byte(0x42), Bytes::new())
        .with_sender(sender())
        .with_amount(U256::from(1_000));
    let result = service.call(request).await?;
    assert!(result.return_data.is_empty());
    assert_eq!(result.gas_used, 21_000);
    Ok(())
}

#[tokio::test]
async fn test_static_call_cannot_write() -> eyre::Result<()> {
    let service = service(ledger()?);
    let request = ContractCallRequest::call(WRITER.to_address(), Bytes::new())
        .with_sender(sender())
        .with_static(true);
    assert!(matches!(service.call(request).await, Err(Error::Reverted(_))));

    let request =
        ContractCallRequest::call(WRITER.to_address(), Bytes::new()).with_sender(sender());
    assert!(service.call(request).await.is_ok());
    Ok(())
}

#[tokio::test]
async fn test_throttled_when_bucket_is_short() -> eyre::Result<()> {
    let config = Config {
        throttle: ThrottleConfig {
            gas_capacity: 100_000,
            refund_percent: 10,
            refill_per_second: 0,
        },
        ..Config::default()
    };
    let service = service_with(ledger()?, config);
    let err = service
        .call(read_slot(BlockReference::LATEST))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Throttled { .. }));
    assert!(err.is_retryable());

    let result = service
        .call(read_slot(BlockReference::LATEST).with_gas(50_000))
        .await?;
    assert_eq!(result.return_data, word(43));
    Ok(())
}

#[tokio::test]
async fn test_process_dispatches_on_kind() -> eyre::Result<()> {
    let service = service(ledger()?);

    let response = service.process(read_slot(BlockReference::LATEST)).await?;
    assert!(matches!(response, CallResponse::Result(ref r) if r.return_data == word(43)));

    let response = service
        .process(read_slot(BlockReference::LATEST).estimate())
        .await?;
    assert!(matches!(response, CallResponse::Estimate(gas) if gas > 21_000));
    Ok(())
}

#[tokio::test]
async fn test_token_view_through_delegatecall() -> eyre::Result<()> {
    let service = service(ledger()?);
    let request =
        ContractCallRequest::call(DELEGATOR.to_address(), Bytes::new()).with_sender(sender());
    let result = service.call(request).await?;
    assert_eq!(result.return_data, word(8));
    Ok(())
}
