use std::sync::Arc;

use alloy_primitives::{Address, Bytes, TxKind, U256};
use evm_tracer::{OpcodeStep, TraceOptions, Tracer};
use revm::{
    InspectEvm, MainBuilder, MainContext,
    context::{
        Context, TxEnv,
        result::{EVMError, ExecutionResult as EvmOutcome, HaltReason, InvalidTransaction},
    },
    database::CacheDB,
};
use serde::Serialize;
use tracing::debug;

use crate::{
    cache::ContractStorageCache,
    common::{ContractCallRequest, Entity},
    config::Config,
    error::{Error, Revert, RevertReason},
    repository::Repository,
    snapshot::{Snapshot, SnapshotResolver},
    state::StateProvider,
    throttle::GasBucket,
    token::TokenFacade,
};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub return_data: Bytes,
    pub gas_used: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Status {
    Success,
    Reverted,
    OutOfGas,
    Halted(String),
}

/// Raw outcome of one VM run, before reverts are turned into errors.
#[derive(Clone, Debug)]
pub struct Execution {
    pub status: Status,
    pub output: Bytes,
    pub gas_used: u64,
    /// Some frame ran out of gas, even if its caller recovered.
    pub inner_out_of_gas: bool,
    pub steps: Vec<OpcodeStep>,
}

impl Execution {
    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }

    pub fn revert(&self) -> Option<Revert> {
        let reason = match &self.status {
            Status::Success => return None,
            Status::Reverted => RevertReason::ContractReverted,
            Status::OutOfGas => RevertReason::InsufficientGas,
            Status::Halted(halt) => RevertReason::Halted(halt.clone()),
        };
        Some(Revert::new(reason, self.output.clone(), self.gas_used))
    }

    pub fn into_result(self) -> Result<ExecutionResult, Error> {
        match self.revert() {
            None => Ok(ExecutionResult {
                return_data: self.output,
                gas_used: self.gas_used,
            }),
            Some(revert) => Err(Error::Reverted(revert)),
        }
    }
}

struct Validated {
    value: U256,
    nonce: u64,
}

/// Runs single calls against a snapshot, under the shared gas bucket.
pub struct CallExecutor<R: ?Sized> {
    repository: Arc<R>,
    cache: Arc<ContractStorageCache>,
    bucket: Arc<GasBucket>,
    config: Arc<Config>,
}

impl<R: ?Sized> Clone for CallExecutor<R> {
    fn clone(&self) -> Self {
        Self {
            repository: self.repository.clone(),
            cache: self.cache.clone(),
            bucket: self.bucket.clone(),
            config: self.config.clone(),
        }
    }
}

impl<R: Repository + ?Sized> CallExecutor<R> {
    pub fn new(
        repository: Arc<R>,
        cache: Arc<ContractStorageCache>,
        bucket: Arc<GasBucket>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            repository,
            cache,
            bucket,
            config,
        }
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn cache(&self) -> &ContractStorageCache {
        &self.cache
    }

    pub fn bucket(&self) -> &GasBucket {
        &self.bucket
    }

    pub fn resolver(&self) -> SnapshotResolver<'_, R> {
        SnapshotResolver::new(&*self.repository)
    }

    pub fn execute(&self, request: &ContractCallRequest) -> Result<ExecutionResult, Error> {
        let snapshot = self.resolver().resolve(request.block)?;
        let execution = self.run(request, &snapshot, None)?;
        if let Some(revert) = execution.revert() {
            debug!(reason = %revert, gas_used = revert.gas_used, "call reverted");
        }
        execution.into_result()
    }

    pub fn has_code(&self, snapshot: &Snapshot, address: &Address) -> Result<bool, Error> {
        let provider = StateProvider::new(&*self.repository, &self.cache, snapshot);
        Ok(provider.code(address)?.is_some())
    }

    fn validate(
        &self,
        provider: &StateProvider<'_, R>,
        request: &ContractCallRequest,
    ) -> Result<Validated, Error> {
        if request.value.is_negative() {
            return Err(Error::NegativeValue);
        }
        let value = request.value.into_raw();
        let sender = provider.entity(&request.sender)?;
        if sender.as_ref().is_some_and(Entity::is_token) {
            return Err(Error::InvalidSender(request.sender));
        }
        // A sender without an entity is hollow: it may call, but holds nothing.
        let balance = sender.as_ref().map(|e| e.balance).unwrap_or_default();
        if value > balance {
            return Err(Error::InsufficientBalance {
                sender: request.sender,
                balance,
                value,
            });
        }
        Ok(Validated {
            value,
            nonce: sender.map(|e| e.nonce).unwrap_or_default(),
        })
    }

    /// Validates and runs `request` at `snapshot`. Requests above the
    /// configured gas ceiling run with the ceiling.
    pub fn run(
        &self,
        request: &ContractCallRequest,
        snapshot: &Snapshot,
        trace: Option<TraceOptions>,
    ) -> Result<Execution, Error> {
        let gas_limit = request.gas.min(self.config.estimate.gas_ceiling);
        self.run_with_limit(request, snapshot, gas_limit, trace)
    }

    /// Runs a recorded transaction with its own gas limit, ceiling or not.
    pub fn replay(
        &self,
        request: &ContractCallRequest,
        snapshot: &Snapshot,
        trace: TraceOptions,
    ) -> Result<Execution, Error> {
        self.run_with_limit(request, snapshot, request.gas, Some(trace))
    }

    fn run_with_limit(
        &self,
        request: &ContractCallRequest,
        snapshot: &Snapshot,
        gas_limit: u64,
        trace: Option<TraceOptions>,
    ) -> Result<Execution, Error> {
        let provider = StateProvider::new(&*self.repository, &self.cache, snapshot);
        let Validated { value, nonce } = self.validate(&provider, request)?;

        let mut reservation = self.bucket.reserve(gas_limit)?;
        let execution = self.transact(&provider, request, gas_limit, value, nonce, trace)?;
        reservation.record_used(execution.gas_used);
        Ok(execution)
    }

    fn transact(
        &self,
        provider: &StateProvider<'_, R>,
        request: &ContractCallRequest,
        gas_limit: u64,
        value: U256,
        nonce: u64,
        trace: Option<TraceOptions>,
    ) -> Result<Execution, Error> {
        let chain_id = self.config.evm.chain_id;
        let spec = self.config.evm.spec.spec_id();
        let tx_env = TxEnv::builder()
            .caller(request.sender)
            .gas_limit(gas_limit)
            .value(value)
            .data(request.data.clone())
            .chain_id(Some(chain_id))
            .nonce(nonce)
            .gas_price(0)
            .kind(match request.receiver {
                Some(to) => TxKind::Call(to),
                None => TxKind::Create,
            })
            .build()
            .map_err(|e| Error::Evm(format!("{e:?}")))?;

        let mut tracer = Tracer::new(TokenFacade::new(provider, self.config.evm.token_call_gas))
            .with_static(request.is_static);
        if let Some(options) = trace {
            tracer = tracer.with_steps(options);
        }

        let block = &provider.snapshot().block;
        let block_gas_limit = gas_limit.max(self.config.estimate.gas_ceiling);
        let ctx = Context::mainnet()
            .with_db(CacheDB::new(provider))
            .modify_block_chained(|b| {
                b.number = U256::from(block.index);
                b.timestamp = U256::from(block.timestamp());
                b.gas_limit = block_gas_limit;
                b.basefee = 0;
            })
            .modify_cfg_chained(|c| {
                c.chain_id = chain_id;
                c.spec = spec;
                c.disable_nonce_check = true;
            });

        let mut evm = ctx.build_mainnet_with_inspector(tracer);
        let result = evm.inspect_tx(tx_env);
        let inner_out_of_gas = evm.inspector.out_of_gas();
        let steps = evm.inspector.take();
        if let Some(err) = evm.inspector.hook_mut().take_failure() {
            return Err(err.into());
        }

        let outcome = match result {
            Ok(result) => result.result,
            Err(EVMError::Transaction(err)) => {
                return self.rejected(provider, request, value, gas_limit, err, steps);
            }
            Err(EVMError::Database(err)) => return Err(err.into()),
            Err(err) => return Err(Error::Evm(format!("{err:?}"))),
        };

        let status = match &outcome {
            EvmOutcome::Success { .. } => Status::Success,
            EvmOutcome::Revert { .. } => Status::Reverted,
            EvmOutcome::Halt {
                reason: HaltReason::OutOfGas(_),
                ..
            } => Status::OutOfGas,
            EvmOutcome::Halt { reason, .. } => Status::Halted(format!("{reason:?}")),
        };
        let execution = Execution {
            status,
            output: outcome.output().cloned().unwrap_or_default(),
            gas_used: outcome.gas_used(),
            inner_out_of_gas,
            steps,
        };
        debug!(
            block = block.index,
            historical = provider.snapshot().historical,
            gas_limit,
            gas_used = execution.gas_used,
            status = ?execution.status,
            "executed call"
        );
        Ok(execution)
    }

    /// Maps a transaction the VM refused to run before the first opcode.
    fn rejected(
        &self,
        provider: &StateProvider<'_, R>,
        request: &ContractCallRequest,
        value: U256,
        gas_limit: u64,
        err: InvalidTransaction,
        steps: Vec<OpcodeStep>,
    ) -> Result<Execution, Error> {
        match err {
            InvalidTransaction::CallGasCostMoreThanGasLimit { .. }
            | InvalidTransaction::GasFloorMoreThanGasLimit { .. } => Ok(Execution {
                status: Status::OutOfGas,
                output: Bytes::new(),
                gas_used: gas_limit,
                inner_out_of_gas: false,
                steps,
            }),
            InvalidTransaction::LackOfFundForMaxFee { .. } => Err(Error::InsufficientBalance {
                sender: request.sender,
                balance: provider.balance(&request.sender)?,
                value,
            }),
            InvalidTransaction::RejectCallerWithCode { .. } => {
                Err(Error::InvalidSender(request.sender))
            }
            other => Err(Error::Evm(format!("{other:?}"))),
        }
    }
}
