use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::{
    cache::ContractStorageCache,
    common::{CallKind, ContractCallRequest},
    config::Config,
    error::Error,
    estimate::GasEstimator,
    executor::{CallExecutor, ExecutionResult},
    replay::{OpcodeTrace, TraceReconstructor, TraceRequest},
    repository::Repository,
    throttle::GasBucket,
};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum CallResponse {
    Result(ExecutionResult),
    Estimate(u64),
}

/// Entry point for callers: owns the process-wide cache and gas bucket and
/// runs every request on a blocking worker.
pub struct ContractCallService<R: ?Sized> {
    executor: CallExecutor<R>,
}

impl<R: ?Sized> Clone for ContractCallService<R> {
    fn clone(&self) -> Self {
        Self {
            executor: self.executor.clone(),
        }
    }
}

impl<R: Repository + ?Sized + 'static> ContractCallService<R> {
    pub fn new(repository: Arc<R>, config: Config) -> Self {
        let cache = Arc::new(ContractStorageCache::new(config.cache.clone()));
        let bucket = Arc::new(GasBucket::new(&config.throttle));
        Self {
            executor: CallExecutor::new(repository, cache, bucket, Arc::new(config)),
        }
    }

    pub fn executor(&self) -> &CallExecutor<R> {
        &self.executor
    }

    async fn spawn<T, F>(&self, f: F) -> Result<T, Error>
    where
        T: Send + 'static,
        F: FnOnce(CallExecutor<R>) -> Result<T, Error> + Send + 'static,
    {
        let executor = self.executor.clone();
        tokio::task::spawn_blocking(move || f(executor))
            .await
            .map_err(|e| Error::Evm(format!("worker failed: {e}")))?
    }

    /// Dispatches on the request's kind.
    pub async fn process(&self, request: ContractCallRequest) -> Result<CallResponse, Error> {
        debug!(kind = ?request.kind, block = %request.block, "processing call");
        match request.kind {
            CallKind::EthCall => self.call(request).await.map(CallResponse::Result),
            CallKind::EthEstimateGas => self.estimate_gas(request).await.map(CallResponse::Estimate),
        }
    }

    pub async fn call(&self, request: ContractCallRequest) -> Result<ExecutionResult, Error> {
        self.spawn(move |executor| executor.execute(&request)).await
    }

    pub async fn estimate_gas(&self, request: ContractCallRequest) -> Result<u64, Error> {
        self.spawn(move |executor| GasEstimator::new(executor).estimate(&request))
            .await
    }

    pub async fn trace(&self, request: TraceRequest) -> Result<OpcodeTrace, Error> {
        self.spawn(move |executor| TraceReconstructor::new(executor).trace(&request))
            .await
    }
}
