pub mod cache;
pub mod common;
pub mod config;
pub mod error;
pub mod estimate;
pub mod executor;
pub mod replay;
pub mod repository;
pub mod revert;
pub mod service;
pub mod snapshot;
pub mod state;
pub mod throttle;
pub mod token;

pub use evm_tracer::{OpcodeStep, TraceOptions};

pub use crate::{
    cache::ContractStorageCache,
    common::{CallKind, ContractCallRequest, EntityId},
    config::Config,
    error::{Error, NotFound, RepositoryError, Revert, RevertReason},
    estimate::GasEstimator,
    executor::{CallExecutor, ExecutionResult},
    replay::{OpcodeTrace, TraceReconstructor, TraceRequest, TransactionRef},
    repository::{MemRepository, Repository},
    service::{CallResponse, ContractCallService},
    snapshot::{BlockReference, BlockTag, Snapshot, SnapshotResolver},
    state::StateProvider,
    throttle::GasBucket,
};
