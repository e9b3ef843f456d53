//! Binary search for the smallest gas limit a call succeeds with.
//!
//! The search assumes that a call succeeding with `g` gas also succeeds with
//! any larger limit. Contracts branching on `GASLEFT` can break that, in
//! which case the estimate is the boundary the search happened to find.

use tracing::{debug, warn};

use crate::{
    common::ContractCallRequest,
    error::{Error, Revert},
    executor::{CallExecutor, Status},
    repository::Repository,
    snapshot::Snapshot,
};

pub const TX_BASE_GAS: u64 = 21_000;
pub const TX_CREATE_GAS: u64 = 32_000;
const ZERO_BYTE_GAS: u64 = 4;
const NON_ZERO_BYTE_GAS: u64 = 16;
const INIT_CODE_WORD_GAS: u64 = 2;

/// Gas charged before the first opcode runs.
pub fn intrinsic_gas(request: &ContractCallRequest) -> u64 {
    let data: u64 = request
        .data
        .iter()
        .map(|byte| if *byte == 0 { ZERO_BYTE_GAS } else { NON_ZERO_BYTE_GAS })
        .sum();
    let create = if request.is_create() {
        TX_CREATE_GAS + INIT_CODE_WORD_GAS * (request.data.len() as u64).div_ceil(32)
    } else {
        0
    };
    TX_BASE_GAS + data + create
}

enum Attempt {
    Success(u64),
    OutOfGas(Revert),
    /// Failed for a reason more gas would not fix.
    Failed(Revert),
}

pub struct GasEstimator<R: ?Sized> {
    executor: CallExecutor<R>,
}

impl<R: Repository + ?Sized> GasEstimator<R> {
    pub fn new(executor: CallExecutor<R>) -> Self {
        Self { executor }
    }

    pub fn estimate(&self, request: &ContractCallRequest) -> Result<u64, Error> {
        let config = &self.executor.config().estimate;
        let snapshot = self.executor.resolver().resolve(request.block)?;
        let floor = intrinsic_gas(request);
        let ceiling = match request.gas {
            0 => config.gas_ceiling,
            gas => gas.min(config.gas_ceiling),
        };

        // Precompiles have no ledger code but charge on top of the floor,
        // so the floor is only returned once it has run.
        if request.data.is_empty()
            && let Some(to) = request.receiver
            && !self.executor.has_code(&snapshot, &to)?
            && let Attempt::Success(_) = self.attempt(request, &snapshot, floor)?
        {
            return Ok(floor);
        }

        let gas_used = match self.attempt(request, &snapshot, ceiling)? {
            Attempt::Success(gas_used) => gas_used,
            Attempt::OutOfGas(revert) | Attempt::Failed(revert) => {
                debug!(ceiling, reason = %revert, "call fails at gas ceiling");
                return Err(Error::Reverted(revert));
            }
        };

        // A limit below what the call used (after refunds) cannot succeed.
        let mut lo = floor.max(gas_used).saturating_sub(1);
        let mut hi = ceiling;
        let mut mid = gas_used.saturating_mul(3).min(lo + (hi - lo) / 2);
        let mut attempts = 1;

        while hi - lo > config.precision.threshold(hi) {
            if attempts >= config.max_attempts {
                warn!(lo, hi, attempts, "gas estimation stopped at attempt limit");
                break;
            }
            mid = mid.clamp(lo + 1, hi - 1);
            attempts += 1;
            match self.attempt(request, &snapshot, mid)? {
                Attempt::Success(_) => hi = mid,
                Attempt::OutOfGas(_) => lo = mid,
                Attempt::Failed(revert) => {
                    debug!(gas = mid, reason = %revert, "call reverted during estimation");
                    return Err(Error::Reverted(revert));
                }
            }
            mid = lo + (hi - lo) / 2;
        }

        debug!(estimate = hi, gas_used, attempts, "estimated gas");
        Ok(hi)
    }

    fn attempt(
        &self,
        request: &ContractCallRequest,
        snapshot: &Snapshot,
        gas: u64,
    ) -> Result<Attempt, Error> {
        let attempt = request.clone().with_gas(gas);
        let execution = self.executor.run(&attempt, snapshot, None)?;
        let Some(revert) = execution.revert() else {
            return Ok(Attempt::Success(execution.gas_used));
        };
        if execution.status == Status::OutOfGas || execution.inner_out_of_gas {
            Ok(Attempt::OutOfGas(revert))
        } else {
            Ok(Attempt::Failed(revert))
        }
    }
}

#[cfg(test)]
mod tests {
    use alloy_primitives::Address;

    use super::*;

    #[test]
    fn test_intrinsic_gas() {
        let call = ContractCallRequest::call(Address::ZERO, vec![0x00, 0x01, 0x00, 0xff]);
        assert_eq!(intrinsic_gas(&call), 21_000 + 4 + 16 + 4 + 16);
        let create = ContractCallRequest::create(vec![0x60; 33]);
        assert_eq!(intrinsic_gas(&create), 21_000 + 32_000 + 33 * 16 + 2 * 2);
    }
}
