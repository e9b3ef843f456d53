use std::collections::BTreeMap;

use alloy_primitives::{Address, Bytes, B256};
use revm::bytecode::opcode::{OpCode, SSTORE};
use revm::context::{ContextTr, JournalTr};
use revm::inspector::Inspector;
use revm::interpreter::{
    interpreter::EthInterpreter,
    interpreter_types::{Jumps, MemoryTr},
    CallInputs, CallOutcome, CreateInputs, CreateOutcome, Gas, InstructionResult, Interpreter,
    InterpreterResult,
};
use serde::{Deserialize, Serialize};

pub use revm;

/// Which per-step snapshots a trace collects.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TraceOptions {
    pub stack: bool,
    pub memory: bool,
    pub storage: bool,
}

impl TraceOptions {
    pub fn all() -> Self {
        Self {
            stack: true,
            memory: true,
            storage: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpcodeStep {
    pub pc: u64,
    pub op: String,
    pub opcode: u8,
    pub gas: u64,
    pub gas_cost: u64,
    pub depth: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<Vec<B256>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory: Option<Vec<B256>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage: Option<BTreeMap<B256, B256>>,
}

/// Answer produced by an [`Intercept`] hook in place of running bytecode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Intercepted {
    pub output: Bytes,
    pub gas_cost: u64,
    pub reverted: bool,
}

impl Intercepted {
    pub fn ok(output: impl Into<Bytes>, gas_cost: u64) -> Self {
        Self {
            output: output.into(),
            gas_cost,
            reverted: false,
        }
    }

    pub fn revert(output: impl Into<Bytes>, gas_cost: u64) -> Self {
        Self {
            output: output.into(),
            gas_cost,
            reverted: true,
        }
    }
}

/// Hook consulted before every call frame with the address whose code the
/// frame would run (the callee for `DELEGATECALL` and `CALLCODE` too).
/// Returning `Some` short-circuits the frame: no bytecode runs and the
/// answer becomes the frame's outcome.
pub trait Intercept {
    fn intercept(&mut self, code_address: Address, input: &[u8]) -> Option<Intercepted>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoIntercept;

impl Intercept for NoIntercept {
    fn intercept(&mut self, _code_address: Address, _input: &[u8]) -> Option<Intercepted> {
        None
    }
}

/// Inspector driving one execution: optional opcode collection, a call
/// interception hook and top-level static enforcement.
#[derive(Debug, Default)]
pub struct Tracer<H = NoIntercept> {
    options: Option<TraceOptions>,
    hook: H,
    force_static: bool,
    entered: bool,
    out_of_gas: bool,
    pending: Option<OpcodeStep>,
    steps: Vec<OpcodeStep>,
}

impl<H: Intercept> Tracer<H> {
    pub fn new(hook: H) -> Self {
        Self {
            options: None,
            hook,
            force_static: false,
            entered: false,
            out_of_gas: false,
            pending: None,
            steps: Vec::new(),
        }
    }

    /// Collect one [`OpcodeStep`] per executed instruction.
    pub fn with_steps(mut self, options: TraceOptions) -> Self {
        self.options = Some(options);
        self
    }

    /// Run the outermost call frame as a static call.
    pub fn with_static(mut self, force_static: bool) -> Self {
        self.force_static = force_static;
        self
    }

    /// True when any frame of the execution ended out of gas, including
    /// inner frames whose failure the caller swallowed.
    pub fn out_of_gas(&self) -> bool {
        self.out_of_gas
    }

    pub fn hook(&self) -> &H {
        &self.hook
    }

    pub fn hook_mut(&mut self) -> &mut H {
        &mut self.hook
    }

    pub fn take(&mut self) -> Vec<OpcodeStep> {
        self.flush();
        std::mem::take(&mut self.steps)
    }

    fn flush(&mut self) {
        if let Some(step) = self.pending.take() {
            self.steps.push(step);
        }
    }
}

pub fn opcode_name(opcode: u8) -> String {
    OpCode::new(opcode)
        .map(|op| op.as_str().to_string())
        .unwrap_or_else(|| format!("UNKNOWN(0x{opcode:02x})"))
}

pub fn memory_words(memory: &[u8]) -> Vec<B256> {
    memory
        .chunks(32)
        .map(|chunk| {
            let mut word = [0u8; 32];
            word[..chunk.len()].copy_from_slice(chunk);
            B256::from(word)
        })
        .collect()
}

fn is_out_of_gas(result: InstructionResult) -> bool {
    matches!(
        result,
        InstructionResult::OutOfGas
            | InstructionResult::MemoryOOG
            | InstructionResult::MemoryLimitOOG
            | InstructionResult::PrecompileOOG
            | InstructionResult::InvalidOperandOOG
            | InstructionResult::ReentrancySentryOOG
    )
}

impl<CTX, H> Inspector<CTX, EthInterpreter> for Tracer<H>
where
    CTX: ContextTr,
    H: Intercept,
{
    fn step(&mut self, interp: &mut Interpreter<EthInterpreter>, context: &mut CTX) {
        let Some(options) = self.options else {
            return;
        };
        self.flush();

        let opcode = interp.bytecode.opcode();
        let data = interp.stack.data();

        let stack = options
            .stack
            .then(|| data.iter().map(|word| B256::from(*word)).collect());
        let memory = options.memory.then(|| {
            let size = interp.memory.size();
            memory_words(&interp.memory.slice_len(0, size))
        });
        let storage = (options.storage && opcode == SSTORE && data.len() >= 2).then(|| {
            let key = data[data.len() - 1];
            let value = data[data.len() - 2];
            BTreeMap::from([(B256::from(key), B256::from(value))])
        });

        self.pending = Some(OpcodeStep {
            pc: interp.bytecode.pc() as u64,
            op: opcode_name(opcode),
            opcode,
            gas: interp.gas.remaining(),
            gas_cost: 0,
            depth: context.journal_mut().depth(),
            stack,
            memory,
            storage,
        });
    }

    fn step_end(&mut self, interp: &mut Interpreter<EthInterpreter>, _context: &mut CTX) {
        if let Some(mut step) = self.pending.take() {
            step.gas_cost = step.gas.saturating_sub(interp.gas.remaining());
            self.steps.push(step);
        }
    }

    fn call(&mut self, context: &mut CTX, inputs: &mut CallInputs) -> Option<CallOutcome> {
        if !self.entered {
            self.entered = true;
            if self.force_static {
                inputs.is_static = true;
            }
        }

        let input = inputs.input.bytes(context);
        let answer = self.hook.intercept(inputs.bytecode_address, &input)?;

        let mut gas = Gas::new(inputs.gas_limit);
        let result = if !gas.record_cost(answer.gas_cost) {
            gas = Gas::new_spent(inputs.gas_limit);
            InstructionResult::OutOfGas
        } else if answer.reverted {
            InstructionResult::Revert
        } else {
            InstructionResult::Return
        };

        Some(CallOutcome {
            result: InterpreterResult {
                result,
                output: answer.output,
                gas,
            },
            memory_offset: inputs.return_memory_offset.clone(),
            was_precompile_called: false,
            precompile_call_logs: vec![],
        })
    }

    fn call_end(&mut self, _context: &mut CTX, _inputs: &CallInputs, outcome: &mut CallOutcome) {
        if is_out_of_gas(outcome.result.result) {
            self.out_of_gas = true;
        }
    }

    fn create_end(
        &mut self,
        _context: &mut CTX,
        _inputs: &CreateInputs,
        outcome: &mut CreateOutcome,
    ) {
        if is_out_of_gas(outcome.result.result) {
            self.out_of_gas = true;
        }
    }
}
