use std::{path::PathBuf, sync::Arc};

use alloy_primitives::{Address, Bytes, I256};
use clap::{Args as ClapArgs, Parser, Subcommand};
use retrocall::{
    BlockReference, Config, ContractCallRequest, ContractCallService, MemRepository,
    TraceOptions, TraceRequest, TransactionRef, common::call::DEFAULT_GAS,
};
use serde_json::json;
use tracing_subscriber::EnvFilter;

#[cfg(feature = "mimalloc")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

/// Historical calls, gas estimates and opcode traces over a ledger fixture.
#[derive(Parser)]
#[command(name = "retrocall")]
struct Args {
    /// Ledger fixture (JSON).
    #[arg(long)]
    ledger: PathBuf,

    /// Config file (JSON); RETROCALL_* variables are used when absent.
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Execute a read-only call.
    Call(CallArgs),
    /// Estimate the gas a call needs.
    Estimate(CallArgs),
    /// Replay a recorded transaction opcode by opcode.
    Trace(TraceArgs),
}

#[derive(ClapArgs)]
struct CallArgs {
    /// Receiver; omit to deploy `--data` as init code.
    #[arg(long)]
    to: Option<Address>,

    #[arg(long, default_value_t = Address::ZERO)]
    from: Address,

    #[arg(long, default_value = "0x")]
    data: Bytes,

    #[arg(long, default_value = "0", allow_hyphen_values = true)]
    value: I256,

    #[arg(long, default_value_t = DEFAULT_GAS)]
    gas: u64,

    /// Tag, block number or `<seconds>.<nanos>` timestamp.
    #[arg(long, default_value = "latest")]
    block: BlockReference,

    #[arg(long = "static")]
    is_static: bool,
}

impl CallArgs {
    fn into_request(self) -> ContractCallRequest {
        let request = match self.to {
            Some(to) => ContractCallRequest::call(to, self.data),
            None => ContractCallRequest::create(self.data),
        };
        request
            .with_sender(self.from)
            .with_value(self.value)
            .with_gas(self.gas)
            .with_block(self.block)
            .with_static(self.is_static)
    }
}

#[derive(ClapArgs)]
struct TraceArgs {
    /// Transaction hash or id (`0.0.2-1700000000-000000000`).
    transaction: TransactionRef,

    #[arg(long)]
    stack: bool,

    #[arg(long)]
    memory: bool,

    #[arg(long)]
    storage: bool,
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env()?,
    };
    let default_trace = config.trace;
    let repository = Arc::new(MemRepository::load(&args.ledger)?);
    let service = ContractCallService::new(repository, config);

    let output = match args.command {
        Command::Call(call) => serde_json::to_value(service.call(call.into_request()).await?)?,
        Command::Estimate(call) => {
            let gas = service.estimate_gas(call.into_request().estimate()).await?;
            json!({ "gas": gas })
        }
        Command::Trace(trace) => {
            let requested = TraceOptions {
                stack: trace.stack,
                memory: trace.memory,
                storage: trace.storage,
            };
            let options = if requested == TraceOptions::default() {
                default_trace
            } else {
                requested
            };
            let request = TraceRequest {
                transaction: trace.transaction,
                options,
            };
            serde_json::to_value(service.trace(request).await?)?
        }
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
