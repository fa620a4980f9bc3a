//! Method call tool - calls an ABI method on an application and prints the result.
//!
//! Usage:
//!   cargo run --release --bin method-call -- --app-id 1234 \
//!       --method 'add(uint64,uint64)uint128' --arg 1 --arg 2
//!   cargo run --release --bin method-call -- --app-id 1234 \
//!       --contract contract.json --method add --arg 1 --arg 2
//!
//! The signing key is read from SIGNER_KEY_HEX (32-byte Ed25519 seed).

use anyhow::{anyhow, Context, Result};
use avmkit_client::{AccountSigner, AtomicGroup, Client, MethodArg, MethodCall, TransactionSigner};
use avmkit_types::{
    abi::{ArgKind, Contract, Method, ReferenceArg, Type, Value},
    OnComplete,
};
use clap::Parser;
use ed25519_dalek::SigningKey;
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about = "Call an ABI method and print its return value")]
struct Args {
    #[arg(short, long, env = "ALGOD_URL", default_value = "http://localhost:4001")]
    url: String,

    #[arg(long, env = "ALGOD_TOKEN", default_value = "")]
    token: String,

    #[arg(long, env = "SIGNER_KEY_HEX", hide_env_values = true)]
    key: String,

    #[arg(long)]
    app_id: u64,

    /// Full signature, or a method name when --contract is given.
    #[arg(short, long)]
    method: String,

    /// Contract description to look the method up in.
    #[arg(long)]
    contract: Option<std::path::PathBuf>,

    /// One JSON value per method argument, in order.
    #[arg(long = "arg")]
    args: Vec<String>,

    /// noop, optin, closeout, clearstate, update, delete.
    #[arg(long, default_value = "noop")]
    on_complete: String,

    #[arg(long, default_value = "10")]
    wait_rounds: u64,
}

#[derive(Serialize)]
struct CallOutput {
    tx_id: String,
    confirmed_round: u64,
    method: String,
    return_value: Option<JsonValue>,
    return_hex: Option<String>,
    decode_error: Option<String>,
}

fn parse_key(hex_str: &str) -> Result<SigningKey> {
    let bytes = hex::decode(hex_str.trim_start_matches("0x")).context("Invalid key hex")?;
    let seed: [u8; 32] = bytes
        .try_into()
        .map_err(|_| anyhow!("Signing key must be 32 bytes"))?;
    Ok(SigningKey::from_bytes(&seed))
}

fn parse_on_complete(s: &str) -> Result<OnComplete> {
    Ok(match s {
        "noop" => OnComplete::NoOp,
        "optin" => OnComplete::OptIn,
        "closeout" => OnComplete::CloseOut,
        "clearstate" => OnComplete::ClearState,
        "update" => OnComplete::UpdateApplication,
        "delete" => OnComplete::DeleteApplication,
        other => return Err(anyhow!("Unknown on-complete action {other:?}")),
    })
}

fn load_method(args: &Args) -> Result<Method> {
    match &args.contract {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let contract = Contract::from_json(&json).context("Invalid contract description")?;
            Ok(contract.get_method_by_name(&args.method)?.clone())
        }
        None => Ok(Method::from_signature(&args.method)?),
    }
}

fn parse_arg(kind: &ArgKind, raw: &str) -> Result<MethodArg> {
    let json: JsonValue =
        serde_json::from_str(raw).with_context(|| format!("Argument {raw:?} is not JSON"))?;
    let ty = match kind {
        ArgKind::Value(ty) => ty.clone(),
        ArgKind::Reference(ReferenceArg::Account) => Type::Address,
        ArgKind::Reference(_) => Type::Uint(64),
        ArgKind::Transaction(txn) => {
            return Err(anyhow!("Transaction argument {} is not supported here", txn.as_str()))
        }
    };
    Ok(Value::from_json(&ty, &json)?.into())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let method = load_method(&args)?;
    if method.args.len() != args.args.len() {
        return Err(anyhow!(
            "{} takes {} arguments, got {}",
            method.signature(),
            method.args.len(),
            args.args.len()
        ));
    }
    let method_args = method
        .args
        .iter()
        .zip(&args.args)
        .map(|(arg, raw)| parse_arg(&arg.kind, raw))
        .collect::<Result<Vec<_>>>()?;

    let signer = AccountSigner::new(parse_key(&args.key)?);
    let sender = signer.address();
    let signer: Arc<dyn TransactionSigner> = Arc::new(signer);

    let client = Client::new(&args.url, &args.token)?;
    let params = client.suggested_params().await?;
    info!(%sender, app_id = args.app_id, method = %method.signature(), "calling method");

    let mut group = AtomicGroup::new();
    group.add_method_call(
        MethodCall::new(args.app_id, method, sender, params, signer)
            .with_on_complete(parse_on_complete(&args.on_complete)?)
            .with_args(method_args),
    )?;
    let result = group.execute(&client, args.wait_rounds).await?;

    let method_result = result
        .method_results
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("No method result"))?;
    let output = CallOutput {
        tx_id: method_result.tx_id,
        confirmed_round: result.confirmed_round,
        method: method_result.method.signature(),
        return_value: method_result.return_value.as_ref().map(Value::to_json),
        return_hex: method_result.raw_value.as_ref().map(hex::encode),
        decode_error: method_result.decode_error.map(|e| e.to_string()),
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
