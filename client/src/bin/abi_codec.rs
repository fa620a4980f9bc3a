//! ABI codec tool - encodes and decodes values and computes method selectors.
//!
//! Usage:
//!   cargo run --bin abi-codec -- encode --type '(uint64,bool)' --value '[7,true]'
//!   cargo run --bin abi-codec -- decode --type '(uint64,bool)' --hex 000000000000000780
//!   cargo run --bin abi-codec -- selector 'add(uint64,uint64)uint128'

use anyhow::{anyhow, Context, Result};
use avmkit_types::abi::{decode, encode, Method, Type, Value};
use clap::{Parser, Subcommand};
use serde_json::Value as JsonValue;

#[derive(Parser, Debug)]
#[command(author, version, about = "Encode and decode ABI values")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Encode a JSON value as the given type; prints hex.
    Encode {
        #[arg(short, long = "type")]
        ty: String,
        #[arg(short, long)]
        value: String,
    },
    /// Decode hex bytes as the given type; prints JSON.
    Decode {
        #[arg(short, long = "type")]
        ty: String,
        #[arg(long)]
        hex: String,
    },
    /// Print a method's selector.
    Selector { signature: String },
}

fn parse_type(ty: &str) -> Result<Type> {
    ty.parse().with_context(|| format!("Invalid type {ty:?}"))
}

fn main() -> Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .init();

    match args.command {
        Command::Encode { ty, value } => {
            let ty = parse_type(&ty)?;
            let json: JsonValue = serde_json::from_str(&value).context("Value is not JSON")?;
            let value = Value::from_json(&ty, &json)?;
            println!("{}", hex::encode(encode(&ty, &value)?));
        }
        Command::Decode { ty, hex: encoded } => {
            let ty = parse_type(&ty)?;
            let bytes = hex::decode(encoded.trim_start_matches("0x"))
                .map_err(|e| anyhow!("Invalid hex: {e}"))?;
            let value = decode(&ty, &bytes)?;
            println!("{}", serde_json::to_string_pretty(&value.to_json())?);
        }
        Command::Selector { signature } => {
            let method = Method::from_signature(&signature)?;
            println!("{}", hex::encode(method.selector()));
        }
    }
    Ok(())
}
