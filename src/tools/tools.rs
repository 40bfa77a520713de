mod dump;
use dump::dump;
mod wat2wasm;
use wat2wasm::wat2wasm;

use std::path::PathBuf;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};

use wasm_codec::Features;

/// Inspect and convert WebAssembly modules
#[derive(Clone, Debug, Parser)]
struct Args {
    /// input filename
    #[arg(short, long)]
    input: PathBuf,
    /// enable a proposal (e.g. --enable simd), may be repeated
    #[arg(long = "enable", value_name = "FEATURE")]
    enable: Vec<String>,
    // operation to execute
    #[command(subcommand)]
    operation: Operation,
}

#[derive(Clone, Debug, Subcommand)]
enum Operation {
    /// Decode a binary module and print its contents
    Dump {
        /// print the decoded module as JSON
        #[arg(long)]
        json: bool,
    },
    /// Convert a text module to the binary format
    Wat2wasm {
        /// output filename
        #[arg(short, long)]
        output: PathBuf,
    },
}

fn features_from_args(args: &Args) -> Result<Features> {
    let mut features = Features::default();
    for name in &args.enable {
        let flag =
            Features::by_name(name).ok_or_else(|| anyhow!("unknown feature: {name}"))?;
        features = features.with(flag);
    }
    Ok(features)
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    let features = features_from_args(&args)?;
    match args.operation {
        Operation::Dump { json } => dump(&args.input, features, json),
        Operation::Wat2wasm { ref output } => wat2wasm(&args.input, output, features),
    }
}
