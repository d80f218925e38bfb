//! Reconstruct buffer allocations from a lowered entry signature.
//!
//! ```text
//! sigcheck entry.sig
//! echo 'func @main(%a: tensor<4x4xf32> {params = 0})' | sigcheck -v
//! ```

use std::io::{self, Read};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use thiserror::Error;

use thunkc::output::sorted_output_info;
use thunkc::reconstruct::reconstruct_allocations;
use thunkc::signature::{parse_signature, SignatureParseError};
use thunkc::CompileError;

#[derive(Parser)]
#[command(name = "sigcheck")]
#[command(about = "Check a lowered entry signature and print its allocations.", long_about = None)]
struct Cli {
    /// Signature file; reads stdin when omitted.
    input: Option<PathBuf>,

    /// Raise the log level (-v debug, -vv trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Error, Debug)]
enum SigcheckError {
    #[error("Failed to read {source_name}: {error}")]
    Io { source_name: String, error: io::Error },

    #[error("Parse error: {0}")]
    Parse(#[from] SignatureParseError),

    #[error(transparent)]
    Compile(#[from] CompileError),
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::from_default_env().filter_level(level).init();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {}", err);
            ExitCode::FAILURE
        }
    }
}

fn read_input(input: Option<&PathBuf>) -> Result<String, SigcheckError> {
    match input {
        Some(path) => std::fs::read_to_string(path).map_err(|error| SigcheckError::Io {
            source_name: path.display().to_string(),
            error,
        }),
        None => {
            let mut text = String::new();
            io::stdin()
                .read_to_string(&mut text)
                .map_err(|error| SigcheckError::Io { source_name: "stdin".into(), error })?;
            Ok(text)
        }
    }
}

fn run(cli: &Cli) -> Result<(), SigcheckError> {
    let text = read_input(cli.input.as_ref())?;
    let func = parse_signature(&text)?;
    log::debug!("Parsed {}", func);

    let mut allocations = Vec::new();
    let reconstruction = reconstruct_allocations(&func, &mut allocations)?;

    println!("@{}: {} allocations", func.name, allocations.len());
    for allocation in &allocations {
        println!("  {}", allocation);
    }
    println!("output shape: {}", reconstruction.output_shape);
    for (index, info) in sorted_output_info(&reconstruction.output_info) {
        print!("  output {} -> allocation {}", index, info.allocation_index);
        if let Some(alias) = &info.alias {
            print!(", {:?} parameter {} at {}", alias.kind, alias.parameter, alias.parameter_index);
        }
        if info.dynamic {
            print!(", dynamic");
        }
        println!();
    }
    Ok(())
}
