//! `tbcc`: thin CLI surface over the three public operations §6 names.
//! Ambient surface only — logic belongs in the library, not here.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tbcwriter::context::CompilerContext;
use tbcwriter::frontend::ScriptFrontend;
use tbcwriter::orchestrator::{self, CompileOptions};

/// Bytecode writer for a dynamically-typed scripting language.
#[derive(Parser, Debug)]
#[command(name = "tbcc", version, about)]
struct Cli {
    /// Text inserted verbatim as the first line of the emitted object file.
    #[arg(long, value_name = "TEXT")]
    preamble: Option<String>,

    /// Message embedded in the preamble's loader-missing error, overriding
    /// the built-in default.
    #[arg(long, value_name = "TEXT")]
    loader_error: Option<String>,

    /// Increase logging verbosity (may be repeated).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Print the default bytecode file extension (`.tbc`) and exit.
    #[arg(long)]
    extension: bool,

    /// Print the host runtime version string and exit.
    #[arg(long = "host-version")]
    host_version: bool,

    /// Script to compile.
    input: Option<PathBuf>,

    /// Destination path; defaults to `input` with its extension replaced.
    output: Option<PathBuf>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    stderrlog::new()
        .module(module_path!())
        .verbosity(1 + cli.verbose as usize)
        .init()
        .ok();

    if cli.extension {
        println!("{}", orchestrator::bytecode_extension());
        return ExitCode::SUCCESS;
    }
    if cli.host_version {
        println!("{}", orchestrator::host_version());
        return ExitCode::SUCCESS;
    }

    let Some(input) = cli.input.as_deref() else {
        eprintln!("tbcc: missing required argument <input>");
        return ExitCode::FAILURE;
    };

    let opts = CompileOptions { preamble: cli.preamble, loader_error_override: cli.loader_error };
    let mut frontend = ScriptFrontend::new();
    let mut context = CompilerContext::new();

    match orchestrator::compile_file(&mut frontend, &mut context, input, cli.output.as_deref(), &opts) {
        Ok(out_path) => {
            log::info!("wrote {}", out_path.display());
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("tbcc: {err}");
            ExitCode::FAILURE
        }
    }
}
