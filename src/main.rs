//! Plasma textual bytecode assembler - CLI

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use plasma::pz::{asm, pretty, write};
use plasma::util::logger::{self, LogLevel};
use plasma::util::report::InternalError;
use plasma::{NAME, VERSION};
use std::fs;
use std::path::PathBuf;
use std::process;
use tracing::info;

/// Log level enum for CLI
#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevelArg {
    Debug,
    Info,
    Warn,
    Error,
}

impl From<LogLevelArg> for LogLevel {
    fn from(level: LogLevelArg) -> Self {
        match level {
            LogLevelArg::Debug => LogLevel::Debug,
            LogLevelArg::Info => LogLevel::Info,
            LogLevelArg::Warn => LogLevel::Warn,
            LogLevelArg::Error => LogLevel::Error,
        }
    }
}

/// Assemble Plasma textual bytecode into a binary bytecode file
#[derive(Parser, Debug)]
#[command(name = "pzasm")]
#[command(version = VERSION)]
#[command(about = "Plasma bytecode assembler", long_about = None)]
struct Args {
    /// Textual bytecode file to assemble
    #[arg(value_name = "FILE")]
    input: PathBuf,

    /// Output file (defaults to <input>.pz)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Print the assembled program back as text instead of writing
    #[arg(short, long)]
    dump: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Set log level (debug, info, warn, error)
    #[arg(short, long, value_enum)]
    log_level: Option<LogLevelArg>,
}

fn main() {
    let args = Args::parse();

    logger::init(args.log_level.map(Into::into));

    if args.verbose {
        info!("{} assembler {}", NAME, VERSION);
    }

    if let Err(e) = run(&args) {
        // compile errors print as `file:line: message`; compiler bugs
        // get the internal-error exit code
        eprintln!("{:#}", e);
        let code = if e.downcast_ref::<InternalError>().is_some() {
            2
        } else {
            1
        };
        process::exit(code);
    }
}

fn run(args: &Args) -> Result<()> {
    let file_name = args.input.display().to_string();
    let source = fs::read_to_string(&args.input)
        .with_context(|| format!("Failed to read file: {}", file_name))?;

    let pz = asm::assemble(&file_name, &source).map_err(anyhow::Error::new)?;
    info!(
        "assembled {} procs, {} data entries",
        pz.procs.len(),
        pz.datas.len()
    );

    if args.dump {
        print!("{}", pretty::print_pz(&pz));
        return Ok(());
    }

    let output = args.output.clone().unwrap_or_else(|| {
        let mut path = args.input.clone();
        path.set_extension("pz");
        path
    });
    let mut file = fs::File::create(&output)
        .with_context(|| format!("Failed to create output: {}", output.display()))?;
    write::write_pz(&pz, &mut file)
        .with_context(|| format!("Failed to write bytecode: {}", output.display()))?;

    Ok(())
}
