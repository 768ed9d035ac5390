use clap::Parser;
use log::{LevelFilter, info};
use std::path::PathBuf;
use std::process::ExitCode;

use stackvm::vm::machine::Machine;
use stackvm::vm::parser::parse_program;
use stackvm::{config, logging};

// --- Command Line Arguments ---
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Program file with one instruction per line.
    program: PathBuf,

    /// Heap capacity in cells.
    #[arg(long, default_value_t = config::DEFAULT_HEAP_SIZE)]
    heap_size: usize,

    /// Debug filter to specify log topics (e.g., "vm,parser,io")
    /// Available topics: vm, parser, io
    #[arg(long)]
    debug_filter: Option<String>,

    /// Log level (off, error, warn, info, debug, trace)
    #[arg(long, default_value = config::DEFAULT_LOG_LEVEL)]
    log_level: String,
}

fn main() -> ExitCode {
    // Parse command line arguments
    let args = Args::parse();

    let log_level = match args.log_level.to_lowercase().as_str() {
        "off" => LevelFilter::Off,
        "error" => LevelFilter::Error,
        "warn" => LevelFilter::Warn,
        "info" => LevelFilter::Info,
        "debug" => LevelFilter::Debug,
        "trace" => LevelFilter::Trace,
        _ => LevelFilter::Warn,
    };

    // Setup logger with debug filters if provided
    if let Err(e) = logging::init_logger(log_level, args.debug_filter) {
        eprintln!("Warning: Failed to initialize logger: {}", e);
    }

    let source = match std::fs::read_to_string(&args.program) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("Cannot read {}: {}", args.program.display(), e);
            return ExitCode::FAILURE;
        }
    };

    let program = match parse_program(&source) {
        Ok(program) => program,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };
    info!("Loaded {} instruction(s) from {}", program.len(), args.program.display());

    let mut machine = Machine::new(program, args.heap_size);
    match machine.run() {
        Ok(status) => {
            info!("Run finished: {status:?}");
            ExitCode::SUCCESS
        }
        Err(report) => {
            eprintln!("{report}");
            ExitCode::FAILURE
        }
    }
}
