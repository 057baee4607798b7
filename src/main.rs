use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

use mypl::RuntimeConfig;
use mypl::compiler;

#[derive(Parser)]
#[command(name = "mypl")]
#[command(about = "Bytecode compiler and VM for checked MyPL programs", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile and run a checked syntax tree (JSON)
    Run {
        /// The syntax tree file to run
        file: PathBuf,

        /// Load runtime settings from a TOML file
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// Trace every executed instruction to stderr
        #[arg(long)]
        trace: bool,

        /// Profile opcode execution counts
        #[arg(long)]
        profile_opcodes: bool,

        /// Dump bytecode to stderr, or to a file with --dump-bytecode=path
        #[arg(long, value_name = "FILE", num_args = 0..=1, require_equals = true)]
        dump_bytecode: Option<Option<PathBuf>>,
    },
    /// Print the generated bytecode of a checked syntax tree
    Ir {
        /// The syntax tree file to compile
        file: PathBuf,
    },
    /// Generate code for a checked syntax tree without running it
    Check {
        /// The syntax tree file to check
        file: PathBuf,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            file,
            config,
            trace,
            profile_opcodes,
            dump_bytecode,
        } => {
            let mut runtime_config = match config {
                Some(path) => match RuntimeConfig::load(&path) {
                    Ok(c) => c,
                    Err(e) => {
                        eprintln!("error: {}", e);
                        return ExitCode::FAILURE;
                    }
                },
                None => RuntimeConfig::default(),
            };
            // Flags can only switch diagnostics on
            runtime_config.trace |= trace;
            runtime_config.profile_opcodes |= profile_opcodes;

            let dump_opts = compiler::DumpOptions { dump_bytecode };

            if let Err(e) = compiler::run_file_with_dump(&file, &runtime_config, &dump_opts) {
                eprintln!("{}", e);
                return ExitCode::FAILURE;
            }
        }
        Commands::Ir { file } => match compiler::dump_file(&file) {
            Ok(listing) => print!("{}", listing),
            Err(e) => {
                eprintln!("{}", e);
                return ExitCode::FAILURE;
            }
        },
        Commands::Check { file } => {
            if let Err(e) = compiler::check_file(&file) {
                eprintln!("{}", e);
                return ExitCode::FAILURE;
            }
            println!("Code generation passed.");
        }
    }

    ExitCode::SUCCESS
}
