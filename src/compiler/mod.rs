pub mod ast;
mod codegen;
pub mod dump;

pub use codegen::{Codegen, CodegenError};

use std::fs;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

use crate::config::RuntimeConfig;
use crate::error::{Error, Result};
use crate::vm::{Chunk, VM};
use ast::Program;

/// Where the `run` command should send intermediate dumps.
#[derive(Debug, Clone, Default)]
pub struct DumpOptions {
    /// `None` = no dump, `Some(None)` = stderr, `Some(Some(path))` = file
    pub dump_bytecode: Option<Option<PathBuf>>,
}

/// Decode a checked syntax tree from a JSON file.
pub fn load_program(path: &Path) -> Result<Program> {
    let content = fs::read_to_string(path).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|source| Error::Tree {
        path: path.to_path_buf(),
        source,
    })
}

/// Decode a checked syntax tree from a JSON string.
pub fn parse_program(json: &str) -> Result<Program> {
    serde_json::from_str(json).map_err(|source| Error::Tree {
        path: PathBuf::from("<input>"),
        source,
    })
}

/// Lower a checked tree to bytecode.
pub fn compile(program: &Program) -> Result<Chunk> {
    let mut codegen = Codegen::new();
    Ok(codegen.compile(program)?)
}

/// Compile and run a program against stdout/stdin.
pub fn run_program(program: &Program, config: &RuntimeConfig) -> Result<()> {
    let chunk = compile(program)?;
    let mut vm = VM::new();
    execute(&mut vm, &chunk, config)
}

/// Compile and run a program against the given output and input streams.
pub fn run_program_with_io(
    program: &Program,
    config: &RuntimeConfig,
    output: Box<dyn Write>,
    input: Box<dyn BufRead>,
) -> Result<()> {
    let chunk = compile(program)?;
    let mut vm = VM::with_io(output, input);
    execute(&mut vm, &chunk, config)
}

fn execute(vm: &mut VM, chunk: &Chunk, config: &RuntimeConfig) -> Result<()> {
    if config.trace {
        eprintln!("[trace] {} functions, entry 'main'", chunk.functions.len());
    }
    vm.set_config(config);
    vm.run(chunk)?;
    Ok(())
}

/// Load, compile and run a tree file, dumping bytecode first if requested.
pub fn run_file_with_dump(
    path: &Path,
    config: &RuntimeConfig,
    dump_opts: &DumpOptions,
) -> Result<()> {
    let program = load_program(path)?;
    let chunk = compile(&program)?;

    if let Some(target) = &dump_opts.dump_bytecode {
        let listing = dump::format_bytecode(&chunk);
        match target {
            Some(dump_path) => fs::write(dump_path, listing).map_err(|source| Error::Io {
                path: dump_path.clone(),
                source,
            })?,
            None => eprint!("{}", listing),
        }
    }

    let mut vm = VM::new();
    execute(&mut vm, &chunk, config)
}

/// Load and compile a tree file, returning its bytecode listing.
pub fn dump_file(path: &Path) -> Result<String> {
    let program = load_program(path)?;
    let chunk = compile(&program)?;
    Ok(dump::format_bytecode(&chunk))
}

/// Load and compile a tree file without running it.
pub fn check_file(path: &Path) -> Result<()> {
    let program = load_program(path)?;
    compile(&program)?;
    Ok(())
}
