use std::path::PathBuf;
use std::process::exit;

use anyhow::Context;
use clap::Parser;
use log::LevelFilter;

use dachs::compiler::{CompileError, Compiler};
use dachs::codegen::CodegenError;

/// Compiler for the Dachs programming language.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// Source files (must end with '.dcs'); order matters.
    files: Vec<String>,

    /// Dump the AST of each compilation unit and exit.
    #[arg(long)]
    dump_ast: bool,

    /// Dump the symbol tables of each compilation unit and exit.
    #[arg(long)]
    dump_sym_table: bool,

    /// Print the emitted IR of each compilation unit and exit.
    #[arg(long)]
    emit_llvm: bool,

    /// Compile each compilation unit into an object file.
    #[arg(long)]
    output_obj: bool,

    /// Enable debug information emission.
    #[arg(long)]
    debug: bool,

    /// Suppress ANSI colors in diagnostics.
    #[arg(long)]
    disable_color: bool,

    /// Comma-separated library search paths.
    #[arg(long, value_name = "a,b,c")]
    libdir: Option<String>,
}

fn read_source(file: &str) -> anyhow::Result<String> {
    std::fs::read_to_string(file).with_context(|| format!("Could not read file '{file}'"))
}

fn error_exit_code(error: &CompileError) -> i32 {
    match error {
        CompileError::Parse(_) => 10,
        CompileError::Semantic(_) => 11,
        CompileError::Codegen(CodegenError::NotImplemented { .. }) => 13,
        CompileError::Codegen(CodegenError::Internal(_)) => -1,
        CompileError::Codegen(_) => 12,
        CompileError::Io(_) => 3,
    }
}

fn main() {
    let cli = Cli::parse();

    simple_logger::SimpleLogger::new()
        .with_level(if cli.debug {
            LevelFilter::Debug
        } else {
            LevelFilter::Warn
        })
        .init()
        .expect("failed to set up logging");

    if cli.disable_color {
        colored::control::set_override(false);
    }

    let actions = [cli.dump_ast, cli.dump_sym_table, cli.emit_llvm, cli.output_obj]
        .iter()
        .filter(|flag| **flag)
        .count();
    if actions > 1 {
        eprintln!(
            "Usage: dachs [--dump-ast|--dump-sym-table|--emit-llvm|--output-obj] [--debug] [--libdir={{path}}] [--disable-color] {{file}}"
        );
        exit(1);
    }

    let files: Vec<&String> = cli.files.iter().filter(|f| f.ends_with(".dcs")).collect();
    if files.is_empty() {
        eprintln!("No input file: Source file must end with '.dcs'.");
        exit(2);
    }

    let libdirs: Vec<PathBuf> = cli
        .libdir
        .as_deref()
        .map(|dirs| dirs.split(',').map(PathBuf::from).collect())
        .unwrap_or_default();
    let compiler = Compiler::new(libdirs);

    for file in files {
        let code = match read_source(file) {
            Ok(code) => code,
            Err(e) => {
                eprintln!("{e:#}");
                exit(3);
            }
        };

        let result: Result<(), CompileError> = if cli.dump_ast {
            compiler.dump_ast(&code, file).map(|dump| println!("{dump}"))
        } else if cli.dump_sym_table {
            compiler
                .dump_scope_tree(&code, file)
                .map(|dump| println!("{dump}"))
        } else if cli.emit_llvm {
            compiler.compile(&code, file).map(|module| println!("{module}"))
        } else if cli.output_obj {
            Err(CompileError::Codegen(CodegenError::not_implemented(
                "object code emission (requires the native backend)",
            )))
        } else {
            compiler.compile(&code, file).map(|_| ())
        };

        if let Err(error) = result {
            eprintln!("{error}");
            exit(error_exit_code(&error));
        }
    }

    exit(0);
}
