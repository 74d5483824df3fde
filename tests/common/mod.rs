//! Shared driver for the end-to-end scenarios: source text through the
//! full pipeline down to the printed IR.

use dachs::compiler::{CompileError, Compiler};

pub fn compile(code: &str) -> Result<String, CompileError> {
    Compiler::default()
        .compile(code, "test.dcs")
        .map(|module| module.to_string())
}
