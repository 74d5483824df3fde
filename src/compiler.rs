//! The compilation pipeline: parse → forward analysis → semantic analysis
//! → IR emission, plus the debug dump entry points the driver exposes.

use std::collections::HashSet;
use std::fmt::Write as _;
use std::path::PathBuf;
use std::{error::Error, fmt::Display};

use crate::codegen::{self, CodegenError};
use crate::ir::Module;
use crate::parser::ast::CompilationUnit;
use crate::parser::{self, ParseError};
use crate::semantics::{self, SemanticCheckError, SemanticContext};

/// Modules whose implicit imports are satisfied natively by the type
/// system when no library file provides them.
const BUILTIN_MODULES: &[&str] = &["string", "array", "range"];

#[derive(Debug)]
pub enum CompileError {
    Parse(ParseError),
    Semantic(SemanticCheckError),
    Codegen(CodegenError),
    Io(std::io::Error),
}

impl Display for CompileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompileError::Parse(e) => e.fmt(f),
            CompileError::Semantic(e) => e.fmt(f),
            CompileError::Codegen(e) => e.fmt(f),
            CompileError::Io(e) => e.fmt(f),
        }
    }
}

impl Error for CompileError {}

impl From<ParseError> for CompileError {
    fn from(value: ParseError) -> Self {
        CompileError::Parse(value)
    }
}

impl From<SemanticCheckError> for CompileError {
    fn from(value: SemanticCheckError) -> Self {
        CompileError::Semantic(value)
    }
}

impl From<CodegenError> for CompileError {
    fn from(value: CodegenError) -> Self {
        CompileError::Codegen(value)
    }
}

#[derive(Debug, Default)]
pub struct Compiler {
    pub libdirs: Vec<PathBuf>,
}

impl Compiler {
    pub fn new(libdirs: Vec<PathBuf>) -> Self {
        Compiler { libdirs }
    }

    /// Parse one unit and textually include what it imports.
    pub fn parse(&self, code: &str, path: &str) -> Result<CompilationUnit, CompileError> {
        let mut unit = parser::parse(code, Some(path))?;
        let mut included = HashSet::new();
        self.resolve_imports(&mut unit, &mut included)?;
        Ok(unit)
    }

    /// Imported definitions are appended to the importing unit; builtin
    /// modules without a library file are satisfied natively.
    fn resolve_imports(
        &self,
        unit: &mut CompilationUnit,
        included: &mut HashSet<String>,
    ) -> Result<(), CompileError> {
        let imports = unit.imports.clone();
        for import in imports {
            if !included.insert(import.module.clone()) {
                continue;
            }
            let relative = import.module.replace('.', "/") + ".dcs";
            let found = self
                .libdirs
                .iter()
                .map(|dir| dir.join(&relative))
                .find(|candidate| candidate.is_file());

            let Some(found) = found else {
                if BUILTIN_MODULES.contains(&import.module.as_str()) {
                    log::debug!("import '{}' resolved natively", import.module);
                    continue;
                }
                log::warn!("import '{}' not found in library paths", import.module);
                continue;
            };

            let code = std::fs::read_to_string(&found).map_err(CompileError::Io)?;
            let mut imported = parser::parse(&code, Some(&found.display().to_string()))?;
            self.resolve_imports(&mut imported, included)?;
            unit.functions.extend(imported.functions);
            unit.constants.extend(imported.constants);
            unit.classes.extend(imported.classes);
            unit.cast_funcs.extend(imported.cast_funcs);
        }
        Ok(())
    }

    /// Run the two semantic phases over a parsed unit.
    pub fn analyze(
        &self,
        unit: &mut CompilationUnit,
    ) -> Result<SemanticContext, CompileError> {
        let scopes = semantics::analyze_forward(unit)?;
        let ctx = semantics::analyze(unit, scopes)?;
        Ok(ctx)
    }

    /// Full pipeline down to the IR module.
    pub fn compile(&self, code: &str, path: &str) -> Result<Module, CompileError> {
        let mut unit = self.parse(code, path)?;
        let ctx = self.analyze(&mut unit)?;
        let module = codegen::emit_module(&unit, &ctx, path)?;
        Ok(module)
    }

    pub fn dump_ast(&self, code: &str, path: &str) -> Result<String, CompileError> {
        let mut unit = self.parse(code, path)?;
        self.analyze(&mut unit)?;
        serde_json::to_string_pretty(&unit)
            .map_err(|e| CompileError::Codegen(CodegenError::internal(e.to_string())))
    }

    pub fn dump_scope_tree(&self, code: &str, path: &str) -> Result<String, CompileError> {
        let mut unit = self.parse(code, path)?;
        let ctx = self.analyze(&mut unit)?;

        let mut out = String::new();
        let tree = &ctx.scopes;
        writeln!(out, "global scope").unwrap();
        for class in &tree.global.classes {
            let class = tree.class(*class);
            writeln!(out, "  class '{}'", class.name).unwrap();
            for var in &class.instance_vars {
                let symbol = tree.symbol(*var);
                writeln!(
                    out,
                    "    instance var '{}' : {}",
                    symbol.name,
                    symbol
                        .typ
                        .as_ref()
                        .map(|t| t.to_string())
                        .unwrap_or_else(|| "?".to_string())
                )
                .unwrap();
            }
            for func in &class.member_funcs {
                let func = tree.func(*func);
                writeln!(out, "    member func '{}'", func.name).unwrap();
            }
        }
        for func_id in &tree.global.functions {
            let func = tree.func(*func_id);
            writeln!(out, "  func '{}'", func.name).unwrap();
            for param in &func.params {
                let symbol = tree.symbol(*param);
                writeln!(
                    out,
                    "    param '{}' : {}",
                    symbol.name,
                    symbol
                        .typ
                        .as_ref()
                        .map(|t| t.to_string())
                        .unwrap_or_else(|| "?".to_string())
                )
                .unwrap();
            }
        }
        for cast in &tree.global.cast_funcs {
            let func = tree.func(*cast);
            writeln!(
                out,
                "  cast func '{}' : {}",
                func.name,
                func.ret_type
                    .as_ref()
                    .map(|t| t.to_string())
                    .unwrap_or_else(|| "?".to_string())
            )
            .unwrap();
        }
        for symbol in &tree.global.const_symbols {
            let symbol = tree.symbol(*symbol);
            writeln!(
                out,
                "  const '{}' : {}",
                symbol.name,
                symbol
                    .typ
                    .as_ref()
                    .map(|t| t.to_string())
                    .unwrap_or_else(|| "?".to_string())
            )
            .unwrap();
        }
        Ok(out)
    }
}
