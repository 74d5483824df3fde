//! AST node definitions for the Dachs language.
//!
//! The tree is a tagged sum with two polymorphic expression-like groups
//! ([`Expression`] and [`TypeName`]) and a flat [`Statement`] variant. Every
//! node carries a globally monotonically increasing 64-bit [`NodeId`] and a
//! [`Location`]. Scope back-references live in the semantic side tables
//! keyed by node id, never inside the tree, so the AST owns its children
//! without cycles.

mod expression;
mod statement;
mod type_name;

pub use expression::*;
pub use statement::*;
pub use type_name::*;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct NodeId(pub u64);

static NODE_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Mint a fresh node id. The counter is the only process-wide state of the
/// compiler.
pub fn generate_id() -> NodeId {
    NodeId(NODE_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
}

/// Source extent of a node: `{line, col, length, path}`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Location {
    pub line: usize,
    pub col: usize,
    pub length: usize,
    pub path: Option<String>,
}

impl Location {
    pub fn empty(&self) -> bool {
        self.line == 0 && self.col == 0 && self.length == 0 && self.path.is_none()
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line:{}, col:{}", self.line, self.col)?;
        if let Some(path) = &self.path {
            write!(f, ", {path}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IfKind {
    If,
    Unless,
    Case,
}

impl IfKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IfKind::If => "if",
            IfKind::Unless => "unless",
            IfKind::Case => "case",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FuncKind {
    Func,
    Proc,
}

/// Root of one compilation unit: ordered vectors of top-level definitions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompilationUnit {
    pub id: NodeId,
    pub location: Location,
    pub functions: Vec<FunctionDef>,
    pub constants: Vec<InitializeStmt>,
    pub classes: Vec<ClassDef>,
    pub imports: Vec<Import>,
    pub cast_funcs: Vec<FunctionDef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Import {
    pub id: NodeId,
    pub location: Location,
    pub module: String,
}
