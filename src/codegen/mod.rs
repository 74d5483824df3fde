//! Lowering of the typed, scope-annotated AST to the low-level IR: type
//! lowering ([`type_emitter`]), the allocation contract ([`allocation`])
//! and the instruction emitter itself ([`emitter`]).
//!
//! Codegen errors are fatal at the first occurrence, unlike the batched
//! semantic errors.

pub mod allocation;
pub mod emitter;
pub mod type_emitter;

pub use emitter::emit_module;
pub use type_emitter::TypeIrEmitter;

use std::{error::Error, fmt::Display};

use crate::parser::ast::Location;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodegenError {
    Codegen {
        message: String,
        location: Location,
    },
    NotImplemented {
        feature: String,
    },
    Internal(String),
}

impl CodegenError {
    pub fn at(location: &Location, message: impl Into<String>) -> Self {
        CodegenError::Codegen {
            message: message.into(),
            location: location.clone(),
        }
    }

    pub fn not_implemented(feature: impl Into<String>) -> Self {
        CodegenError::NotImplemented {
            feature: feature.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        CodegenError::Internal(message.into())
    }
}

impl Display for CodegenError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CodegenError::Codegen { message, location } => {
                if location.empty() {
                    write!(f, "Error in code generation\n  {message}")
                } else {
                    write!(f, "Error in code generation at {location}\n  {message}")
                }
            }
            CodegenError::NotImplemented { feature } => {
                write!(f, "Not implemented yet: {feature}")
            }
            CodegenError::Internal(message) => {
                write!(f, "Internal compilation error: {message}")
            }
        }
    }
}

impl Error for CodegenError {}

pub type CodegenResult<T> = Result<T, CodegenError>;
