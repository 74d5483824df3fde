//! Semantic diagnostics.
//!
//! Semantic errors are batched: each one is printed as it is found and a
//! counter accumulates; when a phase finishes with a nonzero count it fails
//! with a [`SemanticCheckError`] naming the phase. Warnings (shadowing) are
//! printed but never fail the phase.

use std::{error::Error, fmt::Display};

use colored::Colorize;

use crate::parser::ast::Location;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SemanticCheckError {
    pub count: usize,
    pub phase: String,
}

impl Display for SemanticCheckError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} semantic error(s) generated in {}",
            self.count, self.phase
        )
    }
}

impl Error for SemanticCheckError {}

/// Collects diagnostics for one phase and prints them as they occur.
#[derive(Debug, Default)]
pub struct DiagnosticSink {
    pub failed: usize,
    pub messages: Vec<String>,
}

impl DiagnosticSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn error(&mut self, location: &Location, message: impl Display) {
        let rendered = if location.empty() {
            format!("{}\n  {message}", "Error".red())
        } else {
            format!("{} at {location}\n  {message}", "Error".red())
        };
        log::debug!("semantic error: {message}");
        eprintln!("{rendered}\n");
        self.messages.push(rendered);
        self.failed += 1;
    }

    pub fn warning(&mut self, location: &Location, message: impl Display) {
        let rendered = if location.empty() {
            format!("{}\n  {message}", "Warning".yellow())
        } else {
            format!("{} at {location}\n  {message}", "Warning".yellow())
        };
        log::warn!("{message}");
        eprintln!("{rendered}\n");
        self.messages.push(rendered);
    }

    /// Fail the phase if any error was recorded.
    pub fn into_result(self, phase: &str) -> Result<(), SemanticCheckError> {
        if self.failed > 0 {
            Err(SemanticCheckError {
                count: self.failed,
                phase: phase.to_string(),
            })
        } else {
            Ok(())
        }
    }
}
