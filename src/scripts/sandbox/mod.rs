//! Postman-compatible scripting for test scripts.
//!
//! Scripts are parsed into an AST and evaluated by a small interpreter that
//! only exposes the `pm` API and a handful of standard globals. Nothing in
//! a script can reach the file system, the network or the process.

pub mod ast;
pub mod expect;
pub mod interpreter;
pub mod lexer;
pub mod parser;
pub mod value;

use crate::models::{ProcessedResponse, TestResult};
use crate::variables::VariableStore;
use interpreter::Interpreter;
use thiserror::Error;

/// Name of the result reported when a script fails outside of `pm.test`.
pub const SCRIPT_ERROR_NAME: &str = "Script error";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("SyntaxError: {message} (line {line})")]
pub struct SyntaxError {
    pub message: String,
    pub line: usize,
}

/// Runs a sandbox script against a response.
///
/// Each `pm.test` call yields one result. A script that does not parse
/// yields a single failed [`SCRIPT_ERROR_NAME`] result.
pub fn run_sandbox(
    script: &str,
    response: &ProcessedResponse,
    store: &mut VariableStore,
) -> Vec<TestResult> {
    let program = match parser::parse_program(script) {
        Ok(program) => program,
        Err(e) => {
            log::warn!("Test script did not parse: {}", e);
            return vec![TestResult::fail(SCRIPT_ERROR_NAME, e.to_string())];
        }
    };

    log::debug!("Running sandbox script with {} statements", program.len());
    Interpreter::new(response, store).run(&program)
}
