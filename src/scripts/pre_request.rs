//! Pre-request command interpreter.
//!
//! | command            | arguments            | effect                          |
//! |--------------------|----------------------|---------------------------------|
//! | `setUrlWithVar`    | `<varName>`          | replaces the URL                |
//! | `addHeader`        | `<name> <value>`     | sets a header to a literal      |
//! | `addHeaderWithVar` | `<name> <varName>`   | sets a header from a variable   |
//! | `setBodyWithVar`   | `<varName>`          | replaces the body               |
//!
//! Commands run in source order against the working copy of the request. A
//! reference to an undefined variable stops the script with a
//! [`ScriptError`]; unknown commands and malformed lines only produce a
//! [`ScriptWarning`].

use super::{script_lines, ScriptError, ScriptLine, ScriptWarning};
use crate::models::{RequestBody, RequestDefinition};
use crate::variables::VariableStore;

/// What a pre-request script did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreRequestOutcome {
    pub warnings: Vec<ScriptWarning>,
    /// Number of commands applied to the request
    pub executed: usize,
}

/// Runs `script` against `request`.
///
/// # Arguments
/// * `script` - The pre-request script source
/// * `request` - The working copy to mutate
/// * `store` - Variables visible to the script
///
/// # Returns
/// The warnings raised by skipped lines, or the first fatal error.
///
/// # Examples
/// ```
/// use rest_workbench::models::{HttpMethod, RequestDefinition};
/// use rest_workbench::scripts::run_pre_request_script;
/// use rest_workbench::variables::VariableStore;
///
/// let mut request = RequestDefinition::new("r1", HttpMethod::GET, "http://localhost");
/// let outcome = run_pre_request_script("addHeader X-Test 123", &mut request, &VariableStore::new()).unwrap();
///
/// assert_eq!(outcome.executed, 1);
/// assert_eq!(request.headers["X-Test"], "123");
/// ```
pub fn run_pre_request_script(
    script: &str,
    request: &mut RequestDefinition,
    store: &VariableStore,
) -> Result<PreRequestOutcome, ScriptError> {
    let mut outcome = PreRequestOutcome::default();

    for line in script_lines(script) {
        match apply_command(&line, request, store)? {
            Ok(()) => outcome.executed += 1,
            Err(message) => {
                let warning = ScriptWarning {
                    line: line.number,
                    text: line.text.to_string(),
                    message,
                };
                log::warn!("Pre-request script skipped {}", warning);
                outcome.warnings.push(warning);
            }
        }
    }

    Ok(outcome)
}

/// Applies one command. The inner `Err` is a skip-with-warning message.
fn apply_command(
    line: &ScriptLine<'_>,
    request: &mut RequestDefinition,
    store: &VariableStore,
) -> Result<Result<(), String>, ScriptError> {
    match line.command {
        "setUrlWithVar" => {
            let Some(var_name) = line.single_arg() else {
                return Ok(Err(missing("variable name")));
            };
            request.url = require(store, var_name, line)?;
        }
        "addHeader" => {
            let Some((name, value)) = line.split_args() else {
                return Ok(Err(missing("header name and value")));
            };
            request.add_header(name, value);
        }
        "addHeaderWithVar" => {
            let Some((name, var_name)) = line.split_args() else {
                return Ok(Err(missing("header name and variable name")));
            };
            let value = require(store, var_name.trim(), line)?;
            request.add_header(name, value);
        }
        "setBodyWithVar" => {
            let Some(var_name) = line.single_arg() else {
                return Ok(Err(missing("variable name")));
            };
            request.body = Some(RequestBody::Text(require(store, var_name, line)?));
        }
        other => return Ok(Err(format!("Unknown command: {}", other))),
    }
    Ok(Ok(()))
}

fn require(store: &VariableStore, name: &str, line: &ScriptLine<'_>) -> Result<String, ScriptError> {
    store.get(name).ok_or_else(|| ScriptError::UndefinedVariable {
        variable: name.to_string(),
        line: line.number,
    })
}

fn missing(what: &str) -> String {
    format!("Missing {}", what)
}
