//! Embedded request scripts.
//!
//! Every request carries two scripts:
//!
//! - a **pre-request** script ([`pre_request`]) that mutates the working copy
//!   of the request before it is built, and
//! - a **test** script that asserts on the response. A test script is either a
//!   list of line commands ([`assertions`]) or, when it mentions `pm.`, a
//!   program for the [`sandbox`].
//!
//! Line-oriented scripts share one grammar: one command per line, the command
//! being the text before the first space and the rest of the line its raw
//! argument. Blank lines and lines starting with `//` are ignored.

pub mod assertions;
pub mod pre_request;
pub mod sandbox;

use crate::models::{ProcessedResponse, TestResult};
use crate::variables::VariableStore;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::fmt;
use thiserror::Error;

pub use assertions::run_test_commands;
pub use pre_request::{run_pre_request_script, PreRequestOutcome};
pub use sandbox::run_sandbox;

/// A `pm.` token that is not the tail of a longer identifier.
static PM_TOKEN_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:^|[^A-Za-z0-9_$])pm\.").expect("Failed to compile pm regex"));

/// Fatal script failures. These abort the send.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScriptError {
    #[error("Undefined variable '{variable}' on line {line}")]
    UndefinedVariable { variable: String, line: usize },
}

/// A non-fatal problem with a script line. The line is skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptWarning {
    /// 1-based line number in the script
    pub line: usize,
    /// The trimmed source line
    pub text: String,
    pub message: String,
}

impl fmt::Display for ScriptWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {} ({})", self.line, self.message, self.text)
    }
}

/// One command line of a line-oriented script.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScriptLine<'a> {
    /// 1-based line number
    pub number: usize,
    /// The whole line, trimmed
    pub text: &'a str,
    pub command: &'a str,
    /// Everything after the command and the whitespace that follows it
    pub args: &'a str,
}

impl<'a> ScriptLine<'a> {
    /// Splits the arguments into a first token and the raw remainder.
    ///
    /// Returns `None` unless both parts are non-empty.
    pub fn split_args(&self) -> Option<(&'a str, &'a str)> {
        let (first, rest) = self.args.split_once(char::is_whitespace)?;
        let rest = rest.trim_start();
        if first.is_empty() || rest.is_empty() {
            None
        } else {
            Some((first, rest))
        }
    }

    /// The single argument, or `None` when it is missing.
    pub fn single_arg(&self) -> Option<&'a str> {
        let arg = self.args.trim();
        if arg.is_empty() {
            None
        } else {
            Some(arg)
        }
    }
}

/// Iterates the command lines of a script, skipping blanks and comments.
pub fn script_lines(script: &str) -> impl Iterator<Item = ScriptLine<'_>> {
    script.lines().enumerate().filter_map(|(index, raw)| {
        let text = raw.trim();
        if text.is_empty() || text.starts_with("//") {
            return None;
        }
        let (command, args) = match text.split_once(char::is_whitespace) {
            Some((command, args)) => (command, args.trim_start()),
            None => (text, ""),
        };
        Some(ScriptLine {
            number: index + 1,
            text,
            command,
            args,
        })
    })
}

/// Whether a test script is meant for the `pm` sandbox.
pub fn uses_sandbox(script: &str) -> bool {
    PM_TOKEN_REGEX.is_match(script)
}

/// Runs a test script against a response with the interpreter it is written for.
///
/// Never fails: every problem is reported as a failed [`TestResult`].
pub fn run_test_script(
    script: &str,
    response: &ProcessedResponse,
    store: &mut VariableStore,
) -> Vec<TestResult> {
    if script.trim().is_empty() {
        return Vec::new();
    }
    if uses_sandbox(script) {
        run_sandbox(script, response, store)
    } else {
        run_test_commands(script, response, store)
    }
}

/// Follows a dot-separated path into a JSON value.
///
/// Numeric segments index into arrays. An empty path returns the value itself.
///
/// # Examples
///
/// ```
/// use rest_workbench::scripts::lookup_path;
/// use serde_json::json;
///
/// let body = json!({"data": {"items": [{"id": 7}]}});
/// assert_eq!(lookup_path(&body, "data.items.0.id"), Some(&json!(7)));
/// assert_eq!(lookup_path(&body, "data.missing"), None);
/// ```
pub fn lookup_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(value);
    }
    path.split('.').try_fold(value, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_script_lines_skip_blank_and_comments() {
        let script = "\n  // comment\nstatus 200\n\n   bodyContains  hello world  \n";
        let lines: Vec<_> = script_lines(script).collect();

        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].number, 3);
        assert_eq!(lines[0].command, "status");
        assert_eq!(lines[0].args, "200");
        assert_eq!(lines[1].text, "bodyContains  hello world");
        assert_eq!(lines[1].args, "hello world");
    }

    #[test]
    fn test_command_without_args() {
        let line = script_lines("headerExists").next().unwrap();
        assert_eq!(line.command, "headerExists");
        assert_eq!(line.args, "");
        assert_eq!(line.single_arg(), None);
    }

    #[test]
    fn test_split_args_keeps_remainder() {
        let line = script_lines("addHeader X-Note hello there").next().unwrap();
        assert_eq!(line.split_args(), Some(("X-Note", "hello there")));

        let line = script_lines("addHeader X-Note").next().unwrap();
        assert_eq!(line.split_args(), None);
    }

    #[test]
    fn test_tabs_separate_arguments() {
        let line = script_lines("addHeader\tX-A\tv").next().unwrap();
        assert_eq!(line.command, "addHeader");
        assert_eq!(line.split_args(), Some(("X-A", "v")));

        let line = script_lines("setVarFromHeader id \t X-Request-Id").next().unwrap();
        assert_eq!(line.split_args(), Some(("id", "X-Request-Id")));
    }

    #[test]
    fn test_uses_sandbox() {
        assert!(uses_sandbox("pm.test('x', () => {})"));
        assert!(uses_sandbox("const r = pm.response.json();"));
        assert!(!uses_sandbox("status 200\nbodyContains npm.js"));
        assert!(!uses_sandbox("bodyContains rpm.x"));
    }

    #[test]
    fn test_lookup_path() {
        let body = json!({"data": {"items": [1, 2, 3]}, "ok": true});
        assert_eq!(lookup_path(&body, "ok"), Some(&json!(true)));
        assert_eq!(lookup_path(&body, "data.items.1"), Some(&json!(2)));
        assert_eq!(lookup_path(&body, "data.items.9"), None);
        assert_eq!(lookup_path(&body, "ok.deeper"), None);
        assert_eq!(lookup_path(&body, ""), Some(&body));
    }
}
