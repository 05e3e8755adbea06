//! Line-oriented test commands.
//!
//! Each line is an independent assertion; a failing or unknown line records a
//! failed [`TestResult`] and the next line still runs. The result name is the
//! trimmed source line.

use super::{lookup_path, script_lines, ScriptLine};
use crate::models::{ProcessedResponse, TestResult};
use crate::variables::{VariableScope, VariableStore};
use serde_json::Value;

/// Runs every command in `script` against `response`, in source order.
///
/// `setVarFromHeader` writes into the environment scope of `store` and always
/// passes; a missing header or a rejected write is only logged.
///
/// # Examples
/// ```
/// use rest_workbench::models::{HeaderMap, ProcessedResponse};
/// use rest_workbench::scripts::run_test_commands;
/// use rest_workbench::variables::VariableStore;
///
/// let response = ProcessedResponse {
///     status: 200,
///     status_text: "OK".to_string(),
///     headers: HeaderMap::new(),
///     body_text: "ok".to_string(),
///     body: serde_json::Value::String("ok".to_string()),
///     duration: 12,
///     size: 2,
/// };
///
/// let results = run_test_commands("status 200\nbodyContains ok", &response, &mut VariableStore::new());
/// assert!(results.iter().all(|r| r.passed));
/// ```
pub fn run_test_commands(
    script: &str,
    response: &ProcessedResponse,
    store: &mut VariableStore,
) -> Vec<TestResult> {
    script_lines(script)
        .map(|line| match run_command(&line, response, store) {
            Ok(()) => TestResult::pass(line.text),
            Err(message) => TestResult::fail(line.text, message),
        })
        .collect()
}

fn run_command(
    line: &ScriptLine<'_>,
    response: &ProcessedResponse,
    store: &mut VariableStore,
) -> Result<(), String> {
    match line.command {
        "status" => {
            let arg = line.single_arg().ok_or("Missing status code")?;
            let expected: u16 = arg
                .parse()
                .map_err(|_| format!("Invalid status code: {}", arg))?;
            if response.status == expected {
                Ok(())
            } else {
                Err(format!(
                    "Expected status {} but got {}",
                    expected, response.status
                ))
            }
        }
        "jsonHasProperty" => {
            let property = line.single_arg().ok_or("Missing property name")?;
            match &response.body {
                Value::Object(map) if map.contains_key(property) => Ok(()),
                Value::Object(_) => Err(format!(
                    "Property '{}' not found in response body",
                    property
                )),
                _ => Err("Response body is not a JSON object".to_string()),
            }
        }
        "jsonArrayLengthEquals" => {
            let (path, length) = line.split_args().ok_or("Missing path or length")?;
            let expected: usize = length
                .trim()
                .parse()
                .map_err(|_| format!("Invalid length: {}", length))?;
            match lookup_path(&response.body, path) {
                Some(Value::Array(items)) if items.len() == expected => Ok(()),
                Some(Value::Array(items)) => Err(format!(
                    "Expected array length {} at '{}' but got {}",
                    expected,
                    path,
                    items.len()
                )),
                Some(_) => Err(format!("Value at '{}' is not an array", path)),
                None => Err(format!("Path '{}' not found in response body", path)),
            }
        }
        "jsonValueEquals" => {
            let (path, raw) = line.split_args().ok_or("Missing path or value")?;
            let expected = coerce_expected(raw);
            match lookup_path(&response.body, path) {
                Some(actual) if strict_json_equals(actual, &expected) => Ok(()),
                Some(actual) => Err(format!(
                    "Expected {} at '{}' but got {}",
                    expected, path, actual
                )),
                None => Err(format!("Path '{}' not found in response body", path)),
            }
        }
        "bodyContains" => {
            let needle = line.single_arg().ok_or("Missing text")?;
            if response.body_text.contains(needle) {
                Ok(())
            } else {
                Err(format!("Response body does not contain '{}'", needle))
            }
        }
        "headerExists" => {
            let name = line.single_arg().ok_or("Missing header name")?;
            if response.headers.contains(name) {
                Ok(())
            } else {
                Err(format!("Header '{}' not found", name))
            }
        }
        "headerValueEquals" => {
            let (name, expected) = line.split_args().ok_or("Missing header name or value")?;
            match response.header(name) {
                Some(actual) if actual == expected => Ok(()),
                Some(actual) => Err(format!(
                    "Expected header '{}' to be '{}' but got '{}'",
                    name, expected, actual
                )),
                None => Err(format!("Header '{}' not found", name)),
            }
        }
        "setVarFromHeader" => {
            let (var_name, header) = line
                .split_args()
                .ok_or("Missing variable name or header name")?;
            let header = header.trim();
            match response.header(header) {
                Some(value) => {
                    if let Err(e) = store.set(VariableScope::Environment, var_name, value, "") {
                        log::warn!("setVarFromHeader could not write '{}': {}", var_name, e);
                    }
                }
                None => log::warn!(
                    "setVarFromHeader: header '{}' not found, '{}' left unchanged",
                    header,
                    var_name
                ),
            }
            Ok(())
        }
        other => Err(format!("Unknown command: {}", other)),
    }
}

/// A numeric-looking argument becomes a number, anything else stays a string.
fn coerce_expected(raw: &str) -> Value {
    let trimmed = raw.trim();
    let looks_numeric = trimmed
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '-' | '+' | '.' | 'e' | 'E'));
    match trimmed.parse::<f64>() {
        Ok(n) if looks_numeric && n.is_finite() => serde_json::Number::from_f64(n)
            .map(Value::Number)
            .unwrap_or_else(|| Value::String(raw.to_string())),
        _ => Value::String(raw.to_string()),
    }
}

/// Same type and same value; numbers compare by numeric value.
fn strict_json_equals(actual: &Value, expected: &Value) -> bool {
    match (actual, expected) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        (Value::String(a), Value::String(b)) => a == b,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::HeaderMap;
    use serde_json::json;

    fn response(status: u16, body: Value) -> ProcessedResponse {
        let body_text = match &body {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        let mut headers = HeaderMap::new();
        headers.append("Content-Type", "application/json");
        headers.append("X-Request-Id", "abc-123");
        ProcessedResponse {
            status,
            status_text: "OK".to_string(),
            headers,
            size: body_text.len(),
            body_text,
            body,
            duration: 5,
        }
    }

    fn run(script: &str, response: &ProcessedResponse) -> Vec<TestResult> {
        let mut store = VariableStore::new();
        store.set_active_environment(Some("dev".to_string()));
        run_test_commands(script, response, &mut store)
    }

    #[test]
    fn test_status_pass_and_fail() {
        let results = run("status 200", &response(200, json!({})));
        assert_eq!(results, vec![TestResult::pass("status 200")]);

        let results = run("status 200", &response(404, json!({})));
        assert!(!results[0].passed);
        let error = results[0].error.as_deref().unwrap();
        assert!(error.contains("200") && error.contains("404"));
    }

    #[test]
    fn test_results_in_source_order() {
        let resp = response(200, Value::String("all ok".to_string()));
        let results = run("status 200\nbodyContains ok", &resp);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].name, "status 200");
        assert_eq!(results[1].name, "bodyContains ok");
        assert!(results.iter().all(|r| r.passed));
    }

    #[test]
    fn test_failure_does_not_stop_later_lines() {
        let resp = response(500, json!({}));
        let results = run("status 200\nheaderExists x-request-id", &resp);
        assert!(!results[0].passed);
        assert!(results[1].passed);
    }

    #[test]
    fn test_json_array_length() {
        let resp = response(200, json!({"data": {"items": [1, 2, 3]}}));
        assert!(run("jsonArrayLengthEquals data.items 3", &resp)[0].passed);

        let failed = &run("jsonArrayLengthEquals data.items 2", &resp)[0];
        assert!(!failed.passed);
        assert!(failed.error.as_deref().unwrap().contains("got 3"));

        assert!(!run("jsonArrayLengthEquals data 1", &resp)[0].passed);
    }

    #[test]
    fn test_json_has_property_is_top_level() {
        let resp = response(200, json!({"id": 1, "nested": {"inner": true}}));
        assert!(run("jsonHasProperty id", &resp)[0].passed);
        assert!(!run("jsonHasProperty inner", &resp)[0].passed);
    }

    #[test]
    fn test_json_value_equals_coercion() {
        let resp = response(200, json!({"id": 42, "code": "42", "name": "Ada", "ratio": 0.5}));
        assert!(run("jsonValueEquals id 42", &resp)[0].passed);
        assert!(run("jsonValueEquals ratio 0.5", &resp)[0].passed);
        assert!(!run("jsonValueEquals code 42", &resp)[0].passed);
        assert!(run("jsonValueEquals name Ada", &resp)[0].passed);
    }

    #[test]
    fn test_json_value_equals_has_no_bool_coercion() {
        let resp = response(200, json!({"active": true}));
        assert!(!run("jsonValueEquals active true", &resp)[0].passed);
    }

    #[test]
    fn test_header_commands() {
        let resp = response(200, json!({}));
        assert!(run("headerExists content-type", &resp)[0].passed);
        assert!(run("headerValueEquals x-request-id abc-123", &resp)[0].passed);
        assert!(!run("headerValueEquals X-Request-Id other", &resp)[0].passed);
        assert!(!run("headerExists X-Missing", &resp)[0].passed);
    }

    #[test]
    fn test_set_var_from_header() {
        let resp = response(200, json!({}));
        let mut store = VariableStore::new();
        store.set_active_environment(Some("dev".to_string()));

        let results = run_test_commands("setVarFromHeader requestId X-Request-Id", &resp, &mut store);
        assert!(results[0].passed);
        assert_eq!(
            store.get_scoped(VariableScope::Environment, "requestId"),
            Some("abc-123".to_string())
        );

        let results = run_test_commands("setVarFromHeader other X-Absent", &resp, &mut store);
        assert!(results[0].passed);
        assert!(!store.contains("other"));
    }

    #[test]
    fn test_set_var_without_environment_still_passes() {
        let resp = response(200, json!({}));
        let mut store = VariableStore::new();
        let results = run_test_commands("setVarFromHeader id X-Request-Id", &resp, &mut store);
        assert!(results[0].passed);
        assert!(!store.contains("id"));
        assert!(store.pending_writes().is_empty());
    }

    #[test]
    fn test_unknown_command_is_failed_result() {
        let results = run("explode now\nstatus 200", &response(200, json!({})));
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].error.as_deref(), Some("Unknown command: explode"));
        assert!(results[1].passed);
    }

    #[test]
    fn test_malformed_lines_fail() {
        let resp = response(200, json!({}));
        assert!(!run("status", &resp)[0].passed);
        assert!(!run("status abc", &resp)[0].passed);
        assert!(!run("jsonArrayLengthEquals data", &resp)[0].passed);
    }
}
