//! Chai-style expectations behind `pm.expect` and `pm.response.to`.
//!
//! An [`Expectation`] is an immutable value: chain words return it unchanged,
//! `not` and `deep` return a copy with the flag set, property assertions run
//! on access and matcher methods run when called.

use super::value::{deep_equals, strict_equals, JsRegex, JsValue};
use crate::models::ProcessedResponse;
use std::rc::Rc;
use thiserror::Error;

/// Words that only make an assertion read better.
const CHAIN_WORDS: &[&str] = &[
    "to", "be", "been", "is", "that", "which", "and", "has", "have", "with", "at", "of", "same",
    "does", "but", "still", "also", "itself", "all", "any", "own", "nested",
];

/// Matchers that are called with arguments.
const METHODS: &[&str] = &[
    "equal",
    "equals",
    "eq",
    "eql",
    "eqls",
    "above",
    "gt",
    "greaterThan",
    "below",
    "lt",
    "lessThan",
    "least",
    "gte",
    "most",
    "lte",
    "within",
    "include",
    "includes",
    "contain",
    "contains",
    "match",
    "matches",
    "property",
    "length",
    "lengthOf",
    "a",
    "an",
    "oneOf",
    "status",
    "header",
    "body",
    "keys",
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct AssertionError(pub String);

/// What an expectation asserts on.
#[derive(Debug, Clone)]
pub enum Subject {
    Value(JsValue),
    Response,
}

#[derive(Debug, Clone)]
pub struct Expectation {
    pub subject: Subject,
    pub negate: bool,
    pub deep: bool,
}

/// Result of reading a property of an expectation.
pub enum Member {
    Value(JsValue),
    /// The name is neither a chain word nor an assertion
    Unknown,
}

type Outcome = Result<JsValue, AssertionError>;

impl Expectation {
    pub fn new(subject: JsValue) -> Self {
        let subject = match subject {
            JsValue::Host(super::value::Host::Response) => Subject::Response,
            other => Subject::Value(other),
        };
        Self {
            subject,
            negate: false,
            deep: false,
        }
    }

    pub fn for_response() -> Self {
        Self {
            subject: Subject::Response,
            negate: false,
            deep: false,
        }
    }

    fn into_value(self) -> JsValue {
        JsValue::Expectation(Rc::new(self))
    }

    fn describe(&self) -> String {
        match &self.subject {
            Subject::Value(v) => v.inspect(),
            Subject::Response => "response".to_string(),
        }
    }

    /// Passes when `pass` differs from the negation flag.
    fn check(&self, pass: bool, verb: impl AsRef<str>) -> Result<(), AssertionError> {
        if pass != self.negate {
            Ok(())
        } else {
            Err(AssertionError(format!(
                "expected {} to {}{}",
                self.describe(),
                if self.negate { "not " } else { "" },
                verb.as_ref()
            )))
        }
    }

    fn value(&self) -> Result<&JsValue, AssertionError> {
        match &self.subject {
            Subject::Value(v) => Ok(v),
            Subject::Response => Err(AssertionError(
                "this assertion cannot be used on the response".to_string(),
            )),
        }
    }

    /// Reads a property: chain words, flags and property-style assertions.
    pub fn member(&self, name: &str, response: &ProcessedResponse) -> Result<Member, AssertionError> {
        if CHAIN_WORDS.contains(&name) {
            return Ok(Member::Value(self.clone().into_value()));
        }
        if METHODS.contains(&name) {
            return Ok(Member::Value(JsValue::method(
                self.clone().into_value(),
                name,
            )));
        }

        match name {
            "not" => {
                let mut negated = self.clone();
                negated.negate = !self.negate;
                return Ok(Member::Value(negated.into_value()));
            }
            "deep" => {
                let mut deep = self.clone();
                deep.deep = true;
                return Ok(Member::Value(deep.into_value()));
            }
            _ => {}
        }

        match &self.subject {
            Subject::Response => self.response_property(name, response)?,
            Subject::Value(value) => match name {
                "ok" => self.check(value.truthy(), "be truthy")?,
                "true" => self.check(strict_equals(value, &JsValue::Bool(true)), "be true")?,
                "false" => self.check(strict_equals(value, &JsValue::Bool(false)), "be false")?,
                "null" => self.check(matches!(value, JsValue::Null), "be null")?,
                "undefined" => self.check(matches!(value, JsValue::Undefined), "be undefined")?,
                "exist" => self.check(!value.is_nullish(), "exist")?,
                "NaN" => self.check(
                    matches!(value, JsValue::Number(n) if n.is_nan()),
                    "be NaN",
                )?,
                "empty" => {
                    let empty = match value {
                        JsValue::String(s) => s.is_empty(),
                        JsValue::Array(items) => items.borrow().is_empty(),
                        JsValue::Object(map) => map.borrow().is_empty(),
                        other => {
                            return Err(AssertionError(format!(
                                ".empty was passed non-string primitive {}",
                                other.inspect()
                            )))
                        }
                    };
                    self.check(empty, "be empty")?
                }
                _ => return Ok(Member::Unknown),
            },
        }
        Ok(Member::Value(self.clone().into_value()))
    }

    fn response_property(&self, name: &str, response: &ProcessedResponse) -> Result<(), AssertionError> {
        let status = response.status;
        let check_status = |pass: bool, what: &str| {
            self.check(pass, format!("{} but got {}", what, status))
        };
        match name {
            "ok" | "success" | "successful" => {
                check_status(response.is_success(), "have a 2xx status code")
            }
            "info" => check_status((100..200).contains(&status), "have a 1xx status code"),
            "redirection" => check_status(response.is_redirect(), "have a 3xx status code"),
            "clientError" => check_status(response.is_client_error(), "have a 4xx status code"),
            "serverError" => check_status(response.is_server_error(), "have a 5xx status code"),
            "error" => check_status(
                response.is_client_error() || response.is_server_error(),
                "have a 4xx or 5xx status code",
            ),
            "accepted" => check_status(status == 202, "have status code 202"),
            "badRequest" => check_status(status == 400, "have status code 400"),
            "unauthorized" | "unauthorised" => check_status(status == 401, "have status code 401"),
            "forbidden" => check_status(status == 403, "have status code 403"),
            "notFound" => check_status(status == 404, "have status code 404"),
            "rateLimited" => check_status(status == 429, "have status code 429"),
            "json" => self.check(
                response
                    .content_type()
                    .map_or(false, |ct| ct.to_ascii_lowercase().contains("json"))
                    && !matches!(response.body, serde_json::Value::String(_)),
                "have a valid JSON body",
            ),
            "empty" => self.check(response.body_text.is_empty(), "have an empty body"),
            _ => Err(AssertionError(format!(
                "Invalid response assertion: {}",
                name
            ))),
        }
    }

    /// Runs a matcher method.
    pub fn call(&self, name: &str, args: &[JsValue], response: &ProcessedResponse) -> Outcome {
        let arg = args.first().cloned().unwrap_or(JsValue::Undefined);

        if let Subject::Response = self.subject {
            return self.call_on_response(name, args, &arg, response);
        }

        let value = self.value()?;
        match name {
            "equal" | "equals" | "eq" => {
                if self.deep {
                    self.check(deep_equals(value, &arg), format!("deeply equal {}", arg.inspect()))?
                } else {
                    self.check(strict_equals(value, &arg), format!("equal {}", arg.inspect()))?
                }
            }
            "eql" | "eqls" => {
                self.check(deep_equals(value, &arg), format!("deeply equal {}", arg.inspect()))?
            }
            "above" | "gt" | "greaterThan" => {
                let (actual, bound) = numbers(value, &arg)?;
                self.check(actual > bound, format!("be above {}", arg.inspect()))?
            }
            "below" | "lt" | "lessThan" => {
                let (actual, bound) = numbers(value, &arg)?;
                self.check(actual < bound, format!("be below {}", arg.inspect()))?
            }
            "least" | "gte" => {
                let (actual, bound) = numbers(value, &arg)?;
                self.check(actual >= bound, format!("be at least {}", arg.inspect()))?
            }
            "most" | "lte" => {
                let (actual, bound) = numbers(value, &arg)?;
                self.check(actual <= bound, format!("be at most {}", arg.inspect()))?
            }
            "within" => {
                let upper = args.get(1).cloned().unwrap_or(JsValue::Undefined);
                let (actual, low) = numbers(value, &arg)?;
                let (_, high) = numbers(value, &upper)?;
                self.check(
                    actual >= low && actual <= high,
                    format!("be within {}..{}", arg.inspect(), upper.inspect()),
                )?
            }
            "include" | "includes" | "contain" | "contains" => {
                let pass = self.includes(value, &arg)?;
                self.check(pass, format!("include {}", arg.inspect()))?
            }
            "match" | "matches" => {
                let regex = to_regex(&arg)?;
                self.check(
                    regex.regex.is_match(&value.to_js_string()),
                    format!("match /{}/{}", regex.source, regex.flags),
                )?
            }
            "property" => return self.property(value, &arg, args.get(1)),
            "length" | "lengthOf" => {
                let expected = arg.to_number();
                let actual = match value {
                    JsValue::String(s) => s.chars().count(),
                    JsValue::Array(items) => items.borrow().len(),
                    other => {
                        return Err(AssertionError(format!(
                            "expected {} to have a length",
                            other.inspect()
                        )))
                    }
                };
                self.check(
                    actual as f64 == expected,
                    format!(
                        "have a length of {} but got {}",
                        arg.to_js_string(),
                        actual
                    ),
                )?
            }
            "a" | "an" => {
                let expected = arg.to_js_string().to_ascii_lowercase();
                let article = if name == "an" { "an" } else { "a" };
                self.check(
                    value.type_name() == expected,
                    format!("be {} {}", article, expected),
                )?
            }
            "oneOf" => {
                let pass = match &arg {
                    JsValue::Array(items) => items.borrow().iter().any(|item| self.same(value, item)),
                    other => {
                        return Err(AssertionError(format!(
                            "oneOf expects an array but got {}",
                            other.inspect()
                        )))
                    }
                };
                self.check(pass, format!("be one of {}", arg.inspect()))?
            }
            "keys" => {
                let wanted = key_list(args);
                let pass = match value {
                    JsValue::Object(map) => {
                        let map = map.borrow();
                        wanted.iter().all(|k| map.contains_key(k))
                    }
                    _ => false,
                };
                self.check(pass, format!("have keys {}", wanted.join(", ")))?
            }
            "status" | "header" | "body" => {
                return Err(AssertionError(format!(
                    "expected {} to be a response",
                    value.inspect()
                )))
            }
            other => {
                return Err(AssertionError(format!("Invalid assertion: {}", other)));
            }
        }
        Ok(self.clone().into_value())
    }

    fn call_on_response(
        &self,
        name: &str,
        args: &[JsValue],
        arg: &JsValue,
        response: &ProcessedResponse,
    ) -> Outcome {
        match name {
            "status" => match arg {
                JsValue::String(text) => self.check(
                    response.status_text == *text,
                    format!("have status reason '{}' but got '{}'", text, response.status_text),
                )?,
                other => {
                    let code = other.to_number();
                    self.check(
                        f64::from(response.status) == code,
                        format!(
                            "have status code {} but got {}",
                            other.to_js_string(),
                            response.status
                        ),
                    )?
                }
            },
            "header" => {
                let header = arg.to_js_string();
                match (response.header(&header), args.get(1)) {
                    (Some(actual), Some(expected)) => {
                        let expected = expected.to_js_string();
                        self.check(
                            actual == expected,
                            format!("have header '{}' with value '{}'", header, expected),
                        )?
                    }
                    (found, _) => {
                        self.check(found.is_some(), format!("have header '{}'", header))?
                    }
                }
            }
            "body" => match arg {
                JsValue::Undefined => self.check(!response.body_text.is_empty(), "have a body")?,
                JsValue::String(text) => self.check(
                    response.body_text == *text,
                    format!("have body '{}'", text),
                )?,
                other => {
                    let body = JsValue::from_json(&response.body);
                    self.check(
                        deep_equals(&body, other),
                        format!("have body {}", other.inspect()),
                    )?
                }
            },
            "property" => {
                let body = JsValue::from_json(&response.body);
                return self.property(&body, arg, args.get(1));
            }
            "include" | "includes" | "contain" | "contains" => {
                let needle = arg.to_js_string();
                self.check(
                    response.body_text.contains(&needle),
                    format!("include '{}'", needle),
                )?
            }
            "match" | "matches" => {
                let regex = to_regex(arg)?;
                self.check(
                    regex.regex.is_match(&response.body_text),
                    format!("match /{}/{}", regex.source, regex.flags),
                )?
            }
            other => {
                return Err(AssertionError(format!(
                    "Invalid response assertion: {}",
                    other
                )))
            }
        }
        Ok(self.clone().into_value())
    }

    /// `property(name[, value])`. On success the property value becomes the subject.
    fn property(&self, target: &JsValue, name: &JsValue, expected: Option<&JsValue>) -> Outcome {
        let key = name.to_js_string();
        let found = match target {
            JsValue::Object(map) => map.borrow().get(&key).cloned(),
            JsValue::Array(items) => {
                let items = items.borrow();
                if key == "length" {
                    Some(JsValue::Number(items.len() as f64))
                } else {
                    key.parse::<usize>().ok().and_then(|i| items.get(i).cloned())
                }
            }
            JsValue::String(s) if key == "length" => Some(JsValue::Number(s.chars().count() as f64)),
            _ => None,
        };

        match expected {
            None => self.check(found.is_some(), format!("have property '{}'", key))?,
            Some(expected) => {
                let pass = found.as_ref().map_or(false, |v| self.same(v, expected));
                self.check(
                    pass,
                    format!("have property '{}' of {}", key, expected.inspect()),
                )?
            }
        }

        match found {
            Some(value) if !self.negate => Ok(Expectation {
                subject: Subject::Value(value),
                negate: false,
                deep: self.deep,
            }
            .into_value()),
            _ => Ok(self.clone().into_value()),
        }
    }

    fn same(&self, a: &JsValue, b: &JsValue) -> bool {
        if self.deep {
            deep_equals(a, b)
        } else {
            strict_equals(a, b)
        }
    }

    fn includes(&self, haystack: &JsValue, needle: &JsValue) -> Result<bool, AssertionError> {
        match haystack {
            JsValue::String(s) => Ok(s.contains(&needle.to_js_string())),
            JsValue::Array(items) => Ok(items
                .borrow()
                .iter()
                .any(|item| {
                    self.same(item, needle) || (!is_primitive(needle) && deep_equals(item, needle))
                })),
            JsValue::Object(map) => match needle {
                JsValue::Object(subset) => {
                    let map = map.borrow();
                    Ok(subset.borrow().iter().all(|(k, v)| {
                        map.get(k).map_or(false, |actual| self.same(actual, v))
                    }))
                }
                _ => Ok(map.borrow().contains_key(&needle.to_js_string())),
            },
            other => Err(AssertionError(format!(
                "object tested must be an array, an object, or a string, but {} given",
                other.type_name()
            ))),
        }
    }
}

fn is_primitive(value: &JsValue) -> bool {
    !matches!(value, JsValue::Array(_) | JsValue::Object(_))
}

fn numbers(actual: &JsValue, bound: &JsValue) -> Result<(f64, f64), AssertionError> {
    match (actual, bound) {
        (JsValue::Number(a), JsValue::Number(b)) => Ok((*a, *b)),
        (JsValue::Number(_), other) => Err(AssertionError(format!(
            "the comparison bound must be a number but got {}",
            other.inspect()
        ))),
        (other, _) => Err(AssertionError(format!(
            "expected {} to be a number",
            other.inspect()
        ))),
    }
}

fn to_regex(value: &JsValue) -> Result<Rc<JsRegex>, AssertionError> {
    match value {
        JsValue::Regex(regex) => Ok(regex.clone()),
        other => JsRegex::new(&regex::escape(&other.to_js_string()), "")
            .map(Rc::new)
            .map_err(|e| AssertionError(e.to_string())),
    }
}

fn key_list(args: &[JsValue]) -> Vec<String> {
    match args {
        [JsValue::Array(items)] => items.borrow().iter().map(JsValue::to_js_string).collect(),
        _ => args.iter().map(JsValue::to_js_string).collect(),
    }
}
