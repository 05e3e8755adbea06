//! Runtime values of the sandbox and the conversions between them.

use super::ast::FunctionDef;
use super::expect::Expectation;
use super::interpreter::Env;
use crate::variables::VariableScope;
use regex::Regex;
use serde_json::{Map, Number, Value};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

pub type ObjectMap = BTreeMap<String, JsValue>;

#[derive(Clone)]
pub enum JsValue {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Rc<RefCell<Vec<JsValue>>>),
    Object(Rc<RefCell<ObjectMap>>),
    Function(Rc<Closure>),
    Regex(Rc<JsRegex>),
    Expectation(Rc<Expectation>),
    Host(Host),
    /// A built-in method bound to its receiver
    Method(Rc<BoundMethod>),
}

/// A user function together with the scope it closes over.
pub struct Closure {
    pub def: Rc<FunctionDef>,
    pub env: Rc<Env>,
}

pub struct JsRegex {
    pub regex: Regex,
    pub source: String,
    pub flags: String,
}

impl JsRegex {
    /// Compiles a regex literal. Only the `i`, `m` and `s` flags change matching.
    pub fn new(source: &str, flags: &str) -> Result<Self, regex::Error> {
        let inline: String = flags.chars().filter(|f| matches!(f, 'i' | 'm' | 's')).collect();
        let pattern = if inline.is_empty() {
            source.to_string()
        } else {
            format!("(?{}){}", inline, source)
        };
        Ok(Self {
            regex: Regex::new(&pattern)?,
            source: source.to_string(),
            flags: flags.to_string(),
        })
    }

    pub fn is_global(&self) -> bool {
        self.flags.contains('g')
    }
}

pub struct BoundMethod {
    pub receiver: JsValue,
    pub name: String,
}

/// Objects provided by the host rather than created by the script.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Host {
    /// Receiver for global functions such as `parseInt`
    Global,
    Pm,
    Response,
    ResponseHeaders,
    Variables(VariableTarget),
    Json,
    Console,
    Object,
    Array,
    Math,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariableTarget {
    /// `pm.environment`, `pm.globals` or `pm.collectionVariables`
    Scope(VariableScope),
    /// `pm.variables`: reads resolve across scopes, writes go to the local scope
    Resolved,
}

impl JsValue {
    pub fn string(s: impl Into<String>) -> Self {
        JsValue::String(s.into())
    }

    pub fn array(items: Vec<JsValue>) -> Self {
        JsValue::Array(Rc::new(RefCell::new(items)))
    }

    pub fn object(map: ObjectMap) -> Self {
        JsValue::Object(Rc::new(RefCell::new(map)))
    }

    pub fn method(receiver: JsValue, name: &str) -> Self {
        JsValue::Method(Rc::new(BoundMethod {
            receiver,
            name: name.to_string(),
        }))
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, JsValue::Undefined | JsValue::Null)
    }

    pub fn is_callable(&self) -> bool {
        matches!(self, JsValue::Function(_) | JsValue::Method(_))
    }

    pub fn truthy(&self) -> bool {
        match self {
            JsValue::Undefined | JsValue::Null => false,
            JsValue::Bool(b) => *b,
            JsValue::Number(n) => *n != 0.0 && !n.is_nan(),
            JsValue::String(s) => !s.is_empty(),
            _ => true,
        }
    }

    pub fn type_of(&self) -> &'static str {
        match self {
            JsValue::Undefined => "undefined",
            JsValue::Bool(_) => "boolean",
            JsValue::Number(_) => "number",
            JsValue::String(_) => "string",
            JsValue::Function(_) | JsValue::Method(_) => "function",
            _ => "object",
        }
    }

    /// Finer-grained type name used by `a`/`an` assertions.
    pub fn type_name(&self) -> &'static str {
        match self {
            JsValue::Null => "null",
            JsValue::Array(_) => "array",
            JsValue::Regex(_) => "regexp",
            other => other.type_of(),
        }
    }

    pub fn to_number(&self) -> f64 {
        match self {
            JsValue::Undefined => f64::NAN,
            JsValue::Null => 0.0,
            JsValue::Bool(b) => f64::from(u8::from(*b)),
            JsValue::Number(n) => *n,
            JsValue::String(s) => string_to_number(s),
            JsValue::Array(items) => {
                let items = items.borrow();
                match items.as_slice() {
                    [] => 0.0,
                    [single] => single.to_number(),
                    _ => f64::NAN,
                }
            }
            _ => f64::NAN,
        }
    }

    /// The string conversion used by concatenation and `String(x)`.
    pub fn to_js_string(&self) -> String {
        match self {
            JsValue::Undefined => "undefined".to_string(),
            JsValue::Null => "null".to_string(),
            JsValue::Bool(b) => b.to_string(),
            JsValue::Number(n) => number_to_string(*n),
            JsValue::String(s) => s.clone(),
            JsValue::Array(items) => items
                .borrow()
                .iter()
                .map(|item| {
                    if item.is_nullish() {
                        String::new()
                    } else {
                        item.to_js_string()
                    }
                })
                .collect::<Vec<_>>()
                .join(","),
            JsValue::Object(map) => match (map.borrow().get("name"), map.borrow().get("message")) {
                (Some(JsValue::String(name)), Some(JsValue::String(message))) => {
                    format!("{}: {}", name, message)
                }
                _ => "[object Object]".to_string(),
            },
            JsValue::Regex(r) => format!("/{}/{}", r.source, r.flags),
            JsValue::Function(_) | JsValue::Method(_) => "function () { [native code] }".to_string(),
            JsValue::Expectation(_) | JsValue::Host(_) => "[object Object]".to_string(),
        }
    }

    /// Representation used in assertion messages: strings are quoted.
    pub fn inspect(&self) -> String {
        match self {
            JsValue::String(s) => format!("'{}'", s),
            JsValue::Array(_) | JsValue::Object(_) => match self.to_json() {
                Some(json) => json.to_string(),
                None => self.to_js_string(),
            },
            JsValue::Function(_) | JsValue::Method(_) => "[Function]".to_string(),
            JsValue::Host(Host::Response) => "response".to_string(),
            other => other.to_js_string(),
        }
    }

    /// Converts to JSON. `None` for values `JSON.stringify` omits.
    pub fn to_json(&self) -> Option<Value> {
        match self {
            JsValue::Undefined
            | JsValue::Function(_)
            | JsValue::Method(_)
            | JsValue::Expectation(_)
            | JsValue::Host(_) => None,
            JsValue::Null => Some(Value::Null),
            JsValue::Bool(b) => Some(Value::Bool(*b)),
            JsValue::Number(n) => Some(number_to_json(*n)),
            JsValue::String(s) => Some(Value::String(s.clone())),
            JsValue::Array(items) => Some(Value::Array(
                items
                    .borrow()
                    .iter()
                    .map(|item| item.to_json().unwrap_or(Value::Null))
                    .collect(),
            )),
            JsValue::Object(map) => {
                let mut object = Map::new();
                for (key, item) in map.borrow().iter() {
                    if let Some(json) = item.to_json() {
                        object.insert(key.clone(), json);
                    }
                }
                Some(Value::Object(object))
            }
            JsValue::Regex(_) => Some(Value::Object(Map::new())),
        }
    }

    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => JsValue::Null,
            Value::Bool(b) => JsValue::Bool(*b),
            Value::Number(n) => JsValue::Number(n.as_f64().unwrap_or(f64::NAN)),
            Value::String(s) => JsValue::String(s.clone()),
            Value::Array(items) => JsValue::array(items.iter().map(JsValue::from_json).collect()),
            Value::Object(map) => JsValue::object(
                map.iter()
                    .map(|(k, v)| (k.clone(), JsValue::from_json(v)))
                    .collect(),
            ),
        }
    }
}

impl fmt::Debug for JsValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JsValue::Host(host) => write!(f, "Host({:?})", host),
            JsValue::Method(m) => write!(f, "Method({})", m.name),
            other => f.write_str(&other.inspect()),
        }
    }
}

/// `===`
pub fn strict_equals(a: &JsValue, b: &JsValue) -> bool {
    match (a, b) {
        (JsValue::Undefined, JsValue::Undefined) | (JsValue::Null, JsValue::Null) => true,
        (JsValue::Bool(x), JsValue::Bool(y)) => x == y,
        (JsValue::Number(x), JsValue::Number(y)) => x == y,
        (JsValue::String(x), JsValue::String(y)) => x == y,
        (JsValue::Array(x), JsValue::Array(y)) => Rc::ptr_eq(x, y),
        (JsValue::Object(x), JsValue::Object(y)) => Rc::ptr_eq(x, y),
        (JsValue::Function(x), JsValue::Function(y)) => Rc::ptr_eq(x, y),
        (JsValue::Regex(x), JsValue::Regex(y)) => Rc::ptr_eq(x, y),
        (JsValue::Host(x), JsValue::Host(y)) => x == y,
        _ => false,
    }
}

/// `==`
pub fn loose_equals(a: &JsValue, b: &JsValue) -> bool {
    match (a, b) {
        (x, y) if x.is_nullish() && y.is_nullish() => true,
        (x, y) if x.is_nullish() || y.is_nullish() => false,
        (JsValue::Number(_), JsValue::String(_))
        | (JsValue::String(_), JsValue::Number(_))
        | (JsValue::Bool(_), _)
        | (_, JsValue::Bool(_)) => a.to_number() == b.to_number(),
        (JsValue::Array(_) | JsValue::Object(_), JsValue::String(_) | JsValue::Number(_))
        | (JsValue::String(_) | JsValue::Number(_), JsValue::Array(_) | JsValue::Object(_)) => {
            a.to_js_string() == b.to_js_string()
        }
        _ => strict_equals(a, b),
    }
}

/// Structural equality used by `eql` and `deep` assertions.
pub fn deep_equals(a: &JsValue, b: &JsValue) -> bool {
    match (a, b) {
        (JsValue::Number(x), JsValue::Number(y)) => x == y || (x.is_nan() && y.is_nan()),
        (JsValue::Array(x), JsValue::Array(y)) => {
            let (x, y) = (x.borrow(), y.borrow());
            x.len() == y.len() && x.iter().zip(y.iter()).all(|(p, q)| deep_equals(p, q))
        }
        (JsValue::Object(x), JsValue::Object(y)) => {
            let (x, y) = (x.borrow(), y.borrow());
            x.len() == y.len()
                && x
                    .iter()
                    .all(|(k, v)| y.get(k).map_or(false, |other| deep_equals(v, other)))
        }
        (JsValue::Regex(x), JsValue::Regex(y)) => x.source == y.source && x.flags == y.flags,
        _ => strict_equals(a, b),
    }
}

/// Formats a number the way JavaScript prints it in common cases.
pub fn number_to_string(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        let text = if n > 0.0 { "Infinity" } else { "-Infinity" };
        text.to_string()
    } else if n == 0.0 {
        "0".to_string()
    } else if n.fract() == 0.0 && n.abs() < 1e21 {
        format!("{:.0}", n)
    } else {
        format!("{}", n)
    }
}

fn number_to_json(n: f64) -> Value {
    if !n.is_finite() {
        return Value::Null;
    }
    if n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
        return Value::Number(Number::from(n as i64));
    }
    Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null)
}

fn string_to_number(s: &str) -> f64 {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return 0.0;
    }
    if let Some(hex) = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        return i64::from_str_radix(hex, 16).map_or(f64::NAN, |v| v as f64);
    }
    match trimmed {
        "Infinity" | "+Infinity" => f64::INFINITY,
        "-Infinity" => f64::NEG_INFINITY,
        _ if trimmed.chars().any(|c| c.is_ascii_alphabetic() && c != 'e' && c != 'E') => f64::NAN,
        _ => trimmed.parse().unwrap_or(f64::NAN),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_truthiness() {
        assert!(!JsValue::Undefined.truthy());
        assert!(!JsValue::Number(0.0).truthy());
        assert!(!JsValue::Number(f64::NAN).truthy());
        assert!(!JsValue::string("").truthy());
        assert!(JsValue::string("0").truthy());
        assert!(JsValue::array(vec![]).truthy());
    }

    #[test]
    fn test_number_formatting() {
        assert_eq!(number_to_string(200.0), "200");
        assert_eq!(number_to_string(-0.0), "0");
        assert_eq!(number_to_string(1.5), "1.5");
        assert_eq!(number_to_string(f64::NAN), "NaN");
        assert_eq!(number_to_string(f64::NEG_INFINITY), "-Infinity");
    }

    #[test]
    fn test_string_to_number() {
        assert_eq!(JsValue::string(" 42 ").to_number(), 42.0);
        assert_eq!(JsValue::string("").to_number(), 0.0);
        assert_eq!(JsValue::string("0x10").to_number(), 16.0);
        assert!(JsValue::string("12px").to_number().is_nan());
        assert!(JsValue::string("inf").to_number().is_nan());
    }

    #[test]
    fn test_equality_flavours() {
        let one = JsValue::Number(1.0);
        let one_str = JsValue::string("1");
        assert!(!strict_equals(&one, &one_str));
        assert!(loose_equals(&one, &one_str));
        assert!(loose_equals(&JsValue::Null, &JsValue::Undefined));
        assert!(!loose_equals(&JsValue::Null, &JsValue::Number(0.0)));

        let a = JsValue::from_json(&json!({"x": [1, {"y": 2}]}));
        let b = JsValue::from_json(&json!({"x": [1, {"y": 2}]}));
        assert!(!strict_equals(&a, &b));
        assert!(deep_equals(&a, &b));
        assert!(!deep_equals(&a, &JsValue::from_json(&json!({"x": [1]}))));
    }

    #[test]
    fn test_json_round_trip_keeps_integers() {
        let value = JsValue::from_json(&json!({"id": 7, "ratio": 0.5, "tags": ["a"]}));
        assert_eq!(
            value.to_json().unwrap(),
            json!({"id": 7, "ratio": 0.5, "tags": ["a"]})
        );
    }

    #[test]
    fn test_to_json_skips_undefined_members() {
        let mut map = ObjectMap::new();
        map.insert("kept".to_string(), JsValue::Bool(true));
        map.insert("dropped".to_string(), JsValue::Undefined);
        let object = JsValue::object(map);
        assert_eq!(object.to_json().unwrap(), json!({"kept": true}));
        assert_eq!(
            JsValue::array(vec![JsValue::Undefined]).to_json().unwrap(),
            json!([null])
        );
    }

    #[test]
    fn test_js_string_conversion() {
        let items = JsValue::array(vec![JsValue::Number(1.0), JsValue::Null, JsValue::string("x")]);
        assert_eq!(items.to_js_string(), "1,,x");
        assert_eq!(JsValue::object(ObjectMap::new()).to_js_string(), "[object Object]");
        assert_eq!(JsValue::string("a").inspect(), "'a'");
    }

    #[test]
    fn test_regex_flags() {
        let regex = JsRegex::new("^abc$", "gi").unwrap();
        assert!(regex.regex.is_match("ABC"));
        assert!(regex.is_global());
    }
}
