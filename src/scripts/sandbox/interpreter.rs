//! Tree-walking evaluator for sandbox scripts.
//!
//! Scripts only reach the host through the objects exposed here (`pm`,
//! `JSON`, `console`, `Object`, `Array`, `Math` and a few global functions).

use super::ast::*;
use super::expect::{Expectation, Member};
use super::value::{
    loose_equals, number_to_string, strict_equals, Closure, Host, JsRegex, JsValue,
    ObjectMap, VariableTarget,
};
use super::SCRIPT_ERROR_NAME;
use crate::models::{ProcessedResponse, TestResult};
use crate::variables::{VariableScope, VariableStore};
use once_cell::sync::Lazy;
use regex::{NoExpand, Regex};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};

/// Nested user function calls allowed before the script is stopped.
const MAX_CALL_DEPTH: usize = 64;

static FLOAT_PREFIX_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[+-]?(Infinity|\d+\.?\d*(?:[eE][+-]?\d+)?|\.\d+(?:[eE][+-]?\d+)?)")
        .expect("Failed to compile float regex")
});

/// An error raised while a script runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeError {
    /// JavaScript error name, e.g. `TypeError`
    pub name: String,
    pub message: String,
}

impl RuntimeError {
    fn new(name: &str, message: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            message: message.into(),
        }
    }

    fn type_error(message: impl Into<String>) -> Self {
        Self::new("TypeError", message)
    }

    /// Wraps a value passed to `throw`.
    fn thrown(value: &JsValue) -> Self {
        if let JsValue::Object(map) = value {
            let map = map.borrow();
            if let Some(message) = map.get("message") {
                let name = map
                    .get("name")
                    .map(JsValue::to_js_string)
                    .unwrap_or_else(|| "Error".to_string());
                return Self::new(&name, message.to_js_string());
            }
        }
        Self::new("Error", value.to_js_string())
    }
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.message)
    }
}

/// Non-local exits.
enum Flow {
    Return(JsValue),
    Error(RuntimeError),
}

impl From<RuntimeError> for Flow {
    fn from(error: RuntimeError) -> Self {
        Flow::Error(error)
    }
}

type Eval<T> = Result<T, Flow>;

struct Binding {
    value: JsValue,
    mutable: bool,
}

/// A lexical scope.
pub struct Env {
    vars: RefCell<HashMap<String, Binding>>,
    parent: Option<Rc<Env>>,
}

impl Env {
    fn root() -> Rc<Self> {
        Rc::new(Self {
            vars: RefCell::new(HashMap::new()),
            parent: None,
        })
    }

    fn child(parent: &Rc<Env>) -> Rc<Self> {
        Rc::new(Self {
            vars: RefCell::new(HashMap::new()),
            parent: Some(parent.clone()),
        })
    }

    /// Drops every binding. Closures capture the scope that declares them,
    /// so this is what releases them.
    fn clear(&self) {
        let bindings = std::mem::take(&mut *self.vars.borrow_mut());
        drop(bindings);
    }

    fn declare(&self, name: &str, value: JsValue, mutable: bool) {
        self.vars
            .borrow_mut()
            .insert(name.to_string(), Binding { value, mutable });
    }

    fn lookup(&self, name: &str) -> Option<JsValue> {
        match self.vars.borrow().get(name) {
            Some(binding) => Some(binding.value.clone()),
            None => self.parent.as_ref().and_then(|p| p.lookup(name)),
        }
    }

    /// Assigns to the nearest binding. `Ok(false)` when no scope declares it.
    fn assign(&self, name: &str, value: JsValue) -> Result<bool, RuntimeError> {
        if let Some(binding) = self.vars.borrow_mut().get_mut(name) {
            if !binding.mutable {
                return Err(RuntimeError::type_error("Assignment to constant variable."));
            }
            binding.value = value;
            return Ok(true);
        }
        match &self.parent {
            Some(parent) => parent.assign(name, value),
            None => Ok(false),
        }
    }
}

/// Runs one parsed script against a response.
pub struct Interpreter<'a> {
    response: &'a ProcessedResponse,
    store: &'a mut VariableStore,
    results: Vec<TestResult>,
    globals: Rc<Env>,
    /// Every scope opened during the run
    scopes: Vec<Weak<Env>>,
    depth: usize,
}

impl<'a> Interpreter<'a> {
    pub fn new(response: &'a ProcessedResponse, store: &'a mut VariableStore) -> Self {
        Self {
            response,
            store,
            results: Vec::new(),
            globals: Env::root(),
            scopes: Vec::new(),
            depth: 0,
        }
    }

    /// Executes the program and returns the collected test results.
    ///
    /// An error outside `pm.test` stops the script and adds one failed
    /// result named [`SCRIPT_ERROR_NAME`].
    pub fn run(mut self, program: &[Stmt]) -> Vec<TestResult> {
        let globals = self.globals.clone();
        if let Err(Flow::Error(error)) = self.exec_block(program, &globals) {
            log::warn!("Test script stopped: {}", error);
            self.results
                .push(TestResult::fail(SCRIPT_ERROR_NAME, error.to_string()));
        }
        for scope in self.scopes.drain(..).filter_map(|scope| scope.upgrade()) {
            scope.clear();
        }
        self.globals.clear();
        self.results
    }

    fn scope(&mut self, parent: &Rc<Env>) -> Rc<Env> {
        let scope = Env::child(parent);
        self.scopes.push(Rc::downgrade(&scope));
        scope
    }

    // ---- statements ----

    fn exec_block(&mut self, stmts: &[Stmt], env: &Rc<Env>) -> Eval<()> {
        for stmt in stmts {
            if let Stmt::Function(def) = stmt {
                if let Some(name) = &def.name {
                    env.declare(name, self.closure(def, env), true);
                }
            }
        }
        for stmt in stmts {
            self.exec(stmt, env)?;
        }
        Ok(())
    }

    fn exec(&mut self, stmt: &Stmt, env: &Rc<Env>) -> Eval<()> {
        match stmt {
            Stmt::Declare { kind, declarations } => {
                for (name, init) in declarations {
                    let value = match init {
                        Some(expr) => self.eval(expr, env)?,
                        None => JsValue::Undefined,
                    };
                    env.declare(name, value, *kind != DeclKind::Const);
                }
            }
            Stmt::Function(_) | Stmt::Empty => {}
            Stmt::Expr(expr) => {
                self.eval(expr, env)?;
            }
            Stmt::If {
                test,
                consequent,
                alternate,
            } => {
                if self.eval(test, env)?.truthy() {
                    self.exec_nested(consequent, env)?;
                } else if let Some(alternate) = alternate {
                    self.exec_nested(alternate, env)?;
                }
            }
            Stmt::Block(body) => {
                let scope = self.scope(env);
                self.exec_block(body, &scope)?;
            }
            Stmt::Return(value) => {
                let value = match value {
                    Some(expr) => self.eval(expr, env)?,
                    None => JsValue::Undefined,
                };
                return Err(Flow::Return(value));
            }
            Stmt::Throw(expr) => {
                let value = self.eval(expr, env)?;
                return Err(RuntimeError::thrown(&value).into());
            }
        }
        Ok(())
    }

    /// Runs the body of an `if` branch in its own scope.
    fn exec_nested(&mut self, stmt: &Stmt, env: &Rc<Env>) -> Eval<()> {
        let scope = self.scope(env);
        match stmt {
            Stmt::Block(body) => self.exec_block(body, &scope),
            other => self.exec_block(std::slice::from_ref(other), &scope),
        }
    }

    // ---- expressions ----

    fn closure(&self, def: &Rc<FunctionDef>, env: &Rc<Env>) -> JsValue {
        JsValue::Function(Rc::new(Closure {
            def: def.clone(),
            env: env.clone(),
        }))
    }

    fn eval(&mut self, expr: &Expr, env: &Rc<Env>) -> Eval<JsValue> {
        Ok(match expr {
            Expr::Number(n) => JsValue::Number(*n),
            Expr::Str(s) => JsValue::string(s.clone()),
            Expr::Bool(b) => JsValue::Bool(*b),
            Expr::Null => JsValue::Null,
            Expr::Template(segments) => {
                let mut text = String::new();
                for segment in segments {
                    match segment {
                        TemplateSegment::Text(t) => text.push_str(t),
                        TemplateSegment::Expr(e) => text.push_str(&self.eval(e, env)?.to_js_string()),
                    }
                }
                JsValue::String(text)
            }
            Expr::Regex { pattern, flags } => {
                let regex = JsRegex::new(pattern, flags).map_err(|e| {
                    RuntimeError::new("SyntaxError", format!("Invalid regular expression: {}", e))
                })?;
                JsValue::Regex(Rc::new(regex))
            }
            Expr::Ident(name) => self.lookup(name, env)?,
            Expr::Array(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(self.eval(item, env)?);
                }
                JsValue::array(values)
            }
            Expr::Object(properties) => {
                let mut map = ObjectMap::new();
                for (key, value) in properties {
                    let key = match key {
                        PropertyKey::Static(name) => name.clone(),
                        PropertyKey::Computed(expr) => self.eval(expr, env)?.to_js_string(),
                    };
                    let value = self.eval(value, env)?;
                    map.insert(key, value);
                }
                JsValue::object(map)
            }
            Expr::Function(def) => self.closure(def, env),
            Expr::Member {
                object,
                property,
                optional,
            } => {
                let target = self.eval(object, env)?;
                if *optional && target.is_nullish() {
                    JsValue::Undefined
                } else {
                    self.get_property(&target, property)?
                }
            }
            Expr::Index { object, index } => {
                let target = self.eval(object, env)?;
                let key = self.eval(index, env)?;
                self.get_index(&target, &key)?
            }
            Expr::Call { callee, args } => {
                let function = self.eval(callee, env)?;
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.eval(arg, env)?);
                }
                self.call(&function, values, &callee.describe())?
            }
            Expr::Unary { op, operand } => {
                if let (UnaryOp::TypeOf, Expr::Ident(name)) = (op, operand.as_ref()) {
                    let value = self.lookup(name, env).unwrap_or(JsValue::Undefined);
                    return Ok(JsValue::string(value.type_of()));
                }
                let value = self.eval(operand, env)?;
                match op {
                    UnaryOp::Not => JsValue::Bool(!value.truthy()),
                    UnaryOp::Neg => JsValue::Number(-value.to_number()),
                    UnaryOp::Plus => JsValue::Number(value.to_number()),
                    UnaryOp::TypeOf => JsValue::string(value.type_of()),
                }
            }
            Expr::Binary { op, left, right } => {
                let left = self.eval(left, env)?;
                let right = self.eval(right, env)?;
                binary(*op, &left, &right)
            }
            Expr::Logical { op, left, right } => {
                let left = self.eval(left, env)?;
                let short_circuit = match op {
                    LogicalOp::And => !left.truthy(),
                    LogicalOp::Or => left.truthy(),
                    LogicalOp::Nullish => !left.is_nullish(),
                };
                if short_circuit {
                    left
                } else {
                    self.eval(right, env)?
                }
            }
            Expr::Conditional {
                test,
                consequent,
                alternate,
            } => {
                if self.eval(test, env)?.truthy() {
                    self.eval(consequent, env)?
                } else {
                    self.eval(alternate, env)?
                }
            }
            Expr::Assign { op, target, value } => self.assign(*op, target, value, env)?,
        })
    }

    fn lookup(&self, name: &str, env: &Rc<Env>) -> Eval<JsValue> {
        if let Some(value) = env.lookup(name) {
            return Ok(value);
        }
        global(name).ok_or_else(|| {
            RuntimeError::new("ReferenceError", format!("{} is not defined", name)).into()
        })
    }

    fn assign(
        &mut self,
        op: Option<AssignOp>,
        target: &Expr,
        value: &Expr,
        env: &Rc<Env>,
    ) -> Eval<JsValue> {
        let mut new_value = self.eval(value, env)?;
        if let Some(op) = op {
            let current = self.eval(target, env)?;
            let op = match op {
                AssignOp::Add => BinaryOp::Add,
                AssignOp::Sub => BinaryOp::Sub,
                AssignOp::Mul => BinaryOp::Mul,
                AssignOp::Div => BinaryOp::Div,
            };
            new_value = binary(op, &current, &new_value);
        }

        match target {
            Expr::Ident(name) => {
                if !env.assign(name, new_value.clone())? {
                    self.globals.declare(name, new_value.clone(), true);
                }
            }
            Expr::Member {
                object, property, ..
            } => {
                let object = self.eval(object, env)?;
                set_property(&object, property, new_value.clone())?;
            }
            Expr::Index { object, index } => {
                let object = self.eval(object, env)?;
                let key = self.eval(index, env)?;
                set_property(&object, &key.to_js_string(), new_value.clone())?;
            }
            _ => return Err(RuntimeError::new("SyntaxError", "Invalid assignment target").into()),
        }
        Ok(new_value)
    }

    // ---- properties ----

    fn get_index(&mut self, target: &JsValue, key: &JsValue) -> Eval<JsValue> {
        if let (JsValue::Array(items), JsValue::Number(n)) = (target, key) {
            return Ok(index_of(*n)
                .and_then(|i| items.borrow().get(i).cloned())
                .unwrap_or(JsValue::Undefined));
        }
        self.get_property(target, &key.to_js_string())
    }

    fn get_property(&mut self, target: &JsValue, name: &str) -> Eval<JsValue> {
        let value = match target {
            JsValue::Undefined | JsValue::Null => {
                return Err(RuntimeError::type_error(format!(
                    "Cannot read properties of {} (reading '{}')",
                    target.to_js_string(),
                    name
                ))
                .into())
            }
            JsValue::String(s) => match name {
                "length" => JsValue::Number(s.chars().count() as f64),
                _ if STRING_METHODS.contains(&name) => JsValue::method(target.clone(), name),
                _ => name
                    .parse::<usize>()
                    .ok()
                    .and_then(|i| s.chars().nth(i))
                    .map(|c| JsValue::string(c.to_string()))
                    .unwrap_or(JsValue::Undefined),
            },
            JsValue::Array(items) => match name {
                "length" => JsValue::Number(items.borrow().len() as f64),
                _ if ARRAY_METHODS.contains(&name) => JsValue::method(target.clone(), name),
                _ => name
                    .parse::<usize>()
                    .ok()
                    .and_then(|i| items.borrow().get(i).cloned())
                    .unwrap_or(JsValue::Undefined),
            },
            JsValue::Number(_) | JsValue::Bool(_) => match name {
                "toFixed" | "toString" => JsValue::method(target.clone(), name),
                _ => JsValue::Undefined,
            },
            JsValue::Object(map) => match map.borrow().get(name) {
                Some(value) => value.clone(),
                None if name == "hasOwnProperty" => JsValue::method(target.clone(), name),
                None => JsValue::Undefined,
            },
            JsValue::Regex(regex) => match name {
                "test" => JsValue::method(target.clone(), name),
                "source" => JsValue::string(regex.source.clone()),
                "flags" => JsValue::string(regex.flags.clone()),
                _ => JsValue::Undefined,
            },
            JsValue::Function(closure) => match name {
                "name" => JsValue::string(closure.def.name.clone().unwrap_or_default()),
                _ => JsValue::Undefined,
            },
            JsValue::Method(method) => match name {
                "name" => JsValue::string(method.name.clone()),
                _ => JsValue::Undefined,
            },
            JsValue::Expectation(expectation) => match expectation.member(name, self.response) {
                Ok(Member::Value(value)) => value,
                Ok(Member::Unknown) => {
                    return Err(RuntimeError::new(
                        "AssertionError",
                        format!("Invalid Chai property: {}", name),
                    )
                    .into())
                }
                Err(e) => return Err(RuntimeError::new("AssertionError", e.0).into()),
            },
            JsValue::Host(host) => self.host_property(*host, name),
        };
        Ok(value)
    }

    fn host_property(&self, host: Host, name: &str) -> JsValue {
        let method = |names: &[&str]| {
            if names.contains(&name) {
                JsValue::method(JsValue::Host(host), name)
            } else {
                JsValue::Undefined
            }
        };
        match host {
            Host::Global => JsValue::Undefined,
            Host::Pm => match name {
                "response" => JsValue::Host(Host::Response),
                "environment" => variables(VariableTarget::Scope(VariableScope::Environment)),
                "globals" => variables(VariableTarget::Scope(VariableScope::Global)),
                "collectionVariables" => variables(VariableTarget::Scope(VariableScope::Collection)),
                "variables" => variables(VariableTarget::Resolved),
                _ => method(&["test", "expect"]),
            },
            Host::Response => match name {
                "code" => JsValue::Number(f64::from(self.response.status)),
                "status" => JsValue::string(self.response.status_text.clone()),
                "responseTime" => JsValue::Number(self.response.duration as f64),
                "responseSize" => JsValue::Number(self.response.size as f64),
                "headers" => JsValue::Host(Host::ResponseHeaders),
                "to" => JsValue::Expectation(Rc::new(Expectation::for_response())),
                _ => method(&["json", "text", "reason"]),
            },
            Host::ResponseHeaders => method(&["get", "has"]),
            Host::Variables(_) => method(&["get", "set", "unset", "has"]),
            Host::Json => method(&["parse", "stringify"]),
            Host::Console => method(&["log", "info", "warn", "error", "debug"]),
            Host::Object => method(&["keys", "values", "entries"]),
            Host::Array => method(&["isArray"]),
            Host::Math => match name {
                "PI" => JsValue::Number(std::f64::consts::PI),
                _ => method(&["floor", "ceil", "round", "abs", "min", "max", "pow", "sqrt", "random"]),
            },
        }
    }

    // ---- calls ----

    fn call(&mut self, function: &JsValue, args: Vec<JsValue>, description: &str) -> Eval<JsValue> {
        match function {
            JsValue::Function(closure) => self.call_closure(closure, args),
            JsValue::Method(method) => {
                let receiver = method.receiver.clone();
                let name = method.name.clone();
                self.call_method(&receiver, &name, args)
            }
            _ => Err(RuntimeError::type_error(format!("{} is not a function", description)).into()),
        }
    }

    fn call_closure(&mut self, closure: &Rc<Closure>, args: Vec<JsValue>) -> Eval<JsValue> {
        if self.depth >= MAX_CALL_DEPTH {
            return Err(
                RuntimeError::new("RangeError", "Maximum call stack size exceeded").into(),
            );
        }

        let scope = self.scope(&closure.env);
        let mut args = args.into_iter();
        for param in &closure.def.params {
            scope.declare(param, args.next().unwrap_or(JsValue::Undefined), true);
        }

        self.depth += 1;
        let result = match &closure.def.body {
            FunctionBody::Expr(expr) => self.eval(expr, &scope),
            FunctionBody::Block(body) => match self.exec_block(body, &scope) {
                Ok(()) => Ok(JsValue::Undefined),
                Err(Flow::Return(value)) => Ok(value),
                Err(error) => Err(error),
            },
        };
        self.depth -= 1;
        result
    }

    /// Calls a callback the way array methods do: `(item, index, array)`.
    fn call_callback(
        &mut self,
        callback: &JsValue,
        item: &JsValue,
        index: usize,
        array: &JsValue,
    ) -> Eval<JsValue> {
        self.call(
            callback,
            vec![item.clone(), JsValue::Number(index as f64), array.clone()],
            "callback",
        )
    }

    fn call_method(&mut self, receiver: &JsValue, name: &str, args: Vec<JsValue>) -> Eval<JsValue> {
        let arg = |i: usize| args.get(i).cloned().unwrap_or(JsValue::Undefined);
        match receiver {
            JsValue::Host(host) => self.call_host(*host, name, &args),
            JsValue::String(s) => string_method(s, name, &args),
            JsValue::Array(items) => self.array_method(receiver, items, name, &args),
            JsValue::Number(n) => Ok(match name {
                "toFixed" => {
                    let digits = arg(0).to_number();
                    let digits = if digits.is_nan() { 0 } else { digits.clamp(0.0, 100.0) as usize };
                    JsValue::string(format!("{:.*}", digits, n))
                }
                _ => JsValue::string(number_to_string(*n)),
            }),
            JsValue::Bool(b) => Ok(JsValue::string(b.to_string())),
            JsValue::Object(map) => Ok(JsValue::Bool(
                map.borrow().contains_key(&arg(0).to_js_string()),
            )),
            JsValue::Regex(regex) => Ok(JsValue::Bool(regex.regex.is_match(&arg(0).to_js_string()))),
            JsValue::Expectation(expectation) => expectation
                .call(name, &args, self.response)
                .map_err(|e| RuntimeError::new("AssertionError", e.0).into()),
            other => Err(RuntimeError::type_error(format!(
                "{}.{} is not a function",
                other.type_of(),
                name
            ))
            .into()),
        }
    }

    fn call_host(&mut self, host: Host, name: &str, args: &[JsValue]) -> Eval<JsValue> {
        let arg = |i: usize| args.get(i).cloned().unwrap_or(JsValue::Undefined);
        let value = match (host, name) {
            (Host::Pm, "test") => {
                self.run_test(arg(0).to_js_string(), &arg(1));
                JsValue::Undefined
            }
            (Host::Pm, "expect") => JsValue::Expectation(Rc::new(Expectation::new(arg(0)))),

            (Host::Response, "json") => self.response_json()?,
            (Host::Response, "text") => JsValue::string(self.response.body_text.clone()),
            (Host::Response, "reason") => JsValue::string(self.response.status_text.clone()),
            (Host::ResponseHeaders, "get") => self
                .response
                .header(&arg(0).to_js_string())
                .map(JsValue::string)
                .unwrap_or(JsValue::Undefined),
            (Host::ResponseHeaders, "has") => {
                JsValue::Bool(self.response.headers.contains(&arg(0).to_js_string()))
            }

            (Host::Variables(target), _) => self.call_variables(target, name, args)?,

            (Host::Json, "parse") => {
                let text = arg(0).to_js_string();
                let parsed: serde_json::Value = serde_json::from_str(&text)
                    .map_err(|e| RuntimeError::new("SyntaxError", e.to_string()))?;
                JsValue::from_json(&parsed)
            }
            (Host::Json, "stringify") => stringify(&arg(0), &arg(2))?,

            (Host::Console, level) => {
                let line = args
                    .iter()
                    .map(|a| match a {
                        JsValue::String(s) => s.clone(),
                        other => other.inspect(),
                    })
                    .collect::<Vec<_>>()
                    .join(" ");
                match level {
                    "warn" => log::warn!("[console] {}", line),
                    "error" => log::error!("[console] {}", line),
                    "debug" => log::debug!("[console] {}", line),
                    _ => log::info!("[console] {}", line),
                }
                JsValue::Undefined
            }

            (Host::Object, "keys" | "values" | "entries") => object_listing(&arg(0), name),
            (Host::Array, "isArray") => JsValue::Bool(matches!(arg(0), JsValue::Array(_))),
            (Host::Math, _) => math(name, args),

            (Host::Global, "parseInt") => JsValue::Number(parse_int(&arg(0).to_js_string(), &arg(1))),
            (Host::Global, "parseFloat") => JsValue::Number(parse_float(&arg(0).to_js_string())),
            (Host::Global, "Number") => {
                JsValue::Number(args.first().map_or(0.0, JsValue::to_number))
            }
            (Host::Global, "String") => {
                JsValue::string(args.first().map_or_else(String::new, JsValue::to_js_string))
            }
            (Host::Global, "Boolean") => JsValue::Bool(arg(0).truthy()),
            (Host::Global, "isNaN") => JsValue::Bool(arg(0).to_number().is_nan()),
            (Host::Global, "Error") => {
                let mut map = ObjectMap::new();
                map.insert("name".to_string(), JsValue::string("Error"));
                map.insert(
                    "message".to_string(),
                    JsValue::string(args.first().map_or_else(String::new, JsValue::to_js_string)),
                );
                JsValue::object(map)
            }

            _ => {
                return Err(RuntimeError::type_error(format!("{} is not a function", name)).into())
            }
        };
        Ok(value)
    }

    /// `pm.test(name, fn)`: failures inside `fn` become a failed result.
    fn run_test(&mut self, name: String, callback: &JsValue) {
        if !callback.is_callable() {
            log::debug!("Skipping test '{}' without a function", name);
            return;
        }
        let result = match self.call(callback, Vec::new(), "test") {
            Ok(_) | Err(Flow::Return(_)) => TestResult::pass(name),
            Err(Flow::Error(error)) => TestResult::fail(name, error.to_string()),
        };
        self.results.push(result);
    }

    fn response_json(&self) -> Result<JsValue, RuntimeError> {
        match &self.response.body {
            serde_json::Value::String(_) => serde_json::from_str(&self.response.body_text)
                .map(|value| JsValue::from_json(&value))
                .map_err(|e| RuntimeError::new("JSONError", e.to_string())),
            body => Ok(JsValue::from_json(body)),
        }
    }

    fn call_variables(
        &mut self,
        target: VariableTarget,
        name: &str,
        args: &[JsValue],
    ) -> Result<JsValue, RuntimeError> {
        let key = args.first().map(JsValue::to_js_string).unwrap_or_default();
        let (read_scope, write_scope) = match target {
            VariableTarget::Scope(scope) => (Some(scope), scope),
            VariableTarget::Resolved => (None, VariableScope::Local),
        };
        let store_error = |e: crate::variables::VarError| RuntimeError::new("Error", e.to_string());

        Ok(match name {
            "get" => {
                let value = match read_scope {
                    Some(scope) => self.store.get_scoped(scope, &key),
                    None => self.store.get(&key),
                };
                value.map(JsValue::String).unwrap_or(JsValue::Undefined)
            }
            "has" => JsValue::Bool(match read_scope {
                Some(scope) => self.store.variable(scope, &key).is_some(),
                None => self.store.contains(&key),
            }),
            "set" => {
                let value = args.get(1).cloned().unwrap_or(JsValue::Undefined);
                let text = match &value {
                    JsValue::Array(_) | JsValue::Object(_) => value
                        .to_json()
                        .map(|json| json.to_string())
                        .unwrap_or_default(),
                    other => other.to_js_string(),
                };
                self.store
                    .set(write_scope, key, text, "")
                    .map_err(store_error)?;
                JsValue::Undefined
            }
            "unset" => {
                self.store.unset(write_scope, &key).map_err(store_error)?;
                JsValue::Undefined
            }
            other => {
                return Err(RuntimeError::type_error(format!("{} is not a function", other)))
            }
        })
    }

    fn array_method(
        &mut self,
        receiver: &JsValue,
        items: &Rc<RefCell<Vec<JsValue>>>,
        name: &str,
        args: &[JsValue],
    ) -> Eval<JsValue> {
        let arg = |i: usize| args.get(i).cloned().unwrap_or(JsValue::Undefined);
        let snapshot: Vec<JsValue> = items.borrow().clone();
        let callback = arg(0);

        let value = match name {
            "includes" => {
                let needle = arg(0);
                JsValue::Bool(snapshot.iter().any(|item| same_value_zero(item, &needle)))
            }
            "indexOf" => {
                let needle = arg(0);
                let position = snapshot.iter().position(|item| strict_equals(item, &needle));
                JsValue::Number(position.map_or(-1.0, |p| p as f64))
            }
            "join" => {
                let separator = match arg(0) {
                    JsValue::Undefined => ",".to_string(),
                    other => other.to_js_string(),
                };
                JsValue::string(
                    snapshot
                        .iter()
                        .map(|item| {
                            if item.is_nullish() {
                                String::new()
                            } else {
                                item.to_js_string()
                            }
                        })
                        .collect::<Vec<_>>()
                        .join(&separator),
                )
            }
            "push" => {
                let mut items = items.borrow_mut();
                items.extend(args.iter().cloned());
                JsValue::Number(items.len() as f64)
            }
            "pop" => items.borrow_mut().pop().unwrap_or(JsValue::Undefined),
            "slice" => {
                let (start, end) = slice_bounds(snapshot.len(), &arg(0), &arg(1));
                JsValue::array(snapshot.get(start..end).map(<[JsValue]>::to_vec).unwrap_or_default())
            }
            "map" => {
                let mut mapped = Vec::with_capacity(snapshot.len());
                for (i, item) in snapshot.iter().enumerate() {
                    mapped.push(self.call_callback(&callback, item, i, receiver)?);
                }
                JsValue::array(mapped)
            }
            "filter" => {
                let mut kept = Vec::new();
                for (i, item) in snapshot.iter().enumerate() {
                    if self.call_callback(&callback, item, i, receiver)?.truthy() {
                        kept.push(item.clone());
                    }
                }
                JsValue::array(kept)
            }
            "find" | "findIndex" => {
                let mut found = None;
                for (i, item) in snapshot.iter().enumerate() {
                    if self.call_callback(&callback, item, i, receiver)?.truthy() {
                        found = Some((i, item.clone()));
                        break;
                    }
                }
                match (name, found) {
                    ("find", Some((_, item))) => item,
                    ("find", None) => JsValue::Undefined,
                    (_, Some((i, _))) => JsValue::Number(i as f64),
                    (_, None) => JsValue::Number(-1.0),
                }
            }
            "some" => {
                let mut any = false;
                for (i, item) in snapshot.iter().enumerate() {
                    if self.call_callback(&callback, item, i, receiver)?.truthy() {
                        any = true;
                        break;
                    }
                }
                JsValue::Bool(any)
            }
            "every" => {
                let mut all = true;
                for (i, item) in snapshot.iter().enumerate() {
                    if !self.call_callback(&callback, item, i, receiver)?.truthy() {
                        all = false;
                        break;
                    }
                }
                JsValue::Bool(all)
            }
            "forEach" => {
                for (i, item) in snapshot.iter().enumerate() {
                    self.call_callback(&callback, item, i, receiver)?;
                }
                JsValue::Undefined
            }
            "reduce" => {
                let mut iter = snapshot.iter().enumerate();
                let mut acc = match args.get(1) {
                    Some(initial) => initial.clone(),
                    None => match iter.next() {
                        Some((_, first)) => first.clone(),
                        None => {
                            return Err(RuntimeError::type_error(
                                "Reduce of empty array with no initial value",
                            )
                            .into())
                        }
                    },
                };
                for (i, item) in iter {
                    acc = self.call(
                        &callback,
                        vec![acc, item.clone(), JsValue::Number(i as f64), receiver.clone()],
                        "callback",
                    )?;
                }
                acc
            }
            other => {
                return Err(
                    RuntimeError::type_error(format!("array.{} is not a function", other)).into(),
                )
            }
        };
        Ok(value)
    }
}

const STRING_METHODS: &[&str] = &[
    "includes",
    "indexOf",
    "startsWith",
    "endsWith",
    "toLowerCase",
    "toUpperCase",
    "trim",
    "split",
    "replace",
    "slice",
    "substring",
    "toString",
];

const ARRAY_METHODS: &[&str] = &[
    "includes", "indexOf", "join", "push", "pop", "slice", "map", "filter", "find", "findIndex",
    "some", "every", "forEach", "reduce",
];

/// Identifiers available without declaration.
fn global(name: &str) -> Option<JsValue> {
    Some(match name {
        "undefined" | "this" => JsValue::Undefined,
        "NaN" => JsValue::Number(f64::NAN),
        "Infinity" => JsValue::Number(f64::INFINITY),
        "pm" => JsValue::Host(Host::Pm),
        "JSON" => JsValue::Host(Host::Json),
        "console" => JsValue::Host(Host::Console),
        "Object" => JsValue::Host(Host::Object),
        "Array" => JsValue::Host(Host::Array),
        "Math" => JsValue::Host(Host::Math),
        "parseInt" | "parseFloat" | "Number" | "String" | "Boolean" | "isNaN" | "Error" => {
            JsValue::method(JsValue::Host(Host::Global), name)
        }
        _ => return None,
    })
}

fn variables(target: VariableTarget) -> JsValue {
    JsValue::Host(Host::Variables(target))
}

fn binary(op: BinaryOp, left: &JsValue, right: &JsValue) -> JsValue {
    let numbers = || (left.to_number(), right.to_number());
    match op {
        BinaryOp::Add => {
            let stringish = |v: &JsValue| !matches!(v, JsValue::Undefined | JsValue::Null | JsValue::Bool(_) | JsValue::Number(_));
            if stringish(left) || stringish(right) {
                JsValue::String(format!("{}{}", left.to_js_string(), right.to_js_string()))
            } else {
                JsValue::Number(left.to_number() + right.to_number())
            }
        }
        BinaryOp::Sub => {
            let (a, b) = numbers();
            JsValue::Number(a - b)
        }
        BinaryOp::Mul => {
            let (a, b) = numbers();
            JsValue::Number(a * b)
        }
        BinaryOp::Div => {
            let (a, b) = numbers();
            JsValue::Number(a / b)
        }
        BinaryOp::Rem => {
            let (a, b) = numbers();
            JsValue::Number(a % b)
        }
        BinaryOp::StrictEq => JsValue::Bool(strict_equals(left, right)),
        BinaryOp::StrictNe => JsValue::Bool(!strict_equals(left, right)),
        BinaryOp::LooseEq => JsValue::Bool(loose_equals(left, right)),
        BinaryOp::LooseNe => JsValue::Bool(!loose_equals(left, right)),
        BinaryOp::Lt | BinaryOp::Gt | BinaryOp::Le | BinaryOp::Ge => {
            let ordering = match (left, right) {
                (JsValue::String(a), JsValue::String(b)) => Some(a.cmp(b)),
                _ => {
                    let (a, b) = numbers();
                    a.partial_cmp(&b)
                }
            };
            JsValue::Bool(match ordering {
                None => false,
                Some(ordering) => match op {
                    BinaryOp::Lt => ordering.is_lt(),
                    BinaryOp::Gt => ordering.is_gt(),
                    BinaryOp::Le => ordering.is_le(),
                    _ => ordering.is_ge(),
                },
            })
        }
    }
}

fn set_property(target: &JsValue, name: &str, value: JsValue) -> Result<(), RuntimeError> {
    match target {
        JsValue::Object(map) => {
            map.borrow_mut().insert(name.to_string(), value);
            Ok(())
        }
        JsValue::Array(items) => {
            if let Ok(index) = name.parse::<usize>() {
                let mut items = items.borrow_mut();
                if index >= items.len() {
                    items.resize(index + 1, JsValue::Undefined);
                }
                items[index] = value;
            }
            Ok(())
        }
        JsValue::Undefined | JsValue::Null => Err(RuntimeError::type_error(format!(
            "Cannot set properties of {} (setting '{}')",
            target.to_js_string(),
            name
        ))),
        JsValue::Host(_) | JsValue::Expectation(_) => Err(RuntimeError::type_error(format!(
            "Cannot assign to read only property '{}'",
            name
        ))),
        _ => Ok(()),
    }
}

fn index_of(n: f64) -> Option<usize> {
    if n >= 0.0 && n.fract() == 0.0 {
        Some(n as usize)
    } else {
        None
    }
}

fn same_value_zero(a: &JsValue, b: &JsValue) -> bool {
    match (a, b) {
        (JsValue::Number(x), JsValue::Number(y)) if x.is_nan() && y.is_nan() => true,
        _ => strict_equals(a, b),
    }
}

/// Resolves `slice(start, end)` arguments against a length, JavaScript style.
fn slice_bounds(len: usize, start: &JsValue, end: &JsValue) -> (usize, usize) {
    let resolve = |value: &JsValue, default: usize| -> usize {
        if matches!(value, JsValue::Undefined) {
            return default;
        }
        let n = value.to_number();
        if n.is_nan() {
            0
        } else if n < 0.0 {
            (len as f64 + n).max(0.0) as usize
        } else {
            (n as usize).min(len)
        }
    };
    let start = resolve(start, 0);
    let end = resolve(end, len);
    (start, end.max(start))
}

fn string_method(s: &str, name: &str, args: &[JsValue]) -> Eval<JsValue> {
    let arg = |i: usize| args.get(i).cloned().unwrap_or(JsValue::Undefined);
    let text = |i: usize| arg(i).to_js_string();
    let chars: Vec<char> = s.chars().collect();

    Ok(match name {
        "includes" => JsValue::Bool(s.contains(&text(0))),
        "startsWith" => JsValue::Bool(s.starts_with(&text(0))),
        "endsWith" => JsValue::Bool(s.ends_with(&text(0))),
        "indexOf" => JsValue::Number(
            s.find(&text(0))
                .map_or(-1.0, |byte| s[..byte].chars().count() as f64),
        ),
        "toLowerCase" => JsValue::string(s.to_lowercase()),
        "toUpperCase" => JsValue::string(s.to_uppercase()),
        "trim" => JsValue::string(s.trim()),
        "toString" => JsValue::string(s),
        "split" => {
            let parts: Vec<JsValue> = match arg(0) {
                JsValue::Undefined => vec![JsValue::string(s)],
                JsValue::Regex(regex) => regex.regex.split(s).map(JsValue::string).collect(),
                separator => {
                    let separator = separator.to_js_string();
                    if separator.is_empty() {
                        chars.iter().map(|c| JsValue::string(c.to_string())).collect()
                    } else {
                        s.split(separator.as_str()).map(JsValue::string).collect()
                    }
                }
            };
            JsValue::array(parts)
        }
        "replace" => {
            let replacement = text(1);
            match arg(0) {
                JsValue::Regex(regex) if regex.is_global() => JsValue::string(
                    regex.regex.replace_all(s, NoExpand(&replacement)).into_owned(),
                ),
                JsValue::Regex(regex) => {
                    JsValue::string(regex.regex.replace(s, NoExpand(&replacement)).into_owned())
                }
                pattern => JsValue::string(s.replacen(&pattern.to_js_string(), &replacement, 1)),
            }
        }
        "slice" => {
            let (start, end) = slice_bounds(chars.len(), &arg(0), &arg(1));
            JsValue::string(chars[start..end].iter().collect::<String>())
        }
        "substring" => {
            let clamp = |value: JsValue, default: usize| -> usize {
                if matches!(value, JsValue::Undefined) {
                    return default;
                }
                let n = value.to_number();
                if n.is_nan() || n < 0.0 {
                    0
                } else {
                    (n as usize).min(chars.len())
                }
            };
            let a = clamp(arg(0), 0);
            let b = clamp(arg(1), chars.len());
            let (start, end) = if a <= b { (a, b) } else { (b, a) };
            JsValue::string(chars[start..end].iter().collect::<String>())
        }
        other => {
            return Err(RuntimeError::type_error(format!("string.{} is not a function", other)).into())
        }
    })
}

fn stringify(value: &JsValue, indent: &JsValue) -> Result<JsValue, RuntimeError> {
    let Some(json) = value.to_json() else {
        return Ok(JsValue::Undefined);
    };
    let indent = match indent {
        JsValue::Number(n) if *n >= 1.0 => " ".repeat(n.min(10.0) as usize),
        JsValue::String(s) => s.chars().take(10).collect(),
        _ => String::new(),
    };
    if indent.is_empty() {
        return Ok(JsValue::string(json.to_string()));
    }

    let mut out = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(indent.as_bytes());
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
    serde::Serialize::serialize(&json, &mut serializer)
        .map_err(|e| RuntimeError::type_error(e.to_string()))?;
    String::from_utf8(out)
        .map(JsValue::String)
        .map_err(|e| RuntimeError::type_error(e.to_string()))
}

fn object_listing(target: &JsValue, kind: &str) -> JsValue {
    let entries: Vec<(String, JsValue)> = match target {
        JsValue::Object(map) => map
            .borrow()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
        JsValue::Array(items) => items
            .borrow()
            .iter()
            .enumerate()
            .map(|(i, v)| (i.to_string(), v.clone()))
            .collect(),
        _ => Vec::new(),
    };
    JsValue::array(
        entries
            .into_iter()
            .map(|(key, value)| match kind {
                "keys" => JsValue::String(key),
                "values" => value,
                _ => JsValue::array(vec![JsValue::String(key), value]),
            })
            .collect(),
    )
}

fn math(name: &str, args: &[JsValue]) -> JsValue {
    let n = |i: usize| args.get(i).map_or(f64::NAN, JsValue::to_number);
    JsValue::Number(match name {
        "floor" => n(0).floor(),
        "ceil" => n(0).ceil(),
        "round" => (n(0) + 0.5).floor(),
        "abs" => n(0).abs(),
        "sqrt" => n(0).sqrt(),
        "pow" => n(0).powf(n(1)),
        "random" => rand::random::<f64>(),
        "min" => args
            .iter()
            .map(JsValue::to_number)
            .fold(f64::INFINITY, |acc, x| if x.is_nan() || acc.is_nan() { f64::NAN } else { acc.min(x) }),
        "max" => args
            .iter()
            .map(JsValue::to_number)
            .fold(f64::NEG_INFINITY, |acc, x| if x.is_nan() || acc.is_nan() { f64::NAN } else { acc.max(x) }),
        _ => f64::NAN,
    })
}

fn parse_int(text: &str, radix: &JsValue) -> f64 {
    let trimmed = text.trim();
    let (negative, body) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
    };
    let mut radix = match radix {
        JsValue::Undefined => 10,
        other => other.to_number() as u32,
    };
    let mut body = body;
    if radix == 0 || radix == 16 {
        if let Some(hex) = body.strip_prefix("0x").or_else(|| body.strip_prefix("0X")) {
            body = hex;
            radix = 16;
        }
    }
    if radix == 0 {
        radix = 10;
    }
    if !(2..=36).contains(&radix) {
        return f64::NAN;
    }

    let digits: String = body.chars().take_while(|c| c.is_digit(radix)).collect();
    if digits.is_empty() {
        return f64::NAN;
    }
    let value = digits.chars().fold(0.0, |acc, c| {
        acc * f64::from(radix) + f64::from(c.to_digit(radix).unwrap_or(0))
    });
    if negative {
        -value
    } else {
        value
    }
}

fn parse_float(text: &str) -> f64 {
    match FLOAT_PREFIX_REGEX.find(text.trim_start()) {
        Some(m) => {
            let matched = m.as_str();
            match matched.trim_start_matches(&['+', '-'][..]) {
                "Infinity" if matched.starts_with('-') => f64::NEG_INFINITY,
                "Infinity" => f64::INFINITY,
                _ => matched.parse().unwrap_or(f64::NAN),
            }
        }
        None => f64::NAN,
    }
}
