//! Turns a resolved request definition into a transport request.
//!
//! Building never touches the network. Every failure here is synchronous
//! and stops the send before a connection is made.

use crate::auth::apply_auth_headers;
use crate::models::{BodyType, HttpMethod, ProcessedRequest, RequestBody, RequestDefinition};
use serde_json::{Map, Value};
use std::collections::HashMap;
use thiserror::Error;

pub const CONTENT_TYPE: &str = "Content-Type";
pub const JSON_CONTENT_TYPE: &str = "application/json";
pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Errors raised while building a request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    #[error("Invalid JSON body: {0}")]
    InvalidJson(String),

    #[error("Form body must be an object or key=value pairs, got {0}")]
    InvalidForm(String),
}

/// Body of a request ready to hand to a transport.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum BodyData {
    #[default]
    Empty,
    Text(String),
    /// Sent as `application/x-www-form-urlencoded`
    UrlEncoded(Vec<(String, String)>),
    /// Sent as `multipart/form-data`; the transport picks the boundary
    Multipart(Vec<(String, String)>),
}

impl BodyData {
    /// Text form of the body as recorded in history.
    ///
    /// Multipart fields are rendered as a JSON object.
    pub fn to_text(&self) -> Option<String> {
        match self {
            BodyData::Empty => None,
            BodyData::Text(text) => Some(text.clone()),
            BodyData::UrlEncoded(pairs) => Some(encode_form(pairs)),
            BodyData::Multipart(fields) => {
                let map: Map<String, Value> = fields
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                    .collect();
                Some(Value::Object(map).to_string())
            }
        }
    }
}

/// A fully built request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: HashMap<String, String>,
    pub body: BodyData,
}

impl TransportRequest {
    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// The request as it is reported to history and observers.
    pub fn to_processed(&self) -> ProcessedRequest {
        ProcessedRequest {
            method: self.method,
            url: self.url.clone(),
            headers: self.headers.clone(),
            body: self.body.to_text(),
        }
    }
}

/// Builds a transport request from a resolved request definition.
///
/// Custom headers are copied first, then authentication headers are applied
/// on top. The body is shaped according to the request's body type.
///
/// # Arguments
///
/// * `request` - A request whose variables have already been interpolated
///
/// # Returns
///
/// `Ok(TransportRequest)` or `Err(BuildError)` when the body does not match
/// its declared type.
///
/// # Examples
///
/// ```
/// use rest_workbench::executor::build_request;
/// use rest_workbench::models::{BodyType, HttpMethod, RequestDefinition};
///
/// let mut request = RequestDefinition::new("r1", HttpMethod::POST, "https://api.test/items");
/// request.set_body(r#"{"a":1}"#, BodyType::Json);
///
/// let built = build_request(&request).unwrap();
/// assert_eq!(built.header("content-type"), Some("application/json"));
/// ```
pub fn build_request(request: &RequestDefinition) -> Result<TransportRequest, BuildError> {
    let mut headers = request.headers.clone();
    apply_auth_headers(&mut headers, &request.auth);

    let body = match request.body_type {
        BodyType::None => BodyData::Empty,
        BodyType::Raw => match &request.body {
            Some(body) => BodyData::Text(body.to_text()),
            None => BodyData::Empty,
        },
        BodyType::Json => {
            let text = request.body.as_ref().map(RequestBody::to_text).unwrap_or_default();
            serde_json::from_str::<Value>(&text)
                .map_err(|e| BuildError::InvalidJson(e.to_string()))?;
            if find_header(&headers, CONTENT_TYPE).is_none() {
                headers.insert(CONTENT_TYPE.to_string(), JSON_CONTENT_TYPE.to_string());
            }
            BodyData::Text(text)
        }
        BodyType::FormData => {
            let fields = form_fields(request.body.as_ref())?;
            remove_header(&mut headers, CONTENT_TYPE);
            BodyData::Multipart(fields)
        }
        BodyType::UrlEncoded => {
            let pairs = form_fields(request.body.as_ref())?;
            remove_header(&mut headers, CONTENT_TYPE);
            headers.insert(CONTENT_TYPE.to_string(), FORM_CONTENT_TYPE.to_string());
            BodyData::UrlEncoded(pairs)
        }
    };

    Ok(TransportRequest {
        method: request.method,
        url: request.url.clone(),
        headers,
        body,
    })
}

/// Percent-encodes pairs as an `application/x-www-form-urlencoded` string.
pub fn encode_form(pairs: &[(String, String)]) -> String {
    url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(pairs)
        .finish()
}

/// Reads the key/value fields of a form body.
///
/// A structured body must be an object. A text body is parsed as a JSON
/// object when it looks like one, otherwise as `k=v` pairs separated by `&`
/// or newlines.
fn form_fields(body: Option<&RequestBody>) -> Result<Vec<(String, String)>, BuildError> {
    match body {
        None => Ok(Vec::new()),
        Some(RequestBody::Structured(value)) => object_fields(value),
        Some(RequestBody::Text(text)) => {
            let trimmed = text.trim();
            if trimmed.starts_with('{') {
                let value: Value = serde_json::from_str(trimmed)
                    .map_err(|e| BuildError::InvalidJson(e.to_string()))?;
                return object_fields(&value);
            }
            Ok(trimmed
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .flat_map(|line| url::form_urlencoded::parse(line.as_bytes()).into_owned())
                .collect())
        }
    }
}

fn object_fields(value: &Value) -> Result<Vec<(String, String)>, BuildError> {
    let Value::Object(map) = value else {
        return Err(BuildError::InvalidForm(json_type(value).to_string()));
    };
    Ok(map
        .iter()
        .map(|(k, v)| {
            let text = match v {
                Value::String(s) => s.clone(),
                Value::Null => String::new(),
                other => other.to_string(),
            };
            (k.clone(), text)
        })
        .collect())
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn find_header<'a>(headers: &'a HashMap<String, String>, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

fn remove_header(headers: &mut HashMap<String, String>, name: &str) {
    headers.retain(|k, _| !k.eq_ignore_ascii_case(name));
}
