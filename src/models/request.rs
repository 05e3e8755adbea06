//! HTTP request data models.
//!
//! This module defines the request definitions users author and the
//! processed request that the pipeline actually sends.

use crate::models::response::ProcessedResponse;
use crate::models::test_result::TestResult;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

/// HTTP request method.
///
/// Represents all standard HTTP methods as defined in RFC 7231 and RFC 5789.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum HttpMethod {
    /// HTTP GET method - retrieve a resource
    #[default]
    GET,
    /// HTTP POST method - submit data to create a resource
    POST,
    /// HTTP PUT method - replace a resource
    PUT,
    /// HTTP DELETE method - remove a resource
    DELETE,
    /// HTTP PATCH method - partially modify a resource
    PATCH,
    /// HTTP OPTIONS method - describe communication options
    OPTIONS,
    /// HTTP HEAD method - retrieve headers only
    HEAD,
    /// HTTP TRACE method - perform a message loop-back test
    TRACE,
    /// HTTP CONNECT method - establish a tunnel to the server
    CONNECT,
}

impl HttpMethod {
    /// Returns the string representation of the HTTP method.
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::GET => "GET",
            HttpMethod::POST => "POST",
            HttpMethod::PUT => "PUT",
            HttpMethod::DELETE => "DELETE",
            HttpMethod::PATCH => "PATCH",
            HttpMethod::OPTIONS => "OPTIONS",
            HttpMethod::HEAD => "HEAD",
            HttpMethod::TRACE => "TRACE",
            HttpMethod::CONNECT => "CONNECT",
        }
    }

    /// Parses a string into an HttpMethod, case-insensitively.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "GET" => Some(HttpMethod::GET),
            "POST" => Some(HttpMethod::POST),
            "PUT" => Some(HttpMethod::PUT),
            "DELETE" => Some(HttpMethod::DELETE),
            "PATCH" => Some(HttpMethod::PATCH),
            "OPTIONS" => Some(HttpMethod::OPTIONS),
            "HEAD" => Some(HttpMethod::HEAD),
            "TRACE" => Some(HttpMethod::TRACE),
            "CONNECT" => Some(HttpMethod::CONNECT),
            _ => None,
        }
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Selects how the request body is encoded on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum BodyType {
    #[default]
    #[serde(rename = "none")]
    None,
    #[serde(rename = "raw")]
    Raw,
    #[serde(rename = "json")]
    Json,
    #[serde(rename = "form-data")]
    FormData,
    #[serde(rename = "urlencoded")]
    UrlEncoded,
}

/// Request body as authored: free text or a structured value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestBody {
    Text(String),
    Structured(Value),
}

impl RequestBody {
    /// Renders the body as text; structured bodies become compact JSON.
    pub fn to_text(&self) -> String {
        match self {
            RequestBody::Text(text) => text.clone(),
            RequestBody::Structured(value) => value.to_string(),
        }
    }
}

/// Where an API key is attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ApiKeyLocation {
    #[default]
    Header,
    Query,
}

/// Authentication configured on a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum AuthSpec {
    #[default]
    None,
    Basic {
        username: String,
        password: String,
    },
    Bearer {
        token: String,
    },
    #[serde(rename = "apikey", rename_all = "camelCase")]
    ApiKey {
        key: String,
        value: String,
        #[serde(default)]
        add_to: ApiKeyLocation,
    },
    #[serde(rename = "oauth2", rename_all = "camelCase")]
    OAuth2 {
        access_token: String,
        #[serde(default)]
        token_type: String,
    },
}

/// A request as authored by the user and stored in a collection.
///
/// The pipeline never mutates a definition while executing it; it works on a
/// clone and reports what was sent as a [`ProcessedRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct RequestDefinition {
    pub id: String,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub method: HttpMethod,

    /// Target URL, possibly containing `{{variable}}` markers.
    pub url: String,

    #[serde(default)]
    pub headers: HashMap<String, String>,

    /// Query parameters merged into the URL after interpolation.
    #[serde(default)]
    pub params: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<RequestBody>,

    #[serde(default)]
    pub body_type: BodyType,

    #[serde(default)]
    pub auth: AuthSpec,

    #[serde(default)]
    pub pre_request_script: String,

    #[serde(default)]
    pub test_script: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_request_execution: Option<ProcessedRequest>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_response_execution: Option<LastResponseExecution>,
}

impl RequestDefinition {
    /// Creates a new request definition with default values for optional fields.
    pub fn new(id: impl Into<String>, method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            method,
            url: url.into(),
            ..Self::default()
        }
    }

    /// Adds or replaces a header.
    pub fn add_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.insert(name.into(), value.into());
    }

    /// Sets a text body with the given body type.
    pub fn set_body(&mut self, body: impl Into<String>, body_type: BodyType) {
        self.body = Some(RequestBody::Text(body.into()));
        self.body_type = body_type;
    }

    /// Checks if the request has a non-empty body.
    pub fn has_body(&self) -> bool {
        match &self.body {
            Some(RequestBody::Text(text)) => !text.is_empty(),
            Some(RequestBody::Structured(value)) => !value.is_null(),
            None => false,
        }
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Attaches the result of a completed send as last-execution metadata.
    pub fn record_execution(
        &mut self,
        request: &ProcessedRequest,
        response: &ProcessedResponse,
        test_results: &[TestResult],
    ) {
        self.last_request_execution = Some(request.clone());
        self.last_response_execution = Some(LastResponseExecution {
            response: response.clone(),
            test_results: test_results.to_vec(),
        });
    }
}

/// The request exactly as it went to the transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

impl ProcessedRequest {
    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Response side of the last-execution metadata on a request definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastResponseExecution {
    pub response: ProcessedResponse,
    pub test_results: Vec<TestResult>,
}
