//! Data models for request history.
//!
//! This module defines the record kept for every completed send.

use crate::models::{ProcessedRequest, ProcessedResponse, TestResult, TestSummary};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Maximum body size to store in history (1MB).
///
/// Larger bodies are dropped from the stored entry; the recorded `size`
/// still reports the original length.
pub const MAX_BODY_SIZE: usize = 1_048_576;

/// Sensitive header names that should be sanitized before storage.
///
/// These headers contain authentication tokens, cookies, and other
/// sensitive information that should not be persisted by default.
pub const SENSITIVE_HEADERS: &[&str] = &[
    "authorization",
    "cookie",
    "set-cookie",
    "x-api-key",
    "api-key",
    "auth-token",
    "x-auth-token",
    "access-token",
    "x-access-token",
    "bearer",
    "proxy-authorization",
];

/// Returns true when a header should not be persisted.
pub fn is_sensitive_header(name: &str) -> bool {
    SENSITIVE_HEADERS
        .iter()
        .any(|sensitive| name.eq_ignore_ascii_case(sensitive))
}

/// A single completed send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    /// Unique identifier for this history entry.
    ///
    /// Generated using UUID v4 for guaranteed uniqueness.
    pub id: String,

    /// When the send completed, in UTC.
    pub timestamp: DateTime<Utc>,

    /// Id of the request definition this send came from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,

    /// The request as it went to the transport.
    pub request: ProcessedRequest,

    /// The normalized response.
    pub response: ProcessedResponse,

    /// Results of the test stage, in script order.
    #[serde(default)]
    pub test_results: Vec<TestResult>,
}

impl HistoryEntry {
    /// Creates a new history entry with a fresh id and the current time.
    ///
    /// # Arguments
    ///
    /// * `request` - The request that was sent
    /// * `response` - The response that was received
    /// * `test_results` - Results of the test script
    pub fn new(
        request: ProcessedRequest,
        response: ProcessedResponse,
        test_results: Vec<TestResult>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            request_id: None,
            request,
            response,
            test_results,
        }
    }

    /// Links the entry to the request definition it came from.
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    /// Pass/fail counts of the recorded test results.
    pub fn summary(&self) -> TestSummary {
        TestSummary::from_results(&self.test_results)
    }

    /// Checks if the request or response body exceeds the storage limit.
    pub fn has_large_body(&self) -> bool {
        self.response.body_text.len() > MAX_BODY_SIZE
            || self
                .request
                .body
                .as_ref()
                .map_or(false, |body| body.len() > MAX_BODY_SIZE)
    }

    /// Removes sensitive headers from the request and the response.
    pub fn sanitize_headers(&self) -> Self {
        let mut sanitized = self.clone();
        sanitized
            .request
            .headers
            .retain(|key, _| !is_sensitive_header(key));
        sanitized
            .response
            .headers
            .retain(|key| !is_sensitive_header(key));
        sanitized
    }

    /// Drops bodies that exceed [`MAX_BODY_SIZE`].
    pub fn truncate_large_bodies(&self) -> Self {
        let mut truncated = self.clone();
        if truncated.response.body_text.len() > MAX_BODY_SIZE {
            truncated.response.body_text = String::new();
            truncated.response.body = Value::Null;
        }
        if truncated
            .request
            .body
            .as_ref()
            .map_or(false, |body| body.len() > MAX_BODY_SIZE)
        {
            truncated.request.body = None;
        }
        truncated
    }

    /// Prepares the entry for storage by sanitizing and truncating as needed.
    ///
    /// # Arguments
    ///
    /// * `sanitize_sensitive` - Whether to remove sensitive headers
    pub fn prepare_for_storage(&self, sanitize_sensitive: bool) -> Self {
        let entry = if sanitize_sensitive {
            self.sanitize_headers()
        } else {
            self.clone()
        };
        if entry.has_large_body() {
            entry.truncate_large_bodies()
        } else {
            entry
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{HeaderMap, HttpMethod};
    use serde_json::json;
    use std::collections::HashMap;

    fn create_test_entry() -> HistoryEntry {
        let mut request_headers = HashMap::new();
        request_headers.insert("Authorization".to_string(), "Bearer secret".to_string());
        request_headers.insert("Accept".to_string(), "application/json".to_string());

        let mut response_headers = HeaderMap::new();
        response_headers.append("Set-Cookie", "session=1");
        response_headers.append("Content-Type", "application/json");

        HistoryEntry::new(
            ProcessedRequest {
                method: HttpMethod::GET,
                url: "https://api.test/users".to_string(),
                headers: request_headers,
                body: None,
            },
            ProcessedResponse {
                status: 200,
                status_text: "OK".to_string(),
                headers: response_headers,
                body_text: r#"{"ok":true}"#.to_string(),
                body: json!({"ok": true}),
                duration: 10,
                size: 11,
            },
            vec![TestResult::pass("status 200"), TestResult::fail("x", "y")],
        )
    }

    #[test]
    fn test_new_entry_has_unique_id() {
        let a = create_test_entry();
        let b = create_test_entry();
        assert_ne!(a.id, b.id);
        assert_eq!(a.summary().passed, 1);
        assert_eq!(a.summary().failed, 1);
    }

    #[test]
    fn test_sanitize_headers() {
        let entry = create_test_entry().prepare_for_storage(true);

        assert!(!entry.request.headers.contains_key("Authorization"));
        assert!(entry.request.headers.contains_key("Accept"));
        assert!(!entry.response.headers.contains("set-cookie"));
        assert!(entry.response.headers.contains("content-type"));
    }

    #[test]
    fn test_no_sanitization_when_disabled() {
        let entry = create_test_entry().prepare_for_storage(false);
        assert!(entry.request.headers.contains_key("Authorization"));
    }

    #[test]
    fn test_large_response_is_truncated() {
        let mut entry = create_test_entry();
        entry.response.body_text = "x".repeat(MAX_BODY_SIZE + 1);
        entry.response.size = MAX_BODY_SIZE + 1;
        assert!(entry.has_large_body());

        let stored = entry.prepare_for_storage(true);
        assert!(stored.response.body_text.is_empty());
        assert_eq!(stored.response.body, Value::Null);
        assert_eq!(stored.response.size, MAX_BODY_SIZE + 1);
    }

    #[test]
    fn test_small_bodies_are_kept() {
        let entry = create_test_entry();
        assert!(!entry.has_large_body());
        assert_eq!(entry.prepare_for_storage(true).response.body, json!({"ok": true}));
    }

    #[test]
    fn test_serialization_round_trip() {
        let entry = create_test_entry().with_request_id("req-1");
        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.contains("\"requestId\":\"req-1\""));

        let back: HistoryEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(back, entry);
    }
}
