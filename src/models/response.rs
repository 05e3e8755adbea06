//! HTTP response data models.
//!
//! A [`RawResponse`] is what the transport hands back; a [`ProcessedResponse`]
//! is the normalized, immutable view the test stage and history consume.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Response headers with case-preserving storage and case-insensitive lookup.
///
/// Repeated header names are kept as separate entries in arrival order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct HeaderMap(Vec<(String, String)>);

impl HeaderMap {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Appends a header, keeping any existing entries with the same name.
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.push((name.into(), value.into()));
    }

    /// Returns the first value for `name`, compared case-insensitively.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Keeps only the entries whose name satisfies the predicate.
    pub fn retain<F>(&mut self, mut keep: F)
    where
        F: FnMut(&str) -> bool,
    {
        self.0.retain(|(k, _)| keep(k));
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for HeaderMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Response descriptor produced by a transport.
///
/// A `status` of 0 denotes a transport-level failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub status_text: String,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

/// Normalized response consumed by the test stage and history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessedResponse {
    /// HTTP status code (e.g., 200, 404, 500).
    pub status: u16,

    /// HTTP status text (e.g., "OK", "Not Found").
    pub status_text: String,

    pub headers: HeaderMap,

    /// Body decoded as UTF-8 (lossily).
    pub body_text: String,

    /// Parsed JSON when the content type is `application/json` and the body
    /// parses, otherwise the body text as a JSON string.
    pub body: Value,

    /// Wall-clock duration of the network stage in milliseconds.
    pub duration: u64,

    /// Body size in bytes.
    pub size: usize,
}

impl ProcessedResponse {
    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    /// Checks if the response status indicates success (2xx).
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Checks if the response status indicates a client error (4xx).
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status)
    }

    /// Checks if the response status indicates a server error (5xx).
    pub fn is_server_error(&self) -> bool {
        (500..600).contains(&self.status)
    }

    /// Checks if the response status indicates a redirection (3xx).
    pub fn is_redirect(&self) -> bool {
        (300..400).contains(&self.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response_with_status(status: u16) -> ProcessedResponse {
        ProcessedResponse {
            status,
            status_text: String::new(),
            headers: HeaderMap::new(),
            body_text: String::new(),
            body: Value::String(String::new()),
            duration: 0,
            size: 0,
        }
    }

    #[test]
    fn test_header_map_case_insensitive() {
        let mut headers = HeaderMap::new();
        headers.append("Content-Type", "application/json");
        headers.append("X-Request-Id", "abc");

        assert_eq!(headers.get("content-type"), Some("application/json"));
        assert_eq!(headers.get("X-REQUEST-ID"), Some("abc"));
        assert!(!headers.contains("authorization"));
        assert_eq!(headers.len(), 2);
    }

    #[test]
    fn test_header_map_preserves_case_and_duplicates() {
        let headers: HeaderMap = vec![("Set-Cookie", "a=1"), ("set-cookie", "b=2")]
            .into_iter()
            .collect();
        let names: Vec<&str> = headers.iter().map(|(k, _)| k).collect();
        assert_eq!(names, vec!["Set-Cookie", "set-cookie"]);
        assert_eq!(headers.get("SET-COOKIE"), Some("a=1"));
    }

    #[test]
    fn test_header_map_retain() {
        let mut headers: HeaderMap = vec![("Authorization", "x"), ("Accept", "y")]
            .into_iter()
            .collect();
        headers.retain(|name| !name.eq_ignore_ascii_case("authorization"));
        assert_eq!(headers.len(), 1);
        assert!(headers.contains("accept"));
    }

    #[test]
    fn test_status_checks() {
        assert!(response_with_status(200).is_success());
        assert!(response_with_status(301).is_redirect());
        assert!(response_with_status(404).is_client_error());
        assert!(response_with_status(503).is_server_error());
        assert!(!response_with_status(404).is_success());
    }

    #[test]
    fn test_header_map_serializes_as_pairs() {
        let headers: HeaderMap = vec![("A", "1")].into_iter().collect();
        assert_eq!(serde_json::to_string(&headers).unwrap(), r#"[["A","1"]]"#);
    }
}
