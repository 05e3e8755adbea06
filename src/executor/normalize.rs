//! Converts raw transport responses into processed responses.

use crate::models::{ProcessedResponse, RawResponse};
use serde_json::Value;
use std::time::Duration;

/// Builds a [`ProcessedResponse`] from a raw response and the time it took.
///
/// The body is decoded as UTF-8 with invalid sequences replaced. It is parsed
/// as JSON only when the `content-type` header contains `application/json`;
/// when parsing fails, or for any other content type, `body` holds the text.
/// This never fails.
pub fn normalize_response(raw: RawResponse, elapsed: Duration) -> ProcessedResponse {
    let body_text = String::from_utf8_lossy(&raw.body).into_owned();

    let is_json = raw
        .headers
        .get("content-type")
        .map(|ct| ct.to_ascii_lowercase().contains("application/json"))
        .unwrap_or(false);

    let body = if is_json {
        serde_json::from_str(&body_text).unwrap_or_else(|e| {
            log::debug!("Response declared JSON but did not parse: {}", e);
            Value::String(body_text.clone())
        })
    } else {
        Value::String(body_text.clone())
    };

    let status_text = if raw.status_text.is_empty() {
        reqwest::StatusCode::from_u16(raw.status)
            .ok()
            .and_then(|status| status.canonical_reason())
            .unwrap_or("")
            .to_string()
    } else {
        raw.status_text
    };

    ProcessedResponse {
        status: raw.status,
        status_text,
        headers: raw.headers,
        size: raw.body.len(),
        body_text,
        body,
        duration: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::HeaderMap;
    use serde_json::json;

    fn raw(content_type: Option<&str>, body: &[u8]) -> RawResponse {
        let mut headers = HeaderMap::new();
        if let Some(ct) = content_type {
            headers.append("Content-Type", ct);
        }
        RawResponse {
            status: 200,
            status_text: String::new(),
            headers,
            body: body.to_vec(),
        }
    }

    #[test]
    fn test_json_body_is_parsed() {
        let response = normalize_response(
            raw(Some("application/json; charset=utf-8"), br#"{"a":1}"#),
            Duration::from_millis(25),
        );
        assert_eq!(response.body, json!({"a": 1}));
        assert_eq!(response.body_text, r#"{"a":1}"#);
        assert_eq!(response.size, 7);
        assert_eq!(response.duration, 25);
        assert_eq!(response.status_text, "OK");
    }

    #[test]
    fn test_invalid_json_falls_back_to_text() {
        let response = normalize_response(raw(Some("application/json"), b"{oops"), Duration::ZERO);
        assert_eq!(response.body, Value::String("{oops".to_string()));
    }

    #[test]
    fn test_json_without_content_type_stays_text() {
        let response = normalize_response(raw(Some("text/plain"), b"[1,2]"), Duration::ZERO);
        assert_eq!(response.body, Value::String("[1,2]".to_string()));

        let response = normalize_response(raw(None, b"[1,2]"), Duration::ZERO);
        assert_eq!(response.body, Value::String("[1,2]".to_string()));
    }

    #[test]
    fn test_content_type_lookup_is_case_insensitive() {
        let mut response = raw(None, b"true");
        response.headers.append("CONTENT-TYPE", "Application/JSON");
        assert_eq!(normalize_response(response, Duration::ZERO).body, json!(true));
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let response = normalize_response(raw(None, &[b'o', 0xff, b'k']), Duration::ZERO);
        assert_eq!(response.body_text, "o\u{fffd}k");
        assert_eq!(response.size, 3);
    }

    #[test]
    fn test_status_text_is_kept() {
        let mut response = raw(None, b"");
        response.status = 404;
        response.status_text = "Gone Fishing".to_string();
        let response = normalize_response(response, Duration::ZERO);
        assert_eq!(response.status_text, "Gone Fishing");
        assert!(response.is_client_error());
    }
}
