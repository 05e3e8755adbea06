//! Transport error types.
//!
//! This module defines the errors that can occur while a request is on the
//! wire, including network errors, timeouts and protocol issues.

use thiserror::Error;

/// Errors that can occur while sending a request.
///
/// A transport error always means no usable response was received.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Connection failures, DNS resolution errors and other network issues.
    #[error("Network error: {0}")]
    Network(String),

    /// The request took longer than the configured timeout.
    #[error("Request timed out after {0} ms")]
    Timeout(u64),

    /// The URL could not be parsed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Certificate validation errors, handshake failures and similar.
    #[error("TLS/SSL error: {0}")]
    Tls(String),

    /// Invalid headers or malformed responses.
    #[error("HTTP protocol error: {0}")]
    Protocol(String),

    /// The HTTP client could not be built or could not build the request.
    #[error("Request build error: {0}")]
    Build(String),

    /// Only HTTP and HTTPS are supported.
    #[error("Unsupported protocol: {0}")]
    UnsupportedProtocol(String),

    /// The transport reported status 0.
    #[error("No response received")]
    NoResponse,
}

impl TransportError {
    /// Maps a reqwest error, using `timeout_ms` for timeouts.
    pub fn from_reqwest(err: reqwest::Error, timeout_ms: u64) -> Self {
        if err.is_timeout() {
            return TransportError::Timeout(timeout_ms);
        }
        err.into()
    }
}

/// Convert reqwest errors to TransportError.
///
/// Timeouts carry no duration here; use [`TransportError::from_reqwest`]
/// when the configured timeout is known.
impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        let message = err.to_string();
        if err.is_timeout() {
            TransportError::Timeout(0)
        } else if err.is_builder() {
            TransportError::Build(message)
        } else if message.contains("certificate")
            || message.contains("TLS")
            || message.contains("SSL")
        {
            TransportError::Tls(message)
        } else if err.is_connect() || err.is_request() {
            TransportError::Network(message)
        } else if err.is_decode() || err.is_body() || err.is_redirect() {
            TransportError::Protocol(message)
        } else {
            TransportError::Network(message)
        }
    }
}

/// Convert URL parsing errors to TransportError.
impl From<url::ParseError> for TransportError {
    fn from(err: url::ParseError) -> Self {
        TransportError::InvalidUrl(err.to_string())
    }
}
