//! Request building, transport and response normalization.
//!
//! The executor owns everything between a resolved [`RequestDefinition`]
//! and a [`ProcessedResponse`]:
//!
//! 1. [`build_request`] shapes headers, auth and body into a
//!    [`TransportRequest`].
//! 2. A [`Transport`] sends it. [`ReqwestTransport`] is the default.
//! 3. [`normalize_response`] turns the raw bytes into a processed response.
//!
//! [`RequestDefinition`]: crate::models::RequestDefinition
//! [`ProcessedResponse`]: crate::models::ProcessedResponse

pub mod builder;
pub mod config;
pub mod error;
pub mod normalize;

pub use builder::{build_request, encode_form, BodyData, BuildError, TransportRequest};
pub use config::ExecutionConfig;
pub use error::TransportError;
pub use normalize::normalize_response;

use crate::config::ClientConfig;
use crate::models::{HeaderMap, HttpMethod, RawResponse};
use async_trait::async_trait;
use reqwest::header::{HeaderName, HeaderValue};
use std::time::{Duration, Instant};

/// Sends built requests.
///
/// Implementations must honor `timeout` and report a missing response as an
/// error rather than a response with status 0.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(
        &self,
        request: &TransportRequest,
        timeout: Duration,
    ) -> Result<RawResponse, TransportError>;
}

/// Sends a request and measures how long it took.
///
/// A response with status 0 is turned into [`TransportError::NoResponse`] so
/// that it never reaches the normalizer.
pub async fn execute(
    transport: &dyn Transport,
    request: &TransportRequest,
    timeout: Duration,
) -> Result<(RawResponse, Duration), TransportError> {
    let start = Instant::now();
    let raw = transport.send(request, timeout).await?;
    let elapsed = start.elapsed();

    if raw.status == 0 {
        return Err(TransportError::NoResponse);
    }
    log::debug!(
        "{} {} -> {} in {} ms",
        request.method,
        request.url,
        raw.status,
        elapsed.as_millis()
    );
    Ok((raw, elapsed))
}

/// [`Transport`] backed by a shared `reqwest` client.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Builds a client that follows the redirect, TLS and default-header
    /// settings of `config`.
    ///
    /// # Examples
    ///
    /// ```
    /// use rest_workbench::config::ClientConfig;
    /// use rest_workbench::executor::ReqwestTransport;
    ///
    /// let transport = ReqwestTransport::new(&ClientConfig::default()).unwrap();
    /// ```
    pub fn new(config: &ClientConfig) -> Result<Self, TransportError> {
        let redirect = if config.follow_redirects {
            reqwest::redirect::Policy::limited(config.max_redirects as usize)
        } else {
            reqwest::redirect::Policy::none()
        };

        let mut default_headers = reqwest::header::HeaderMap::new();
        for (name, value) in &config.default_headers {
            match (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                (Ok(name), Ok(value)) => {
                    default_headers.insert(name, value);
                }
                _ => log::warn!("Ignoring invalid default header '{}'", name),
            }
        }

        let client = reqwest::Client::builder()
            .redirect(redirect)
            .danger_accept_invalid_certs(!config.validate_ssl)
            .default_headers(default_headers)
            .build()
            .map_err(|e| TransportError::Build(e.to_string()))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(
        &self,
        request: &TransportRequest,
        timeout: Duration,
    ) -> Result<RawResponse, TransportError> {
        let url = url::Url::parse(&request.url)?;
        match url.scheme() {
            "http" | "https" => {}
            other => return Err(TransportError::UnsupportedProtocol(other.to_string())),
        }

        let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        let mut builder = self
            .client
            .request(to_reqwest_method(request.method), url)
            .timeout(timeout);

        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        builder = match &request.body {
            BodyData::Empty => builder,
            BodyData::Text(text) => builder.body(text.clone()),
            BodyData::UrlEncoded(pairs) => builder.body(encode_form(pairs)),
            BodyData::Multipart(fields) => {
                let form = fields
                    .iter()
                    .fold(reqwest::multipart::Form::new(), |form, (k, v)| {
                        form.text(k.clone(), v.clone())
                    });
                builder.multipart(form)
            }
        };

        let response = builder
            .send()
            .await
            .map_err(|e| TransportError::from_reqwest(e, timeout_ms))?;

        let status = response.status();
        let headers: HeaderMap = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();

        let body = response
            .bytes()
            .await
            .map_err(|e| TransportError::from_reqwest(e, timeout_ms))?
            .to_vec();

        Ok(RawResponse {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or("").to_string(),
            headers,
            body,
        })
    }
}

fn to_reqwest_method(method: HttpMethod) -> reqwest::Method {
    match method {
        HttpMethod::GET => reqwest::Method::GET,
        HttpMethod::POST => reqwest::Method::POST,
        HttpMethod::PUT => reqwest::Method::PUT,
        HttpMethod::DELETE => reqwest::Method::DELETE,
        HttpMethod::PATCH => reqwest::Method::PATCH,
        HttpMethod::HEAD => reqwest::Method::HEAD,
        HttpMethod::OPTIONS => reqwest::Method::OPTIONS,
        HttpMethod::TRACE => reqwest::Method::TRACE,
        HttpMethod::CONNECT => reqwest::Method::CONNECT,
    }
}
