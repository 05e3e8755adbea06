//! HTTP authentication.
//!
//! Turns a request's [`AuthSpec`] into headers. API keys configured for the
//! query string are not handled here; they are appended to the URL during
//! interpolation.

pub mod basic;

use crate::models::{ApiKeyLocation, AuthSpec};
use std::collections::HashMap;

/// Token type used for OAuth2 when the request leaves it empty.
pub const DEFAULT_TOKEN_TYPE: &str = "Bearer";

/// Injects the headers described by `auth` into `headers`.
///
/// An injected `Authorization` header replaces any existing one, whatever its
/// casing.
///
/// # Examples
///
/// ```
/// use rest_workbench::auth::apply_auth_headers;
/// use rest_workbench::models::AuthSpec;
/// use std::collections::HashMap;
///
/// let mut headers = HashMap::new();
/// apply_auth_headers(&mut headers, &AuthSpec::Bearer { token: "abc".to_string() });
/// assert_eq!(headers["Authorization"], "Bearer abc");
/// ```
pub fn apply_auth_headers(headers: &mut HashMap<String, String>, auth: &AuthSpec) {
    match auth {
        AuthSpec::None => {}
        AuthSpec::Basic { username, password } => {
            set_authorization(headers, basic::basic_auth(username, password));
        }
        AuthSpec::Bearer { token } => {
            set_authorization(headers, format!("Bearer {}", token));
        }
        AuthSpec::ApiKey {
            key,
            value,
            add_to: ApiKeyLocation::Header,
        } => {
            headers.insert(key.clone(), value.clone());
        }
        AuthSpec::ApiKey {
            add_to: ApiKeyLocation::Query,
            ..
        } => {}
        AuthSpec::OAuth2 {
            access_token,
            token_type,
        } => {
            let token_type = if token_type.trim().is_empty() {
                DEFAULT_TOKEN_TYPE
            } else {
                token_type.as_str()
            };
            set_authorization(headers, format!("{} {}", token_type, access_token));
        }
    }
}

/// Replaces the Authorization header, matching the existing name case-insensitively.
fn set_authorization(headers: &mut HashMap<String, String>, value: String) {
    headers.retain(|k, _| !k.eq_ignore_ascii_case("authorization"));
    headers.insert("Authorization".to_string(), value);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apply(auth: AuthSpec) -> HashMap<String, String> {
        let mut headers = HashMap::new();
        headers.insert("authorization".to_string(), "stale".to_string());
        headers.insert("Accept".to_string(), "*/*".to_string());
        apply_auth_headers(&mut headers, &auth);
        headers
    }

    #[test]
    fn test_basic() {
        let headers = apply(AuthSpec::Basic {
            username: "user".to_string(),
            password: "pass".to_string(),
        });
        assert_eq!(headers["Authorization"], "Basic dXNlcjpwYXNz");
        assert!(!headers.contains_key("authorization"));
        assert_eq!(headers["Accept"], "*/*");
    }

    #[test]
    fn test_bearer() {
        let headers = apply(AuthSpec::Bearer {
            token: "tok".to_string(),
        });
        assert_eq!(headers["Authorization"], "Bearer tok");
    }

    #[test]
    fn test_api_key_header() {
        let headers = apply(AuthSpec::ApiKey {
            key: "X-API-Key".to_string(),
            value: "secret".to_string(),
            add_to: ApiKeyLocation::Header,
        });
        assert_eq!(headers["X-API-Key"], "secret");
        assert_eq!(headers["authorization"], "stale");
    }

    #[test]
    fn test_api_key_query_adds_no_header() {
        let headers = apply(AuthSpec::ApiKey {
            key: "api_key".to_string(),
            value: "secret".to_string(),
            add_to: ApiKeyLocation::Query,
        });
        assert!(!headers.contains_key("api_key"));
        assert_eq!(headers.len(), 2);
    }

    #[test]
    fn test_oauth2_token_type() {
        let headers = apply(AuthSpec::OAuth2 {
            access_token: "at".to_string(),
            token_type: "MAC".to_string(),
        });
        assert_eq!(headers["Authorization"], "MAC at");

        let headers = apply(AuthSpec::OAuth2 {
            access_token: "at".to_string(),
            token_type: String::new(),
        });
        assert_eq!(headers["Authorization"], "Bearer at");
    }

    #[test]
    fn test_none_leaves_headers() {
        let headers = apply(AuthSpec::None);
        assert_eq!(headers["authorization"], "stale");
    }
}
