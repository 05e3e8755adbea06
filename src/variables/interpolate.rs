//! Template interpolation.
//!
//! Replaces `{{name}}` markers with values from a [`VariableStore`]. The scan is
//! a single left-to-right pass: substituted values are never rescanned, and
//! markers that do not resolve are left in place, braces included.

use super::store::VariableStore;
use super::system::resolve_dynamic_variable;
use crate::models::{ApiKeyLocation, AuthSpec, RequestBody, RequestDefinition};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::{Map, Value};
use url::form_urlencoded;

/// Matches `{{identifier}}`. The identifier is taken verbatim.
static VARIABLE_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{([^{}]+)\}\}").expect("Failed to compile variable regex"));

/// Resolves a single reference: scoped variables first, then dynamic `$` names.
fn resolve_reference(name: &str, store: &VariableStore) -> Option<String> {
    store.get(name).or_else(|| {
        if name.starts_with('$') {
            resolve_dynamic_variable(name)
        } else {
            None
        }
    })
}

/// Replaces every resolvable `{{name}}` in `text`.
///
/// # Examples
///
/// ```
/// use rest_workbench::variables::{interpolate, VariableScope, VariableStore};
///
/// let mut store = VariableStore::new();
/// store.set(VariableScope::Global, "host", "example.com", "").unwrap();
///
/// assert_eq!(interpolate("https://{{host}}/{{path}}", &store), "https://example.com/{{path}}");
/// ```
pub fn interpolate(text: &str, store: &VariableStore) -> String {
    if !text.contains("{{") {
        return text.to_string();
    }

    VARIABLE_REGEX
        .replace_all(text, |caps: &Captures| {
            resolve_reference(&caps[1], store).unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

/// Interpolates strings anywhere inside a JSON value, including object keys.
///
/// Arrays keep their length and order; non-string scalars pass through.
pub fn deep_interpolate(value: &Value, store: &VariableStore) -> Value {
    match value {
        Value::String(s) => Value::String(interpolate(s, store)),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| deep_interpolate(item, store))
                .collect(),
        ),
        Value::Object(map) => {
            let mut rebuilt = Map::with_capacity(map.len());
            for (key, item) in map {
                rebuilt.insert(interpolate(key, store), deep_interpolate(item, store));
            }
            Value::Object(rebuilt)
        }
        other => other.clone(),
    }
}

/// Produces the interpolated working copy of a request.
///
/// URL, headers, params, auth and body (when present) are interpolated. The
/// params are then merged into the URL query string, and an API key
/// configured for the query string is appended last.
pub fn resolve_request(request: &RequestDefinition, store: &VariableStore) -> RequestDefinition {
    let mut resolved = request.clone();

    resolved.url = interpolate(&request.url, store);
    resolved.headers = request
        .headers
        .iter()
        .map(|(k, v)| (interpolate(k, store), interpolate(v, store)))
        .collect();
    resolved.params = request
        .params
        .iter()
        .map(|(k, v)| (interpolate(k, store), interpolate(v, store)))
        .collect();
    resolved.auth = resolve_auth(&request.auth, store);
    resolved.body = request.body.as_ref().map(|body| match body {
        RequestBody::Text(text) => RequestBody::Text(interpolate(text, store)),
        RequestBody::Structured(value) => RequestBody::Structured(deep_interpolate(value, store)),
    });

    if !resolved.params.is_empty() {
        let pairs: Vec<(String, String)> = resolved
            .params
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        resolved.url = merge_query(&resolved.url, &pairs);
    }

    if let AuthSpec::ApiKey {
        key,
        value,
        add_to: ApiKeyLocation::Query,
    } = &resolved.auth
    {
        resolved.url = merge_query(&resolved.url, &[(key.clone(), value.clone())]);
    }

    resolved
}

fn resolve_auth(auth: &AuthSpec, store: &VariableStore) -> AuthSpec {
    match auth {
        AuthSpec::None => AuthSpec::None,
        AuthSpec::Basic { username, password } => AuthSpec::Basic {
            username: interpolate(username, store),
            password: interpolate(password, store),
        },
        AuthSpec::Bearer { token } => AuthSpec::Bearer {
            token: interpolate(token, store),
        },
        AuthSpec::ApiKey { key, value, add_to } => AuthSpec::ApiKey {
            key: interpolate(key, store),
            value: interpolate(value, store),
            add_to: *add_to,
        },
        AuthSpec::OAuth2 {
            access_token,
            token_type,
        } => AuthSpec::OAuth2 {
            access_token: interpolate(access_token, store),
            token_type: interpolate(token_type, store),
        },
    }
}

/// Sets query parameters on a URL string, replacing existing pairs with the
/// same key. Other existing pairs are kept byte for byte; only the new pairs
/// are form-encoded. The fragment, if any, stays at the end.
pub fn merge_query(url: &str, pairs: &[(String, String)]) -> String {
    if pairs.is_empty() {
        return url.to_string();
    }

    let (without_fragment, fragment) = match url.split_once('#') {
        Some((head, frag)) => (head, Some(frag)),
        None => (url, None),
    };
    let (base, query) = match without_fragment.split_once('?') {
        Some((base, query)) => (base, query),
        None => (without_fragment, ""),
    };

    let mut segments: Vec<String> = query
        .split('&')
        .filter(|segment| !segment.is_empty())
        .filter(|segment| !pairs.iter().any(|(key, _)| *key == segment_key(segment)))
        .map(str::to_string)
        .collect();
    segments.push(
        form_urlencoded::Serializer::new(String::new())
            .extend_pairs(pairs)
            .finish(),
    );

    let mut merged = format!("{}?{}", base, segments.join("&"));
    if let Some(fragment) = fragment {
        merged.push('#');
        merged.push_str(fragment);
    }
    merged
}

/// Decoded key of one `k=v` (or bare `k`) query segment.
fn segment_key(segment: &str) -> String {
    let raw = segment.split_once('=').map_or(segment, |(key, _)| key);
    form_urlencoded::parse(raw.as_bytes())
        .next()
        .map(|(key, _)| key.into_owned())
        .unwrap_or_default()
}
