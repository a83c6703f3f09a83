//! Generic Canvas resource access.
//!
//! # Design
//! `ResourceClient` is the seam between the per-resource services and the
//! wire. Services hand it a path (`/api/v1/...`) and query parameters and get
//! JSON back; authentication, URL assembly, status interpretation and
//! pagination all live behind the trait.
//!
//! `CanvasClient` is the HTTP implementation. It holds only its configuration
//! and a `Transport`, and carries no mutable state between calls.

use std::collections::HashSet;

use secrecy::ExposeSecret;
use serde_json::Value;
use tracing::{debug, trace};
use url::Url;

use crate::config::CanvasConfig;
use crate::error::ApiError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse, Transport, UreqTransport};
use crate::sis::{self, SisField};

/// Query parameters as ordered key/value pairs.
pub type Params = [(String, String)];

/// Access to Canvas REST resources.
///
/// `get_paged` consumes every page before returning. Errors from any request
/// abort the whole call. Next-page links are only followed within the origin
/// of the configured base URL, and each page URL is fetched at most once.
pub trait ResourceClient {
    fn get(&self, url: &str, params: &Params) -> Result<Value, ApiError>;

    fn get_paged(&self, url: &str, params: &Params) -> Result<Vec<Value>, ApiError>;

    fn post(&self, url: &str, body: &Value) -> Result<Value, ApiError>;

    fn put(&self, url: &str, body: &Value) -> Result<Value, ApiError>;

    /// Turn a SIS identifier into the reference form accepted in URL paths.
    fn resolve_sis_id(&self, value: &str, field: SisField) -> String {
        sis::sis_id(value, field)
    }
}

/// HTTP-backed `ResourceClient`.
#[derive(Clone)]
pub struct CanvasClient<T = UreqTransport> {
    config: CanvasConfig,
    transport: T,
}

impl CanvasClient<UreqTransport> {
    pub fn from_config(config: CanvasConfig) -> Self {
        Self::new(config, UreqTransport::new())
    }
}

impl<T: Transport> CanvasClient<T> {
    pub fn new(config: CanvasConfig, transport: T) -> Self {
        Self { config, transport }
    }

    pub fn config(&self) -> &CanvasConfig {
        &self.config
    }

    fn absolute_url(&self, path: &str, params: &Params) -> String {
        let mut url = format!("{}{}", self.config.base_url, path);
        if !params.is_empty() {
            url.push('?');
            url.push_str(&encode_query(params));
        }
        url
    }

    fn build_request(&self, method: HttpMethod, url: String, body: Option<&Value>) -> Result<HttpRequest, ApiError> {
        let mut headers = vec![("accept".to_string(), "application/json".to_string())];
        if let Some(token) = &self.config.token {
            headers.push(("authorization".to_string(), format!("Bearer {}", token.expose_secret())));
        }
        let body = match body {
            Some(value) => {
                headers.push(("content-type".to_string(), "application/json".to_string()));
                Some(serde_json::to_string(value).map_err(|e| ApiError::Serialization(e.to_string()))?)
            }
            None => None,
        };
        Ok(HttpRequest {
            method,
            url,
            headers,
            body,
        })
    }

    /// Resolve a `Link` target against the base URL, refusing other origins.
    fn same_origin_link(&self, base: &Url, link: &str) -> Result<String, ApiError> {
        let target = base
            .join(link)
            .map_err(|e| ApiError::Deserialization(format!("bad next-page link {link:?}: {e}")))?;
        if target.origin() != base.origin() {
            return Err(ApiError::ForeignLink { url: link.to_string() });
        }
        Ok(target.into())
    }

    fn send(&self, request: HttpRequest) -> Result<HttpResponse, ApiError> {
        debug!(method = ?request.method, url = %request.url, "canvas request");
        let response = self.transport.execute(request)?;
        trace!(status = response.status, "canvas response");
        check_status(&response)?;
        Ok(response)
    }
}

impl<T: Transport> ResourceClient for CanvasClient<T> {
    fn get(&self, url: &str, params: &Params) -> Result<Value, ApiError> {
        let request = self.build_request(HttpMethod::Get, self.absolute_url(url, params), None)?;
        parse_body(&self.send(request)?)
    }

    fn get_paged(&self, url: &str, params: &Params) -> Result<Vec<Value>, ApiError> {
        let mut params = params.to_vec();
        if !params.iter().any(|(key, _)| key == "per_page") {
            params.push(("per_page".to_string(), self.config.per_page.to_string()));
        }

        let base = Url::parse(&self.config.base_url)
            .map_err(|e| ApiError::Config(format!("invalid base URL {:?}: {e}", self.config.base_url)))?;
        let mut items = Vec::new();
        let mut visited = HashSet::new();
        let mut next = Some(self.absolute_url(url, &params));
        let mut page = 0u32;
        while let Some(page_url) = next.take() {
            if !visited.insert(page_url.clone()) {
                debug!(url = %page_url, "next-page link already fetched, stopping");
                break;
            }
            page += 1;
            let request = self.build_request(HttpMethod::Get, page_url.clone(), None)?;
            let response = self.send(request)?;

            match parse_body(&response)? {
                Value::Array(mut page_items) => {
                    debug!(page, count = page_items.len(), "canvas page");
                    items.append(&mut page_items);
                }
                other => {
                    return Err(ApiError::Deserialization(format!(
                        "expected a JSON array on page {page} of {url}, got {}",
                        json_kind(&other)
                    )))
                }
            }

            next = match response.header("link").and_then(next_link) {
                Some(link) => Some(self.same_origin_link(&base, &link)?),
                None => None,
            };
        }
        Ok(items)
    }

    fn post(&self, url: &str, body: &Value) -> Result<Value, ApiError> {
        let request = self.build_request(HttpMethod::Post, self.absolute_url(url, &[]), Some(body))?;
        parse_body(&self.send(request)?)
    }

    fn put(&self, url: &str, body: &Value) -> Result<Value, ApiError> {
        let request = self.build_request(HttpMethod::Put, self.absolute_url(url, &[]), Some(body))?;
        parse_body(&self.send(request)?)
    }
}

/// Map non-success status codes to the appropriate `ApiError` variant.
fn check_status(response: &HttpResponse) -> Result<(), ApiError> {
    if (200..300).contains(&response.status) {
        return Ok(());
    }
    if response.status == 404 {
        return Err(ApiError::NotFound);
    }
    Err(ApiError::HttpError {
        status: response.status,
        body: response.body.clone(),
    })
}

fn parse_body(response: &HttpResponse) -> Result<Value, ApiError> {
    if response.body.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(&response.body).map_err(|e| ApiError::Deserialization(e.to_string()))
}

fn encode_query(params: &Params) -> String {
    params
        .iter()
        .map(|(key, value)| format!("{}={}", urlencoding::encode(key), urlencoding::encode(value)))
        .collect::<Vec<_>>()
        .join("&")
}

/// Extract the `rel="next"` target from an RFC 8288 `Link` header.
fn next_link(header: &str) -> Option<String> {
    header.split(',').find_map(|entry| {
        let mut parts = entry.split(';');
        let target = parts.next()?.trim();
        let is_next = parts.any(|param| {
            let param = param.trim();
            param == "rel=\"next\"" || param == "rel=next"
        });
        if !is_next {
            return None;
        }
        target
            .strip_prefix('<')
            .and_then(|t| t.strip_suffix('>'))
            .map(str::to_string)
    })
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
