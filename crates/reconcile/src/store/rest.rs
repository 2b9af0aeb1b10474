//! REST store.
//!
//! This module provides [`RestStore`], which reads and writes configuration
//! through an instance's REST API using a static bearer token.
//!
//! # Status mapping
//!
//! The API answers 403 for unknown ids as well as for forbidden ones, so both
//! 403 and 404 map to `Error::NotFound`. 401 maps to `Error::Unauthorized`.
//! Everything else outside 2xx becomes `Error::Http` with the message from
//! the `{errors: [{message}]}` envelope when there is one.

use super::{CollectionStore, FlowStore, PolicyStore, RoleStore};
use crate::error::{Error, Result};
use crate::types::entity_id;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use ureq::Agent;
use ureq::http::Response;

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

const USER_AGENT: &str = concat!("reconcile/", env!("CARGO_PKG_VERSION"));

/// Query that lifts the default page size on list endpoints.
const UNLIMITED: (&str, &str) = ("limit", "-1");

/// Unpaged listings can exceed ureq's default 10 MB body limit.
const MAX_BODY_SIZE: u64 = 256 * 1024 * 1024;

/// Store backed by a remote instance.
///
/// # Example
///
/// ```no_run
/// use reconcile::store::{RestStore, RoleStore};
///
/// let store = RestStore::connect("https://cms.example.com/", "static-token").unwrap();
/// let roles = store.list_roles().unwrap();
/// println!("Found {} roles", roles.len());
/// ```
pub struct RestStore {
    agent: Agent,
    base_url: String,
    auth: String,
}

/// Identity reported by `GET /server/info`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ServerInfo {
    #[serde(default)]
    pub project_name: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ServerInfoData {
    #[serde(default)]
    project: Option<ServerInfo>,
    #[serde(default)]
    version: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    errors: Vec<ErrorEntry>,
}

#[derive(Debug, Deserialize)]
struct ErrorEntry {
    message: String,
}

impl std::fmt::Debug for RestStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestStore")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl RestStore {
    /// Connect with the default timeout.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidRequest` if the url or token is empty.
    pub fn connect(url: &str, token: &str) -> Result<Self> {
        Self::connect_with_timeout(url, token, DEFAULT_TIMEOUT)
    }

    /// Connect with a custom per-request timeout.
    pub fn connect_with_timeout(url: &str, token: &str, timeout: Duration) -> Result<Self> {
        let base_url = normalize_base_url(url);
        if base_url.is_empty() {
            return Err(Error::InvalidRequest("remote url is required".into()));
        }
        if token.trim().is_empty() {
            return Err(Error::InvalidRequest("remote token is required".into()));
        }
        let config = Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(Some(timeout))
            .build();
        log::debug!("Connecting to {base_url}");
        Ok(Self {
            agent: config.into(),
            base_url,
            auth: format!("Bearer {}", token.trim()),
        })
    }

    /// Base URL without trailing slashes.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Read the server identity; doubles as a connection test.
    pub fn server_info(&self) -> Result<ServerInfo> {
        let data: ServerInfoData = serde_json::from_value(self.get("/server/info", &[])?)?;
        let mut info = data.project.unwrap_or_default();
        if info.version.is_none() {
            info.version = data.version;
        }
        Ok(info)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn get(&self, path: &str, query: &[(&str, &str)]) -> Result<Value> {
        log::debug!("GET {path}");
        let mut request = self
            .agent
            .get(self.url(path))
            .header("Authorization", &self.auth)
            .header("User-Agent", USER_AGENT);
        for (key, value) in query {
            request = request.query(*key, *value);
        }
        finish(path, request.call())
    }

    fn list(&self, path: &str, filter: Option<(&str, &str)>) -> Result<Vec<Value>> {
        let filter_key = filter.map(|(field, _)| format!("filter[{field}][_eq]"));
        let mut query = vec![UNLIMITED];
        if let (Some(key), Some((_, value))) = (filter_key.as_deref(), filter) {
            query.push((key, value));
        }
        match self.get(path, &query)? {
            Value::Array(items) => Ok(items),
            Value::Null => Ok(Vec::new()),
            other => Err(Error::InvalidResponse(format!(
                "expected a list from {path}, got {other}"
            ))),
        }
    }

    fn post(&self, path: &str, body: &Value) -> Result<()> {
        log::debug!("POST {path}");
        let result = self
            .agent
            .post(self.url(path))
            .header("Authorization", &self.auth)
            .header("User-Agent", USER_AGENT)
            .send_json(body);
        finish(path, result).map(drop)
    }

    fn patch(&self, path: &str, body: &Value) -> Result<()> {
        log::debug!("PATCH {path}");
        let result = self
            .agent
            .patch(self.url(path))
            .header("Authorization", &self.auth)
            .header("User-Agent", USER_AGENT)
            .send_json(body);
        finish(path, result).map(drop)
    }

    fn delete(&self, path: &str) -> Result<()> {
        log::debug!("DELETE {path}");
        let result = self
            .agent
            .delete(self.url(path))
            .header("Authorization", &self.auth)
            .header("User-Agent", USER_AGENT)
            .call();
        finish(path, result).map(drop)
    }
}

/// Percent-encode one path segment.
fn segment(value: &str) -> std::borrow::Cow<'_, str> {
    urlencoding::encode(value)
}

/// Strip surrounding whitespace and every trailing slash.
pub fn normalize_base_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}

/// Turn a response into the `data` member of its body, or an error.
fn finish(
    path: &str,
    result: std::result::Result<Response<ureq::Body>, ureq::Error>,
) -> Result<Value> {
    let mut response = result?;
    let status = response.status().as_u16();
    let body = response
        .body_mut()
        .with_config()
        .limit(MAX_BODY_SIZE)
        .read_to_string();
    if !(200..300).contains(&status) {
        // The envelope only refines the message; the status decides the error.
        return Err(status_error(status, path, body.as_deref().unwrap_or_default()));
    }
    let text = body.map_err(|e| Error::Http {
        message: format!("{path}: failed to read response body: {e}"),
        status: None,
    })?;
    if text.trim().is_empty() {
        return Ok(Value::Null);
    }
    let mut body: Value = serde_json::from_str(&text)?;
    Ok(body.get_mut("data").map(Value::take).unwrap_or(Value::Null))
}

/// Map a non-2xx status and body to an error.
fn status_error(status: u16, path: &str, body: &str) -> Error {
    let message = serde_json::from_str::<ErrorEnvelope>(body)
        .ok()
        .and_then(|e| e.errors.into_iter().next())
        .map_or_else(|| format!("HTTP {status}"), |e| e.message);
    match status {
        401 => Error::Unauthorized(message),
        403 | 404 => Error::NotFound(format!("{path}: {message}")),
        _ => Error::Http {
            message,
            status: Some(status),
        },
    }
}

impl CollectionStore for RestStore {
    fn list_collections(&self) -> Result<Vec<Value>> {
        self.list("/collections", None)
    }

    fn read_collection(&self, name: &str) -> Result<Value> {
        self.get(&format!("/collections/{}", segment(name)), &[])
    }

    fn create_collection(&self, payload: &Value) -> Result<()> {
        self.post("/collections", payload)
    }

    fn update_collection(&self, name: &str, patch: &Value) -> Result<()> {
        self.patch(&format!("/collections/{}", segment(name)), patch)
    }

    fn list_fields(&self, collection: &str) -> Result<Vec<Value>> {
        self.list(&format!("/fields/{}", segment(collection)), None)
    }

    fn read_field(&self, collection: &str, field: &str) -> Result<Value> {
        self.get(&format!("/fields/{}/{}", segment(collection), segment(field)), &[])
    }

    fn create_field(&self, collection: &str, payload: &Value) -> Result<()> {
        self.post(&format!("/fields/{}", segment(collection)), payload)
    }

    fn update_field(&self, collection: &str, field: &str, payload: &Value) -> Result<()> {
        self.patch(&format!("/fields/{}/{}", segment(collection), segment(field)), payload)
    }

    fn update_field_meta(&self, collection: &str, field: &str, meta: &Value) -> Result<()> {
        self.patch(
            &format!("/fields/{}/{}", segment(collection), segment(field)),
            &serde_json::json!({ "meta": meta }),
        )
    }
}

impl FlowStore for RestStore {
    fn list_flows(&self) -> Result<Vec<Value>> {
        self.list("/flows", None)
    }

    fn read_flow(&self, id: &str) -> Result<Value> {
        self.get(&format!("/flows/{}", segment(id)), &[])
    }

    fn create_flow(&self, payload: &Value) -> Result<()> {
        self.post("/flows", payload)
    }

    fn update_flow(&self, id: &str, patch: &Value) -> Result<()> {
        self.patch(&format!("/flows/{}", segment(id)), patch)
    }

    fn list_operations(&self, flow: &str) -> Result<Vec<Value>> {
        self.list("/operations", Some(("flow", flow)))
    }

    fn create_operation(&self, payload: &Value) -> Result<()> {
        self.post("/operations", payload)
    }

    fn update_operation(&self, id: &str, patch: &Value) -> Result<()> {
        self.patch(&format!("/operations/{}", segment(id)), patch)
    }

    fn delete_operation(&self, id: &str) -> Result<()> {
        self.delete(&format!("/operations/{}", segment(id)))
    }
}

impl RoleStore for RestStore {
    fn list_roles(&self) -> Result<Vec<Value>> {
        self.list("/roles", None)
    }

    fn read_role(&self, id: &str) -> Result<Value> {
        self.get(&format!("/roles/{}", segment(id)), &[])
    }

    fn create_role(&self, payload: &Value) -> Result<()> {
        self.post("/roles", payload)
    }

    fn update_role(&self, id: &str, patch: &Value) -> Result<()> {
        self.patch(&format!("/roles/{}", segment(id)), patch)
    }
}

impl PolicyStore for RestStore {
    fn list_policies(&self) -> Result<Vec<Value>> {
        self.list("/policies", None)
    }

    fn read_policy(&self, id: &str) -> Result<Value> {
        self.get(&format!("/policies/{}", segment(id)), &[])
    }

    fn create_policy(&self, payload: &Value) -> Result<()> {
        self.post("/policies", payload)
    }

    fn update_policy(&self, id: &str, patch: &Value) -> Result<()> {
        self.patch(&format!("/policies/{}", segment(id)), patch)
    }

    fn list_permissions(&self, policy: &str) -> Result<Vec<Value>> {
        self.list("/permissions", Some(("policy", policy)))
    }

    fn create_permission(&self, payload: &Value) -> Result<()> {
        self.post("/permissions", payload)
    }

    fn delete_permission(&self, id: &str) -> Result<()> {
        self.delete(&format!("/permissions/{}", segment(id)))
    }

    fn read_policy_roles(&self, policy: &str) -> Result<Vec<String>> {
        let rows = self.list("/access", Some(("policy", policy)))?;
        Ok(rows.iter().filter_map(|row| entity_id(row, "role")).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread::JoinHandle;

    /// Answer one request on a local port with `response`, then close.
    /// The handle yields the request head.
    fn serve_once(response: String) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut head = Vec::new();
            let mut buf = [0u8; 1024];
            while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = stream.read(&mut buf).unwrap();
                if n == 0 {
                    break;
                }
                head.extend_from_slice(&buf[..n]);
            }
            stream.write_all(response.as_bytes()).unwrap();
            String::from_utf8_lossy(&head).into_owned()
        });
        (format!("http://{addr}"), handle)
    }

    fn json_response(body: &str) -> String {
        format!(
            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        )
    }

    #[test]
    fn test_list_reads_data_envelope() {
        let (url, server) = serve_once(json_response(r#"{"data":[{"id":"r1","name":"Editor"}]}"#));
        let store = RestStore::connect(&url, "token").unwrap();
        let roles = store.list_roles().unwrap();
        assert_eq!(roles.len(), 1);
        assert_eq!(roles[0]["name"], "Editor");
        let head = server.join().unwrap();
        assert!(head.starts_with("GET /roles?limit=-1 "));
        assert!(head.contains("Bearer token"));
    }

    #[test]
    fn test_truncated_body_is_an_error() {
        let response = "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: 5000\r\n\r\n{\"data\":[{\"id\":\"r1\"";
        let (url, server) = serve_once(response.to_string());
        let store = RestStore::connect(&url, "token").unwrap();
        let err = store.list_roles().unwrap_err();
        server.join().unwrap();
        match err {
            Error::Http { message, status } => {
                assert_eq!(status, None);
                assert!(message.contains("/roles"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_identities_are_encoded_in_paths() {
        assert_eq!(segment("articles"), "articles");
        assert_eq!(segment("a/b?c#d"), "a%2Fb%3Fc%23d");

        let (url, server) = serve_once(json_response(r#"{"data":{"id":"a/b"}}"#));
        let store = RestStore::connect(&url, "token").unwrap();
        let role = store.read_role("a/b").unwrap();
        assert_eq!(role["id"], "a/b");
        assert!(server.join().unwrap().starts_with("GET /roles/a%2Fb "));
    }

    #[test]
    fn test_normalize_base_url() {
        assert_eq!(
            normalize_base_url("https://x.example.com///"),
            "https://x.example.com"
        );
        assert_eq!(normalize_base_url(" http://localhost:8055 "), "http://localhost:8055");
        assert_eq!(normalize_base_url("/"), "");
    }

    #[test]
    fn test_connect_validates_inputs() {
        let err = RestStore::connect("", "token").unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)));
        let err = RestStore::connect("https://x.example.com", "  ").unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)));

        let store = RestStore::connect("https://x.example.com///", "token").unwrap();
        assert_eq!(store.base_url(), "https://x.example.com");
        assert_eq!(store.url("/roles"), "https://x.example.com/roles");
    }

    #[test]
    fn test_status_error_mapping() {
        let body = r#"{"errors":[{"message":"You don't have permission to access this.","extensions":{"code":"FORBIDDEN"}}]}"#;
        let err = status_error(403, "/flows/f1", body);
        assert!(err.is_not_found());
        assert!(err.to_string().contains("You don't have permission"));

        assert!(status_error(404, "/roles/r1", "").is_not_found());

        let err = status_error(401, "/roles", r#"{"errors":[{"message":"Invalid user credentials."}]}"#);
        assert!(matches!(err, Error::Unauthorized(ref m) if m == "Invalid user credentials."));

        match status_error(400, "/fields/articles", "not json") {
            Error::Http { message, status } => {
                assert_eq!(message, "HTTP 400");
                assert_eq!(status, Some(400));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(status_error(503, "/flows", "").is_retryable());
    }

    #[test]
    fn test_debug_hides_token() {
        let store = RestStore::connect("https://x.example.com", "secret").unwrap();
        assert!(!format!("{store:?}").contains("secret"));
    }
}
