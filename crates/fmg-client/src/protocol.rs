//! JSON-RPC wire types for the FortiManager API
//!
//! Every call is a single HTTP POST to `/jsonrpc` carrying one envelope:
//!
//! ```json
//! {"id": 7, "method": "get", "params": [{"url": "/sys/status"}], "session": "...", "verbose": 1}
//! ```
//!
//! The response carries one sub-result per entry in `params`, in order:
//!
//! ```json
//! {"id": 7, "result": [{"status": {"code": 0, "message": "OK"}, "url": "/sys/status", "data": {}}]}
//! ```

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{FmgError, Result};

/// JSON-RPC method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    Get,
    Set,
    Add,
    Update,
    Delete,
    Move,
    Exec,
    Clone,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "get",
            Method::Set => "set",
            Method::Add => "add",
            Method::Update => "update",
            Method::Delete => "delete",
            Method::Move => "move",
            Method::Exec => "exec",
            Method::Clone => "clone",
        }
    }

    /// Only reads can be replayed without risk of applying a change twice.
    pub fn is_idempotent(&self) -> bool {
        matches!(self, Method::Get)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One sub-operation of a request: a URL, an optional payload and any
/// extra request options (`fields`, `filter`, `loadsub`, `range`, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Target {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(flatten)]
    pub options: Map<String, Value>,
}

impl Target {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            data: None,
            options: Map::new(),
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Attach a request option such as `fields` or `filter`.
    pub fn with_option(mut self, key: impl Into<String>, value: Value) -> Self {
        self.options.insert(key.into(), value);
        self
    }
}

/// Outgoing envelope
#[derive(Debug, Clone, Serialize)]
pub struct RequestEnvelope {
    pub id: u64,
    pub method: Method,
    pub params: Vec<Target>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<String>,
    pub verbose: u8,
}

impl RequestEnvelope {
    pub fn new(id: u64, method: Method, params: Vec<Target>, session: Option<String>) -> Self {
        Self {
            id,
            method,
            params,
            session,
            verbose: 1,
        }
    }
}

/// Numeric status reported per sub-result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcStatus {
    pub code: i64,
    #[serde(default)]
    pub message: String,
}

/// Classified outcome of a remote status code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusKind {
    Success,
    ObjectNotFound,
    PermissionDenied,
    InvalidParameter,
    ObjectAlreadyExists,
    SessionExpired,
    LockConflict,
    InternalServerError,
    Unknown(i64),
}

impl fmt::Display for StatusKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusKind::Success => f.write_str("success"),
            StatusKind::ObjectNotFound => f.write_str("object not found"),
            StatusKind::PermissionDenied => f.write_str("permission denied"),
            StatusKind::InvalidParameter => f.write_str("invalid parameter"),
            StatusKind::ObjectAlreadyExists => f.write_str("object already exists"),
            StatusKind::SessionExpired => f.write_str("session expired"),
            StatusKind::LockConflict => f.write_str("workspace lock conflict"),
            StatusKind::InternalServerError => f.write_str("internal server error"),
            StatusKind::Unknown(code) => write!(f, "unknown status {}", code),
        }
    }
}

/// Maps remote status codes to [`StatusKind`].
///
/// The defaults cover the codes observed across 6.4 to 7.6; deployments can
/// override individual codes through settings without touching the client.
#[derive(Debug, Clone)]
pub struct StatusTable {
    codes: HashMap<i64, StatusKind>,
}

impl Default for StatusTable {
    fn default() -> Self {
        let codes = HashMap::from([
            (0, StatusKind::Success),
            (-1, StatusKind::InternalServerError),
            (-2, StatusKind::InvalidParameter),
            (-3, StatusKind::ObjectNotFound),
            (-6, StatusKind::ObjectAlreadyExists),
            (-8, StatusKind::LockConflict),
            (-10, StatusKind::SessionExpired),
            (-11, StatusKind::PermissionDenied),
        ]);
        Self { codes }
    }
}

impl StatusTable {
    /// Default table with per-code overrides applied on top
    pub fn with_overrides(overrides: &HashMap<i64, StatusKind>) -> Self {
        let mut table = Self::default();
        for (code, kind) in overrides {
            table.codes.insert(*code, *kind);
        }
        table
    }

    pub fn classify(&self, code: i64) -> StatusKind {
        self.codes
            .get(&code)
            .copied()
            .unwrap_or(StatusKind::Unknown(code))
    }
}

/// One classified sub-result, aligned with the request target at the same index
#[derive(Debug, Clone, PartialEq)]
pub struct SubResult {
    pub status: RpcStatus,
    pub kind: StatusKind,
    pub url: String,
    pub data: Option<Value>,
}

impl SubResult {
    pub fn is_success(&self) -> bool {
        self.kind == StatusKind::Success
    }

    /// Payload on success, otherwise a [`FmgError::Remote`] describing the rejection.
    pub fn into_data(self) -> Result<Value> {
        if self.is_success() {
            Ok(self.data.unwrap_or(Value::Null))
        } else {
            Err(self.to_error())
        }
    }

    pub fn to_error(&self) -> FmgError {
        FmgError::Remote {
            kind: self.kind,
            code: self.status.code,
            message: self.status.message.clone(),
            url: self.url.clone(),
        }
    }
}

/// Parsed response envelope
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseEnvelope {
    pub id: u64,
    pub results: Vec<SubResult>,
    /// Session identifier issued by a login call
    pub session: Option<String>,
}

impl ResponseEnvelope {
    /// First sub-result whose status matches one of `kinds`
    pub fn find_kind(&self, kinds: &[StatusKind]) -> Option<&SubResult> {
        self.results.iter().find(|r| kinds.contains(&r.kind))
    }

    /// Unwrap a single-target response into its payload.
    pub fn into_single(self) -> Result<Value> {
        match self.results.into_iter().next() {
            Some(result) => result.into_data(),
            None => Err(FmgError::Transport {
                status: None,
                message: "response carried no results".to_string(),
                body: String::new(),
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    session: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireResult {
    status: RpcStatus,
    #[serde(default)]
    url: String,
    #[serde(default)]
    data: Option<Value>,
}

/// Parse a raw response body against the request it answers.
///
/// Returns a description of the problem when the body is not a well-formed
/// answer to `request`; the caller attaches the raw body.
pub(crate) fn parse_response(
    body: &str,
    request: &RequestEnvelope,
    table: &StatusTable,
) -> std::result::Result<ResponseEnvelope, String> {
    let wire: WireResponse =
        serde_json::from_str(body).map_err(|e| format!("response is not valid JSON: {}", e))?;

    let id = match wire.id {
        Some(Value::Number(n)) => n.as_u64(),
        Some(Value::String(s)) => s.parse().ok(),
        _ => None,
    };
    if id != Some(request.id) {
        return Err(format!(
            "response id {:?} does not match request id {}",
            id, request.id
        ));
    }

    // Some firmware returns a bare object instead of a one-element array.
    let raw_results = match wire.result {
        Some(Value::Array(items)) => items,
        Some(obj @ Value::Object(_)) => vec![obj],
        _ => return Err("response has no result list".to_string()),
    };

    if raw_results.len() != request.params.len() {
        return Err(format!(
            "expected {} results, got {}",
            request.params.len(),
            raw_results.len()
        ));
    }

    let mut results = Vec::with_capacity(raw_results.len());
    for raw in raw_results {
        let item: WireResult = serde_json::from_value(raw)
            .map_err(|e| format!("malformed result entry: {}", e))?;
        results.push(SubResult {
            kind: table.classify(item.status.code),
            status: item.status,
            url: item.url,
            data: item.data,
        });
    }

    Ok(ResponseEnvelope {
        id: request.id,
        results,
        session: wire.session,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(targets: usize) -> RequestEnvelope {
        let params = (0..targets)
            .map(|i| Target::new(format!("/obj/{}", i)))
            .collect();
        RequestEnvelope::new(42, Method::Get, params, Some("sid".to_string()))
    }

    #[test]
    fn test_envelope_serialization() {
        let target = Target::new("/pm/config/adom/root/obj/firewall/address")
            .with_data(json!({"name": "web"}))
            .with_option("fields", json!(["name"]));
        let env = RequestEnvelope::new(3, Method::Add, vec![target], Some("abc".into()));

        let value = serde_json::to_value(&env).unwrap();
        assert_eq!(value["method"], "add");
        assert_eq!(value["verbose"], 1);
        assert_eq!(value["session"], "abc");
        assert_eq!(value["params"][0]["fields"], json!(["name"]));
        assert_eq!(value["params"][0]["data"]["name"], "web");
    }

    #[test]
    fn test_envelope_without_session_omits_field() {
        let env = RequestEnvelope::new(1, Method::Exec, vec![Target::new("/sys/login/user")], None);
        let value = serde_json::to_value(&env).unwrap();
        assert!(value.get("session").is_none());
        assert!(value["params"][0].get("data").is_none());
    }

    #[test]
    fn test_only_get_is_idempotent() {
        assert!(Method::Get.is_idempotent());
        for m in [
            Method::Set,
            Method::Add,
            Method::Update,
            Method::Delete,
            Method::Move,
            Method::Exec,
            Method::Clone,
        ] {
            assert!(!m.is_idempotent(), "{} must not be idempotent", m);
        }
    }

    #[test]
    fn test_status_table_defaults_and_overrides() {
        let table = StatusTable::default();
        assert_eq!(table.classify(0), StatusKind::Success);
        assert_eq!(table.classify(-10), StatusKind::SessionExpired);
        assert_eq!(table.classify(-8), StatusKind::LockConflict);
        assert_eq!(table.classify(-9999), StatusKind::Unknown(-9999));

        let overrides = HashMap::from([(-20, StatusKind::PermissionDenied)]);
        let table = StatusTable::with_overrides(&overrides);
        assert_eq!(table.classify(-20), StatusKind::PermissionDenied);
        assert_eq!(table.classify(-3), StatusKind::ObjectNotFound);
    }

    #[test]
    fn test_parse_keeps_order() {
        let body = json!({
            "id": 42,
            "result": [
                {"status": {"code": 0, "message": "OK"}, "url": "/obj/0", "data": {"n": 0}},
                {"status": {"code": -3, "message": "Object does not exist"}, "url": "/obj/1"}
            ]
        })
        .to_string();

        let env = parse_response(&body, &request(2), &StatusTable::default()).unwrap();
        assert_eq!(env.results.len(), 2);
        assert_eq!(env.results[0].url, "/obj/0");
        assert!(env.results[0].is_success());
        assert_eq!(env.results[1].kind, StatusKind::ObjectNotFound);
    }

    #[test]
    fn test_parse_rejects_mismatches() {
        let table = StatusTable::default();

        let wrong_id = json!({"id": 1, "result": []}).to_string();
        assert!(parse_response(&wrong_id, &request(0), &table).is_err());

        let short = json!({
            "id": 42,
            "result": [{"status": {"code": 0}, "url": "/obj/0"}]
        })
        .to_string();
        assert!(parse_response(&short, &request(2), &table).is_err());

        assert!(parse_response("<html>", &request(1), &table).is_err());
    }

    #[test]
    fn test_parse_single_object_result() {
        let body = json!({
            "id": "42",
            "result": {"status": {"code": 0, "message": "OK"}, "url": "/obj/0"},
            "session": "fresh"
        })
        .to_string();

        let env = parse_response(&body, &request(1), &StatusTable::default()).unwrap();
        assert_eq!(env.session.as_deref(), Some("fresh"));
        assert_eq!(env.into_single().unwrap(), Value::Null);
    }
}
