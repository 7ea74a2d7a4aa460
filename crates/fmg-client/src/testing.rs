//! Test utilities for fmg-client
//!
//! [`MockAppliance`] is an in-process stand-in for a FortiManager that speaks
//! the JSON-RPC wire contract: it issues and expires sessions, tracks
//! workspace locks per caller, plays back task state sequences and can be
//! told to fail specific URLs.
//!
//! ```rust,ignore
//! use fmg_client::testing::MockAppliance;
//!
//! let mock = MockAppliance::start().await?;
//! let client = mock.connected_client().await?;
//! let status = client.system_status().await?;
//! ```

use std::collections::{HashMap, HashSet, VecDeque};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::{header::AUTHORIZATION, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::net::TcpListener;

use crate::config::{BackoffKind, ClientSettings};
use crate::error::{FmgError, Result};
use crate::FmgClient;

/// Version string reported by default
pub const DEFAULT_VERSION: &str = "v7.6.2-build3401 241107 (GA)";

/// Token accepted by [`MockAppliance::start`]
pub const DEFAULT_TOKEN: &str = "mock-api-token";

/// Failure injected into the next request that touches a URL
#[derive(Debug, Clone)]
pub enum Failure {
    /// Sub-result with this status code
    Status { code: i64, message: String },
    /// Whole response fails with this HTTP status
    Http(u16),
    /// Whole response body is not JSON
    Garbage,
    /// Response is delayed by this long
    Stall(Duration),
}

impl Failure {
    pub fn status(code: i64, message: impl Into<String>) -> Self {
        Failure::Status {
            code,
            message: message.into(),
        }
    }
}

/// One target of one request, as the mock saw it
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub method: String,
    pub url: String,
    pub data: Option<Value>,
    pub session: Option<String>,
    pub bearer: Option<String>,
}

struct MockState {
    status: Value,
    token: Option<String>,
    user: Option<(String, String)>,
    sessions: HashSet<String>,
    expired: HashSet<String>,
    next_session: u64,
    logins: usize,
    replies: HashMap<String, Value>,
    failures: HashMap<String, VecDeque<Failure>>,
    latency: HashMap<String, Duration>,
    locks: HashMap<String, String>,
    tasks: HashMap<u64, VecDeque<Value>>,
    calls: Vec<RecordedCall>,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            status: json!({
                "Hostname": "fmg-mock",
                "Platform Type": "FMG-VM64",
                "Serial Number": "FMG-VM0000000001",
                "Version": DEFAULT_VERSION,
            }),
            token: None,
            user: None,
            sessions: HashSet::new(),
            expired: HashSet::new(),
            next_session: 0,
            logins: 0,
            replies: HashMap::new(),
            failures: HashMap::new(),
            latency: HashMap::new(),
            locks: HashMap::new(),
            tasks: HashMap::new(),
            calls: Vec::new(),
        }
    }
}

struct Plan {
    delay: Duration,
    response: Response,
}

fn sub_result(url: &str, code: i64, message: &str, data: Option<Value>) -> Value {
    let mut result = json!({
        "status": {"code": code, "message": message},
        "url": url,
    });
    if let Some(data) = data {
        result["data"] = data;
    }
    result
}

impl MockState {
    fn plan(&mut self, request: &Value, bearer: Option<String>) -> Plan {
        let id = request.get("id").cloned().unwrap_or(Value::Null);
        let method = request
            .get("method")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let session = request
            .get("session")
            .and_then(Value::as_str)
            .map(str::to_string);
        let params = request
            .get("params")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let mut delay = Duration::ZERO;
        for param in &params {
            let url = param.get("url").and_then(Value::as_str).unwrap_or_default();
            self.calls.push(RecordedCall {
                method: method.clone(),
                url: url.to_string(),
                data: param.get("data").cloned(),
                session: session.clone(),
                bearer: bearer.clone(),
            });
            if let Some(latency) = self.latency.get(url) {
                delay = delay.max(*latency);
            }
        }

        // Envelope-wide failures queued on any target
        for param in &params {
            let url = param.get("url").and_then(Value::as_str).unwrap_or_default();
            let Some(queue) = self.failures.get_mut(url) else {
                continue;
            };
            match queue.front().cloned() {
                Some(Failure::Http(code)) => {
                    queue.pop_front();
                    let status =
                        StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
                    return Plan {
                        delay,
                        response: (status, "upstream failure").into_response(),
                    };
                }
                Some(Failure::Garbage) => {
                    queue.pop_front();
                    return Plan {
                        delay,
                        response: (StatusCode::OK, "<html>maintenance</html>").into_response(),
                    };
                }
                Some(Failure::Stall(extra)) => {
                    queue.pop_front();
                    delay += extra;
                }
                _ => {}
            }
        }

        let first_url = params
            .first()
            .and_then(|p| p.get("url"))
            .and_then(Value::as_str)
            .unwrap_or_default();
        if method == "exec" && first_url == "/sys/login/user" {
            let body = self.login(&id, &params[0]);
            return Plan {
                delay,
                response: Json(body).into_response(),
            };
        }

        let results: Vec<Value> = match self.authenticate(session.as_deref(), bearer.as_deref()) {
            Ok(caller) => params
                .iter()
                .map(|p| self.answer(&method, p, &caller))
                .collect(),
            Err((code, message)) => params
                .iter()
                .map(|p| {
                    let url = p.get("url").and_then(Value::as_str).unwrap_or_default();
                    sub_result(url, code, message, None)
                })
                .collect(),
        };

        Plan {
            delay,
            response: Json(json!({"id": id, "result": results})).into_response(),
        }
    }

    fn login(&mut self, id: &Value, param: &Value) -> Value {
        let url = "/sys/login/user";
        let data = param.get("data").cloned().unwrap_or(Value::Null);
        let user = data.get("user").and_then(Value::as_str);
        let passwd = data.get("passwd").and_then(Value::as_str);

        match &self.user {
            Some((u, p)) if user == Some(u.as_str()) && passwd == Some(p.as_str()) => {
                self.next_session += 1;
                self.logins += 1;
                let sid = format!("mock-session-{}", self.next_session);
                self.sessions.insert(sid.clone());
                json!({
                    "id": id,
                    "result": [sub_result(url, 0, "OK", None)],
                    "session": sid,
                })
            }
            _ => json!({
                "id": id,
                "result": [sub_result(url, -11, "Login fail", None)],
            }),
        }
    }

    fn authenticate(
        &self,
        session: Option<&str>,
        bearer: Option<&str>,
    ) -> std::result::Result<String, (i64, &'static str)> {
        if let Some(given) = bearer {
            return match &self.token {
                Some(expected) if expected == given => Ok("api-token".to_string()),
                _ => Err((-11, "No permission for the resource")),
            };
        }
        match session {
            Some(sid) if self.sessions.contains(sid) => Ok(sid.to_string()),
            Some(sid) if self.expired.contains(sid) => Err((-10, "The session is invalid")),
            _ => Err((-11, "No permission for the resource")),
        }
    }

    fn answer(&mut self, method: &str, param: &Value, caller: &str) -> Value {
        let url = param.get("url").and_then(Value::as_str).unwrap_or_default();

        if let Some(queue) = self.failures.get_mut(url) {
            if let Some(Failure::Status { code, message }) = queue.front().cloned() {
                queue.pop_front();
                return sub_result(url, code, &message, None);
            }
        }

        if url == "/sys/logout" {
            self.sessions.remove(caller);
            return sub_result(url, 0, "OK", None);
        }

        if let Some((adom, action)) = url
            .strip_prefix("/dvmdb/adom/")
            .and_then(|rest| rest.split_once("/workspace/"))
        {
            return self.workspace(url, adom, action, caller);
        }

        if let Some(rest) = url.strip_prefix("/task/task/") {
            return self.task(url, rest);
        }

        if let Some(data) = self.replies.get(url) {
            return sub_result(url, 0, "OK", Some(data.clone()));
        }

        if url == "/sys/status" {
            return sub_result(url, 0, "OK", Some(self.status.clone()));
        }

        match method {
            "get" => sub_result(url, -3, "Object does not exist", None),
            _ => {
                let echo = param
                    .get("data")
                    .and_then(|d| d.get("name"))
                    .map(|name| json!({"name": name}));
                sub_result(url, 0, "OK", echo)
            }
        }
    }

    fn workspace(&mut self, url: &str, adom: &str, action: &str, caller: &str) -> Value {
        let held_by_other = self
            .locks
            .get(adom)
            .map(|holder| holder != caller)
            .unwrap_or(false);

        match action {
            "lock" if held_by_other => sub_result(
                url,
                -8,
                "Workspace is locked by another administrator",
                None,
            ),
            "lock" => {
                self.locks.insert(adom.to_string(), caller.to_string());
                sub_result(url, 0, "OK", None)
            }
            "unlock" | "commit" if held_by_other => {
                sub_result(url, -8, "Workspace is locked by another administrator", None)
            }
            "unlock" => {
                self.locks.remove(adom);
                sub_result(url, 0, "OK", None)
            }
            "commit" => sub_result(url, 0, "OK", None),
            _ => sub_result(url, -3, "Object does not exist", None),
        }
    }

    fn task(&mut self, url: &str, rest: &str) -> Value {
        let (id, lines) = match rest.strip_suffix("/line") {
            Some(id) => (id, true),
            None => (rest, false),
        };
        let Some(queue) = id.parse::<u64>().ok().and_then(|id| self.tasks.get_mut(&id)) else {
            return sub_result(url, -3, "Task does not exist", None);
        };

        let snapshot = if lines {
            queue.front().cloned()
        } else if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        };

        let snapshot = snapshot.unwrap_or(Value::Null);
        if lines {
            let line = snapshot.get("line").cloned().unwrap_or_else(|| json!([]));
            sub_result(url, 0, "OK", Some(line))
        } else {
            sub_result(url, 0, "OK", Some(snapshot))
        }
    }
}

type Shared = Arc<Mutex<MockState>>;

async fn handle_rpc(State(state): State<Shared>, headers: HeaderMap, body: String) -> Response {
    let request: Value = match serde_json::from_str(&body) {
        Ok(v) => v,
        Err(_) => return (StatusCode::BAD_REQUEST, "invalid JSON").into_response(),
    };
    let bearer = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string);

    let plan = state.lock().plan(&request, bearer);
    if !plan.delay.is_zero() {
        tokio::time::sleep(plan.delay).await;
    }
    plan.response
}

/// Builder for [`MockAppliance`]
pub struct MockApplianceBuilder {
    state: MockState,
}

impl MockApplianceBuilder {
    /// Report this `Version` string from `/sys/status`
    pub fn version(mut self, version: &str) -> Self {
        self.state.status["Version"] = json!(version);
        self
    }

    /// Replace the whole `/sys/status` payload
    pub fn status(mut self, status: Value) -> Self {
        self.state.status = status;
        self
    }

    /// Accept this API token
    pub fn token(mut self, token: &str) -> Self {
        self.state.token = Some(token.to_string());
        self
    }

    /// Accept this username/password for session login
    pub fn credentials(mut self, user: &str, password: &str) -> Self {
        self.state.user = Some((user.to_string(), password.to_string()));
        self
    }

    pub async fn start(self) -> Result<MockAppliance> {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| FmgError::Internal(format!("mock appliance bind failed: {}", e)))?;
        let addr = listener
            .local_addr()
            .map_err(|e| FmgError::Internal(format!("mock appliance address: {}", e)))?;

        let state: Shared = Arc::new(Mutex::new(self.state));
        let router = Router::new()
            .route("/jsonrpc", post(handle_rpc))
            .with_state(state.clone());

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();

        let handle = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .ok();
        });

        // Give server a moment to start
        tokio::time::sleep(Duration::from_millis(10)).await;

        Ok(MockAppliance {
            addr,
            state,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        })
    }
}

/// A mock appliance that shuts down when dropped
pub struct MockAppliance {
    pub addr: SocketAddr,
    state: Shared,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
    handle: Option<tokio::task::JoinHandle<()>>,
}

impl MockAppliance {
    pub fn builder() -> MockApplianceBuilder {
        MockApplianceBuilder {
            state: MockState::default(),
        }
    }

    /// Start with token authentication using [`DEFAULT_TOKEN`]
    pub async fn start() -> Result<Self> {
        Self::builder().token(DEFAULT_TOKEN).start().await
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Settings pointing at this mock with its credentials and short
    /// timeouts suited to tests
    pub fn settings(&self) -> Result<ClientSettings> {
        let builder = ClientSettings::builder(self.base_url())
            .backoff(BackoffKind::Exponential, 10, 50)
            .request_timeout_ms(2_000)
            .connect_timeout_ms(1_000)
            .task_poll(20, 2_000);

        let state = self.state.lock();
        let builder = match (&state.token, &state.user) {
            (Some(token), _) => builder.token(token.clone()),
            (None, Some((user, password))) => builder.password(user.clone(), password.clone()),
            (None, None) => builder.token(DEFAULT_TOKEN),
        };
        Ok(builder.build()?)
    }

    /// A client for this mock that is already logged in
    pub async fn connected_client(&self) -> Result<FmgClient> {
        let client = FmgClient::new(self.settings()?)?;
        client.connect().await?;
        Ok(client)
    }

    /// Answer successful requests for `url` with `data`
    pub fn reply(&self, url: &str, data: Value) {
        self.state.lock().replies.insert(url.to_string(), data);
    }

    /// Queue a failure for the next request touching `url`
    pub fn fail_next(&self, url: &str, failure: Failure) {
        self.state
            .lock()
            .failures
            .entry(url.to_string())
            .or_default()
            .push_back(failure);
    }

    /// Delay every response that touches `url`
    pub fn set_latency(&self, url: &str, latency: Duration) {
        self.state.lock().latency.insert(url.to_string(), latency);
    }

    /// Successive `/task/task/{id}` snapshots; the last one repeats
    pub fn task_states(&self, task_id: u64, snapshots: Vec<Value>) {
        self.state
            .lock()
            .tasks
            .insert(task_id, snapshots.into_iter().collect());
    }

    /// Pretend another administrator holds the workspace lock of `adom`
    pub fn lock_as(&self, adom: &str, holder: &str) {
        self.state
            .lock()
            .locks
            .insert(adom.to_string(), holder.to_string());
    }

    pub fn lock_holder(&self, adom: &str) -> Option<String> {
        self.state.lock().locks.get(adom).cloned()
    }

    /// Invalidate every live session; later requests using them get -10
    pub fn expire_sessions(&self) {
        let mut state = self.state.lock();
        let live: Vec<String> = state.sessions.drain().collect();
        state.expired.extend(live);
    }

    /// Number of successful password logins
    pub fn logins(&self) -> usize {
        self.state.lock().logins
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state.lock().calls.clone()
    }

    /// Number of targets seen for `url`
    pub fn count(&self, url: &str) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|c| c.url == url)
            .count()
    }

    /// Shutdown the server gracefully
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for MockAppliance {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

/// Wait for a condition with timeout
pub async fn wait_for<F>(condition: F, timeout: Duration) -> bool
where
    F: Fn() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;

    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    condition()
}
