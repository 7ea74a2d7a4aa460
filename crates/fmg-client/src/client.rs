//! FortiManager JSON-RPC client
//!
//! [`FmgClient`] is a cheap-to-clone handle. Clones share one session, one
//! retry policy, one cached appliance version and one workspace lock table.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::config::ClientSettings;
use crate::error::{FmgError, Result};
use crate::protocol::{Method, ResponseEnvelope, Target};
use crate::retry::{escalate, Decision, RetryPolicy};
use crate::session::SessionManager;
use crate::task::TaskPoller;
use crate::transport::RpcTransport;
use crate::version::{ApiGeneration, Capability, ResolvedVersion, VersionTag};
use crate::workspace::{LockTable, WorkspaceCoordinator};

struct Inner {
    settings: ClientSettings,
    transport: Arc<RpcTransport>,
    session: SessionManager,
    retry: RetryPolicy,
    version: Mutex<Option<ResolvedVersion>>,
    locks: LockTable,
}

/// FortiManager JSON-RPC client
#[derive(Clone)]
pub struct FmgClient {
    inner: Arc<Inner>,
}

impl fmt::Debug for FmgClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FmgClient")
            .field("endpoint", &self.inner.transport.endpoint().as_str())
            .field("mode", &self.inner.session.mode())
            .field("connected", &self.is_connected())
            .finish()
    }
}

impl FmgClient {
    /// Create a client. No network traffic happens until [`connect`](Self::connect).
    pub fn new(settings: ClientSettings) -> Result<Self> {
        settings.validate()?;

        let transport = Arc::new(RpcTransport::new(&settings)?);
        let session = SessionManager::new(transport.clone(), settings.credentials.clone());
        let retry = RetryPolicy::from_settings(&settings);

        Ok(Self {
            inner: Arc::new(Inner {
                settings,
                transport,
                session,
                retry,
                version: Mutex::new(None),
                locks: LockTable::default(),
            }),
        })
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.inner.settings
    }

    /// JSON-RPC endpoint URL
    pub fn endpoint(&self) -> &Url {
        self.inner.transport.endpoint()
    }

    pub fn default_adom(&self) -> &str {
        &self.inner.settings.default_adom
    }

    pub fn is_connected(&self) -> bool {
        self.inner.session.is_active()
    }

    /// Generation of the current session id; bumps on every login
    pub fn session_generation(&self) -> u64 {
        self.inner.session.generation()
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.inner.retry
    }

    pub(crate) fn locks(&self) -> &LockTable {
        &self.inner.locks
    }

    /// Workspace lock/commit coordination
    pub fn workspace(&self) -> WorkspaceCoordinator {
        WorkspaceCoordinator::new(self.clone())
    }

    /// Task polling
    pub fn tasks(&self) -> TaskPoller {
        TaskPoller::new(self.clone())
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Log in. Calling this on a connected client is a no-op.
    #[instrument(skip(self))]
    pub async fn connect(&self) -> Result<()> {
        if self.is_connected() {
            warn!("Already connected");
            return Ok(());
        }
        self.inner.session.login().await?;
        info!(
            endpoint = %self.endpoint(),
            mode = self.inner.session.mode(),
            "Connected to FortiManager"
        );
        Ok(())
    }

    /// Log out (best-effort) and forget the detected version.
    #[instrument(skip(self))]
    pub async fn disconnect(&self) {
        let held = self.inner.locks.held();
        if !held.is_empty() {
            warn!(?held, "Disconnecting with workspace locks still held");
        }
        self.inner.session.logout().await;
        *self.inner.version.lock().await = None;
        info!("Disconnected");
    }

    // =========================================================================
    // Calls
    // =========================================================================

    /// Send one envelope under the retry policy.
    ///
    /// Per-target rejections (not found, permission, ...) are returned inside
    /// the envelope; only transient envelope-wide failures are retried.
    #[instrument(skip(self, targets), fields(targets = targets.len()))]
    pub async fn call(&self, method: Method, targets: &[Target]) -> Result<ResponseEnvelope> {
        let policy = &self.inner.retry;
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            let token = self.inner.session.ensure_valid().await?;

            let outcome = match tokio::time::timeout(
                policy.attempt_timeout,
                self.inner.transport.call(&token.auth, method, targets),
            )
            .await
            {
                Ok(result) => result.and_then(escalate),
                Err(_) => Err(FmgError::Connectivity {
                    message: format!("no response within {:?}", policy.attempt_timeout),
                    request_sent: true,
                }),
            };

            let err = match outcome {
                Ok(envelope) => return Ok(envelope),
                Err(err) => err,
            };

            match policy.classify(method, &err) {
                Decision::Surface => return Err(err),
                Decision::SurfaceEffectUnknown => {
                    warn!(%method, attempt, "Request failed after it may have been applied: {}", err);
                    return Err(FmgError::EffectUnknown {
                        method,
                        source: Box::new(err),
                    });
                }
                Decision::Retry { reauth } => {
                    if attempt >= policy.max_attempts {
                        warn!(%method, attempt, "Retry budget exhausted: {}", err);
                        return Err(FmgError::RetryExhausted {
                            attempts: attempt,
                            last: Box::new(err),
                        });
                    }
                    if reauth {
                        self.inner.session.refresh(token.generation).await?;
                    } else {
                        let delay = policy.delay_for(attempt);
                        debug!(%method, attempt, ?delay, "Retrying after transient failure: {}", err);
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }
    }

    /// Single-target call returning the payload, or the rejection as an error
    pub async fn request(&self, method: Method, target: Target) -> Result<Value> {
        self.call(method, std::slice::from_ref(&target))
            .await?
            .into_single()
    }

    pub async fn get(&self, url: &str) -> Result<Value> {
        self.request(Method::Get, Target::new(url)).await
    }

    /// `get` with request options such as `fields`, `filter` or `range`
    pub async fn get_with(&self, target: Target) -> Result<Value> {
        self.request(Method::Get, target).await
    }

    pub async fn add(&self, url: &str, data: Value) -> Result<Value> {
        self.request(Method::Add, Target::new(url).with_data(data))
            .await
    }

    pub async fn set(&self, url: &str, data: Value) -> Result<Value> {
        self.request(Method::Set, Target::new(url).with_data(data))
            .await
    }

    pub async fn update(&self, url: &str, data: Value) -> Result<Value> {
        self.request(Method::Update, Target::new(url).with_data(data))
            .await
    }

    pub async fn delete(&self, url: &str) -> Result<Value> {
        self.request(Method::Delete, Target::new(url)).await
    }

    pub async fn exec(&self, url: &str, data: Option<Value>) -> Result<Value> {
        let target = match data {
            Some(data) => Target::new(url).with_data(data),
            None => Target::new(url),
        };
        self.request(Method::Exec, target).await
    }

    pub async fn clone_object(&self, url: &str, data: Value) -> Result<Value> {
        self.request(Method::Clone, Target::new(url).with_data(data))
            .await
    }

    pub async fn move_object(&self, url: &str, data: Value) -> Result<Value> {
        self.request(Method::Move, Target::new(url).with_data(data))
            .await
    }

    // =========================================================================
    // Version Resolution
    // =========================================================================

    /// Raw `/sys/status` payload
    #[instrument(skip(self))]
    pub async fn system_status(&self) -> Result<Value> {
        self.get(Capability::SystemStatus.path_for(ApiGeneration::NEWEST))
            .await
    }

    /// Appliance version, detected once per session
    pub async fn version(&self) -> Result<ResolvedVersion> {
        let mut cached = self.inner.version.lock().await;
        if let Some(resolved) = cached.as_ref() {
            return Ok(resolved.clone());
        }

        let status = self.system_status().await?;
        let resolved = match VersionTag::from_status(&status) {
            Some(version) => {
                info!(%version, generation = %version.generation(), "Detected appliance version");
                ResolvedVersion::Known { version }
            }
            None => {
                let raw = status
                    .get("Version")
                    .and_then(Value::as_str)
                    .unwrap_or("<missing>")
                    .to_string();
                warn!(%raw, "Unrecognized appliance version, using newest endpoint mappings");
                ResolvedVersion::Unrecognized { raw }
            }
        };

        *cached = Some(resolved.clone());
        Ok(resolved)
    }

    /// Path template for `capability` on the connected appliance.
    ///
    /// Fixed-path capabilities never trigger version detection.
    pub async fn endpoint_for(&self, capability: Capability) -> Result<&'static str> {
        if !capability.is_versioned() {
            return Ok(capability.path_for(ApiGeneration::NEWEST));
        }
        let generation = self.version().await?.generation();
        Ok(capability.path_for(generation))
    }

    /// [`endpoint_for`](Self::endpoint_for) by capability name
    pub async fn endpoint_for_name(&self, capability: &str) -> Result<&'static str> {
        self.endpoint_for(capability.parse()?).await
    }
}
