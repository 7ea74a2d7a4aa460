//! Workspace lock/commit/unlock coordination per ADOM
//!
//! ```text
//! Unlocked --acquire--> Locked --commit--> Committed
//!    ^                    |                    |
//!    +------unlock--------+--------unlock------+
//! ```
//!
//! A second `acquire` of an ADOM that is already held, locally or by a
//! remote administrator, fails immediately with [`FmgError::LockConflict`].

use std::collections::HashMap;
use std::fmt;
use std::future::Future;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::client::FmgClient;
use crate::error::{FmgError, Result};
use crate::protocol::StatusKind;
use crate::validate::validate_adom;
use crate::version::{render, Capability};

/// Local view of an ADOM workspace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LockState {
    Unlocked,
    Locked,
    Committed,
}

#[derive(Debug, Clone, Copy)]
struct LockEntry {
    holder: Uuid,
    state: LockState,
}

/// Locks held through one client, keyed by ADOM
#[derive(Debug, Default)]
pub(crate) struct LockTable {
    entries: Mutex<HashMap<String, LockEntry>>,
}

impl LockTable {
    fn reserve(&self, adom: &str, holder: Uuid) -> Result<()> {
        let mut entries = self.entries.lock();
        if entries.contains_key(adom) {
            return Err(FmgError::LockConflict {
                adom: adom.to_string(),
                message: "already held through this client".to_string(),
            });
        }
        entries.insert(
            adom.to_string(),
            LockEntry {
                holder,
                state: LockState::Locked,
            },
        );
        Ok(())
    }

    fn set_state(&self, adom: &str, holder: Uuid, state: LockState) {
        if let Some(entry) = self.entries.lock().get_mut(adom) {
            if entry.holder == holder {
                entry.state = state;
            }
        }
    }

    fn release(&self, adom: &str, holder: Uuid) {
        let mut entries = self.entries.lock();
        if entries.get(adom).map(|e| e.holder) == Some(holder) {
            entries.remove(adom);
        }
    }

    fn state(&self, adom: &str) -> LockState {
        self.entries
            .lock()
            .get(adom)
            .map(|e| e.state)
            .unwrap_or(LockState::Unlocked)
    }

    pub(crate) fn held(&self) -> Vec<String> {
        self.entries.lock().keys().cloned().collect()
    }
}

/// Proof of a held workspace lock. Consumed by [`WorkspaceCoordinator::unlock`].
///
/// Dropping a handle that was never unlocked releases the lock from a
/// detached task.
#[must_use = "dropping a LockHandle releases the lock in the background"]
pub struct LockHandle {
    adom: String,
    holder: Uuid,
    acquired_at: DateTime<Utc>,
    release: Option<WorkspaceCoordinator>,
}

impl LockHandle {
    pub fn adom(&self) -> &str {
        &self.adom
    }

    pub fn holder(&self) -> Uuid {
        self.holder
    }

    pub fn acquired_at(&self) -> DateTime<Utc> {
        self.acquired_at
    }

    fn disarm(&mut self) {
        self.release = None;
    }
}

impl fmt::Debug for LockHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockHandle")
            .field("adom", &self.adom)
            .field("holder", &self.holder)
            .field("acquired_at", &self.acquired_at)
            .field("armed", &self.release.is_some())
            .finish()
    }
}

impl Drop for LockHandle {
    fn drop(&mut self) {
        let Some(coordinator) = self.release.take() else {
            return;
        };
        warn!(adom = %self.adom, "Lock handle dropped while held, releasing in background");
        let handle = LockHandle {
            adom: std::mem::take(&mut self.adom),
            holder: self.holder,
            acquired_at: self.acquired_at,
            release: None,
        };
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    if let Err(e) = coordinator.unlock(handle).await {
                        warn!("Background unlock failed: {}", e);
                    }
                });
            }
            Err(_) => {
                warn!(adom = %handle.adom, "No runtime to release lock; remote lock may be orphaned");
                coordinator.client.locks().release(&handle.adom, handle.holder);
            }
        }
    }
}

/// What the body of [`WorkspaceCoordinator::with_lock`] receives
#[derive(Clone)]
pub struct LockScope {
    coordinator: WorkspaceCoordinator,
    adom: String,
    holder: Uuid,
}

impl LockScope {
    pub fn adom(&self) -> &str {
        &self.adom
    }

    pub fn client(&self) -> &FmgClient {
        &self.coordinator.client
    }

    /// Commit pending changes; the lock stays held until the scope ends.
    pub async fn commit(&self) -> Result<()> {
        self.coordinator.commit_as(&self.adom, self.holder).await
    }
}

/// Lock/commit/unlock protocol over one client
#[derive(Clone)]
pub struct WorkspaceCoordinator {
    client: FmgClient,
}

impl WorkspaceCoordinator {
    pub fn new(client: FmgClient) -> Self {
        Self { client }
    }

    /// Local lock state of `adom`
    pub fn state(&self, adom: &str) -> LockState {
        self.client.locks().state(adom)
    }

    async fn workspace_url(&self, capability: Capability, adom: &str) -> Result<String> {
        let template = self.client.endpoint_for(capability).await?;
        Ok(render(template, &[("adom", adom)]))
    }

    /// Lock `adom`. Never waits for another holder.
    #[instrument(skip(self))]
    pub async fn acquire(&self, adom: &str) -> Result<LockHandle> {
        validate_adom(adom)?;
        let holder = Uuid::new_v4();
        self.client.locks().reserve(adom, holder)?;

        // Cancelled mid-request: the remote lock may or may not exist.
        let mut handle = LockHandle {
            adom: adom.to_string(),
            holder,
            acquired_at: Utc::now(),
            release: Some(self.clone()),
        };

        let result = async {
            let url = self.workspace_url(Capability::WorkspaceLock, adom).await?;
            self.client.exec(&url, None).await
        }
        .await;

        match result {
            Ok(_) => {
                handle.acquired_at = Utc::now();
                info!(adom, %holder, "Workspace locked");
                Ok(handle)
            }
            Err(e) => {
                handle.disarm();
                self.client.locks().release(adom, holder);
                if e.status_kind() == Some(StatusKind::LockConflict) {
                    let message = match e.root() {
                        FmgError::Remote { message, .. } => message.clone(),
                        other => other.to_string(),
                    };
                    return Err(FmgError::LockConflict {
                        adom: adom.to_string(),
                        message,
                    });
                }
                Err(e)
            }
        }
    }

    /// Commit pending changes in the locked workspace
    pub async fn commit(&self, handle: &LockHandle) -> Result<()> {
        self.commit_as(&handle.adom, handle.holder).await
    }

    #[instrument(skip(self))]
    async fn commit_as(&self, adom: &str, holder: Uuid) -> Result<()> {
        let url = self.workspace_url(Capability::WorkspaceCommit, adom).await?;
        self.client.exec(&url, None).await?;
        self.client.locks().set_state(adom, holder, LockState::Committed);
        info!(adom, "Workspace committed");
        Ok(())
    }

    /// Release the lock. The local entry is cleared even if the remote call fails.
    #[instrument(skip(self, handle), fields(adom = %handle.adom))]
    pub async fn unlock(&self, mut handle: LockHandle) -> Result<()> {
        handle.disarm();
        let outcome = async {
            let url = self
                .workspace_url(Capability::WorkspaceUnlock, &handle.adom)
                .await?;
            self.client.exec(&url, None).await
        }
        .await;

        self.client.locks().release(&handle.adom, handle.holder);
        match outcome {
            Ok(_) => {
                debug!("Workspace unlocked");
                Ok(())
            }
            Err(e) => {
                warn!("Unlock failed, remote lock may remain: {}", e);
                Err(e)
            }
        }
    }

    /// Run `body` with `adom` locked; unlock exactly once however it ends.
    ///
    /// Success, error and cancellation (dropping the returned future) all
    /// release the lock. An error from `body` wins over an unlock error.
    pub async fn with_lock<T, F, Fut>(&self, adom: &str, body: F) -> Result<T>
    where
        F: FnOnce(LockScope) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let handle = self.acquire(adom).await?;
        let scope = LockScope {
            coordinator: self.clone(),
            adom: handle.adom.clone(),
            holder: handle.holder,
        };

        // Dropping `handle` on cancellation releases the lock.
        let outcome = body(scope).await;

        // Detach the unlock so cancelling this future cannot interrupt it.
        let coordinator = self.clone();
        let released = tokio::spawn(async move { coordinator.unlock(handle).await })
            .await
            .map_err(|e| FmgError::Internal(format!("unlock task failed: {}", e)))
            .and_then(|r| r);

        match (outcome, released) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(e)) => Err(e),
            (Err(e), Err(unlock_err)) => {
                warn!("Unlock after failed scope also failed: {}", unlock_err);
                Err(e)
            }
            (Err(e), Ok(())) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_table_reservation() {
        let table = LockTable::default();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        table.reserve("root", a).unwrap();
        assert_eq!(table.state("root"), LockState::Locked);
        assert!(matches!(
            table.reserve("root", b),
            Err(FmgError::LockConflict { .. })
        ));

        // Only the holder can change or release the entry
        table.set_state("root", b, LockState::Committed);
        assert_eq!(table.state("root"), LockState::Locked);
        table.release("root", b);
        assert_eq!(table.state("root"), LockState::Locked);

        table.set_state("root", a, LockState::Committed);
        assert_eq!(table.state("root"), LockState::Committed);
        table.release("root", a);
        assert_eq!(table.state("root"), LockState::Unlocked);
        assert!(table.held().is_empty());
    }
}
