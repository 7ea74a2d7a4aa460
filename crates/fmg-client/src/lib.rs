//! FortiManager Client Library
//!
//! Shared client core for talking to a FortiManager appliance over its
//! JSON-RPC API: session handling, one request envelope, bounded retry,
//! version-aware endpoints, workspace locking and task polling.
//!
//! # Example
//!
//! ```rust,no_run
//! use fmg_client::{ClientSettings, FmgClient};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = ClientSettings::builder("fmg.example.net")
//!         .token("api-token")
//!         .build()?;
//!     let client = FmgClient::new(settings)?;
//!     client.connect().await?;
//!
//!     // Plain read
//!     let adoms = client.get("/dvmdb/adom").await?;
//!
//!     // Locked mutation, unlocked on every exit path
//!     client
//!         .workspace()
//!         .with_lock("root", |scope| async move {
//!             scope
//!                 .client()
//!                 .add(
//!                     "/pm/config/adom/root/obj/firewall/address",
//!                     serde_json::json!({"name": "web", "subnet": "10.0.0.10/32"}),
//!                 )
//!                 .await?;
//!             scope.commit().await
//!         })
//!         .await?;
//!
//!     client.disconnect().await;
//!     Ok(())
//! }
//! ```
//!
//! # Testing
//!
//! The `testing` module provides an in-process mock appliance:
//!
//! ```rust,ignore
//! use fmg_client::testing::MockAppliance;
//!
//! let mock = MockAppliance::start().await?;
//! let client = mock.connected_client().await?;
//! ```

mod client;
pub mod config;
mod error;
pub mod protocol;
pub mod retry;
pub mod sanitize;
pub mod session;
pub mod task;
pub mod testing;
pub mod transport;
pub mod validate;
pub mod version;
pub mod workspace;

pub use client::FmgClient;
pub use config::{ClientSettings, ConfigError, Credentials, ExposureMode};
pub use error::{ErrorKind, ErrorReport, FmgError, Result};
pub use protocol::{Method, ResponseEnvelope, StatusKind, SubResult, Target};
pub use task::{Task, TaskStatus};
pub use version::{ApiGeneration, Capability, ResolvedVersion, VersionTag};
pub use workspace::{LockHandle, LockScope, LockState, WorkspaceCoordinator};
