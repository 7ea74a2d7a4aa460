//! FortiManager operations
//!
//! Named operations over [`fmg_client`], a registry to hold them and a
//! dispatcher that resolves names at call time.
//!
//! # Example
//!
//! ```rust,no_run
//! use fmg_client::{ClientSettings, FmgClient};
//! use fmg_ops::{default_registry, Dispatcher};
//! use serde_json::json;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = FmgClient::new(ClientSettings::from_env()?)?;
//! client.connect().await?;
//!
//! let dispatcher = Dispatcher::new(client.clone(), default_registry());
//! let devices = dispatcher
//!     .execute("list_devices", json!({"adom": "root", "fields": ["name"]}))
//!     .await?;
//!
//! dispatcher.shutdown().await;
//! client.disconnect().await;
//! # Ok(())
//! # }
//! ```

pub mod catalog;
pub mod dispatcher;
pub mod operation;
pub mod registry;

pub use dispatcher::{
    validate_name, DispatchError, DispatchFailure, Dispatcher, DESCRIBE_OPERATION,
    EXECUTE_OPERATION, LIST_OPERATIONS,
};
pub use operation::{parse_params, OpContext, Operation, OperationInfo, ParamSpec};
pub use registry::{Entry, OperationRegistry};

/// Registry with every built-in operation. Meta tool names are reserved so
/// `execute_operation` cannot reach them.
pub fn default_registry() -> OperationRegistry {
    let mut registry = OperationRegistry::new();
    catalog::register_all(&mut registry);
    for meta in [LIST_OPERATIONS, DESCRIBE_OPERATION, EXECUTE_OPERATION] {
        registry.reserve(meta, "meta tool");
    }
    registry
}
