//! Built-in operations
//!
//! Each operation is a fixed request template over the client core. Mutating
//! object changes run inside a scoped workspace lock and commit on success.

mod devices;
mod objects;
mod policy;
mod scripts;
mod system;
mod tasks;
mod workspace;

use std::sync::Arc;

use fmg_client::task::task_id_from;
use fmg_client::validate::validate_device;
use fmg_client::version::render;
use fmg_client::{Capability, Result, Target, Task};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::operation::{to_value, OpContext, ParamSpec};
use crate::registry::OperationRegistry;

pub use devices::{GetDevice, ListDevices};
pub use objects::{CreateFirewallAddress, DeleteFirewallAddress, ListFirewallAddresses};
pub use policy::{InstallPackage, ListPackages};
pub use scripts::{ListScripts, RunScript};
pub use system::{GetApiVersion, GetHaStatus, GetSystemStatus, ListAdoms};
pub use tasks::{GetTask, WaitTask};
pub use workspace::{CommitAdom, LockAdom, UnlockAdom};

/// Register every built-in operation
pub fn register_all(registry: &mut OperationRegistry) {
    registry.register(Arc::new(GetSystemStatus));
    registry.register(Arc::new(GetHaStatus));
    registry.register(Arc::new(GetApiVersion));
    registry.register(Arc::new(ListAdoms));
    registry.register(Arc::new(ListDevices));
    registry.register(Arc::new(GetDevice));
    registry.register(Arc::new(ListPackages));
    registry.register(Arc::new(InstallPackage));
    registry.register(Arc::new(ListFirewallAddresses));
    registry.register(Arc::new(CreateFirewallAddress));
    registry.register(Arc::new(DeleteFirewallAddress));
    registry.register(Arc::new(LockAdom));
    registry.register(Arc::new(UnlockAdom));
    registry.register(Arc::new(CommitAdom));
    registry.register(Arc::new(ListScripts));
    registry.register(Arc::new(RunScript));
    registry.register(Arc::new(GetTask));
    registry.register(Arc::new(WaitTask));
}

const ADOM_PARAM: ParamSpec = ParamSpec::optional("adom", "string", "ADOM, defaults to the configured one");

static LIST_PARAMS: [ParamSpec; 4] = [
    ADOM_PARAM,
    ParamSpec::optional("fields", "string[]", "Attributes to return"),
    ParamSpec::optional("filter", "array", "FortiManager filter expression"),
    ParamSpec::optional("limit", "integer", "Maximum number of entries"),
];

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct NoParams {}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct AdomParams {
    #[serde(default)]
    adom: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ListParams {
    #[serde(default)]
    adom: Option<String>,
    #[serde(default)]
    fields: Option<Vec<String>>,
    #[serde(default)]
    filter: Option<Value>,
    #[serde(default)]
    limit: Option<u32>,
}

impl ListParams {
    fn target(&self, url: String) -> Target {
        let mut target = Target::new(url);
        if let Some(fields) = &self.fields {
            target = target.with_option("fields", json!(fields));
        }
        if let Some(filter) = &self.filter {
            target = target.with_option("filter", filter.clone());
        }
        if let Some(limit) = self.limit {
            target = target.with_option("range", json!([0, limit]));
        }
        target
    }
}

/// Device (and optional VDOM) an install or script run targets
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
struct ScopeMember {
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    vdom: Option<String>,
}

fn check_scope(scope: &[ScopeMember]) -> Result<()> {
    for member in scope {
        validate_device(&member.name)?;
        if let Some(vdom) = &member.vdom {
            validate_device(vdom)?;
        }
    }
    Ok(())
}

/// Rendered path for `capability` on the connected appliance
async fn path(ctx: &OpContext, capability: Capability, params: &[(&str, &str)]) -> Result<String> {
    let template = ctx.client().endpoint_for(capability).await?;
    Ok(render(template, params))
}

#[derive(Serialize)]
struct Submitted {
    task_id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    task: Option<Task>,
}

/// Follow the task a submission returned, waiting for it when asked
async fn follow_task(ctx: &OpContext, data: Value, wait: bool) -> Result<Value> {
    let Some(task_id) = task_id_from(&data) else {
        return Ok(data);
    };
    let task = if wait {
        Some(ctx.client().tasks().wait_default(task_id).await?)
    } else {
        None
    };
    to_value(Submitted { task_id, task })
}
