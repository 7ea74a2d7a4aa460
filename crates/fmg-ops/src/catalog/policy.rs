//! Policy packages and installation

use async_trait::async_trait;
use fmg_client::validate::validate_package;
use fmg_client::{Capability, Result};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use super::{check_scope, follow_task, path, ListParams, ScopeMember, ADOM_PARAM, LIST_PARAMS};
use crate::operation::{parse_params, OpContext, Operation, ParamSpec};

pub struct ListPackages;

#[async_trait]
impl Operation for ListPackages {
    fn name(&self) -> &'static str {
        "list_packages"
    }

    fn description(&self) -> &'static str {
        "List policy packages in an ADOM"
    }

    fn params(&self) -> &'static [ParamSpec] {
        &LIST_PARAMS
    }

    async fn invoke(&self, ctx: &OpContext, params: Value) -> Result<Value> {
        let params: ListParams = parse_params(params)?;
        let adom = ctx.adom(params.adom.as_deref())?;
        let url = path(ctx, Capability::PackageList, &[("adom", &adom)]).await?;
        ctx.client().get_with(params.target(url)).await
    }
}

static INSTALL_PARAMS: [ParamSpec; 5] = [
    ADOM_PARAM,
    ParamSpec::required("package", "string", "Policy package name"),
    ParamSpec::required("scope", "object[]", "Target devices as {name, vdom?}"),
    ParamSpec::optional("flags", "string[]", "Install flags such as preview"),
    ParamSpec::optional("wait", "boolean", "Wait for the install task to finish"),
];

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct InstallParams {
    #[serde(default)]
    adom: Option<String>,
    package: String,
    scope: Vec<ScopeMember>,
    #[serde(default)]
    flags: Option<Vec<String>>,
    #[serde(default)]
    wait: bool,
}

pub struct InstallPackage;

#[async_trait]
impl Operation for InstallPackage {
    fn name(&self) -> &'static str {
        "install_package"
    }

    fn description(&self) -> &'static str {
        "Install a policy package to devices; returns the install task"
    }

    fn mutating(&self) -> bool {
        true
    }

    fn params(&self) -> &'static [ParamSpec] {
        &INSTALL_PARAMS
    }

    async fn invoke(&self, ctx: &OpContext, params: Value) -> Result<Value> {
        let params: InstallParams = parse_params(params)?;
        let adom = ctx.adom(params.adom.as_deref())?;
        validate_package(&params.package)?;
        check_scope(&params.scope)?;

        let url = path(ctx, Capability::PackageInstall, &[]).await?;
        let data = json!({
            "adom": adom,
            "pkg": params.package,
            "scope": params.scope,
            "flags": params.flags.unwrap_or_else(|| vec!["none".to_string()]),
        });
        let submitted = ctx.client().exec(&url, Some(data)).await?;
        info!(%adom, package = %params.package, devices = params.scope.len(), "Install submitted");

        follow_task(ctx, submitted, params.wait).await
    }
}
