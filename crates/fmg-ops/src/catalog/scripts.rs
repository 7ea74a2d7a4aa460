//! CLI scripts

use async_trait::async_trait;
use fmg_client::validate::{validate_package, validate_script_name};
use fmg_client::version::render;
use fmg_client::{Capability, Result};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, info};

use super::{check_scope, follow_task, path, ListParams, ScopeMember, ADOM_PARAM, LIST_PARAMS};
use crate::operation::{parse_params, OpContext, Operation, ParamSpec};

pub struct ListScripts;

#[async_trait]
impl Operation for ListScripts {
    fn name(&self) -> &'static str {
        "list_scripts"
    }

    fn description(&self) -> &'static str {
        "List CLI scripts stored in an ADOM"
    }

    fn params(&self) -> &'static [ParamSpec] {
        &LIST_PARAMS
    }

    async fn invoke(&self, ctx: &OpContext, params: Value) -> Result<Value> {
        let params: ListParams = parse_params(params)?;
        let adom = ctx.adom(params.adom.as_deref())?;
        let url = path(ctx, Capability::ScriptList, &[("adom", &adom)]).await?;
        ctx.client().get_with(params.target(url)).await
    }
}

static RUN_PARAMS: [ParamSpec; 5] = [
    ADOM_PARAM,
    ParamSpec::required("script", "string", "Script name"),
    ParamSpec::optional("scope", "object[]", "Target devices as {name, vdom?}"),
    ParamSpec::optional("package", "string", "Policy package for package-scoped scripts"),
    ParamSpec::optional("wait", "boolean", "Wait for the script task to finish"),
];

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RunParams {
    #[serde(default)]
    adom: Option<String>,
    script: String,
    #[serde(default)]
    scope: Vec<ScopeMember>,
    #[serde(default)]
    package: Option<String>,
    #[serde(default)]
    wait: bool,
}

pub struct RunScript;

#[async_trait]
impl Operation for RunScript {
    fn name(&self) -> &'static str {
        "run_script"
    }

    fn description(&self) -> &'static str {
        "Run a CLI script against devices or a package; returns the script task"
    }

    fn mutating(&self) -> bool {
        true
    }

    fn params(&self) -> &'static [ParamSpec] {
        &RUN_PARAMS
    }

    async fn invoke(&self, ctx: &OpContext, params: Value) -> Result<Value> {
        let params: RunParams = parse_params(params)?;
        let adom = ctx.adom(params.adom.as_deref())?;
        validate_script_name(&params.script)?;
        check_scope(&params.scope)?;
        if let Some(package) = &params.package {
            validate_package(package)?;
        }

        let template = ctx.client().endpoint_for(Capability::ScriptRun).await?;
        let adom_in_path = template.contains("{adom}");
        let url = render(template, &[("adom", &adom)]);

        let mut data = Map::new();
        data.insert("script".into(), json!(params.script));
        data.insert("scope".into(), json!(params.scope));
        if let Some(package) = &params.package {
            data.insert("package".into(), json!(package));
        }
        // Older firmware takes the ADOM in the payload instead of the path
        if !adom_in_path {
            data.insert("adom".into(), json!(adom));
        }
        debug!(%url, "Resolved script endpoint");

        let submitted = ctx.client().exec(&url, Some(Value::Object(data))).await?;
        info!(%adom, script = %params.script, "Script submitted");

        follow_task(ctx, submitted, params.wait).await
    }
}
