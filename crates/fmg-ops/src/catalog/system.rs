//! Appliance-level reads

use async_trait::async_trait;
use fmg_client::{Capability, ResolvedVersion, Result};
use serde_json::{json, Value};

use super::{path, ListParams, NoParams, LIST_PARAMS};
use crate::operation::{parse_params, OpContext, Operation, ParamSpec};

pub struct GetSystemStatus;

#[async_trait]
impl Operation for GetSystemStatus {
    fn name(&self) -> &'static str {
        "get_system_status"
    }

    fn description(&self) -> &'static str {
        "Hostname, serial number, platform and firmware version"
    }

    async fn invoke(&self, ctx: &OpContext, params: Value) -> Result<Value> {
        let _: NoParams = parse_params(params)?;
        ctx.client().system_status().await
    }
}

pub struct GetHaStatus;

#[async_trait]
impl Operation for GetHaStatus {
    fn name(&self) -> &'static str {
        "get_ha_status"
    }

    fn description(&self) -> &'static str {
        "High-availability cluster status"
    }

    async fn invoke(&self, ctx: &OpContext, params: Value) -> Result<Value> {
        let _: NoParams = parse_params(params)?;
        let url = path(ctx, Capability::HaStatus, &[]).await?;
        ctx.client().get(&url).await
    }
}

pub struct GetApiVersion;

#[async_trait]
impl Operation for GetApiVersion {
    fn name(&self) -> &'static str {
        "get_api_version"
    }

    fn description(&self) -> &'static str {
        "Detected firmware version and the API generation used for endpoints"
    }

    async fn invoke(&self, ctx: &OpContext, params: Value) -> Result<Value> {
        let _: NoParams = parse_params(params)?;
        let resolved = ctx.client().version().await?;
        let (version, recognized) = match &resolved {
            ResolvedVersion::Known { version } => (version.to_string(), true),
            ResolvedVersion::Unrecognized { raw } => (raw.clone(), false),
        };
        Ok(json!({
            "version": version,
            "recognized": recognized,
            "generation": resolved.generation().to_string(),
        }))
    }
}

pub struct ListAdoms;

#[async_trait]
impl Operation for ListAdoms {
    fn name(&self) -> &'static str {
        "list_adoms"
    }

    fn description(&self) -> &'static str {
        "List administrative domains"
    }

    fn params(&self) -> &'static [ParamSpec] {
        &LIST_PARAMS[1..]
    }

    async fn invoke(&self, ctx: &OpContext, params: Value) -> Result<Value> {
        let params: ListParams = parse_params(params)?;
        let url = path(ctx, Capability::AdomList, &[]).await?;
        ctx.client().get_with(params.target(url)).await
    }
}
