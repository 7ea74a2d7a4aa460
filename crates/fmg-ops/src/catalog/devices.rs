//! Managed devices

use async_trait::async_trait;
use fmg_client::validate::validate_device;
use fmg_client::{Capability, Result};
use serde::Deserialize;
use serde_json::Value;

use super::{path, ListParams, ADOM_PARAM, LIST_PARAMS};
use crate::operation::{parse_params, OpContext, Operation, ParamSpec};

pub struct ListDevices;

#[async_trait]
impl Operation for ListDevices {
    fn name(&self) -> &'static str {
        "list_devices"
    }

    fn description(&self) -> &'static str {
        "List devices managed in an ADOM"
    }

    fn params(&self) -> &'static [ParamSpec] {
        &LIST_PARAMS
    }

    async fn invoke(&self, ctx: &OpContext, params: Value) -> Result<Value> {
        let params: ListParams = parse_params(params)?;
        let adom = ctx.adom(params.adom.as_deref())?;
        let url = path(ctx, Capability::DeviceList, &[("adom", &adom)]).await?;
        ctx.client().get_with(params.target(url)).await
    }
}

static GET_DEVICE_PARAMS: [ParamSpec; 2] = [
    ADOM_PARAM,
    ParamSpec::required("device", "string", "Device name"),
];

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct GetDeviceParams {
    #[serde(default)]
    adom: Option<String>,
    device: String,
}

pub struct GetDevice;

#[async_trait]
impl Operation for GetDevice {
    fn name(&self) -> &'static str {
        "get_device"
    }

    fn description(&self) -> &'static str {
        "Read one managed device"
    }

    fn params(&self) -> &'static [ParamSpec] {
        &GET_DEVICE_PARAMS
    }

    async fn invoke(&self, ctx: &OpContext, params: Value) -> Result<Value> {
        let params: GetDeviceParams = parse_params(params)?;
        let adom = ctx.adom(params.adom.as_deref())?;
        validate_device(&params.device)?;
        let base = path(ctx, Capability::DeviceList, &[("adom", &adom)]).await?;
        ctx.client()
            .get(&format!("{}/{}", base, params.device))
            .await
    }
}
