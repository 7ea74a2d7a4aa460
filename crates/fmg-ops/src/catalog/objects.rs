//! Firewall address objects

use async_trait::async_trait;
use fmg_client::validate::validate_object_name;
use fmg_client::{Capability, FmgError, Result};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::info;

use super::{path, ListParams, ADOM_PARAM, LIST_PARAMS};
use crate::operation::{parse_params, OpContext, Operation, ParamSpec};

pub struct ListFirewallAddresses;

#[async_trait]
impl Operation for ListFirewallAddresses {
    fn name(&self) -> &'static str {
        "list_firewall_addresses"
    }

    fn description(&self) -> &'static str {
        "List firewall address objects in an ADOM"
    }

    fn params(&self) -> &'static [ParamSpec] {
        &LIST_PARAMS
    }

    async fn invoke(&self, ctx: &OpContext, params: Value) -> Result<Value> {
        let params: ListParams = parse_params(params)?;
        let adom = ctx.adom(params.adom.as_deref())?;
        let url = path(ctx, Capability::FirewallAddress, &[("adom", &adom)]).await?;
        ctx.client().get_with(params.target(url)).await
    }
}

static CREATE_PARAMS: [ParamSpec; 8] = [
    ADOM_PARAM,
    ParamSpec::required("name", "string", "Object name"),
    ParamSpec::optional("type", "string", "ipmask, iprange or fqdn (default ipmask)"),
    ParamSpec::optional("subnet", "string", "Address and mask for ipmask objects"),
    ParamSpec::optional("start-ip", "string", "First address for iprange objects"),
    ParamSpec::optional("end-ip", "string", "Last address for iprange objects"),
    ParamSpec::optional("fqdn", "string", "Domain name for fqdn objects"),
    ParamSpec::optional("comment", "string", "Free-form comment"),
];

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct CreateParams {
    #[serde(default)]
    adom: Option<String>,
    name: String,
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    subnet: Option<String>,
    #[serde(default, rename = "start-ip")]
    start_ip: Option<String>,
    #[serde(default, rename = "end-ip")]
    end_ip: Option<String>,
    #[serde(default)]
    fqdn: Option<String>,
    #[serde(default)]
    comment: Option<String>,
}

impl CreateParams {
    fn into_data(self) -> Result<Value> {
        let kind = self.kind.unwrap_or_else(|| "ipmask".to_string());
        let required = match kind.as_str() {
            "ipmask" => self.subnet.is_some(),
            "iprange" => self.start_ip.is_some() && self.end_ip.is_some(),
            "fqdn" => self.fqdn.is_some(),
            _ => return Err(FmgError::validation("type", "must be ipmask, iprange or fqdn")),
        };
        if !required {
            return Err(FmgError::validation(
                "params",
                "address value missing for the selected type",
            ));
        }

        let mut data = Map::new();
        data.insert("name".into(), Value::String(self.name));
        data.insert("type".into(), Value::String(kind));
        let optional = [
            ("subnet", self.subnet),
            ("start-ip", self.start_ip),
            ("end-ip", self.end_ip),
            ("fqdn", self.fqdn),
            ("comment", self.comment),
        ];
        for (key, value) in optional {
            if let Some(value) = value {
                data.insert(key.into(), Value::String(value));
            }
        }
        Ok(Value::Object(data))
    }
}

pub struct CreateFirewallAddress;

#[async_trait]
impl Operation for CreateFirewallAddress {
    fn name(&self) -> &'static str {
        "create_firewall_address"
    }

    fn description(&self) -> &'static str {
        "Create a firewall address object and commit the ADOM"
    }

    fn mutating(&self) -> bool {
        true
    }

    fn params(&self) -> &'static [ParamSpec] {
        &CREATE_PARAMS
    }

    async fn invoke(&self, ctx: &OpContext, params: Value) -> Result<Value> {
        let params: CreateParams = parse_params(params)?;
        let adom = ctx.adom(params.adom.as_deref())?;
        validate_object_name(&params.name)?;
        let name = params.name.clone();
        let data = params.into_data()?;
        let url = path(ctx, Capability::FirewallAddress, &[("adom", &adom)]).await?;

        let created = ctx
            .client()
            .workspace()
            .with_lock(&adom, |scope| async move {
                let created = scope.client().add(&url, data).await?;
                scope.commit().await?;
                Ok(created)
            })
            .await?;

        info!(%adom, %name, "Firewall address created");
        Ok(created)
    }
}

static DELETE_PARAMS: [ParamSpec; 2] = [
    ADOM_PARAM,
    ParamSpec::required("name", "string", "Object name"),
];

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct DeleteParams {
    #[serde(default)]
    adom: Option<String>,
    name: String,
}

pub struct DeleteFirewallAddress;

#[async_trait]
impl Operation for DeleteFirewallAddress {
    fn name(&self) -> &'static str {
        "delete_firewall_address"
    }

    fn description(&self) -> &'static str {
        "Delete a firewall address object and commit the ADOM"
    }

    fn mutating(&self) -> bool {
        true
    }

    fn params(&self) -> &'static [ParamSpec] {
        &DELETE_PARAMS
    }

    async fn invoke(&self, ctx: &OpContext, params: Value) -> Result<Value> {
        let params: DeleteParams = parse_params(params)?;
        let adom = ctx.adom(params.adom.as_deref())?;
        validate_object_name(&params.name)?;
        let base = path(ctx, Capability::FirewallAddress, &[("adom", &adom)]).await?;
        let url = format!("{}/{}", base, params.name);

        ctx.client()
            .workspace()
            .with_lock(&adom, |scope| async move {
                let deleted = scope.client().delete(&url).await?;
                scope.commit().await?;
                Ok(deleted)
            })
            .await
    }
}
