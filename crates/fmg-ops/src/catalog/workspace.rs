//! Raw workspace control
//!
//! Locks taken here outlive the call that took them; the context keeps the
//! handle until `unlock_adom` or dispatcher shutdown.

use async_trait::async_trait;
use fmg_client::{FmgError, LockState, Result};
use serde::Serialize;
use serde_json::Value;

use super::{AdomParams, ADOM_PARAM};
use crate::operation::{parse_params, to_value, OpContext, Operation, ParamSpec};

static PARAMS: [ParamSpec; 1] = [ADOM_PARAM];

#[derive(Serialize)]
struct LockReport {
    adom: String,
    state: LockState,
}

fn not_held() -> FmgError {
    FmgError::validation("adom", "not locked through lock_adom")
}

pub struct LockAdom;

#[async_trait]
impl Operation for LockAdom {
    fn name(&self) -> &'static str {
        "lock_adom"
    }

    fn description(&self) -> &'static str {
        "Lock an ADOM workspace until unlock_adom is called"
    }

    fn mutating(&self) -> bool {
        true
    }

    fn params(&self) -> &'static [ParamSpec] {
        &PARAMS
    }

    async fn invoke(&self, ctx: &OpContext, params: Value) -> Result<Value> {
        let params: AdomParams = parse_params(params)?;
        let adom = ctx.adom(params.adom.as_deref())?;
        let workspace = ctx.client().workspace();

        let handle = workspace.acquire(&adom).await?;
        ctx.hold(handle);
        to_value(LockReport {
            state: workspace.state(&adom),
            adom,
        })
    }
}

pub struct CommitAdom;

#[async_trait]
impl Operation for CommitAdom {
    fn name(&self) -> &'static str {
        "commit_adom"
    }

    fn description(&self) -> &'static str {
        "Commit changes in an ADOM locked by lock_adom; the lock stays held"
    }

    fn mutating(&self) -> bool {
        true
    }

    fn params(&self) -> &'static [ParamSpec] {
        &PARAMS
    }

    async fn invoke(&self, ctx: &OpContext, params: Value) -> Result<Value> {
        let params: AdomParams = parse_params(params)?;
        let adom = ctx.adom(params.adom.as_deref())?;
        let workspace = ctx.client().workspace();

        let handle = ctx.take(&adom).ok_or_else(not_held)?;
        let committed = workspace.commit(&handle).await;
        ctx.hold(handle);
        committed?;

        to_value(LockReport {
            state: workspace.state(&adom),
            adom,
        })
    }
}

pub struct UnlockAdom;

#[async_trait]
impl Operation for UnlockAdom {
    fn name(&self) -> &'static str {
        "unlock_adom"
    }

    fn description(&self) -> &'static str {
        "Release an ADOM workspace lock taken by lock_adom"
    }

    fn mutating(&self) -> bool {
        true
    }

    fn params(&self) -> &'static [ParamSpec] {
        &PARAMS
    }

    async fn invoke(&self, ctx: &OpContext, params: Value) -> Result<Value> {
        let params: AdomParams = parse_params(params)?;
        let adom = ctx.adom(params.adom.as_deref())?;
        let workspace = ctx.client().workspace();

        let handle = ctx.take(&adom).ok_or_else(not_held)?;
        workspace.unlock(handle).await?;
        to_value(LockReport {
            state: workspace.state(&adom),
            adom,
        })
    }
}
