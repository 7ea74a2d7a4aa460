//! Task inspection and waiting

use std::time::Duration;

use async_trait::async_trait;
use fmg_client::{FmgError, Result};
use serde::Deserialize;
use serde_json::Value;

use crate::operation::{parse_params, to_value, OpContext, Operation, ParamSpec};

static GET_PARAMS: [ParamSpec; 2] = [
    ParamSpec::required("task_id", "integer", "Task identifier"),
    ParamSpec::optional("lines", "boolean", "Include per-device lines"),
];

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct GetParams {
    task_id: u64,
    #[serde(default)]
    lines: bool,
}

pub struct GetTask;

#[async_trait]
impl Operation for GetTask {
    fn name(&self) -> &'static str {
        "get_task"
    }

    fn description(&self) -> &'static str {
        "Read one snapshot of a task"
    }

    fn params(&self) -> &'static [ParamSpec] {
        &GET_PARAMS
    }

    async fn invoke(&self, ctx: &OpContext, params: Value) -> Result<Value> {
        let params: GetParams = parse_params(params)?;
        let tasks = ctx.client().tasks();
        let mut task = tasks.get(params.task_id).await?;
        if params.lines && task.lines.is_empty() {
            task.lines = tasks.lines(params.task_id).await?;
        }
        to_value(task)
    }
}

static WAIT_PARAMS: [ParamSpec; 3] = [
    ParamSpec::required("task_id", "integer", "Task identifier"),
    ParamSpec::optional("interval_secs", "integer", "Seconds between polls"),
    ParamSpec::optional("timeout_secs", "integer", "Seconds before giving up"),
];

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct WaitParams {
    task_id: u64,
    #[serde(default)]
    interval_secs: Option<u64>,
    #[serde(default)]
    timeout_secs: Option<u64>,
}

pub struct WaitTask;

#[async_trait]
impl Operation for WaitTask {
    fn name(&self) -> &'static str {
        "wait_task"
    }

    fn description(&self) -> &'static str {
        "Poll a task until it finishes or the timeout passes"
    }

    fn params(&self) -> &'static [ParamSpec] {
        &WAIT_PARAMS
    }

    async fn invoke(&self, ctx: &OpContext, params: Value) -> Result<Value> {
        let params: WaitParams = parse_params(params)?;
        let settings = ctx.client().settings();
        let interval = params
            .interval_secs
            .map(Duration::from_secs)
            .unwrap_or_else(|| settings.poll_interval());
        let deadline = params
            .timeout_secs
            .map(Duration::from_secs)
            .unwrap_or_else(|| settings.poll_deadline());
        if interval.is_zero() {
            return Err(FmgError::validation("interval_secs", "must be at least 1"));
        }

        let task = ctx
            .client()
            .tasks()
            .wait(params.task_id, interval, deadline)
            .await?;
        to_value(task)
    }
}
