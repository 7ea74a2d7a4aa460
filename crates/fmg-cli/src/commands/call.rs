//! Call command - invoke an operation by name

use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use fmg_ops::Dispatcher;
use serde_json::Value;

use crate::output::OutputContext;

pub async fn call(
    dispatcher: &Dispatcher,
    name: &str,
    params: Option<&str>,
    ctx: &OutputContext,
) -> Result<ExitCode> {
    let params = parse_params(params)?;

    match dispatcher.execute(name, params).await {
        Ok(value) => {
            ctx.print_value(&value);
            Ok(ExitCode::SUCCESS)
        }
        Err(failure) => {
            ctx.print_failure(&failure);
            Ok(ExitCode::FAILURE)
        }
    }
}

/// Parse `--params`. The raw text is never included in errors since it may
/// carry secrets.
fn parse_params(raw: Option<&str>) -> Result<Value> {
    let Some(raw) = raw else {
        return Ok(Value::Null);
    };

    let value: Value = serde_json::from_str(raw)
        .map_err(|e| anyhow::anyhow!("line {}, column {}", e.line(), e.column()))
        .context("--params is not valid JSON")?;
    if !value.is_object() && !value.is_null() {
        bail!("--params must be a JSON object");
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_params_is_null() {
        assert_eq!(parse_params(None).unwrap(), Value::Null);
    }

    #[test]
    fn test_object_params() {
        let value = parse_params(Some(r#"{"adom": "root"}"#)).unwrap();
        assert_eq!(value["adom"], "root");
    }

    #[test]
    fn test_params_must_be_object() {
        let err = parse_params(Some("[1, 2]")).unwrap_err();
        assert!(err.to_string().contains("JSON object"));
    }

    #[test]
    fn test_parse_error_does_not_echo_input() {
        let err = parse_params(Some(r#"{"passwd": "hunter2""#)).unwrap_err();
        let rendered = format!("{:#}", err);
        assert!(rendered.contains("not valid JSON"));
        assert!(!rendered.contains("hunter2"));
    }
}
