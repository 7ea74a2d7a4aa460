//! Status command - appliance identity and API generation

use std::process::ExitCode;

use anyhow::Result;
use fmg_client::{FmgClient, ResolvedVersion};
use serde_json::Value;

use crate::output::OutputContext;

const STATUS_FIELDS: [(&str, &str); 4] = [
    ("Hostname", "Hostname"),
    ("Serial", "Serial Number"),
    ("Platform", "Platform Type"),
    ("HA Mode", "HA Mode"),
];

pub async fn status(client: &FmgClient, ctx: &OutputContext) -> Result<ExitCode> {
    let status = client.system_status().await?;
    let version = client.version().await?;

    let mut pairs: Vec<(&str, String)> = vec![("Endpoint", client.endpoint().to_string())];
    for (label, key) in STATUS_FIELDS {
        if let Some(value) = status.get(key).and_then(text) {
            pairs.push((label, value));
        }
    }

    let reported = match &version {
        ResolvedVersion::Known { version } => version.to_string(),
        ResolvedVersion::Unrecognized { raw } => format!("{} (unrecognized)", raw),
    };
    pairs.push(("Version", reported));
    pairs.push(("API Generation", version.generation().to_string()));
    pairs.push(("Default ADOM", client.default_adom().to_string()));

    ctx.print_kv(&pairs);
    Ok(ExitCode::SUCCESS)
}

fn text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
