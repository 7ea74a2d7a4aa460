//! Operation trait and the context handlers run in

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use fmg_client::validate::validate_adom;
use fmg_client::{FmgClient, FmgError, LockHandle, Result};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

/// One parameter an operation accepts, for discovery
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ParamSpec {
    pub name: &'static str,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub required: bool,
    pub description: &'static str,
}

impl ParamSpec {
    pub const fn required(name: &'static str, kind: &'static str, description: &'static str) -> Self {
        Self {
            name,
            kind,
            required: true,
            description,
        }
    }

    pub const fn optional(name: &'static str, kind: &'static str, description: &'static str) -> Self {
        Self {
            name,
            kind,
            required: false,
            description,
        }
    }
}

/// Discovery view of an operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperationInfo {
    pub name: &'static str,
    pub description: &'static str,
    pub mutating: bool,
    pub params: Vec<ParamSpec>,
}

/// A named request template over the client core
#[async_trait]
pub trait Operation: Send + Sync {
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    /// Whether the operation changes appliance state
    fn mutating(&self) -> bool {
        false
    }

    fn params(&self) -> &'static [ParamSpec] {
        &[]
    }

    async fn invoke(&self, ctx: &OpContext, params: Value) -> Result<Value>;

    fn info(&self) -> OperationInfo {
        OperationInfo {
            name: self.name(),
            description: self.description(),
            mutating: self.mutating(),
            params: self.params().to_vec(),
        }
    }
}

/// Everything a handler needs: the client and raw workspace locks held
/// between calls.
#[derive(Clone)]
pub struct OpContext {
    client: FmgClient,
    held: Arc<Mutex<HashMap<String, LockHandle>>>,
}

impl OpContext {
    pub fn new(client: FmgClient) -> Self {
        Self {
            client,
            held: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn client(&self) -> &FmgClient {
        &self.client
    }

    /// `adom` if given, otherwise the client's default; validated either way
    pub fn adom(&self, adom: Option<&str>) -> Result<String> {
        let adom = adom.unwrap_or_else(|| self.client.default_adom());
        validate_adom(adom)?;
        Ok(adom.to_string())
    }

    pub(crate) fn hold(&self, handle: LockHandle) {
        let adom = handle.adom().to_string();
        if let Some(previous) = self.held.lock().insert(adom, handle) {
            warn!(adom = %previous.adom(), "Replacing a held workspace lock");
        }
    }

    pub(crate) fn take(&self, adom: &str) -> Option<LockHandle> {
        self.held.lock().remove(adom)
    }

    /// ADOMs locked through `lock_adom` and not yet unlocked
    pub fn held_adoms(&self) -> Vec<String> {
        let mut adoms: Vec<String> = self.held.lock().keys().cloned().collect();
        adoms.sort();
        adoms
    }

    /// Unlock every raw lock still held. Failures are logged.
    pub async fn release_all(&self) {
        let handles: Vec<LockHandle> = self.held.lock().drain().map(|(_, h)| h).collect();
        let workspace = self.client.workspace();
        for handle in handles {
            let adom = handle.adom().to_string();
            if let Err(e) = workspace.unlock(handle).await {
                warn!(%adom, "Releasing held lock failed: {}", e);
            }
        }
    }
}

/// Deserialize operation parameters.
///
/// Error messages keep serde's field names but never the offending values.
pub fn parse_params<T: DeserializeOwned>(params: Value) -> Result<T> {
    let params = match params {
        Value::Null => Value::Object(Default::default()),
        other => other,
    };
    serde_json::from_value(params).map_err(|e| {
        let message = e.to_string();
        let reason = ["missing field", "unknown field", "duplicate field"]
            .iter()
            .find(|prefix| message.starts_with(*prefix))
            .map(|_| message.split(" at line").next().unwrap_or_default().to_string())
            .unwrap_or_else(|| "parameters do not match the expected types".to_string());
        FmgError::validation("params", reason)
    })
}

/// Serialize a handler result
pub(crate) fn to_value<T: Serialize>(value: T) -> Result<Value> {
    serde_json::to_value(value).map_err(|e| FmgError::Internal(format!("result encoding: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize)]
    #[serde(deny_unknown_fields)]
    struct Params {
        name: String,
        #[serde(default)]
        count: u32,
    }

    #[test]
    fn test_parse_params() {
        let p: Params = parse_params(json!({"name": "web"})).unwrap();
        assert_eq!(p.name, "web");
        assert_eq!(p.count, 0);
    }

    #[test]
    fn test_parse_params_null_is_empty_object() {
        #[derive(Deserialize)]
        struct Empty {
            #[serde(default)]
            adom: Option<String>,
        }
        let p: Empty = parse_params(Value::Null).unwrap();
        assert!(p.adom.is_none());
    }

    #[test]
    fn test_parse_params_never_echoes_values() {
        let err = parse_params::<Params>(json!({"name": "web", "count": "hunter2"})).unwrap_err();
        assert!(matches!(err, FmgError::Validation { .. }));
        assert!(!err.to_string().contains("hunter2"));

        let err = parse_params::<Params>(json!({})).unwrap_err();
        assert!(err.to_string().contains("missing field `name`"));

        let err = parse_params::<Params>(json!({"name": "x", "password": "hunter2"})).unwrap_err();
        assert!(err.to_string().contains("unknown field `password`"));
        assert!(!err.to_string().contains("hunter2"));
    }
}
