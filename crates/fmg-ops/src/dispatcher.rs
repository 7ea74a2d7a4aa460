//! Name-checked dispatch and the tool surface for each exposure mode
//!
//! In `full` mode every operation is its own tool. In `dynamic` mode only the
//! three meta tools are exposed and operations are reached through
//! `execute_operation`.

use std::fmt;
use std::sync::Arc;

use fmg_client::sanitize::{redact, scrub_text};
use fmg_client::{ExposureMode, FmgClient, FmgError};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::operation::{parse_params, OpContext, Operation, OperationInfo, ParamSpec};
use crate::registry::{Entry, OperationRegistry};

pub const LIST_OPERATIONS: &str = "list_operations";
pub const DESCRIBE_OPERATION: &str = "describe_operation";
pub const EXECUTE_OPERATION: &str = "execute_operation";

const MAX_NAME_LEN: usize = 64;

/// Why a name could not be dispatched, or the operation's own failure
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("invalid operation name: {0}")]
    InvalidName(&'static str),

    #[error("unknown operation '{0}'")]
    UnknownOperation(String),

    #[error("operation '{0}' is not invocable")]
    NotInvocable(String),

    #[error("unknown tool")]
    UnknownTool,

    #[error(transparent)]
    Operation(#[from] FmgError),
}

impl DispatchError {
    pub fn kind(&self) -> &'static str {
        match self {
            DispatchError::InvalidName(_) => "invalid_name",
            DispatchError::UnknownOperation(_) => "unknown_operation",
            DispatchError::NotInvocable(_) => "not_invocable",
            DispatchError::UnknownTool => "unknown_tool",
            DispatchError::Operation(e) => e.kind().as_str(),
        }
    }
}

/// Serialisable failure; carries the operation name but never its parameters
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DispatchFailure {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,
    pub kind: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<i64>,
    pub effect_unknown: bool,
}

impl DispatchFailure {
    fn new(operation: &str, err: &DispatchError) -> Self {
        // Names that fail the pattern are not echoed back
        let operation = validate_name(operation).ok().map(|_| operation.to_string());
        match err {
            DispatchError::Operation(e) => {
                let report = e.report();
                Self {
                    operation,
                    kind: err.kind().to_string(),
                    message: report.message,
                    code: report.code,
                    effect_unknown: report.effect_unknown,
                }
            }
            other => Self {
                operation,
                kind: other.kind().to_string(),
                message: scrub_text(&other.to_string()),
                code: None,
                effect_unknown: false,
            },
        }
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| json!({"kind": self.kind}))
    }
}

impl fmt::Display for DispatchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.operation {
            Some(op) => write!(f, "{} failed ({}): {}", op, self.kind, self.message),
            None => write!(f, "{}: {}", self.kind, self.message),
        }
    }
}

impl std::error::Error for DispatchFailure {}

/// Check a caller-supplied operation name.
///
/// The internal `_` prefix is rejected before anything else, so internal
/// names fail the same way whether or not they are registered.
pub fn validate_name(name: &str) -> Result<(), DispatchError> {
    if name.starts_with('_') {
        return Err(DispatchError::InvalidName("internal names are not callable"));
    }
    if name.is_empty() || name.len() > MAX_NAME_LEN {
        return Err(DispatchError::InvalidName("must be 1 to 64 characters"));
    }
    if !name
        .bytes()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_')
    {
        return Err(DispatchError::InvalidName(
            "only lowercase letters, digits and underscores are allowed",
        ));
    }
    Ok(())
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct DescribeArgs {
    name: String,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct ExecuteArgs {
    operation: String,
    #[serde(default)]
    params: Value,
}

fn meta_tools() -> Vec<OperationInfo> {
    vec![
        OperationInfo {
            name: LIST_OPERATIONS,
            description: "List the operations available through execute_operation",
            mutating: false,
            params: vec![],
        },
        OperationInfo {
            name: DESCRIBE_OPERATION,
            description: "Describe one operation and its parameters",
            mutating: false,
            params: vec![ParamSpec::required("name", "string", "Operation name")],
        },
        OperationInfo {
            name: EXECUTE_OPERATION,
            description: "Execute an operation by name",
            mutating: true,
            params: vec![
                ParamSpec::required("operation", "string", "Operation name"),
                ParamSpec::optional("params", "object", "Operation parameters"),
            ],
        },
    ]
}

/// Resolves operation names against a registry and runs them
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<OperationRegistry>,
    ctx: OpContext,
    mode: ExposureMode,
}

impl Dispatcher {
    /// Dispatcher using the client's configured exposure mode
    pub fn new(client: FmgClient, registry: OperationRegistry) -> Self {
        let mode = client.settings().tool_mode;
        Self {
            registry: Arc::new(registry),
            ctx: OpContext::new(client),
            mode,
        }
    }

    pub fn with_mode(mut self, mode: ExposureMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn mode(&self) -> ExposureMode {
        self.mode
    }

    pub fn context(&self) -> &OpContext {
        &self.ctx
    }

    pub fn registry(&self) -> &OperationRegistry {
        &self.registry
    }

    /// Look up an invocable handler by name
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn Operation>, DispatchError> {
        validate_name(name)?;
        match self.registry.get(name) {
            None => Err(DispatchError::UnknownOperation(name.to_string())),
            Some(Entry::Handler(op)) if op.name() == name => Ok(op.clone()),
            Some(Entry::Handler(op)) => {
                warn!(key = name, handler = op.name(), "Registry key does not match handler name");
                Err(DispatchError::NotInvocable(name.to_string()))
            }
            Some(Entry::Reserved { reason }) => {
                debug!(operation = name, reason, "Reserved name requested");
                Err(DispatchError::NotInvocable(name.to_string()))
            }
        }
    }

    /// Run an operation by name
    #[instrument(skip(self, params))]
    pub async fn execute(&self, name: &str, params: Value) -> Result<Value, DispatchFailure> {
        let op = self
            .resolve(name)
            .map_err(|e| DispatchFailure::new(name, &e))?;

        debug!(params = %redact(&params), "Dispatching");
        match op.invoke(&self.ctx, params).await {
            Ok(value) => {
                info!(operation = name, "Operation completed");
                Ok(value)
            }
            Err(e) => {
                let failure = DispatchFailure::new(name, &DispatchError::Operation(e));
                warn!(
                    operation = name,
                    kind = %failure.kind,
                    effect_unknown = failure.effect_unknown,
                    "Operation failed"
                );
                Err(failure)
            }
        }
    }

    /// Invocable operations in name order
    pub fn list(&self) -> Vec<OperationInfo> {
        self.registry.infos()
    }

    pub fn describe(&self, name: &str) -> Result<OperationInfo, DispatchFailure> {
        self.resolve(name)
            .map(|op| op.info())
            .map_err(|e| DispatchFailure::new(name, &e))
    }

    /// Tools exposed under the current mode
    pub fn tools(&self) -> Vec<OperationInfo> {
        match self.mode {
            ExposureMode::Full => self.list(),
            ExposureMode::Dynamic => meta_tools(),
        }
    }

    /// Invoke a tool as exposed under the current mode
    pub async fn call_tool(&self, tool: &str, args: Value) -> Result<Value, DispatchFailure> {
        match self.mode {
            ExposureMode::Full => self.execute(tool, args).await,
            ExposureMode::Dynamic => match tool {
                LIST_OPERATIONS => Ok(json!({ "operations": self.list() })),
                DESCRIBE_OPERATION => {
                    let args: DescribeArgs = parse_params(args)
                        .map_err(|e| DispatchFailure::new(tool, &DispatchError::from(e)))?;
                    let info = self.describe(&args.name)?;
                    Ok(json!(info))
                }
                EXECUTE_OPERATION => {
                    let args: ExecuteArgs = parse_params(args)
                        .map_err(|e| DispatchFailure::new(tool, &DispatchError::from(e)))?;
                    self.execute(&args.operation, args.params).await
                }
                _ => Err(DispatchFailure::new(tool, &DispatchError::UnknownTool)),
            },
        }
    }

    /// Release raw workspace locks still held by `lock_adom`
    pub async fn shutdown(&self) {
        let held = self.ctx.held_adoms();
        if !held.is_empty() {
            info!(?held, "Releasing workspace locks held by operations");
        }
        self.ctx.release_all().await;
    }
}
