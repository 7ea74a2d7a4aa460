//! Dispatcher and catalog tests against the mock appliance

use std::sync::Arc;

use async_trait::async_trait;
use fmg_client::testing::{MockAppliance, DEFAULT_TOKEN};
use fmg_client::{ExposureMode, LockState, Result};
use fmg_ops::{
    default_registry, DispatchError, Dispatcher, OpContext, Operation, OperationRegistry,
};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

const ADDRESS_URL: &str = "/pm/config/adom/root/obj/firewall/address";

struct Helper;

#[async_trait]
impl Operation for Helper {
    fn name(&self) -> &'static str {
        "_internal_helper"
    }

    fn description(&self) -> &'static str {
        "Not for callers"
    }

    async fn invoke(&self, _ctx: &OpContext, _params: Value) -> Result<Value> {
        Ok(json!("reached"))
    }
}

async fn dispatcher(mock: &MockAppliance) -> Dispatcher {
    let client = mock.connected_client().await.unwrap();
    Dispatcher::new(client, default_registry())
}

// =============================================================================
// Name Resolution
// =============================================================================

#[tokio::test]
async fn test_internal_names_rejected_whether_registered_or_not() {
    let mock = MockAppliance::start().await.unwrap();
    let client = mock.connected_client().await.unwrap();

    let mut with_helper = default_registry();
    with_helper.register(Arc::new(Helper));
    assert!(with_helper.contains("_internal_helper"));

    for registry in [default_registry(), with_helper] {
        let dispatcher = Dispatcher::new(client.clone(), registry);
        let err = dispatcher.resolve("_internal_helper").err().unwrap();
        assert!(matches!(err, DispatchError::InvalidName(_)));

        let failure = dispatcher
            .execute("_internal_helper", json!({}))
            .await
            .unwrap_err();
        assert_eq!(failure.kind, "invalid_name");
    }
    assert!(mock.calls().is_empty());
}

#[tokio::test]
async fn test_unknown_and_non_invocable_names() {
    let mock = MockAppliance::start().await.unwrap();
    let client = mock.connected_client().await.unwrap();

    let mut registry = default_registry();
    registry.register_alias("status_alias", Arc::new(fmg_ops::catalog::GetSystemStatus));
    let dispatcher = Dispatcher::new(client, registry);

    assert!(matches!(
        dispatcher.resolve("no_such_operation").err().unwrap(),
        DispatchError::UnknownOperation(_)
    ));
    assert!(matches!(
        dispatcher.resolve("status_alias").err().unwrap(),
        DispatchError::NotInvocable(_)
    ));
    assert!(matches!(
        dispatcher.resolve("execute_operation").err().unwrap(),
        DispatchError::NotInvocable(_)
    ));
    assert!(matches!(
        dispatcher.resolve("List-Devices").err().unwrap(),
        DispatchError::InvalidName(_)
    ));
    assert!(dispatcher.resolve("list_devices").is_ok());
}

#[tokio::test]
async fn test_failures_never_echo_params() {
    let mock = MockAppliance::start().await.unwrap();
    mock.fail_next(
        ADDRESS_URL,
        fmg_client::testing::Failure::status(-2, "Invalid value"),
    );
    let dispatcher = dispatcher(&mock).await;

    let failure = dispatcher
        .execute(
            "create_firewall_address",
            json!({"name": "web", "subnet": "10.0.0.10/32", "comment": "hunter2"}),
        )
        .await
        .unwrap_err();

    assert_eq!(failure.operation.as_deref(), Some("create_firewall_address"));
    assert_eq!(failure.kind, "remote");
    assert_eq!(failure.code, Some(-2));
    let rendered = failure.to_json().to_string();
    assert!(!rendered.contains("hunter2"));
    assert!(!rendered.contains("10.0.0.10"));

    // The scoped lock was still released
    assert_eq!(mock.count("/dvmdb/adom/root/workspace/unlock"), 1);
    assert_eq!(mock.count("/dvmdb/adom/root/workspace/commit"), 0);

    // Names end up in the request path; the path stays out of the failure
    let secret_url = format!("{}/Payroll-DB-Secret", ADDRESS_URL);
    mock.fail_next(
        &secret_url,
        fmg_client::testing::Failure::status(-3, "Object does not exist"),
    );
    let failure = dispatcher
        .execute("delete_firewall_address", json!({"name": "Payroll-DB-Secret"}))
        .await
        .unwrap_err();

    assert_eq!(failure.kind, "remote");
    assert_eq!(failure.code, Some(-3));
    assert_eq!(failure.message, "object not found (code -3)");
    let rendered = failure.to_json().to_string();
    assert!(!rendered.contains("Payroll-DB-Secret"));
    assert!(!rendered.contains("/pm/config"));
    assert_eq!(mock.count(&secret_url), 1);
    assert_eq!(mock.count("/dvmdb/adom/root/workspace/unlock"), 2);
}

#[tokio::test]
async fn test_bad_params_are_validation_failures() {
    let mock = MockAppliance::start().await.unwrap();
    let dispatcher = dispatcher(&mock).await;

    let failure = dispatcher
        .execute("get_task", json!({"task_id": "s3cret-token-value"}))
        .await
        .unwrap_err();
    assert_eq!(failure.kind, "validation");
    assert!(!failure.message.contains("s3cret"));

    let failure = dispatcher
        .execute("list_devices", json!({"adom": "../../etc"}))
        .await
        .unwrap_err();
    assert_eq!(failure.kind, "validation");
    assert!(!failure.message.contains("etc"));
    assert!(mock.calls().is_empty());
}

// =============================================================================
// Exposure Modes
// =============================================================================

#[tokio::test]
async fn test_full_mode_exposes_every_operation() {
    let mock = MockAppliance::start().await.unwrap();
    let dispatcher = dispatcher(&mock).await.with_mode(ExposureMode::Full);

    let tools: Vec<&str> = dispatcher.tools().iter().map(|t| t.name).collect();
    assert!(tools.contains(&"list_devices"));
    assert!(tools.contains(&"run_script"));
    assert!(!tools.contains(&"execute_operation"));
    assert_eq!(tools.len(), dispatcher.list().len());

    let status = dispatcher
        .call_tool("get_system_status", json!({}))
        .await
        .unwrap();
    assert_eq!(status["Hostname"], "fmg-mock");
}

#[tokio::test]
async fn test_dynamic_mode_exposes_meta_tools() {
    let mock = MockAppliance::start().await.unwrap();
    let dispatcher = dispatcher(&mock).await.with_mode(ExposureMode::Dynamic);

    let tools: Vec<&str> = dispatcher.tools().iter().map(|t| t.name).collect();
    assert_eq!(
        tools,
        vec!["list_operations", "describe_operation", "execute_operation"]
    );

    let listed = dispatcher
        .call_tool("list_operations", Value::Null)
        .await
        .unwrap();
    let names: Vec<&str> = listed["operations"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|op| op["name"].as_str())
        .collect();
    assert!(names.contains(&"wait_task"));

    let described = dispatcher
        .call_tool("describe_operation", json!({"name": "install_package"}))
        .await
        .unwrap();
    assert_eq!(described["mutating"], true);
    assert_eq!(described["params"][1]["name"], "package");

    let status = dispatcher
        .call_tool(
            "execute_operation",
            json!({"operation": "get_system_status", "params": {}}),
        )
        .await
        .unwrap();
    assert_eq!(status["Hostname"], "fmg-mock");

    let failure = dispatcher
        .call_tool("get_system_status", json!({}))
        .await
        .unwrap_err();
    assert_eq!(failure.kind, "unknown_tool");

    let failure = dispatcher
        .call_tool(
            "execute_operation",
            json!({"operation": "execute_operation", "params": {}}),
        )
        .await
        .unwrap_err();
    assert_eq!(failure.kind, "not_invocable");
}

// =============================================================================
// Catalog
// =============================================================================

#[tokio::test]
async fn test_create_address_runs_inside_scoped_lock() {
    let mock = MockAppliance::start().await.unwrap();
    let dispatcher = dispatcher(&mock).await;

    let created = dispatcher
        .execute(
            "create_firewall_address",
            json!({"name": "web", "subnet": "10.0.0.10/32"}),
        )
        .await
        .unwrap();
    assert_eq!(created, json!({"name": "web"}));

    let calls = mock.calls();
    let urls: Vec<&str> = calls.iter().map(|c| c.url.as_str()).collect();
    assert_eq!(
        urls,
        vec![
            "/dvmdb/adom/root/workspace/lock",
            ADDRESS_URL,
            "/dvmdb/adom/root/workspace/commit",
            "/dvmdb/adom/root/workspace/unlock",
        ]
    );
    assert_eq!(calls[1].method, "add");
    assert_eq!(
        calls[1].data,
        Some(json!({"name": "web", "type": "ipmask", "subnet": "10.0.0.10/32"}))
    );
    assert_eq!(
        dispatcher.context().client().workspace().state("root"),
        LockState::Unlocked
    );
}

#[tokio::test]
async fn test_run_script_uses_legacy_endpoint_on_7_0() {
    let mock = MockAppliance::builder()
        .token(DEFAULT_TOKEN)
        .version("v7.0.12-build0423 231011 (GA)")
        .start()
        .await
        .unwrap();
    mock.reply("/dvmdb/script/execute", json!({"task": 42}));
    let dispatcher = dispatcher(&mock).await;

    let result = dispatcher
        .execute(
            "run_script",
            json!({"script": "backup-config", "scope": [{"name": "FGT-A", "vdom": "root"}]}),
        )
        .await
        .unwrap();
    assert_eq!(result, json!({"task_id": 42}));

    let call = mock
        .calls()
        .into_iter()
        .find(|c| c.url == "/dvmdb/script/execute")
        .unwrap();
    let data = call.data.unwrap();
    assert_eq!(data["adom"], "root");
    assert_eq!(data["script"], "backup-config");
}

#[tokio::test]
async fn test_run_script_uses_adom_path_on_7_6_and_waits() {
    let mock = MockAppliance::start().await.unwrap();
    mock.reply("/dvmdb/adom/root/script/execute", json!({"task": 43}));
    mock.task_states(
        43,
        vec![
            json!({"id": 43, "state": 1, "percent": 50}),
            json!({"id": 43, "state": 4, "percent": 100}),
        ],
    );
    let dispatcher = dispatcher(&mock).await;

    let result = dispatcher
        .execute(
            "run_script",
            json!({"script": "backup-config", "scope": [{"name": "FGT-A"}], "wait": true}),
        )
        .await
        .unwrap();
    assert_eq!(result["task_id"], 43);
    assert_eq!(result["task"]["status"], "done");

    let call = mock
        .calls()
        .into_iter()
        .find(|c| c.url == "/dvmdb/adom/root/script/execute")
        .unwrap();
    assert!(call.data.unwrap().get("adom").is_none());
}

#[tokio::test]
async fn test_install_package_follows_task() {
    let mock = MockAppliance::start().await.unwrap();
    mock.reply("/securityconsole/install/package", json!({"task": 7}));
    mock.task_states(7, vec![json!({"id": 7, "state": 5, "percent": 100, "num_err": 1})]);
    let dispatcher = dispatcher(&mock).await;

    let result = dispatcher
        .execute(
            "install_package",
            json!({"package": "default", "scope": [{"name": "FGT-A", "vdom": "root"}], "wait": true}),
        )
        .await
        .unwrap();
    assert_eq!(result["task"]["status"], "error");
    assert_eq!(result["task"]["num_err"], 1);

    let data = mock
        .calls()
        .into_iter()
        .find(|c| c.url == "/securityconsole/install/package")
        .and_then(|c| c.data)
        .unwrap();
    assert_eq!(data["pkg"], "default");
    assert_eq!(data["flags"], json!(["none"]));
}

#[tokio::test]
async fn test_raw_lock_commit_unlock() {
    let mock = MockAppliance::start().await.unwrap();
    let dispatcher = dispatcher(&mock).await;

    let failure = dispatcher
        .execute("unlock_adom", json!({}))
        .await
        .unwrap_err();
    assert_eq!(failure.kind, "validation");

    let locked = dispatcher.execute("lock_adom", json!({})).await.unwrap();
    assert_eq!(locked, json!({"adom": "root", "state": "locked"}));
    assert_eq!(mock.lock_holder("root").as_deref(), Some("api-token"));

    // A scoped mutation on the same ADOM conflicts locally
    let failure = dispatcher
        .execute("delete_firewall_address", json!({"name": "web"}))
        .await
        .unwrap_err();
    assert_eq!(failure.kind, "lock_conflict");

    let committed = dispatcher.execute("commit_adom", json!({})).await.unwrap();
    assert_eq!(committed["state"], "committed");

    let unlocked = dispatcher.execute("unlock_adom", json!({})).await.unwrap();
    assert_eq!(unlocked["state"], "unlocked");
    assert_eq!(mock.lock_holder("root"), None);
}

#[tokio::test]
async fn test_shutdown_releases_raw_locks() {
    let mock = MockAppliance::start().await.unwrap();
    let dispatcher = dispatcher(&mock).await;

    dispatcher
        .execute("lock_adom", json!({"adom": "root"}))
        .await
        .unwrap();
    assert_eq!(dispatcher.context().held_adoms(), vec!["root".to_string()]);

    dispatcher.shutdown().await;
    assert!(dispatcher.context().held_adoms().is_empty());
    assert_eq!(mock.lock_holder("root"), None);
}

#[tokio::test]
async fn test_wait_task_timeout_is_reported() {
    let mock = MockAppliance::start().await.unwrap();
    mock.task_states(9, vec![json!({"id": 9, "state": 1, "percent": 10})]);
    let dispatcher = dispatcher(&mock).await;

    let failure = dispatcher
        .execute(
            "wait_task",
            json!({"task_id": 9, "interval_secs": 2, "timeout_secs": 1}),
        )
        .await
        .unwrap_err();
    assert_eq!(failure.kind, "task_timeout");
    assert_eq!(mock.count("/task/task/9"), 1);
}

#[tokio::test]
async fn test_api_version_report() {
    let mock = MockAppliance::builder()
        .token(DEFAULT_TOKEN)
        .version("v6.4.13-build2702 230731 (GA)")
        .start()
        .await
        .unwrap();
    let dispatcher = dispatcher(&mock).await;

    let report = dispatcher
        .execute("get_api_version", Value::Null)
        .await
        .unwrap();
    assert_eq!(
        report,
        json!({"version": "6.4.13", "recognized": true, "generation": "6.4"})
    );
}
