//! Operation registry

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::operation::{Operation, OperationInfo};

/// What a registry key points at
#[derive(Clone)]
pub enum Entry {
    /// Live handler
    Handler(Arc<dyn Operation>),
    /// Name held back from callers
    Reserved { reason: &'static str },
}

/// Operations by name, in name order
#[derive(Clone, Default)]
pub struct OperationRegistry {
    entries: BTreeMap<String, Entry>,
}

impl OperationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under its own name
    pub fn register(&mut self, operation: Arc<dyn Operation>) {
        let name = operation.name().to_string();
        debug!(operation = %name, "Registering operation");
        if self
            .entries
            .insert(name.clone(), Entry::Handler(operation))
            .is_some()
        {
            warn!(operation = %name, "Operation registered twice, keeping the latest");
        }
    }

    /// Register a handler under a key other than its name.
    ///
    /// Such entries are listed but the dispatcher refuses to invoke them.
    pub fn register_alias(&mut self, key: &str, operation: Arc<dyn Operation>) {
        self.entries.insert(key.to_string(), Entry::Handler(operation));
    }

    /// Hold `name` back from callers
    pub fn reserve(&mut self, name: &str, reason: &'static str) {
        self.entries
            .insert(name.to_string(), Entry::Reserved { reason });
    }

    pub fn get(&self, name: &str) -> Option<&Entry> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Invocable operations: live handlers registered under their own name
    pub fn operations(&self) -> impl Iterator<Item = &Arc<dyn Operation>> {
        self.entries.iter().filter_map(|(key, entry)| match entry {
            Entry::Handler(op) if op.name() == key => Some(op),
            _ => None,
        })
    }

    pub fn infos(&self) -> Vec<OperationInfo> {
        self.operations().map(|op| op.info()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::OpContext;
    use async_trait::async_trait;
    use fmg_client::Result;
    use serde_json::Value;

    struct Noop;

    #[async_trait]
    impl Operation for Noop {
        fn name(&self) -> &'static str {
            "noop"
        }

        fn description(&self) -> &'static str {
            "Does nothing"
        }

        async fn invoke(&self, _ctx: &OpContext, _params: Value) -> Result<Value> {
            Ok(Value::Null)
        }
    }

    #[test]
    fn test_register_and_list() {
        let mut registry = OperationRegistry::new();
        registry.register(Arc::new(Noop));
        registry.register_alias("other_name", Arc::new(Noop));
        registry.reserve("held", "not for callers");

        assert_eq!(registry.len(), 3);
        assert!(registry.contains("held"));
        let names: Vec<&str> = registry.operations().map(|op| op.name()).collect();
        assert_eq!(names, vec!["noop"]);
        assert!(matches!(registry.get("held"), Some(Entry::Reserved { .. })));
    }
}
