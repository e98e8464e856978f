use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::emitter::Emitter;
use super::error::ModuleResult;

/// A pluggable lookup the orchestrator can run.
///
/// `run` must check `token` at every suspension point, return promptly once
/// it is cancelled, and never emit after returning. Partial results already
/// emitted stay delivered. Modules that fan out must cap their concurrency
/// and stop issuing sub-lookups once cancelled.
#[async_trait]
pub trait SearchModule: Send + Sync {
    fn name(&self) -> &'static str;

    /// Check the query before any work starts; `Err` carries the reason
    fn validate(&self, query: &str) -> Result<(), String>;

    /// Run the lookup. The returned value becomes the `Completed` payload.
    async fn run(&self, query: &str, token: CancellationToken, emit: &Emitter) -> ModuleResult<Value>;
}

/// Registered module names and their aliases
#[derive(Debug, Clone, Serialize)]
pub struct ModuleInfo {
    pub name: String,
    pub aliases: Vec<String>,
}

/// Table of search modules keyed by name
#[derive(Clone, Default)]
pub struct ModuleRegistry {
    modules: HashMap<String, Arc<dyn SearchModule>>,
    aliases: HashMap<String, String>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, module: Arc<dyn SearchModule>) {
        self.modules.insert(module.name().to_string(), module);
    }

    /// Make `alias` resolve to the module registered as `target`.
    /// Returns false if `target` is unknown.
    pub fn alias(&mut self, alias: impl Into<String>, target: &str) -> bool {
        if !self.modules.contains_key(target) {
            return false;
        }
        self.aliases.insert(alias.into(), target.to_string());
        true
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn SearchModule>> {
        if let Some(module) = self.modules.get(name) {
            return Some(module.clone());
        }
        self.aliases
            .get(name)
            .and_then(|target| self.modules.get(target))
            .cloned()
    }

    /// Canonical module names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.modules.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn describe(&self) -> Vec<ModuleInfo> {
        let mut by_target: BTreeMap<&str, Vec<String>> = self
            .modules
            .keys()
            .map(|name| (name.as_str(), Vec::new()))
            .collect();
        for (alias, target) in &self.aliases {
            if let Some(aliases) = by_target.get_mut(target.as_str()) {
                aliases.push(alias.clone());
            }
        }

        by_target
            .into_iter()
            .map(|(name, mut aliases)| {
                aliases.sort();
                ModuleInfo {
                    name: name.to_string(),
                    aliases,
                }
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Named(&'static str);

    #[async_trait]
    impl SearchModule for Named {
        fn name(&self) -> &'static str {
            self.0
        }

        fn validate(&self, _query: &str) -> Result<(), String> {
            Ok(())
        }

        async fn run(&self, _query: &str, _token: CancellationToken, _emit: &Emitter) -> ModuleResult<Value> {
            Ok(json!(null))
        }
    }

    #[test]
    fn test_lookup_by_name_and_alias() {
        let mut registry = ModuleRegistry::new();
        registry.register(Arc::new(Named("cross-site-enumeration")));
        assert!(registry.alias("username", "cross-site-enumeration"));
        assert!(!registry.alias("phone", "missing"));

        assert_eq!(registry.get("cross-site-enumeration").unwrap().name(), "cross-site-enumeration");
        assert_eq!(registry.get("username").unwrap().name(), "cross-site-enumeration");
        assert!(registry.get("phone").is_none());
    }

    #[test]
    fn test_describe_groups_aliases() {
        let mut registry = ModuleRegistry::new();
        registry.register(Arc::new(Named("whois")));
        registry.register(Arc::new(Named("code-hosting")));
        registry.alias("github", "code-hosting");

        let info = registry.describe();
        assert_eq!(info.len(), 2);
        assert_eq!(info[0].name, "code-hosting");
        assert_eq!(info[0].aliases, vec!["github".to_string()]);
        assert!(info[1].aliases.is_empty());
        assert_eq!(registry.names(), vec!["code-hosting", "whois"]);
    }
}
