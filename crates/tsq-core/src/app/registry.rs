//! RunnerRegistry - 名前 → Runner の対応表
//!
//! # 方針
//! - 同名の再登録は後勝ち（エラーにしない）
//! - Runner は Arc で共有し、worker は実行中にロックを握らない

use std::collections::HashMap;
use std::sync::Arc;

use crate::ports::Runner;

#[derive(Default)]
pub struct RunnerRegistry {
    runners: HashMap<String, Arc<dyn Runner>>,
}

impl RunnerRegistry {
    pub fn new() -> Self {
        Self {
            runners: HashMap::new(),
        }
    }

    /// Bind `name` to `runner`, returning the runner it replaced, if any.
    pub fn define(&mut self, name: impl Into<String>, runner: Arc<dyn Runner>) -> Option<Arc<dyn Runner>> {
        self.runners.insert(name.into(), runner)
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Runner>> {
        self.runners.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.runners.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.runners.keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::FnRunner;
    use serde_json::{json, Value};

    fn constant(value: Value) -> Arc<dyn Runner> {
        Arc::new(FnRunner::new(move |_| Ok(value.clone())))
    }

    #[test]
    fn names_are_sorted() {
        let mut registry = RunnerRegistry::new();
        registry.define("sleep", constant(json!(1)));
        registry.define("echo", constant(json!(2)));
        registry.define("ping", constant(json!(3)));

        assert_eq!(registry.names(), vec!["echo", "ping", "sleep"]);
        assert!(registry.contains("ping"));
        assert!(!registry.contains("pong"));
    }

    #[tokio::test]
    async fn redefining_a_name_replaces_the_runner() {
        let mut registry = RunnerRegistry::new();
        assert!(registry.define("test", constant(json!("old"))).is_none());
        assert!(registry.define("test", constant(json!("new"))).is_some());

        let runner = registry.get("test").unwrap();
        assert_eq!(runner.run(Value::Null).await.unwrap(), json!("new"));
        assert_eq!(registry.names().len(), 1);
    }
}
