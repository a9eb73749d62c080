//! Registry mapping `(module, class)` identifiers to task constructors.
//!
//! Workflow files name their tasks by a module/class pair. The registry is
//! populated once at startup by explicit registration, so the workflow file
//! decides which tasks run and in which order without any reflection.

use std::collections::{BTreeMap, HashMap};

use crate::error::LoadError;

use super::{Task, TaskConfig};

/// Constructs a task from its workflow `config` mapping.
pub type TaskFactory = Box<dyn Fn(TaskConfig) -> Box<dyn Task> + Send + Sync>;

/// Registry of constructible task implementations.
#[derive(Default)]
pub struct TaskRegistry {
    /// Factories keyed by module, then class.
    modules: HashMap<String, HashMap<String, TaskFactory>>,
}

impl TaskRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a factory under a module/class pair.
    ///
    /// Registering the same pair twice replaces the earlier factory.
    pub fn register<F>(&mut self, module: impl Into<String>, class: impl Into<String>, factory: F)
    where
        F: Fn(TaskConfig) -> Box<dyn Task> + Send + Sync + 'static,
    {
        self.modules
            .entry(module.into())
            .or_default()
            .insert(class.into(), Box::new(factory));
    }

    /// Looks up the factory for a module/class pair.
    ///
    /// # Errors
    /// Returns `ModuleNotFound` if nothing is registered under `module`, or
    /// `ClassNotFound` if the module exists but has no such class.
    pub fn resolve(&self, module: &str, class: &str) -> Result<&TaskFactory, LoadError> {
        let classes = self
            .modules
            .get(module)
            .ok_or_else(|| LoadError::ModuleNotFound(module.to_string()))?;

        classes.get(class).ok_or_else(|| LoadError::ClassNotFound {
            module: module.to_string(),
            class: class.to_string(),
        })
    }

    /// Returns true if the pair is registered.
    pub fn contains(&self, module: &str, class: &str) -> bool {
        self.resolve(module, class).is_ok()
    }

    /// Returns all registered identifiers, sorted, as `(module, class)` pairs.
    pub fn identifiers(&self) -> Vec<(String, String)> {
        let sorted: BTreeMap<&String, &HashMap<String, TaskFactory>> =
            self.modules.iter().collect();

        sorted
            .into_iter()
            .flat_map(|(module, classes)| {
                let mut names: Vec<&String> = classes.keys().collect();
                names.sort();
                names
                    .into_iter()
                    .map(move |class| (module.clone(), class.clone()))
            })
            .collect()
    }

    /// Number of registered task classes.
    pub fn len(&self) -> usize {
        self.modules.values().map(HashMap::len).sum()
    }

    /// Returns true if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for TaskRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskRegistry")
            .field("identifiers", &self.identifiers())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::PipelineContext;
    use crate::task::TaskData;
    use async_trait::async_trait;

    struct Named(String);

    #[async_trait]
    impl Task for Named {
        fn name(&self) -> &str {
            &self.0
        }

        fn description(&self) -> &str {
            "test task"
        }

        async fn execute(&self, _context: &PipelineContext) -> anyhow::Result<TaskData> {
            Ok(TaskData::new())
        }
    }

    fn registry() -> TaskRegistry {
        let mut registry = TaskRegistry::new();
        registry.register("tasks.alpha", "AlphaTask", |_| Box::new(Named("alpha".into())));
        registry.register("tasks.alpha", "OtherTask", |_| Box::new(Named("other".into())));
        registry.register("tasks.beta", "BetaTask", |_| Box::new(Named("beta".into())));
        registry
    }

    #[test]
    fn test_resolve_constructs_task() {
        let registry = registry();
        let factory = registry.resolve("tasks.beta", "BetaTask").unwrap();
        let task = factory(TaskConfig::new());
        assert_eq!(task.name(), "beta");
    }

    #[test]
    fn test_resolve_unknown_module() {
        let registry = registry();
        let err = registry.resolve("tasks.gamma", "GammaTask").err().unwrap();
        assert!(matches!(err, LoadError::ModuleNotFound(ref m) if m == "tasks.gamma"));
    }

    #[test]
    fn test_resolve_unknown_class() {
        let registry = registry();
        let err = registry.resolve("tasks.alpha", "BetaTask").err().unwrap();
        assert!(matches!(err, LoadError::ClassNotFound { .. }));
    }

    #[test]
    fn test_identifiers_sorted() {
        let registry = registry();
        assert_eq!(registry.len(), 3);
        assert_eq!(
            registry.identifiers(),
            vec![
                ("tasks.alpha".to_string(), "AlphaTask".to_string()),
                ("tasks.alpha".to_string(), "OtherTask".to_string()),
                ("tasks.beta".to_string(), "BetaTask".to_string()),
            ]
        );
        assert!(registry.contains("tasks.alpha", "OtherTask"));
        assert!(!TaskRegistry::new().contains("tasks.alpha", "OtherTask"));
        assert!(TaskRegistry::new().is_empty());
    }
}
