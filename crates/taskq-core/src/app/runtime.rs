use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::Task;
use crate::error::ExecutionError;

/// A handler for a specific task type.
///
/// Handlers get the whole claimed `Task` and decode the payload as they like.
/// An `Err` is reported to the engine as a failed attempt; its `Display`
/// text becomes the task's `errorMessage`.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn handle(&self, task: &Task) -> Result<(), ExecutionError>;
}

/// Registry of handlers (task type -> handler), plus an optional fallback
/// for types nobody registered.
///
/// Built during initialization, then shared read-only by the workers.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn TaskHandler>>,
    fallback: Option<Arc<dyn TaskHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for a task type. Registering the same type twice
    /// is an error.
    pub fn register(
        &mut self,
        task_type: impl Into<String>,
        handler: Arc<dyn TaskHandler>,
    ) -> Result<(), ExecutionError> {
        let task_type = task_type.into();
        if self.handlers.contains_key(&task_type) {
            return Err(ExecutionError::DuplicateHandler(task_type));
        }
        self.handlers.insert(task_type, handler);
        Ok(())
    }

    /// Handler used when no type-specific handler matches.
    pub fn set_fallback(&mut self, handler: Arc<dyn TaskHandler>) {
        self.fallback = Some(handler);
    }

    pub fn get(&self, task_type: &str) -> Option<&Arc<dyn TaskHandler>> {
        self.handlers.get(task_type).or(self.fallback.as_ref())
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

/// Runtime executes a claimed `Task` by dispatching to a registered handler.
pub struct Runtime {
    registry: Arc<HandlerRegistry>,
}

impl Runtime {
    pub fn new(registry: Arc<HandlerRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    pub async fn execute(&self, task: &Task) -> Result<(), ExecutionError> {
        let handler = self
            .registry
            .get(&task.task_type)
            .ok_or_else(|| ExecutionError::HandlerNotFound(task.task_type.clone()))?;

        handler.handle(task).await
    }
}
