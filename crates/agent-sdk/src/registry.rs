//! Local tool registry: maps tool names to handlers the agent may invoke on
//! this device.

use std::sync::Arc;

use al_domain::error::{Error, Result};
use indexmap::IndexMap;

use crate::types::{ToolContext, ToolResult};

/// Implement this trait to expose a device-side tool to the agent.
///
/// Any state the handler needs (device drivers, caches, configuration) lives
/// in the implementing type itself.
///
/// # Example
///
/// ```rust,no_run
/// use al_agent_sdk::{LocalTool, ToolContext, ToolResult};
///
/// struct Battery;
///
/// #[async_trait::async_trait]
/// impl LocalTool for Battery {
///     async fn call(&self, _ctx: ToolContext, _args: serde_json::Value) -> ToolResult {
///         Ok(serde_json::json!({ "percent": 87 }))
///     }
/// }
/// ```
#[async_trait::async_trait]
pub trait LocalTool: Send + Sync + 'static {
    /// Execute the tool.
    ///
    /// * `ctx`: call context (correlation ID, cancellation token)
    /// * `args`: JSON arguments chosen by the agent
    async fn call(&self, ctx: ToolContext, args: serde_json::Value) -> ToolResult;
}

/// Registered tools in registration order, keyed by unique name.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: IndexMap<String, Arc<dyn LocalTool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `tool` under `name`.
    ///
    /// Fails with `InvalidArgument` if the name is empty or already taken.
    pub fn register<T: LocalTool>(&mut self, name: impl Into<String>, tool: T) -> Result<()> {
        self.register_boxed(name, Arc::new(tool))
    }

    /// Register a pre-wrapped tool handler.
    pub fn register_boxed(
        &mut self,
        name: impl Into<String>,
        tool: Arc<dyn LocalTool>,
    ) -> Result<()> {
        let name = name.into();
        if name.is_empty() {
            return Err(Error::InvalidArgument("tool name must not be empty".into()));
        }
        if self.tools.contains_key(&name) {
            return Err(Error::InvalidArgument(format!(
                "tool already registered: {name}"
            )));
        }
        tracing::debug!(tool = %name, "registered local tool");
        self.tools.insert(name, tool);
        Ok(())
    }

    /// Remove `name`.  Returns whether an entry was removed.
    pub fn unregister(&mut self, name: &str) -> bool {
        let removed = self.tools.shift_remove(name).is_some();
        if removed {
            tracing::debug!(tool = %name, "unregistered local tool");
        }
        removed
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn LocalTool>> {
        self.tools.get(name).cloned()
    }

    /// All registered tool names in registration order.
    pub fn names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Release every entry.
    pub fn clear(&mut self) {
        self.tools.clear();
    }
}
