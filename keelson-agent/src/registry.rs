use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use thiserror::Error;

use keelson_core::{Tool, ToolError, UserContext, Value};

pub const NO_TOOLS_AVAILABLE: &str = "No tools are currently available.";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ToolRegistryError {
    #[error("tool name must not be empty")]
    EmptyName,
    #[error("Tool '{0}' is already registered")]
    Duplicate(String),
}

/// Name → tool lookup handed to the loop at construction. Read-only once built.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .finish()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<T>(&mut self, tool: T) -> Result<&mut Self, ToolRegistryError>
    where
        T: Tool + 'static,
    {
        self.register_arc(Arc::new(tool))
    }

    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) -> Result<&mut Self, ToolRegistryError> {
        let name = tool.name().trim().to_string();
        if name.is_empty() {
            return Err(ToolRegistryError::EmptyName);
        }
        if self.tools.contains_key(&name) {
            return Err(ToolRegistryError::Duplicate(name));
        }
        self.tools.insert(name, tool);
        Ok(self)
    }

    /// Registers an async closure `(arguments, identity) -> result` as a tool.
    pub fn register_fn<F, Fut>(
        &mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        func: F,
    ) -> Result<&mut Self, ToolRegistryError>
    where
        F: Fn(Value, UserContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, ToolError>> + Send + 'static,
    {
        self.register(FnTool::new(name, description, func))
    }

    pub fn resolve(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Planner-facing catalogue, sorted by name.
    pub fn describe_all(&self) -> String {
        if self.tools.is_empty() {
            return NO_TOOLS_AVAILABLE.to_string();
        }

        let mut lines = Vec::with_capacity(self.tools.len());
        for (name, tool) in &self.tools {
            lines.push(format!("- {name}: {}", tool.description()));
            if let Some(schema) = tool.schema() {
                lines.push(format!("  Expected arguments: {schema}"));
            }
            if let Some(example) = tool.examples() {
                lines.push(format!("  Example: {example}"));
            }
        }
        lines.join("\n")
    }
}

/// Adapts an async closure into a [`Tool`].
pub struct FnTool<F> {
    name: String,
    description: String,
    schema: Option<Value>,
    examples: Option<String>,
    func: F,
}

impl<F> FnTool<F> {
    pub fn new(name: impl Into<String>, description: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            schema: None,
            examples: None,
            func,
        }
    }

    pub fn with_schema(mut self, schema: Value) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn with_examples(mut self, examples: impl Into<String>) -> Self {
        self.examples = Some(examples.into());
        self
    }
}

#[async_trait::async_trait]
impl<F, Fut> Tool for FnTool<F>
where
    F: Fn(Value, UserContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, ToolError>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn schema(&self) -> Option<Value> {
        self.schema.clone()
    }

    fn examples(&self) -> Option<&str> {
        self.examples.as_deref()
    }

    async fn invoke(&self, args: Value, user: &UserContext) -> Result<Value, ToolError> {
        (self.func)(args, user.clone()).await
    }
}
