use serde::Deserialize;

use keelson_core::Value;

/// Tool name the planner uses to decline a tool call.
pub const NO_TOOL: &str = "none";
pub const INVALID_PLANNER_OUTPUT: &str = "invalid planner output";

/// The planner's decision for one cycle.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct ToolSelection {
    pub tool: String,
    #[serde(default)]
    pub reason: String,
    #[serde(default = "empty_object")]
    pub arguments: Value,
}

fn empty_object() -> Value {
    Value::Object(Default::default())
}

impl ToolSelection {
    pub fn none(reason: impl Into<String>) -> Self {
        Self {
            tool: NO_TOOL.to_string(),
            reason: reason.into(),
            arguments: empty_object(),
        }
    }

    /// Parses the planner's raw reply. Anything other than a JSON object with a
    /// string `tool` and an object (or absent) `arguments` becomes a "none" selection.
    pub fn parse(raw: &str) -> Self {
        match serde_json::from_str::<ToolSelection>(raw.trim()) {
            Ok(selection) if selection.arguments.is_object() => selection,
            Ok(_) | Err(_) => {
                tracing::warn!(raw = %raw, "planner returned invalid output");
                Self::none(INVALID_PLANNER_OUTPUT)
            }
        }
    }

    pub fn is_none(&self) -> bool {
        self.tool == NO_TOOL
    }
}
