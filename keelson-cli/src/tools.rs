use keelson::{FnTool, ToolError, ToolRegistry, ToolRegistryError, UserContext, Value};
use serde_json::json;

/// Tools available to the terminal runner.
pub fn builtin_registry() -> Result<ToolRegistry, ToolRegistryError> {
    let mut registry = ToolRegistry::new();

    registry.register_fn(
        "whoami",
        "Returns the identity of the user asking the question.",
        |_args: Value, user: UserContext| async move {
            serde_json::to_value(&user).map_err(ToolError::from)
        },
    )?;

    registry.register_fn(
        "utc_now",
        "Returns the current date and time in UTC (RFC 3339).",
        |_args: Value, _user: UserContext| async move {
            Ok::<_, ToolError>(json!({ "utc": chrono::Utc::now().to_rfc3339() }))
        },
    )?;

    registry.register(
        FnTool::new(
            "tabulate",
            "Shows a list of rows to the user as a table.",
            |args: Value, _user: UserContext| async move { tabulate(args) },
        )
        .with_schema(json!({
            "type": "object",
            "properties": { "rows": { "type": "array", "items": { "type": "object" } } },
            "required": ["rows"]
        }))
        .with_examples(r#"{"rows": [{"region": "west", "total": 12}]}"#),
    )?;

    Ok(registry)
}

fn tabulate(args: Value) -> Result<Value, ToolError> {
    let rows = args
        .get("rows")
        .and_then(Value::as_array)
        .ok_or_else(|| ToolError::InvalidInput("`rows` must be an array".to_string()))?;

    Ok(json!({
        "row_count": rows.len(),
        "widget": { "type": "table", "data": { "rows": rows } }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use keelson::Widget;

    fn user() -> UserContext {
        UserContext::new("u-1", "u@example.com", None).unwrap()
    }

    #[test]
    fn registry_lists_builtin_tools_alphabetically() {
        let registry = builtin_registry().unwrap();
        assert_eq!(registry.names(), vec!["tabulate", "utc_now", "whoami"]);
        assert!(registry.describe_all().contains("Expected arguments"));
    }

    #[tokio::test]
    async fn whoami_echoes_identity() {
        let registry = builtin_registry().unwrap();
        let tool = registry.resolve("whoami").unwrap();

        let output = tool.invoke(json!({}), &user()).await.unwrap();
        assert_eq!(output["user_id"], "u-1");
        assert_eq!(output["user_email"], "u@example.com");
    }

    #[tokio::test]
    async fn tabulate_attaches_table_widget() {
        let registry = builtin_registry().unwrap();
        let tool = registry.resolve("tabulate").unwrap();

        let output = tool
            .invoke(json!({"rows": [{"a": 1}, {"a": 2}]}), &user())
            .await
            .unwrap();
        let widget = Widget::from_tool_output(&output).expect("widget attached");
        assert_eq!(widget.widget_type.as_str(), "table");
        assert_eq!(output["row_count"], 2);

        let error = tool.invoke(json!({"rows": 3}), &user()).await.unwrap_err();
        assert!(matches!(error, ToolError::InvalidInput(_)));
    }
}
