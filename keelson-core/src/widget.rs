use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WidgetKind {
    Table,
    Chart,
    Map,
    Card,
    List,
}

impl WidgetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WidgetKind::Table => "table",
            WidgetKind::Chart => "chart",
            WidgetKind::Map => "map",
            WidgetKind::Card => "card",
            WidgetKind::List => "list",
        }
    }
}

impl fmt::Display for WidgetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WidgetKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "table" => Ok(WidgetKind::Table),
            "chart" => Ok(WidgetKind::Chart),
            "map" => Ok(WidgetKind::Map),
            "card" => Ok(WidgetKind::Card),
            "list" => Ok(WidgetKind::List),
            other => Err(format!("unknown widget type '{other}'")),
        }
    }
}

/// A UI payload attached to a response. The data is passed through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Widget {
    pub widget_type: WidgetKind,
    pub widget_data: Value,
}

impl Widget {
    pub fn new(widget_type: WidgetKind, widget_data: Value) -> Self {
        Self {
            widget_type,
            widget_data,
        }
    }

    /// Extracts a widget from a tool result shaped like
    /// `{"widget": {"type": "table", "data": {...}}}`.
    pub fn from_tool_output(output: &Value) -> Option<Self> {
        let widget = output.get("widget")?;
        let kind = widget.get("type")?.as_str()?.parse().ok()?;
        let data = widget.get("data").cloned().unwrap_or(Value::Null);
        Some(Self::new(kind, data))
    }
}
