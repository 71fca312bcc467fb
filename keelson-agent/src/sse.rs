//! Server-sent-event framing for [`AgentEvent`] streams.

use keelson_core::AgentEvent;

fn event_name(event: &AgentEvent) -> &'static str {
    match event {
        AgentEvent::StageCompleted { .. } => "progress",
        AgentEvent::ToolCall { .. } | AgentEvent::Observation { .. } => "trace",
        AgentEvent::Final { .. } => "message",
        AgentEvent::Widget { .. } => "widget",
        AgentEvent::Done { .. } => "done",
        AgentEvent::Error { .. } => "error",
    }
}

fn frame(name: &str, data: &str) -> String {
    format!("event: {name}\ndata: {data}\n\n")
}

pub fn to_sse_event(event: &AgentEvent) -> String {
    let data = serde_json::to_string(event).unwrap_or_else(|_| {
        serde_json::json!({
            "type": "error",
            "data": {"message": "failed to serialize event"}
        })
        .to_string()
    });
    frame(event_name(event), &data)
}

/// Terminator for consumers that expect a literal `[DONE]` sentinel.
pub fn done_event() -> String {
    frame("done", "[DONE]")
}
