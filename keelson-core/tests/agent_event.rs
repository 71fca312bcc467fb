use serde_json::json;
use keelson_core::{AgentEvent, ErrorCategory, KeelsonError};

#[test]
fn agent_event_serializes_with_tagged_shape() {
    let event = AgentEvent::StageCompleted {
        stage: "plan".to_string(),
        current_step: "query".to_string(),
        iteration: 1,
        thread_id: "thread-123".to_string(),
    };

    let value = serde_json::to_value(&event).expect("stage event should serialize");

    assert_eq!(
        value,
        json!({
            "type": "stage_completed",
            "data": {
                "stage": "plan",
                "current_step": "query",
                "iteration": 1,
                "thread_id": "thread-123"
            }
        })
    );
}

#[test]
fn error_event_carries_category_and_code() {
    let event = AgentEvent::error(&KeelsonError::LlmProvider("bad gateway".to_string()));

    match &event {
        AgentEvent::Error {
            category,
            code,
            message,
        } => {
            assert_eq!(*category, ErrorCategory::UpstreamUnavailable);
            assert_eq!(code, "LLM_ERROR");
            assert_eq!(message, "LLM provider failed: bad gateway");
        }
        other => panic!("expected error event, got {other:?}"),
    }
    assert!(event.is_terminal());
}

#[test]
fn iteration_accessor_and_terminal_flags() {
    let call = AgentEvent::ToolCall {
        tool_name: "sales_total".to_string(),
        input: json!({}),
        iteration: 2,
    };
    let done = AgentEvent::Done {
        thread_id: "t".to_string(),
    };

    assert_eq!(call.iteration(), Some(2));
    assert!(!call.is_terminal());
    assert_eq!(done.iteration(), None);
    assert!(done.is_terminal());
}
