#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use keelson_agent::{AgentLoop, LoopConfig, ToolRegistry};
use keelson_core::{
    ChatCompletion, InMemoryCheckpointer, KeelsonError, Message, Role, UserContext, Value,
};

pub const NO_TOOL_SELECTION: &str = r#"{"tool": "none", "reason": "nothing to call", "arguments": {}}"#;

pub fn user() -> UserContext {
    UserContext::new("user-1", "user-1@example.com", Some("analyst".to_string())).unwrap()
}

type AnswerFn = dyn Fn(&[Message]) -> Result<String, KeelsonError> + Send + Sync;

/// Replays planner selections in order (falling back to "none") and answers
/// every responder call through `answer`.
pub struct ScriptedPlanner {
    selections: Mutex<VecDeque<String>>,
    answer: Box<AnswerFn>,
    calls: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedPlanner {
    pub fn new(selections: &[&str], answer: &str) -> Arc<Self> {
        let answer = answer.to_string();
        Self::with_answer_fn(selections, move |_| Ok(answer.clone()))
    }

    pub fn with_answer_fn<F>(selections: &[&str], answer: F) -> Arc<Self>
    where
        F: Fn(&[Message]) -> Result<String, KeelsonError> + Send + Sync + 'static,
    {
        Arc::new(Self {
            selections: Mutex::new(selections.iter().map(|s| s.to_string()).collect()),
            answer: Box::new(answer),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> Vec<Vec<Message>> {
        self.calls.lock().unwrap().clone()
    }

    pub fn planner_calls(&self) -> usize {
        self.calls().iter().filter(|call| is_planner_call(call)).count()
    }

    pub fn answer_calls(&self) -> Vec<Vec<Message>> {
        self.calls()
            .into_iter()
            .filter(|call| !is_planner_call(call))
            .collect()
    }
}

pub fn is_planner_call(messages: &[Message]) -> bool {
    messages
        .first()
        .map(|m| m.role == Role::System && m.content.contains("tool-selection planner"))
        .unwrap_or(false)
}

#[async_trait::async_trait]
impl ChatCompletion for ScriptedPlanner {
    async fn complete(&self, messages: Vec<Message>) -> Result<String, KeelsonError> {
        self.calls.lock().unwrap().push(messages.clone());
        if is_planner_call(&messages) {
            let next = self.selections.lock().unwrap().pop_front();
            return Ok(next.unwrap_or_else(|| NO_TOOL_SELECTION.to_string()));
        }
        (self.answer)(&messages)
    }
}

/// Registry with a `sales_total` tool returning `{"total": 42}` and counting calls.
pub fn sales_registry() -> (ToolRegistry, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let mut registry = ToolRegistry::new();
    registry
        .register_fn("sales_total", "Total sales for a period", move |_args, _user| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(serde_json::json!({"total": 42}))
            }
        })
        .unwrap();
    (registry, calls)
}

pub fn agent(
    planner: Arc<ScriptedPlanner>,
    tools: ToolRegistry,
    store: InMemoryCheckpointer<keelson_agent::AgentState>,
) -> AgentLoop {
    AgentLoop::builder()
        .with_shared_planner(planner)
        .with_tools(tools)
        .with_checkpointer(store)
        .with_config(LoopConfig::default())
        .build()
        .unwrap()
}

pub fn last_user_text(messages: &[Message]) -> String {
    messages
        .iter()
        .rev()
        .find(|m| m.role == Role::User)
        .map(|m| m.content.clone())
        .unwrap_or_default()
}

pub fn tool_summary(messages: &[Message]) -> Option<Value> {
    messages
        .iter()
        .filter(|m| m.role == Role::System)
        .find_map(|m| m.content.strip_prefix("Tool results (JSON): "))
        .and_then(|json| serde_json::from_str(json).ok())
}
