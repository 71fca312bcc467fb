use std::fmt;

use serde::{Deserialize, Serialize};

use keelson_core::{Message, Role, StateSchema, UserContext, Value, Widget};

/// Position in the plan → query → validate → refine cycle.
///
/// A persisted state's `current_step` names the stage that runs next, so a
/// thread whose latest checkpoint is not at [`Step::End`] can be resumed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Step {
    #[default]
    Plan,
    Query,
    Validate,
    Refine,
    End,
}

impl Step {
    pub fn as_str(&self) -> &'static str {
        match self {
            Step::Plan => "plan",
            Step::Query => "query",
            Step::Validate => "validate",
            Step::Refine => "refine",
            Step::End => "end",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Step::End)
    }

    pub fn can_transition_to(&self, next: Step) -> bool {
        matches!(
            (self, next),
            (Step::Plan, Step::Query)
                | (Step::Query, Step::Validate)
                | (Step::Validate, Step::Refine)
                | (Step::Validate, Step::End)
                | (Step::Refine, Step::Plan)
        )
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One tool invocation. Exactly one of `result` / `error` is set.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolRecord {
    pub tool: String,
    pub arguments: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolRecord {
    pub fn success(tool: impl Into<String>, arguments: Value, result: Value) -> Self {
        Self {
            tool: tool.into(),
            arguments,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(tool: impl Into<String>, arguments: Value, error: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            arguments,
            result: None,
            error: Some(error.into()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AgentState {
    pub thread_id: String,
    #[serde(default)]
    pub messages: Vec<Message>,
    pub user_id: String,
    pub user_email: String,
    #[serde(default)]
    pub user_role: Option<String>,
    #[serde(default)]
    pub current_step: Step,
    #[serde(default)]
    pub iteration_count: u32,
    pub max_iterations: u32,
    #[serde(default)]
    pub tool_results: Vec<ToolRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub widget: Option<Widget>,
    /// Index in `messages` of the user message that started the current run.
    #[serde(default)]
    pub run_start: usize,
}

pub const DEFAULT_MAX_ITERATIONS: u32 = 3;

impl Default for AgentState {
    fn default() -> Self {
        Self {
            thread_id: String::new(),
            messages: Vec::new(),
            user_id: String::new(),
            user_email: String::new(),
            user_role: None,
            current_step: Step::Plan,
            iteration_count: 0,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            tool_results: Vec::new(),
            widget: None,
            run_start: 0,
        }
    }
}

impl StateSchema for AgentState {
    fn owner(&self) -> Option<&str> {
        Some(self.user_id.as_str()).filter(|id| !id.is_empty())
    }
}

impl AgentState {
    pub fn new(thread_id: impl Into<String>, user: &UserContext, max_iterations: u32) -> Self {
        Self {
            thread_id: thread_id.into(),
            user_id: user.user_id.clone(),
            user_email: user.email.clone(),
            user_role: user.role.clone(),
            max_iterations,
            ..Self::default()
        }
    }

    /// Starts a new turn: appends the user message and resets per-run fields.
    /// Conversation history is kept.
    pub fn begin_run(&mut self, message: impl Into<String>, user: &UserContext, max_iterations: u32) {
        self.user_id = user.user_id.clone();
        self.user_email = user.email.clone();
        self.user_role = user.role.clone();
        self.max_iterations = max_iterations;
        self.iteration_count = 0;
        self.current_step = Step::Plan;
        self.tool_results.clear();
        self.widget = None;
        self.run_start = self.messages.len();
        self.messages.push(Message::user(message));
    }

    pub fn identity(&self) -> UserContext {
        UserContext {
            user_id: self.user_id.clone(),
            email: self.user_email.clone(),
            role: self.user_role.clone(),
        }
    }

    /// Text of the most recent user message, or `""` when there is none.
    pub fn last_user_message(&self) -> &str {
        self.last_with_role(Role::User).unwrap_or("")
    }

    pub fn last_assistant_message(&self) -> Option<&str> {
        self.last_with_role(Role::Assistant)
    }

    /// Latest assistant message produced by the current run. Replies from
    /// earlier turns are never returned.
    pub fn run_reply(&self) -> Option<&str> {
        self.messages
            .get(self.run_start..)
            .unwrap_or_default()
            .iter()
            .rev()
            .find(|message| message.role == Role::Assistant)
            .map(|message| message.content.as_str())
    }

    fn last_with_role(&self, role: Role) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|message| message.role == role)
            .map(|message| message.content.as_str())
    }
}
