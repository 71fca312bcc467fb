//! The four stages of the cycle. Plan, validate and refine are replaceable;
//! the query stage owns the planner and tool calls.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use keelson_core::{AgentEvent, ChatCompletion, KeelsonError, Message, Value, Widget};

use crate::config::LoopConfig;
use crate::planner::ToolSelection;
use crate::prompts;
use crate::registry::ToolRegistry;
use crate::state::{AgentState, Step, ToolRecord};

/// Context shared by every stage of a single run.
#[derive(Clone, Default)]
pub struct StageContext {
    events: Option<mpsc::Sender<AgentEvent>>,
    cancellation: CancellationToken,
}

impl StageContext {
    pub fn new(cancellation: CancellationToken) -> Self {
        Self {
            events: None,
            cancellation,
        }
    }

    pub fn with_events(mut self, events: mpsc::Sender<AgentEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Sends an event if a stream is attached. A dropped receiver cancels the run.
    pub async fn emit(&self, event: AgentEvent) {
        if let Some(events) = &self.events {
            if events.send(event).await.is_err() {
                self.cancellation.cancel();
            }
        }
    }
}

#[async_trait::async_trait]
pub trait Stage: Send + Sync {
    async fn run(&self, state: AgentState, ctx: &StageContext) -> Result<AgentState, KeelsonError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PlanStage;

#[async_trait::async_trait]
impl Stage for PlanStage {
    async fn run(&self, mut state: AgentState, _ctx: &StageContext) -> Result<AgentState, KeelsonError> {
        tracing::info!(user_id = %state.user_id, thread_id = %state.thread_id, "agent: planning");
        state.iteration_count += 1;
        state.current_step = Step::Query;
        Ok(state)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ValidateStage;

#[async_trait::async_trait]
impl Stage for ValidateStage {
    async fn run(&self, mut state: AgentState, _ctx: &StageContext) -> Result<AgentState, KeelsonError> {
        tracing::info!(user_id = %state.user_id, thread_id = %state.thread_id, "agent: validating results");
        state.current_step = Step::End;
        Ok(state)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RefineStage;

#[async_trait::async_trait]
impl Stage for RefineStage {
    async fn run(&self, mut state: AgentState, _ctx: &StageContext) -> Result<AgentState, KeelsonError> {
        tracing::info!(user_id = %state.user_id, thread_id = %state.thread_id, "agent: refining query");
        state.current_step = Step::Plan;
        Ok(state)
    }
}

/// Selects at most one tool, runs it, and asks the responder for an answer.
pub struct QueryStage {
    planner: Arc<dyn ChatCompletion>,
    tools: Arc<ToolRegistry>,
    config: LoopConfig,
}

impl QueryStage {
    pub fn new(planner: Arc<dyn ChatCompletion>, tools: Arc<ToolRegistry>, config: LoopConfig) -> Self {
        Self {
            planner,
            tools,
            config,
        }
    }

    async fn complete(&self, messages: Vec<Message>) -> Result<String, KeelsonError> {
        tokio::time::timeout(self.config.planner_timeout, self.planner.complete(messages))
            .await
            .map_err(|_| KeelsonError::Timeout(self.config.planner_timeout))?
    }

    async fn select_tool(&self, user_text: &str) -> Result<ToolSelection, KeelsonError> {
        let system = prompts::planner_prompt(&self.tools.describe_all());
        let raw = self
            .complete(vec![Message::system(system), Message::user(user_text)])
            .await?;
        Ok(ToolSelection::parse(&raw))
    }

    async fn run_tool(&self, state: &mut AgentState, selection: ToolSelection, ctx: &StageContext) {
        let Some(tool) = self.tools.resolve(&selection.tool) else {
            tracing::warn!(tool = %selection.tool, thread_id = %state.thread_id, "planner selected unknown tool");
            return;
        };

        ctx.emit(AgentEvent::ToolCall {
            tool_name: selection.tool.clone(),
            input: selection.arguments.clone(),
            iteration: state.iteration_count,
        })
        .await;

        let identity = state.identity();
        let outcome = tokio::time::timeout(
            self.config.tool_timeout,
            tool.invoke(selection.arguments.clone(), &identity),
        )
        .await;

        let record = match outcome {
            Ok(Ok(result)) => {
                tracing::info!(tool = %selection.tool, thread_id = %state.thread_id, "tool executed");
                if let Some(widget) = Widget::from_tool_output(&result) {
                    state.widget = Some(widget);
                }
                ToolRecord::success(selection.tool, selection.arguments, result)
            }
            Ok(Err(err)) => {
                tracing::error!(tool = %selection.tool, error = %err, "tool execution failed");
                ToolRecord::failure(selection.tool, selection.arguments, err.to_string())
            }
            Err(_) => {
                tracing::error!(tool = %selection.tool, timeout = ?self.config.tool_timeout, "tool timed out");
                ToolRecord::failure(
                    selection.tool,
                    selection.arguments,
                    format!("tool timed out after {:?}", self.config.tool_timeout),
                )
            }
        };

        let (output, is_error) = match (&record.result, &record.error) {
            (Some(result), _) => (result.clone(), false),
            (None, Some(error)) => (Value::String(error.clone()), true),
            (None, None) => (Value::Null, false),
        };
        ctx.emit(AgentEvent::Observation {
            tool_name: record.tool.clone(),
            output,
            is_error,
            iteration: state.iteration_count,
        })
        .await;

        state.tool_results.push(record);
    }

    fn answer_messages(&self, state: &AgentState) -> Result<Vec<Message>, KeelsonError> {
        let mut messages = Vec::with_capacity(state.messages.len() + 2);
        messages.push(Message::system(prompts::TOOL_ANSWER_SYSTEM_PROMPT));
        messages.extend(state.messages.iter().cloned());
        if !state.tool_results.is_empty() {
            let serialized = serde_json::to_string(&state.tool_results)?;
            let capped = truncate_chars(&serialized, self.config.tool_summary_limit);
            messages.push(Message::system(prompts::tool_results_message(capped)));
        }
        Ok(messages)
    }
}

#[async_trait::async_trait]
impl Stage for QueryStage {
    async fn run(&self, mut state: AgentState, ctx: &StageContext) -> Result<AgentState, KeelsonError> {
        tracing::info!(user_id = %state.user_id, thread_id = %state.thread_id, "agent: query execution");

        let user_text = state.last_user_message().to_string();
        let selection = self.select_tool(&user_text).await?;
        tracing::debug!(tool = %selection.tool, reason = %selection.reason, "planner selection");

        if !selection.is_none() {
            self.run_tool(&mut state, selection, ctx).await;
        }

        let answer = self.complete(self.answer_messages(&state)?).await?;
        if answer.trim().is_empty() {
            tracing::warn!(thread_id = %state.thread_id, "responder returned an empty answer");
        } else {
            state.messages.push(Message::assistant(answer));
        }

        state.current_step = Step::Validate;
        Ok(state)
    }
}

/// Cuts `text` to at most `limit` characters without splitting a code point.
pub(crate) fn truncate_chars(text: &str, limit: usize) -> &str {
    match text.char_indices().nth(limit) {
        Some((index, _)) => &text[..index],
        None => text,
    }
}
