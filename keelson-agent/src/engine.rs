use std::future::Future;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use serde::Serialize;

use keelson_core::{
    AgentEvent, ChatCompletion, Checkpoint, Checkpointer, InMemoryCheckpointer, KeelsonError,
    Message, Role, UserContext, Widget,
};

use crate::config::LoopConfig;
use crate::locks::{ThreadGuard, ThreadLocks};
use crate::policy::{route_after_validate, RefineDecision, RefinePolicy, ToolPresencePolicy};
use crate::registry::ToolRegistry;
use crate::stages::{PlanStage, QueryStage, RefineStage, Stage, StageContext, ValidateStage};
use crate::state::{AgentState, Step, ToolRecord, DEFAULT_MAX_ITERATIONS};

/// Reply used when a run ends without any assistant message.
pub const NO_RESPONSE: &str = "No response generated";

/// Checkpoint node name for the snapshot written before the first stage.
pub const INPUT_NODE: &str = "input";

#[derive(Clone, Debug)]
pub struct RunRequest {
    pub message: String,
    pub thread_id: Option<String>,
    pub user: UserContext,
    pub max_iterations: u32,
}

impl RunRequest {
    pub fn new(message: impl Into<String>, user: UserContext) -> Self {
        Self {
            message: message.into(),
            thread_id: None,
            user,
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }

    pub fn with_thread_id(mut self, thread_id: impl Into<String>) -> Self {
        self.thread_id = Some(thread_id.into());
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    fn validate(&self) -> Result<(), KeelsonError> {
        self.user.validate()?;
        if self.message.trim().is_empty() {
            return Err(KeelsonError::InvalidRequest(
                "message must not be empty".to_string(),
            ));
        }
        if self.max_iterations == 0 {
            return Err(KeelsonError::InvalidRequest(
                "max_iterations must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct RunResponse {
    pub thread_id: String,
    pub message: String,
    pub widget: Option<Widget>,
    pub iteration_count: u32,
    pub current_step: Step,
    pub tool_results: Vec<ToolRecord>,
}

impl RunResponse {
    fn from_state(state: AgentState) -> Self {
        let message = state
            .run_reply()
            .unwrap_or(NO_RESPONSE)
            .to_string();
        Self {
            thread_id: state.thread_id,
            message,
            widget: state.widget,
            iteration_count: state.iteration_count,
            current_step: state.current_step,
            tool_results: state.tool_results,
        }
    }
}

/// One conversation as listed for its owner.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ThreadSummary {
    pub thread_id: String,
    pub updated_at: String,
    pub current_step: Step,
    pub message_count: usize,
    /// Opening user message, cut to [`TITLE_CHARS`] characters.
    pub title: String,
}

pub const TITLE_CHARS: usize = 80;

impl ThreadSummary {
    fn from_checkpoint(checkpoint: Checkpoint<AgentState>) -> Self {
        let state = checkpoint.state;
        let title = state
            .messages
            .iter()
            .find(|message| message.role == Role::User)
            .map(|message| message.content.chars().take(TITLE_CHARS).collect())
            .unwrap_or_default();
        Self {
            thread_id: checkpoint.thread_id,
            updated_at: checkpoint.created_at,
            current_step: state.current_step,
            message_count: state.messages.len(),
            title,
        }
    }
}

/// The plan → query → validate → refine loop over checkpointed per-thread state.
#[derive(Clone)]
pub struct AgentLoop {
    checkpointer: Arc<dyn Checkpointer<AgentState>>,
    plan: Arc<dyn Stage>,
    query: Arc<dyn Stage>,
    validate: Arc<dyn Stage>,
    refine: Arc<dyn Stage>,
    policy: Arc<dyn RefinePolicy>,
    config: LoopConfig,
    locks: ThreadLocks,
}

impl AgentLoop {
    pub fn builder() -> AgentLoopBuilder {
        AgentLoopBuilder::default()
    }

    pub fn config(&self) -> &LoopConfig {
        &self.config
    }

    pub async fn run(&self, request: RunRequest) -> Result<RunResponse, KeelsonError> {
        self.run_with_cancellation(request, CancellationToken::new())
            .await
    }

    pub async fn run_with_cancellation(
        &self,
        request: RunRequest,
        cancel: CancellationToken,
    ) -> Result<RunResponse, KeelsonError> {
        request.validate()?;
        let ctx = StageContext::new(cancel);
        let state = self.execute(request, &ctx).await?;
        Ok(RunResponse::from_state(state))
    }

    /// Continues a thread from its latest checkpoint without adding a message.
    /// A thread that already reached `end` is returned as-is. Only the user
    /// that owns the thread may resume it.
    pub async fn resume(
        &self,
        thread_id: &str,
        user: &UserContext,
        cancel: CancellationToken,
    ) -> Result<RunResponse, KeelsonError> {
        user.validate()?;
        require_thread_id(thread_id)?;
        let _guard = self.lock(thread_id).await;
        let checkpoint = self.load(thread_id).await?.ok_or_else(|| {
            KeelsonError::InvalidRequest(format!("no checkpoint for thread '{thread_id}'"))
        })?;
        ensure_owner(&checkpoint.state, user)?;
        tracing::info!(
            thread_id = %thread_id,
            current_step = %checkpoint.state.current_step,
            "resuming from checkpoint"
        );
        let ctx = StageContext::new(cancel);
        let state = self
            .drive(checkpoint.state, checkpoint.step, &ctx)
            .await?;
        Ok(RunResponse::from_state(state))
    }

    /// Latest persisted state for a thread.
    pub async fn state(&self, thread_id: &str) -> Result<Option<AgentState>, KeelsonError> {
        Ok(self.load(thread_id).await?.map(|checkpoint| checkpoint.state))
    }

    /// Conversations owned by `user`, most recently updated first.
    pub async fn list_threads(&self, user: &UserContext) -> Result<Vec<ThreadSummary>, KeelsonError> {
        user.validate()?;
        let threads = self
            .bounded(self.checkpointer.list_threads(&user.user_id))
            .await?;
        Ok(threads.into_iter().map(ThreadSummary::from_checkpoint).collect())
    }

    /// Message history of a thread owned by `user`.
    pub async fn messages(
        &self,
        thread_id: &str,
        user: &UserContext,
    ) -> Result<Vec<Message>, KeelsonError> {
        user.validate()?;
        require_thread_id(thread_id)?;
        let checkpoint = self.load(thread_id).await?.ok_or_else(|| {
            KeelsonError::InvalidRequest(format!("no checkpoint for thread '{thread_id}'"))
        })?;
        ensure_owner(&checkpoint.state, user)?;
        Ok(checkpoint.state.messages)
    }

    /// Removes a thread and its history. Returns `false` for unknown threads.
    pub async fn delete_thread(
        &self,
        thread_id: &str,
        user: &UserContext,
    ) -> Result<bool, KeelsonError> {
        user.validate()?;
        require_thread_id(thread_id)?;
        let _guard = self.lock(thread_id).await;
        let Some(checkpoint) = self.load(thread_id).await? else {
            return Ok(false);
        };
        ensure_owner(&checkpoint.state, user)?;
        let removed = self
            .bounded(self.checkpointer.delete_thread(thread_id))
            .await?;
        if removed {
            tracing::info!(thread_id = %thread_id, "thread deleted");
        }
        Ok(removed)
    }

    pub async fn stream(
        &self,
        request: RunRequest,
    ) -> Result<ReceiverStream<AgentEvent>, KeelsonError> {
        self.stream_with_cancellation(request, CancellationToken::new())
            .await
    }

    /// Streams stage progress followed by `Final`, an optional `Widget` and `Done`.
    /// Request validation errors are returned directly; later failures arrive as
    /// a single `Error` event.
    pub async fn stream_with_cancellation(
        &self,
        request: RunRequest,
        cancel: CancellationToken,
    ) -> Result<ReceiverStream<AgentEvent>, KeelsonError> {
        request.validate()?;

        let (tx, rx) = mpsc::channel::<AgentEvent>(self.config.event_buffer_size.max(1));
        let engine = self.clone();

        tokio::spawn(async move {
            let ctx = StageContext::new(cancel.child_token()).with_events(tx.clone());
            match engine.execute(request, &ctx).await {
                Ok(state) => {
                    let iteration = state.iteration_count;
                    let response = RunResponse::from_state(state);
                    let _ = tx
                        .send(AgentEvent::Final {
                            content: response.message,
                            iteration,
                        })
                        .await;
                    if let Some(widget) = response.widget {
                        let _ = tx
                            .send(AgentEvent::Widget {
                                widget_type: widget.widget_type.to_string(),
                                widget_data: widget.widget_data,
                            })
                            .await;
                    }
                    let _ = tx
                        .send(AgentEvent::Done {
                            thread_id: response.thread_id,
                        })
                        .await;
                }
                Err(err) => {
                    tracing::error!(error = %err, code = err.code(), "agent run failed");
                    let _ = tx.send(AgentEvent::error(&err)).await;
                }
            }
        });

        Ok(ReceiverStream::new(rx))
    }

    async fn execute(
        &self,
        request: RunRequest,
        ctx: &StageContext,
    ) -> Result<AgentState, KeelsonError> {
        let thread_id = request
            .thread_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let _guard = self.lock(&thread_id).await;

        let (mut state, step) = match self.load(&thread_id).await? {
            Some(checkpoint) => {
                ensure_owner(&checkpoint.state, &request.user)?;
                (checkpoint.state, checkpoint.step)
            }
            None => (
                AgentState::new(&thread_id, &request.user, request.max_iterations),
                0,
            ),
        };

        state.begin_run(request.message, &request.user, request.max_iterations);
        tracing::info!(
            thread_id = %thread_id,
            user_id = %state.user_id,
            max_iterations = state.max_iterations,
            "agent run started"
        );

        let step = step + 1;
        self.save(Checkpoint::new(&thread_id, state.clone(), step, INPUT_NODE))
            .await?;

        self.drive(state, step, ctx).await
    }

    async fn drive(
        &self,
        mut state: AgentState,
        mut step: u64,
        ctx: &StageContext,
    ) -> Result<AgentState, KeelsonError> {
        while !state.current_step.is_terminal() {
            if ctx.cancellation().is_cancelled() {
                tracing::warn!(thread_id = %state.thread_id, stage = %state.current_step, "run cancelled");
                return Err(KeelsonError::Cancelled);
            }

            let stage = state.current_step;
            let mut next = self.stage(stage).run(state.clone(), ctx).await?;

            if stage == Step::Validate {
                if !matches!(next.current_step, Step::Refine | Step::End) {
                    return Err(KeelsonError::InvariantViolation(format!(
                        "validation produced '{}'",
                        next.current_step
                    )));
                }
                next.current_step = match route_after_validate(self.policy.as_ref(), &next) {
                    RefineDecision::Refine => Step::Refine,
                    RefineDecision::End => Step::End,
                };
            }

            if !stage.can_transition_to(next.current_step) {
                return Err(KeelsonError::InvariantViolation(format!(
                    "illegal transition {stage} -> {}",
                    next.current_step
                )));
            }
            if next.iteration_count > next.max_iterations {
                return Err(KeelsonError::InvariantViolation(format!(
                    "iteration_count {} exceeds max_iterations {}",
                    next.iteration_count, next.max_iterations
                )));
            }

            step += 1;
            self.save(Checkpoint::new(&next.thread_id, next.clone(), step, stage.as_str()))
                .await?;

            tracing::debug!(
                thread_id = %next.thread_id,
                stage = %stage,
                current_step = %next.current_step,
                iteration = next.iteration_count,
                "stage completed"
            );
            ctx.emit(AgentEvent::StageCompleted {
                stage: stage.as_str().to_string(),
                current_step: next.current_step.as_str().to_string(),
                iteration: next.iteration_count,
                thread_id: next.thread_id.clone(),
            })
            .await;

            state = next;
        }

        tracing::info!(
            thread_id = %state.thread_id,
            iterations = state.iteration_count,
            tools = state.tool_results.len(),
            "agent run finished"
        );
        Ok(state)
    }

    fn stage(&self, step: Step) -> &dyn Stage {
        match step {
            Step::Plan => self.plan.as_ref(),
            Step::Query => self.query.as_ref(),
            Step::Validate => self.validate.as_ref(),
            Step::Refine | Step::End => self.refine.as_ref(),
        }
    }

    async fn lock(&self, thread_id: &str) -> Option<ThreadGuard> {
        if self.config.serialize_threads {
            Some(self.locks.acquire(thread_id).await)
        } else {
            None
        }
    }

    async fn load(&self, thread_id: &str) -> Result<Option<Checkpoint<AgentState>>, KeelsonError> {
        self.bounded(self.checkpointer.load(thread_id)).await
    }

    async fn save(&self, checkpoint: Checkpoint<AgentState>) -> Result<(), KeelsonError> {
        self.bounded(self.checkpointer.save(&checkpoint)).await
    }

    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, KeelsonError>>,
    ) -> Result<T, KeelsonError> {
        tokio::time::timeout(self.config.checkpoint_timeout, call)
            .await
            .map_err(|_| {
                KeelsonError::CheckpointFailed(format!(
                    "checkpoint operation timed out after {:?}",
                    self.config.checkpoint_timeout
                ))
            })?
    }
}

fn require_thread_id(thread_id: &str) -> Result<(), KeelsonError> {
    if thread_id.trim().is_empty() {
        return Err(KeelsonError::InvalidRequest(
            "thread_id must not be empty".to_string(),
        ));
    }
    Ok(())
}

fn ensure_owner(state: &AgentState, user: &UserContext) -> Result<(), KeelsonError> {
    if state.user_id != user.user_id {
        return Err(KeelsonError::Authentication(format!(
            "thread '{}' belongs to another user",
            state.thread_id
        )));
    }
    Ok(())
}

#[derive(Default)]
pub struct AgentLoopBuilder {
    planner: Option<Arc<dyn ChatCompletion>>,
    tools: ToolRegistry,
    checkpointer: Option<Arc<dyn Checkpointer<AgentState>>>,
    plan: Option<Arc<dyn Stage>>,
    validate: Option<Arc<dyn Stage>>,
    refine: Option<Arc<dyn Stage>>,
    policy: Option<Arc<dyn RefinePolicy>>,
    config: LoopConfig,
}

impl AgentLoopBuilder {
    pub fn with_planner<P>(mut self, planner: P) -> Self
    where
        P: ChatCompletion,
    {
        self.planner = Some(Arc::new(planner));
        self
    }

    pub fn with_shared_planner(mut self, planner: Arc<dyn ChatCompletion>) -> Self {
        self.planner = Some(planner);
        self
    }

    pub fn with_tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_checkpointer<C>(mut self, checkpointer: C) -> Self
    where
        C: Checkpointer<AgentState> + 'static,
    {
        self.checkpointer = Some(Arc::new(checkpointer));
        self
    }

    pub fn with_shared_checkpointer(mut self, checkpointer: Arc<dyn Checkpointer<AgentState>>) -> Self {
        self.checkpointer = Some(checkpointer);
        self
    }

    pub fn with_plan_stage<T: Stage + 'static>(mut self, stage: T) -> Self {
        self.plan = Some(Arc::new(stage));
        self
    }

    pub fn with_validate_stage<T: Stage + 'static>(mut self, stage: T) -> Self {
        self.validate = Some(Arc::new(stage));
        self
    }

    pub fn with_refine_stage<T: Stage + 'static>(mut self, stage: T) -> Self {
        self.refine = Some(Arc::new(stage));
        self
    }

    pub fn with_refine_policy<P: RefinePolicy + 'static>(mut self, policy: P) -> Self {
        self.policy = Some(Arc::new(policy));
        self
    }

    pub fn with_config(mut self, config: LoopConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Result<AgentLoop, KeelsonError> {
        let planner = self.planner.ok_or_else(|| {
            KeelsonError::InvalidConfig("agent loop requires a planner".to_string())
        })?;
        if self.config.tool_summary_limit == 0 {
            return Err(KeelsonError::InvalidConfig(
                "tool_summary_limit must be positive".to_string(),
            ));
        }

        let tools = Arc::new(self.tools);
        tracing::debug!(tools = ?tools.names(), "building agent loop");

        Ok(AgentLoop {
            checkpointer: self
                .checkpointer
                .unwrap_or_else(|| Arc::new(InMemoryCheckpointer::<AgentState>::new())),
            plan: self.plan.unwrap_or_else(|| Arc::new(PlanStage)),
            query: Arc::new(QueryStage::new(planner, tools, self.config.clone())),
            validate: self.validate.unwrap_or_else(|| Arc::new(ValidateStage)),
            refine: self.refine.unwrap_or_else(|| Arc::new(RefineStage)),
            policy: self.policy.unwrap_or_else(|| Arc::new(ToolPresencePolicy)),
            config: self.config,
            locks: ThreadLocks::new(),
        })
    }
}
