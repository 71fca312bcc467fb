use std::time::Duration;

#[derive(Clone, Debug)]
pub struct LoopConfig {
    /// Bound on each planner/responder call.
    pub planner_timeout: Duration,
    /// Bound on a single tool invocation. Expiry is recorded as a tool error.
    pub tool_timeout: Duration,
    /// Bound on each checkpoint load or save.
    pub checkpoint_timeout: Duration,
    /// Maximum characters of serialized tool results shown to the responder.
    pub tool_summary_limit: usize,
    /// Hold a per-thread lock for the whole run so cycles on one thread never interleave.
    pub serialize_threads: bool,
    pub event_buffer_size: usize,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            planner_timeout: Duration::from_secs(30),
            tool_timeout: Duration::from_secs(30),
            checkpoint_timeout: Duration::from_secs(10),
            tool_summary_limit: 4000,
            serialize_threads: true,
            event_buffer_size: 64,
        }
    }
}
