use crate::state::AgentState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefineDecision {
    Refine,
    End,
}

/// Decides, after validation, whether another plan/query cycle is worthwhile.
///
/// The iteration ceiling is enforced by [`route_after_validate`] before the
/// policy is consulted.
pub trait RefinePolicy: Send + Sync {
    fn decide(&self, state: &AgentState) -> RefineDecision;
}

impl<F> RefinePolicy for F
where
    F: Fn(&AgentState) -> RefineDecision + Send + Sync,
{
    fn decide(&self, state: &AgentState) -> RefineDecision {
        self(state)
    }
}

/// Stops as soon as any tool has run this turn; otherwise asks for another pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct ToolPresencePolicy;

impl RefinePolicy for ToolPresencePolicy {
    fn decide(&self, state: &AgentState) -> RefineDecision {
        if state.tool_results.is_empty() {
            RefineDecision::Refine
        } else {
            RefineDecision::End
        }
    }
}

pub fn route_after_validate(policy: &dyn RefinePolicy, state: &AgentState) -> RefineDecision {
    if state.iteration_count >= state.max_iterations {
        return RefineDecision::End;
    }
    policy.decide(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::ToolRecord;
    use serde_json::json;

    fn state(iteration_count: u32, max_iterations: u32, with_tool: bool) -> AgentState {
        let mut state = AgentState {
            iteration_count,
            max_iterations,
            ..AgentState::default()
        };
        if with_tool {
            state
                .tool_results
                .push(ToolRecord::success("t", json!({}), json!(1)));
        }
        state
    }

    #[test]
    fn default_policy_matrix() {
        let policy = ToolPresencePolicy;
        assert_eq!(route_after_validate(&policy, &state(1, 3, false)), RefineDecision::Refine);
        assert_eq!(route_after_validate(&policy, &state(1, 3, true)), RefineDecision::End);
        assert_eq!(route_after_validate(&policy, &state(3, 3, false)), RefineDecision::End);
    }

    #[test]
    fn ceiling_overrides_custom_policy() {
        let always_refine = |_: &AgentState| RefineDecision::Refine;
        assert_eq!(route_after_validate(&always_refine, &state(2, 3, true)), RefineDecision::Refine);
        assert_eq!(route_after_validate(&always_refine, &state(3, 3, true)), RefineDecision::End);
    }
}
