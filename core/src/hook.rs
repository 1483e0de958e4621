use serde::Deserialize;
use serde::Serialize;

use loopbreak_protocol::AgentInfo;
use loopbreak_protocol::HistoryTurn;
use loopbreak_protocol::StepOutput;

use crate::config::RepeatActionMitigatorConfig;
use crate::error::Result;
use crate::mitigator::RepeatActionMitigator;

/// Decision returned right after a new action has been generated, before it
/// is recorded or executed.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionDecision {
    /// Record and execute the action as usual.
    Proceed,
    /// Reject the action and regenerate. The action is not recorded.
    Block(BlockedAction),
}

/// Guidance attached to a blocked action.
///
/// The agent loop must treat a block as control flow: regenerate with the
/// message, without counting a model or format failure.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockedAction {
    /// Rendered guidance shown to the model for the retry.
    pub message: String,
    /// Blocks never count against format-failure limits.
    pub exclude_from_format_fail_count: bool,
    /// Sampling temperature override for the retry, if configured.
    pub requery_temperature: Option<f64>,
    /// Also mirror the message into the exchange as an assistant turn.
    pub add_message_as_assistant_turn: bool,
}

impl std::fmt::Display for BlockedAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "action blocked: {}", self.message)
    }
}

/// Verdict returned after an action has executed and its observation has
/// been annotated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepVerdict {
    Continue,
    /// Stop the run early. An intentional, clean exit, not a crash.
    Exit(RepetitiveExit),
}

/// The run is being ended because a command kept repeating.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepetitiveExit {
    pub repetition_count: usize,
    pub base_command: String,
}

impl std::fmt::Display for RepetitiveExit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "exiting run: '{}' repeated {} times",
            self.base_command, self.repetition_count
        )
    }
}

/// Lifecycle hooks the agent loop invokes around each step.
///
/// All methods default to no-ops. The loop must call them strictly in order
/// for one run at a time: `on_run_start` once, then per step
/// `on_actions_generated` → `on_action_executed` → `on_step_done`. The two
/// non-`Proceed`/`Continue` outcomes are control flow the loop pattern-
/// matches on, not failures.
pub trait AgentHook {
    /// Reset per-run state. Called before the first step of every run; an
    /// instance is reused across runs through this, never by rebuilding.
    fn on_run_start(&mut self) {}

    /// Called once an action has been generated, before it is recorded or
    /// executed. A `Block` decision aborts the step and queries the model
    /// again.
    fn on_actions_generated(&mut self, _step: &StepOutput) -> ActionDecision {
        ActionDecision::Proceed
    }

    /// Called once the action has executed, with the observation open for
    /// annotation. An `Exit` verdict stops the run cleanly.
    fn on_action_executed(&mut self, _step: &mut StepOutput) -> StepVerdict {
        StepVerdict::Continue
    }

    /// Called once the step has fully completed. The only point at which the
    /// conversation history may be mutated.
    fn on_step_done(&mut self, _history: &mut Vec<HistoryTurn>, _info: &mut AgentInfo) {}
}

/// Hook configuration variants, dispatched by tag.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentHookConfig {
    RepeatActionMitigator(RepeatActionMitigatorConfig),
}

/// Build the hook for a configuration variant.
///
/// The variant set is closed and matched exhaustively; malformed rule
/// records fail here, before any run starts.
pub fn build_hook(config: &AgentHookConfig) -> Result<Box<dyn AgentHook>> {
    match config {
        AgentHookConfig::RepeatActionMitigator(config) => {
            Ok(Box::new(RepeatActionMitigator::new(config)?))
        }
    }
}
