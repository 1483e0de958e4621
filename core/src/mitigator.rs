use chrono::Utc;

use loopbreak_protocol::AgentInfo;
use loopbreak_protocol::HistoryTurn;
use loopbreak_protocol::RollbackRecord;
use loopbreak_protocol::StepOutput;

use crate::command::base_command;
use crate::config::CompiledPolicy;
use crate::config::RepeatActionMitigatorConfig;
use crate::error::Result;
use crate::hook::ActionDecision;
use crate::hook::AgentHook;
use crate::hook::BlockedAction;
use crate::hook::RepetitiveExit;
use crate::hook::StepVerdict;
use crate::repetition::trailing_repeat_count;
use crate::template::TemplateContext;

/// Watches the stream of issued actions for repetition and applies the
/// configured policy cascade: observation warnings, run termination, blocked
/// retries, and history rollbacks.
///
/// One instance serves one run at a time. `on_run_start` resets all per-run
/// state so the instance can be reused without recompiling its policy.
pub struct RepeatActionMitigator {
    policy: CompiledPolicy,
    /// Actions recorded this run, in step order. Blocked actions are never
    /// recorded.
    past_actions: Vec<String>,
    /// Consecutive blocks issued for the current streak.
    requery_count: u32,
    /// Rollbacks applied this run, bounded by the policy cap.
    rollback_count: u32,
    /// Completed steps this run. Monotonic; rollbacks do not rewind it.
    steps_completed: u32,
}

impl RepeatActionMitigator {
    /// Compile and validate the rule set. Malformed patterns, templates, and
    /// out-of-range thresholds fail here, never mid-run.
    pub fn new(config: &RepeatActionMitigatorConfig) -> Result<Self> {
        Ok(Self {
            policy: config.compile()?,
            past_actions: Vec::new(),
            requery_count: 0,
            rollback_count: 0,
            steps_completed: 0,
        })
    }

    /// Trailing repetitions of the last recorded action's base command.
    pub fn repeat_action_count(&self) -> usize {
        trailing_repeat_count(&self.past_actions)
    }

    /// Actions recorded so far this run.
    pub fn past_actions(&self) -> &[String] {
        &self.past_actions
    }

    /// Rollbacks applied so far this run.
    pub fn rollback_count(&self) -> u32 {
        self.rollback_count
    }

    fn last_base_command(&self) -> Option<(usize, String)> {
        let last = self.past_actions.last()?;
        Some((self.repeat_action_count(), base_command(last)))
    }

    /// Warning pass: render the first matching warning rule's message, to be
    /// appended to the step observation. `None` when no rule matches or no
    /// action has been recorded yet.
    fn injected_message(&self) -> Option<String> {
        let (repeat_count, base) = self.last_base_command()?;
        for rule in &self.policy.warnings {
            if !rule.matcher.matches(&base, repeat_count) {
                continue;
            }
            tracing::warn!(
                repetition_count = repeat_count,
                base_command = %base,
                "injecting repetition warning"
            );
            return Some(rule.message.render(&TemplateContext {
                repetition_count: repeat_count,
                base_command: &base,
                action: "",
            }));
        }
        None
    }

    /// Termination pass: first matching termination rule ends the run.
    fn termination_match(&self) -> Option<RepetitiveExit> {
        let (repeat_count, base) = self.last_base_command()?;
        for matcher in &self.policy.terminations {
            if matcher.matches(&base, repeat_count) {
                tracing::warn!(
                    repetition_count = repeat_count,
                    base_command = %base,
                    "terminating run due to repetitive actions"
                );
                return Some(RepetitiveExit {
                    repetition_count: repeat_count,
                    base_command: base,
                });
            }
        }
        None
    }

    /// Requery pass, evaluated against the last *recorded* action before the
    /// freshly generated one is appended. Once the first matching rule's
    /// retry budget is exhausted the counter resets and the action passes
    /// through, so a stubborn model cannot be blocked forever.
    fn requery_decision(&mut self) -> ActionDecision {
        let Some((repeat_count, base)) = self.last_base_command() else {
            self.requery_count = 0;
            return ActionDecision::Proceed;
        };

        for rule in &self.policy.requeries {
            if !rule.matcher.matches(&base, repeat_count) {
                continue;
            }
            if self.requery_count >= rule.max_requeries {
                tracing::warn!(
                    base_command = %base,
                    requeries = self.requery_count,
                    max_requeries = rule.max_requeries,
                    "requery budget exhausted, letting the action through"
                );
                self.requery_count = 0;
                return ActionDecision::Proceed;
            }

            let last_action = self.past_actions.last().map(String::as_str).unwrap_or("");
            let message = rule.message.render(&TemplateContext {
                repetition_count: repeat_count,
                base_command: &base,
                action: last_action,
            });
            self.requery_count += 1;
            tracing::warn!(
                repetition_count = repeat_count,
                base_command = %base,
                requeries = self.requery_count,
                max_requeries = rule.max_requeries,
                "blocking repeated action for requery"
            );
            return ActionDecision::Block(BlockedAction {
                message,
                exclude_from_format_fail_count: true,
                requery_temperature: rule.temperature,
                add_message_as_assistant_turn: rule.add_message_as_assistant_turn,
            });
        }

        self.requery_count = 0;
        ActionDecision::Proceed
    }

    /// Rollback pass: drop trailing history after the first matching rule.
    ///
    /// The rollback depth is the repetition count plus the rule's offset; a
    /// non-positive depth does nothing. Each rolled-back step removes one
    /// user and one assistant turn, and the two leading turns always
    /// survive.
    fn handle_rollback(&mut self, history: &mut Vec<HistoryTurn>, info: &mut AgentInfo) {
        if self.policy.max_rollbacks > 0 && self.rollback_count >= self.policy.max_rollbacks {
            return;
        }
        let Some((repeat_count, base)) = self.last_base_command() else {
            return;
        };

        for rule in &self.policy.rollbacks {
            if !rule.matcher.matches(&base, repeat_count) {
                continue;
            }
            let depth = repeat_count as i64 + rule.step_offset;
            if depth <= 0 {
                return;
            }
            self.rollback_count += 1;

            let dropped = (2 * depth as usize)
                .min(history.len().saturating_sub(2))
                .min(2 * self.past_actions.len());
            tracing::warn!(
                repetition_count = repeat_count,
                base_command = %base,
                dropped_turns = dropped,
                "rolling back history due to repetitive actions"
            );
            self.past_actions
                .truncate(self.past_actions.len().saturating_sub(dropped));
            history.truncate(history.len().saturating_sub(dropped));
            info.rollbacks.push(RollbackRecord {
                step_count: self.steps_completed,
                history_rollback_steps: dropped,
                recorded_at: Utc::now(),
            });
            return;
        }
    }
}

impl AgentHook for RepeatActionMitigator {
    fn on_run_start(&mut self) {
        self.past_actions.clear();
        self.requery_count = 0;
        self.rollback_count = 0;
        self.steps_completed = 0;
    }

    fn on_actions_generated(&mut self, step: &StepOutput) -> ActionDecision {
        let decision = self.requery_decision();
        // A blocked action is never recorded.
        if decision == ActionDecision::Proceed {
            self.past_actions.push(step.action.clone());
        }
        decision
    }

    fn on_action_executed(&mut self, step: &mut StepOutput) -> StepVerdict {
        if let Some(message) = self.injected_message() {
            step.observation.push_str(&format!("\n\n{message}"));
        }
        match self.termination_match() {
            Some(exit) => StepVerdict::Exit(exit),
            None => StepVerdict::Continue,
        }
    }

    fn on_step_done(&mut self, history: &mut Vec<HistoryTurn>, info: &mut AgentInfo) {
        self.steps_completed += 1;
        self.handle_rollback(history, info);
    }
}
