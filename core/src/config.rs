use regex::Regex;
use serde::Deserialize;
use serde::Serialize;

use crate::error::ConfigError;
use crate::error::Result;
use crate::template::MessageTemplate;
use crate::template::TemplateVar;

/// Appends a warning to the step observation when a repeated command
/// matches.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WarningRule {
    /// Pattern matched from the start of the base command.
    pub base_command_regex: String,
    /// Minimum trailing repetitions before the rule fires.
    pub repetition_count: usize,
    /// Message template. Variables: `repetition_count`, `base_command`.
    pub warning_message: String,
}

/// Terminates the run when a repeated command matches.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TerminationRule {
    pub base_command_regex: String,
    pub repetition_count: usize,
}

/// Blocks a freshly generated action and forces the model to regenerate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RequeryRule {
    pub base_command_regex: String,
    pub repetition_count: usize,
    /// Consecutive blocks before the action is let through once and the
    /// counter resets.
    pub max_requeries: u32,
    /// Message template. Variables: `repetition_count`, `base_command`,
    /// `action` (the raw last action).
    pub requery_message_template: String,
    /// Sampling temperature override for the regeneration.
    #[serde(default)]
    pub requery_temperature: Option<f64>,
    /// Also mirror the rendered message into the exchange as an assistant
    /// turn.
    #[serde(default)]
    pub add_message_as_assistant_turn: bool,
}

/// Rolls back trailing conversation history when a repeated command matches.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RollbackRule {
    pub base_command_regex: String,
    pub repetition_count: usize,
    /// Added to the repetition count to form the rollback depth. May be
    /// negative; a non-positive depth rolls back nothing.
    pub rollback_step_offset: i64,
}

/// Full rule set for the mitigation engine.
///
/// Lists are evaluated in order; within each list the first matching rule
/// wins. Unknown fields are rejected so a typo in a rule record fails loudly
/// instead of silently disabling it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RepeatActionMitigatorConfig {
    #[serde(default)]
    pub warning_messages: Vec<WarningRule>,
    #[serde(default)]
    pub terminate: Vec<TerminationRule>,
    #[serde(default)]
    pub requery: Vec<RequeryRule>,
    #[serde(default)]
    pub rollback_history: Vec<RollbackRule>,
    /// Maximum rollbacks per run. 0 = unlimited.
    #[serde(default)]
    pub max_rollbacks: u32,
}

// ---------------------------------------------------------------------------
// Compiled policy — validated once, queried every step
// ---------------------------------------------------------------------------

/// A compiled (pattern, threshold) gate shared by all rule kinds.
#[derive(Debug, Clone)]
pub(crate) struct CommandMatcher {
    regex: Regex,
    threshold: usize,
}

impl CommandMatcher {
    fn compile(pattern: &str, threshold: usize, rule: &str) -> Result<Self> {
        if threshold == 0 {
            return Err(ConfigError::ZeroRepetitionThreshold {
                rule: rule.to_string(),
            });
        }
        // Anchored so patterns match from the start of the base command.
        let regex =
            Regex::new(&format!("^(?:{pattern})")).map_err(|source| ConfigError::InvalidRegex {
                rule: rule.to_string(),
                pattern: pattern.to_string(),
                source,
            })?;
        Ok(Self { regex, threshold })
    }

    pub(crate) fn matches(&self, base_command: &str, repeat_count: usize) -> bool {
        repeat_count >= self.threshold && self.regex.is_match(base_command)
    }
}

#[derive(Debug, Clone)]
pub(crate) struct CompiledWarning {
    pub(crate) matcher: CommandMatcher,
    pub(crate) message: MessageTemplate,
}

#[derive(Debug, Clone)]
pub(crate) struct CompiledRequery {
    pub(crate) matcher: CommandMatcher,
    pub(crate) message: MessageTemplate,
    pub(crate) max_requeries: u32,
    pub(crate) temperature: Option<f64>,
    pub(crate) add_message_as_assistant_turn: bool,
}

#[derive(Debug, Clone)]
pub(crate) struct CompiledRollback {
    pub(crate) matcher: CommandMatcher,
    pub(crate) step_offset: i64,
}

#[derive(Debug, Clone)]
pub(crate) struct CompiledPolicy {
    pub(crate) warnings: Vec<CompiledWarning>,
    pub(crate) terminations: Vec<CommandMatcher>,
    pub(crate) requeries: Vec<CompiledRequery>,
    pub(crate) rollbacks: Vec<CompiledRollback>,
    pub(crate) max_rollbacks: u32,
}

const MESSAGE_VARS: &[TemplateVar] = &[TemplateVar::RepetitionCount, TemplateVar::BaseCommand];
const REQUERY_VARS: &[TemplateVar] = &[
    TemplateVar::RepetitionCount,
    TemplateVar::BaseCommand,
    TemplateVar::Action,
];

impl RepeatActionMitigatorConfig {
    /// Compile every rule record, failing fast on the first malformed
    /// pattern, template, or out-of-range threshold.
    pub(crate) fn compile(&self) -> Result<CompiledPolicy> {
        let mut warnings = Vec::with_capacity(self.warning_messages.len());
        for (i, rule) in self.warning_messages.iter().enumerate() {
            let at = format!("warning_messages[{i}]");
            warnings.push(CompiledWarning {
                matcher: CommandMatcher::compile(
                    &rule.base_command_regex,
                    rule.repetition_count,
                    &at,
                )?,
                message: MessageTemplate::parse(&rule.warning_message, MESSAGE_VARS, &at)?,
            });
        }

        let mut terminations = Vec::with_capacity(self.terminate.len());
        for (i, rule) in self.terminate.iter().enumerate() {
            let at = format!("terminate[{i}]");
            terminations.push(CommandMatcher::compile(
                &rule.base_command_regex,
                rule.repetition_count,
                &at,
            )?);
        }

        let mut requeries = Vec::with_capacity(self.requery.len());
        for (i, rule) in self.requery.iter().enumerate() {
            let at = format!("requery[{i}]");
            if rule.max_requeries == 0 {
                return Err(ConfigError::ZeroMaxRequeries { rule: at });
            }
            requeries.push(CompiledRequery {
                matcher: CommandMatcher::compile(
                    &rule.base_command_regex,
                    rule.repetition_count,
                    &at,
                )?,
                message: MessageTemplate::parse(
                    &rule.requery_message_template,
                    REQUERY_VARS,
                    &at,
                )?,
                max_requeries: rule.max_requeries,
                temperature: rule.requery_temperature,
                add_message_as_assistant_turn: rule.add_message_as_assistant_turn,
            });
        }

        let mut rollbacks = Vec::with_capacity(self.rollback_history.len());
        for (i, rule) in self.rollback_history.iter().enumerate() {
            let at = format!("rollback_history[{i}]");
            rollbacks.push(CompiledRollback {
                matcher: CommandMatcher::compile(
                    &rule.base_command_regex,
                    rule.repetition_count,
                    &at,
                )?,
                step_offset: rule.rollback_step_offset,
            });
        }

        Ok(CompiledPolicy {
            warnings,
            terminations,
            requeries,
            rollbacks,
            max_rollbacks: self.max_rollbacks,
        })
    }
}
