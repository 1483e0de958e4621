use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;

/// Role of a single conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnRole {
    System,
    User,
    Assistant,
}

/// One turn of the agent's conversation history.
///
/// The history is an ordered sequence that may be truncated from the tail.
/// The two leading turns (system prompt and problem statement) are reserved
/// and must survive any truncation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryTurn {
    pub role: TurnRole,
    pub content: String,
}

impl HistoryTurn {
    pub fn new(role: TurnRole, content: &str) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Output of a single agent step: the generated action and, once the action
/// has run, the observation returned by the environment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepOutput {
    /// Raw command string issued for this step.
    pub action: String,
    /// Environment output; hooks may append annotations to it.
    #[serde(default)]
    pub observation: String,
    /// Whether the agent declared the task finished with this step.
    #[serde(default)]
    pub done: bool,
}

impl StepOutput {
    pub fn from_action(action: &str) -> Self {
        Self {
            action: action.into(),
            ..Self::default()
        }
    }
}

/// A history rollback that was applied during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackRecord {
    /// Completed steps at the moment the rollback fired.
    pub step_count: u32,
    /// Trailing history entries dropped (user and assistant turns combined).
    pub history_rollback_steps: usize,
    pub recorded_at: DateTime<Utc>,
}

/// Mutable run metadata owned by the agent loop. Hooks record notable events
/// here so a finished trajectory can be audited.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentInfo {
    #[serde(default)]
    pub rollbacks: Vec<RollbackRecord>,
    /// Open map for collaborator-specific metadata.
    #[serde(default)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}
