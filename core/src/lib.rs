pub mod command;
pub mod config;
pub mod error;
pub mod hook;
pub mod mitigator;
pub mod repetition;
pub mod template;

// Re-export key types for convenience.
pub use command::base_command;
pub use config::{
    RepeatActionMitigatorConfig, RequeryRule, RollbackRule, TerminationRule, WarningRule,
};
pub use error::ConfigError;
pub use hook::{
    build_hook, ActionDecision, AgentHook, AgentHookConfig, BlockedAction, RepetitiveExit,
    StepVerdict,
};
pub use mitigator::RepeatActionMitigator;
pub use repetition::trailing_repeat_count;
