/// Errors raised when a mitigation policy is built from rule records.
///
/// All validation happens at construction; a successfully built engine never
/// fails mid-run. Each variant names the offending rule list and index.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{rule}: invalid pattern `{pattern}`: {source}")]
    InvalidRegex {
        rule: String,
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("{rule}: repetition_count must be at least 1")]
    ZeroRepetitionThreshold { rule: String },

    #[error("{rule}: max_requeries must be at least 1")]
    ZeroMaxRequeries { rule: String },

    #[error("{rule}: template variable `{variable}` is not available here")]
    UnsupportedTemplateVariable { rule: String, variable: String },

    #[error("{rule}: unterminated `{{{{` placeholder in template")]
    UnterminatedPlaceholder { rule: String },
}

pub type Result<T> = std::result::Result<T, ConfigError>;
