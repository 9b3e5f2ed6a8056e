use thiserror::Error;

pub type Result<T> = std::result::Result<T, SleuthError>;

#[derive(Error, Debug)]
pub enum SleuthError {
    #[error("Parse error in {file}: {message}")]
    Parse { file: String, message: String },

    #[error("No adapter registered for language: {0}")]
    UnsupportedLanguage(String),

    #[error("Invalid rule IR ({rule_id}): {message}")]
    InvalidRuleIr { rule_id: String, message: String },

    #[error("Unknown matcher kind: {0}")]
    UnknownMatcherKind(String),

    #[error("Invalid pattern '{0}': at most one '*' on each side")]
    InvalidPattern(String),

    #[error("Rule compilation timed out after {0} seconds")]
    RuleCompilationTimeout(u64),

    #[error("Rule compilation failed (exit {code}): {stderr}")]
    RuleCompilationFailed { code: i32, stderr: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Output error: {0}")]
    Output(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl SleuthError {
    pub fn exit_code(&self) -> i32 {
        2
    }
}
