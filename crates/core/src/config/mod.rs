mod loader;
mod types;
mod validate;

pub use loader::{load_rules_config, load_rules_config_from_str, RulesFormat};
pub use types::*;
pub use validate::{validate_rules_config, MAX_UP_LIMIT_KIB};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Rules file not found: {0}")]
    FileNotFound(String),

    #[error("Failed to parse rules: {0}")]
    ParseError(String),

    #[error("Rules validation failed: {0}")]
    ValidationError(String),

    #[error("Rule #{index} has an invalid regex {pattern:?}: {source}")]
    InvalidRegex {
        index: usize,
        pattern: String,
        #[source]
        source: regex_lite::Error,
    },
}
