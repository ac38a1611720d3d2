use figment::{
    providers::{Env, Format, Toml, Yaml},
    Figment,
};
use std::path::Path;

use super::{types::RulesConfig, ConfigError};

/// Prefix for environment overrides, e.g. `QBT_RULES_DEFAULTS__CATEGORY=Other`.
const ENV_PREFIX: &str = "QBT_RULES_";

/// On-disk format of a rules file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RulesFormat {
    Yaml,
    Toml,
}

impl RulesFormat {
    /// Guess the format from the file extension (YAML unless `.toml`).
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("toml") => RulesFormat::Toml,
            _ => RulesFormat::Yaml,
        }
    }
}

/// Load the rules file with environment variable overrides
pub fn load_rules_config(path: &Path) -> Result<RulesConfig, ConfigError> {
    if !path.is_file() {
        return Err(ConfigError::FileNotFound(path.display().to_string()));
    }

    let figment = match RulesFormat::from_path(path) {
        RulesFormat::Yaml => Figment::new().merge(Yaml::file(path)),
        RulesFormat::Toml => Figment::new().merge(Toml::file(path)),
    };

    figment
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
        .extract()
        .map_err(|e| ConfigError::ParseError(e.to_string()))
}

/// Load rules from a string (useful for testing)
pub fn load_rules_config_from_str(
    contents: &str,
    format: RulesFormat,
) -> Result<RulesConfig, ConfigError> {
    let figment = match format {
        RulesFormat::Yaml => Figment::new().merge(Yaml::string(contents)),
        RulesFormat::Toml => Figment::new().merge(Toml::string(contents)),
    };

    figment
        .extract()
        .map_err(|e| ConfigError::ParseError(e.to_string()))
}
