use super::{types::RulesConfig, ConfigError};

/// Largest upload limit qBittorrent accepts: it stores bytes/s in an `int`.
pub const MAX_UP_LIMIT_KIB: u64 = i32::MAX as u64 / 1024;

/// Validate the rules file structure.
/// Currently validates:
/// - Each rule has exactly one of `match` / `match_regex`
/// - Patterns and categories are not blank
/// - The defaults category, when given, is not blank
/// - Upload limits fit qBittorrent's range ([`MAX_UP_LIMIT_KIB`])
///
/// Regexes are compiled (and rejected) when the rule set is built.
pub fn validate_rules_config(config: &RulesConfig) -> Result<(), ConfigError> {
    if let Some(category) = &config.defaults.category {
        if category.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "defaults.category cannot be blank".to_string(),
            ));
        }
    }

    if config.defaults.up_limit_kib > MAX_UP_LIMIT_KIB {
        return Err(ConfigError::ValidationError(format!(
            "defaults.up_limit_kib {} exceeds the maximum of {MAX_UP_LIMIT_KIB}",
            config.defaults.up_limit_kib
        )));
    }

    for (index, rule) in config.rules.iter().enumerate() {
        let pattern = match (&rule.match_host, &rule.match_regex) {
            (Some(p), None) | (None, Some(p)) => p,
            (Some(_), Some(_)) => {
                return Err(ConfigError::ValidationError(format!(
                    "rule #{index} sets both match and match_regex"
                )));
            }
            (None, None) => {
                return Err(ConfigError::ValidationError(format!(
                    "rule #{index} needs either match or match_regex"
                )));
            }
        };

        if pattern.trim().is_empty() {
            return Err(ConfigError::ValidationError(format!(
                "rule #{index} has an empty pattern"
            )));
        }

        if rule.category.trim().is_empty() {
            return Err(ConfigError::ValidationError(format!(
                "rule #{index} has an empty category"
            )));
        }

        if rule.up_limit_kib > MAX_UP_LIMIT_KIB {
            return Err(ConfigError::ValidationError(format!(
                "rule #{index} up_limit_kib {} exceeds the maximum of {MAX_UP_LIMIT_KIB}",
                rule.up_limit_kib
            )));
        }
    }

    Ok(())
}
