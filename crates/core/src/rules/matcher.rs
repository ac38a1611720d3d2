//! Rule set construction and first-match-wins classification.

use std::collections::BTreeSet;

use tracing::debug;

use crate::config::{validate_rules_config, ConfigError, RulesConfig};

use super::{AppliedPolicy, Policy, PolicySource, Rule};

/// Ordered, immutable set of tracker rules plus the fallback policy.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    defaults: Policy,
    rules: Vec<Rule>,
}

impl RuleSet {
    pub fn new(defaults: Policy, rules: Vec<Rule>) -> Self {
        Self { defaults, rules }
    }

    /// Validate a parsed rules file and compile its regexes.
    ///
    /// Any invalid pattern fails here, before a torrent is ever submitted.
    pub fn from_config(config: &RulesConfig) -> Result<Self, ConfigError> {
        validate_rules_config(config)?;

        let defaults = Policy {
            category: config.defaults.category.clone(),
            upload_limit_kib: config.defaults.up_limit_kib,
        };

        let rules = config
            .rules
            .iter()
            .enumerate()
            .map(|(index, rc)| {
                let policy = Policy::new(rc.category.clone(), rc.up_limit_kib);
                match (&rc.match_host, &rc.match_regex) {
                    (Some(host), _) => Ok(Rule::exact(host.clone(), policy)),
                    (None, Some(pattern)) => {
                        Rule::regex(pattern.clone(), policy).map_err(|source| {
                            ConfigError::InvalidRegex {
                                index,
                                pattern: pattern.clone(),
                                source,
                            }
                        })
                    }
                    // Rejected by validation.
                    (None, None) => Err(ConfigError::ValidationError(format!(
                        "rule #{index} needs either match or match_regex"
                    ))),
                }
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { defaults, rules })
    }

    pub fn defaults(&self) -> &Policy {
        &self.defaults
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Pick the policy for a torrent with the given tracker hostnames.
    ///
    /// Rules are tried in declaration order and the first one matched by any
    /// hostname wins, no matter which hostname it was. With no match (or no
    /// hostnames at all) the defaults are returned verbatim.
    pub fn classify(&self, hosts: &BTreeSet<String>) -> AppliedPolicy {
        for (index, rule) in self.rules.iter().enumerate() {
            if let Some(host) = hosts.iter().find(|h| rule.matches(h)) {
                debug!(
                    rule = index,
                    pattern = rule.pattern(),
                    host = %host,
                    "Tracker rule matched"
                );
                return AppliedPolicy {
                    policy: rule.policy().clone(),
                    source: PolicySource::Rule {
                        index,
                        host: host.clone(),
                    },
                };
            }
        }

        debug!(hosts = hosts.len(), "No tracker rule matched, using defaults");
        AppliedPolicy {
            policy: self.defaults.clone(),
            source: PolicySource::Defaults,
        }
    }
}
