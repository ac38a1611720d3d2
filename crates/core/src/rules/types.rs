//! Types for tracker rules and the policies they select.

use std::fmt;

use regex_lite::Regex;
use serde::Serialize;

/// How a rule compares its pattern against a tracker hostname.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    /// Hostname equals the pattern.
    Exact,
    /// Pattern matches the whole hostname.
    Regex,
}

/// Compiled predicate of a rule.
#[derive(Debug, Clone)]
enum HostPredicate {
    Exact(String),
    Regex(Regex),
}

/// A compiled tracker rule.
#[derive(Debug, Clone)]
pub struct Rule {
    pattern: String,
    predicate: HostPredicate,
    policy: Policy,
}

impl Rule {
    /// Build an exact-hostname rule. The hostname is compared case-insensitively.
    pub fn exact(host: impl Into<String>, policy: Policy) -> Self {
        let pattern = host.into();
        Self {
            predicate: HostPredicate::Exact(pattern.to_ascii_lowercase()),
            pattern,
            policy,
        }
    }

    /// Build a regex rule. The pattern is anchored so it must match the whole hostname.
    pub fn regex(pattern: impl Into<String>, policy: Policy) -> Result<Self, regex_lite::Error> {
        let pattern = pattern.into();
        let anchored = Regex::new(&format!("^(?:{})$", pattern))?;
        Ok(Self {
            predicate: HostPredicate::Regex(anchored),
            pattern,
            policy,
        })
    }

    pub fn kind(&self) -> MatchKind {
        match self.predicate {
            HostPredicate::Exact(_) => MatchKind::Exact,
            HostPredicate::Regex(_) => MatchKind::Regex,
        }
    }

    /// Pattern as written in the rules file.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    /// Check a single (already lowercased) hostname.
    pub fn matches(&self, host: &str) -> bool {
        match &self.predicate {
            HostPredicate::Exact(expected) => host == expected,
            HostPredicate::Regex(re) => re.is_match(host),
        }
    }
}

/// Category and upload limit to apply to a torrent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Policy {
    /// Target category (None leaves the torrent uncategorized).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Upload limit in KiB/s (0 = unlimited).
    pub upload_limit_kib: u64,
}

impl Policy {
    pub fn new(category: impl Into<String>, upload_limit_kib: u64) -> Self {
        Self {
            category: Some(category.into()),
            upload_limit_kib,
        }
    }

    pub fn is_unlimited(&self) -> bool {
        self.upload_limit_kib == 0
    }
}

/// Where an applied policy came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PolicySource {
    /// A rule, by position in the rules file, and the hostname that matched it.
    Rule { index: usize, host: String },
    /// No rule matched.
    Defaults,
}

/// The single policy chosen for a torrent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppliedPolicy {
    pub policy: Policy,
    pub source: PolicySource,
}

impl fmt::Display for AppliedPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.policy.category {
            Some(category) => write!(f, "category={}", category)?,
            None => write!(f, "category=<none>")?,
        }
        if self.policy.is_unlimited() {
            write!(f, ", up_limit_kib=0 (unlimited)")
        } else {
            write!(f, ", up_limit_kib={}", self.policy.upload_limit_kib)
        }
    }
}
