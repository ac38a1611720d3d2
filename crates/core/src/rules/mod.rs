//! Tracker rules.
//!
//! A [`RuleSet`] is built once from the rules file and then classifies a
//! torrent by its tracker hostnames: the first rule (in file order) matched by
//! any hostname decides the policy, otherwise the defaults apply.

mod matcher;
mod types;

pub use matcher::RuleSet;
pub use types::*;
