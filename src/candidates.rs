// KeyProbe - Weak Password Auditor
// Password candidate rules

use serde::{Deserialize, Serialize};
use std::fmt;

/// A rule that expands a username into password candidates.
///
/// Rules are applied in the order they are configured, and the order of the
/// resulting candidates is the order in which they are tried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateRule {
    /// Password identical to the username
    Username,
    /// Username followed by a single digit (`0`-`9`)
    SingleDigit,
    /// Username followed by two zero-padded digits (`00`-`99`)
    TwoDigit,
    /// Username followed by three zero-padded digits (`000`-`999`), off by default
    ThreeDigit,
}

impl CandidateRule {
    /// The default rule set: username, single digit, two digits (111 candidates)
    pub fn defaults() -> Vec<CandidateRule> {
        vec![
            CandidateRule::Username,
            CandidateRule::SingleDigit,
            CandidateRule::TwoDigit,
        ]
    }

    /// Number of candidates this rule produces for any username
    pub fn count(self) -> usize {
        match self {
            CandidateRule::Username => 1,
            CandidateRule::SingleDigit => 10,
            CandidateRule::TwoDigit => 100,
            CandidateRule::ThreeDigit => 1000,
        }
    }

    fn expand(self, username: &str, out: &mut Vec<String>) {
        match self {
            CandidateRule::Username => out.push(username.to_string()),
            CandidateRule::SingleDigit => {
                out.extend((0..10).map(|i| format!("{username}{i}")));
            }
            CandidateRule::TwoDigit => {
                out.extend((0..100).map(|i| format!("{username}{i:02}")));
            }
            CandidateRule::ThreeDigit => {
                out.extend((0..1000).map(|i| format!("{username}{i:03}")));
            }
        }
    }
}

impl fmt::Display for CandidateRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CandidateRule::Username => "username",
            CandidateRule::SingleDigit => "single_digit",
            CandidateRule::TwoDigit => "two_digit",
            CandidateRule::ThreeDigit => "three_digit",
        };
        write!(f, "{name}")
    }
}

/// Generate the default candidate sequence for a username
#[allow(dead_code)]
pub fn generate(username: &str) -> Vec<String> {
    generate_with_rules(username, &CandidateRule::defaults())
}

/// Generate candidates for a username using the given rules, in rule order
pub fn generate_with_rules(username: &str, rules: &[CandidateRule]) -> Vec<String> {
    let capacity = rules.iter().map(|rule| rule.count()).sum();
    let mut candidates = Vec::with_capacity(capacity);
    for rule in rules {
        rule.expand(username, &mut candidates);
    }
    candidates
}
