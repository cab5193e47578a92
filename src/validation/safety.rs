/*!
 * Safety scan of text against the active safety rules.
 *
 * A match at or above the configured severity threshold fails the check
 * and contributes the rule's name as a flag. Weaker matches are reported
 * as warnings only. Every match contributes to the suggested rating.
 */

use log::debug;

use crate::rules::{CompiledRule, MaturityRating, Severity};

/// One rule that matched the text
#[derive(Debug, Clone, PartialEq)]
pub struct SafetyMatch {
    pub rule_name: String,
    pub severity: Severity,
    pub suggested_rating: MaturityRating,
    /// Whether this match fails the check
    pub blocking: bool,
}

/// Outcome of a safety scan
#[derive(Debug, Clone, PartialEq)]
pub struct SafetyOutcome {
    pub passed: bool,
    /// 1.0 for clean text, lower for each match
    pub score: f64,
    pub matches: Vec<SafetyMatch>,
}

impl SafetyOutcome {
    /// Names of the rules that failed the check, in evaluation order
    pub fn blocking_rules(&self) -> impl Iterator<Item = &str> {
        self.matches
            .iter()
            .filter(|m| m.blocking)
            .map(|m| m.rule_name.as_str())
    }

    /// Names of matched rules below the threshold
    pub fn warnings(&self) -> impl Iterator<Item = &str> {
        self.matches
            .iter()
            .filter(|m| !m.blocking)
            .map(|m| m.rule_name.as_str())
    }

    /// Most restrictive rating suggested by any match
    pub fn suggested_rating(&self) -> Option<MaturityRating> {
        self.matches.iter().map(|m| m.suggested_rating).max()
    }
}

/// Scan text with the given safety rules
pub fn scan<'a>(
    rules: impl IntoIterator<Item = &'a CompiledRule>,
    text: &str,
    threshold: Severity,
) -> SafetyOutcome {
    let mut matches = Vec::new();
    let mut score = 1.0;

    for rule in rules {
        let Some(found) = rule.first_match(text) else {
            continue;
        };
        let severity = rule.rule.severity;
        debug!(
            "Safety rule '{}' ({}) matched {:?}",
            rule.rule.name, severity, found
        );
        score *= 1.0 - severity.penalty();
        matches.push(SafetyMatch {
            rule_name: rule.rule.name.clone(),
            severity,
            suggested_rating: rule.suggested_rating(),
            blocking: severity >= threshold,
        });
    }

    SafetyOutcome {
        passed: !matches.iter().any(|m| m.blocking),
        score: f64::clamp(score, 0.0, 1.0),
        matches,
    }
}
