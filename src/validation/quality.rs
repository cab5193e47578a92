/*!
 * Heuristic text quality assessment.
 *
 * This module scores submitted prose on structure rather than content:
 * - Minimum length in words
 * - Paragraph structure
 * - Runs of one repeated character ("!!!!!!!!!!", "aaaaaaaaaa")
 * - Shouting (share of capital letters)
 *
 * Thresholds come from configuration and may be tightened by active
 * quality rules.
 */

use once_cell::sync::Lazy;
use regex::Regex;

use crate::app_config::ValidationSettings;
use crate::rules::QualityRuleConfig;

/// Blank line separating paragraphs
static PARAGRAPH_BREAK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\n[ \t]*\n").expect("Invalid paragraph break regex"));

/// Below this many letters the caps ratio is not meaningful
const MIN_LETTERS_FOR_CAPS: usize = 20;

pub const FLAG_TOO_SHORT: &str = "too_short";
pub const FLAG_TOO_FEW_PARAGRAPHS: &str = "too_few_paragraphs";
pub const FLAG_REPEATED_CHARACTERS: &str = "repeated_characters";
pub const FLAG_EXCESSIVE_CAPS: &str = "excessive_caps";

/// Effective quality thresholds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QualityThresholds {
    pub min_words: usize,
    pub min_paragraphs: usize,
    pub max_repeated_char_run: usize,
    pub max_caps_ratio: f64,
}

impl QualityThresholds {
    pub fn from_settings(settings: &ValidationSettings) -> Self {
        Self {
            min_words: settings.min_words,
            min_paragraphs: settings.min_paragraphs,
            max_repeated_char_run: settings.max_repeated_char_run,
            max_caps_ratio: settings.max_caps_ratio,
        }
    }

    /// Apply a quality rule; rules can only make thresholds stricter
    pub fn tighten(mut self, rule: &QualityRuleConfig) -> Self {
        if let Some(min_words) = rule.min_words {
            self.min_words = self.min_words.max(min_words);
        }
        if let Some(min_paragraphs) = rule.min_paragraphs {
            self.min_paragraphs = self.min_paragraphs.max(min_paragraphs);
        }
        if let Some(max_run) = rule.max_repeated_char_run {
            self.max_repeated_char_run = self.max_repeated_char_run.min(max_run);
        }
        self
    }
}

/// Measurements and verdict for one text
#[derive(Debug, Clone, PartialEq)]
pub struct QualityReport {
    pub word_count: usize,
    pub paragraph_count: usize,
    pub longest_char_run: usize,
    pub caps_ratio: f64,
    /// Quality score in [0, 1]
    pub score: f64,
    pub flags: Vec<&'static str>,
}

impl QualityReport {
    /// `excessive_caps` lowers the score but does not fail the check
    pub fn passed(&self) -> bool {
        self.flags.iter().all(|f| *f == FLAG_EXCESSIVE_CAPS)
    }
}

/// Measure a text against the thresholds
pub fn assess(text: &str, thresholds: &QualityThresholds) -> QualityReport {
    let word_count = text.split_whitespace().count();
    let paragraph_count = PARAGRAPH_BREAK
        .split(text)
        .filter(|p| !p.trim().is_empty())
        .count();
    let longest_char_run = longest_run(text);
    let caps_ratio = caps_ratio(text);

    let mut score = 1.0;
    let mut flags = Vec::new();

    if word_count < thresholds.min_words {
        flags.push(FLAG_TOO_SHORT);
        score *= word_count as f64 / thresholds.min_words as f64;
    }
    if paragraph_count < thresholds.min_paragraphs {
        flags.push(FLAG_TOO_FEW_PARAGRAPHS);
        score *= 0.8;
    }
    if longest_char_run > thresholds.max_repeated_char_run {
        flags.push(FLAG_REPEATED_CHARACTERS);
        score *= 0.7;
    }
    if caps_ratio > thresholds.max_caps_ratio {
        flags.push(FLAG_EXCESSIVE_CAPS);
        score *= 0.8;
    }

    QualityReport {
        word_count,
        paragraph_count,
        longest_char_run,
        caps_ratio,
        score: f64::clamp(score, 0.0, 1.0),
        flags,
    }
}

/// Longest run of one repeated non-whitespace character
fn longest_run(text: &str) -> usize {
    let mut longest = 0;
    let mut current = 0;
    let mut previous = None;

    for c in text.chars() {
        if c.is_whitespace() {
            previous = None;
            current = 0;
            continue;
        }
        if previous == Some(c) {
            current += 1;
        } else {
            previous = Some(c);
            current = 1;
        }
        longest = longest.max(current);
    }
    longest
}

fn caps_ratio(text: &str) -> f64 {
    let (letters, upper) = text
        .chars()
        .filter(|c| c.is_alphabetic())
        .fold((0usize, 0usize), |(letters, upper), c| {
            (letters + 1, upper + usize::from(c.is_uppercase()))
        });

    if letters < MIN_LETTERS_FOR_CAPS {
        0.0
    } else {
        upper as f64 / letters as f64
    }
}
