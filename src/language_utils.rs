//! Language handling for fan variants
//!
//! Variants are stored under their ISO 639-2/T (3-letter) code so that
//! "fr", "fre", "fra" and "French" all compete for the same default slot.

use anyhow::{anyhow, Result};
use isolang::Language;

/// ISO 639-2/B codes that differ from their 639-2/T counterpart
const BIBLIOGRAPHIC_CODES: &[(&str, &str)] = &[
    ("alb", "sqi"),
    ("arm", "hye"),
    ("baq", "eus"),
    ("bur", "mya"),
    ("chi", "zho"),
    ("cze", "ces"),
    ("dut", "nld"),
    ("fre", "fra"),
    ("geo", "kat"),
    ("ger", "deu"),
    ("gre", "ell"),
    ("ice", "isl"),
    ("mac", "mkd"),
    ("may", "msa"),
    ("per", "fas"),
    ("rum", "ron"),
    ("slo", "slk"),
    ("wel", "cym"),
];

/// Normalize a language code or English name to ISO 639-2/T
pub fn normalize_to_part2t(code: &str) -> Result<String> {
    let trimmed = code.trim();
    let lowered = trimmed.to_lowercase();

    let language = match lowered.len() {
        2 => Language::from_639_1(&lowered),
        3 => BIBLIOGRAPHIC_CODES
            .iter()
            .find(|(bibliographic, _)| *bibliographic == lowered)
            .map_or_else(|| Language::from_639_3(&lowered), |(_, terminology)| {
                Language::from_639_3(terminology)
            }),
        _ => None,
    }
    .or_else(|| Language::from_name(&capitalize(trimmed)));

    language
        .map(|l| l.to_639_3().to_string())
        .ok_or_else(|| anyhow!("Cannot normalize invalid language code: {}", code))
}

/// Check if two language codes represent the same language
pub fn language_codes_match(code1: &str, code2: &str) -> bool {
    match (normalize_to_part2t(code1), normalize_to_part2t(code2)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// English name of a language code
pub fn get_language_name(code: &str) -> Result<String> {
    let normalized = normalize_to_part2t(code)?;
    let lang = Language::from_639_3(&normalized)
        .ok_or_else(|| anyhow!("Failed to get language from code: {}", normalized))?;

    Ok(lang.to_name().to_string())
}

fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}
