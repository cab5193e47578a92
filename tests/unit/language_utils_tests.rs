/*!
 * Tests for ISO language code utilities
 */

use storyguard::language_utils::{get_language_name, language_codes_match, normalize_to_part2t};

#[test]
fn test_normalizeToPart2t_withPart1Code_shouldReturnPart2t() {
    assert_eq!(normalize_to_part2t("es").unwrap(), "spa");
    assert_eq!(normalize_to_part2t("DE").unwrap(), "deu");
}

#[test]
fn test_normalizeToPart2t_withBibliographicCode_shouldReturnTerminologyCode() {
    assert_eq!(normalize_to_part2t("fre").unwrap(), "fra");
    assert_eq!(normalize_to_part2t("ger").unwrap(), "deu");
    assert_eq!(normalize_to_part2t("chi").unwrap(), "zho");
}

#[test]
fn test_normalizeToPart2t_withEnglishName_shouldResolve() {
    assert_eq!(normalize_to_part2t("french").unwrap(), "fra");
    assert_eq!(normalize_to_part2t("Japanese").unwrap(), "jpn");
}

#[test]
fn test_normalizeToPart2t_withGarbage_shouldFail() {
    assert!(normalize_to_part2t("").is_err());
    assert!(normalize_to_part2t("qq").is_err());
    assert!(normalize_to_part2t("Klingonese").is_err());
}

#[test]
fn test_languageCodesMatch_acrossSpellings() {
    assert!(language_codes_match("fr", "fre"));
    assert!(language_codes_match("fra", "French"));
    assert!(!language_codes_match("fr", "de"));
}

#[test]
fn test_getLanguageName_shouldReturnEnglishName() {
    assert_eq!(get_language_name("en").unwrap(), "English");
    assert!(get_language_name("zz").is_err());
}
