/*!
 * Tests for language code handling
 */

use batchlate::language_utils::{
    get_language_name, language_tag, normalize_to_part1_or_part2t, normalize_to_part2t, resolve_target_language,
};

#[test]
fn test_normalizeToPart2t_shouldTrimAndLowercase() {
    assert_eq!(normalize_to_part2t(" DE ").unwrap(), "deu");
    assert_eq!(normalize_to_part2t("ger").unwrap(), "deu");
    assert!(normalize_to_part2t("german").is_err());
    assert!(normalize_to_part2t("").is_err());
}

#[test]
fn test_normalizeToPart1OrPart2t_shouldPreferTwoLetterCode() {
    assert_eq!(normalize_to_part1_or_part2t("spa").unwrap(), "es");
    assert_eq!(normalize_to_part1_or_part2t("hi").unwrap(), "hi");
}

#[test]
fn test_getLanguageName_shouldResolveCommonCodes() {
    assert_eq!(get_language_name("es").unwrap(), "Spanish");
    assert_eq!(get_language_name("deu").unwrap(), "German");
    assert!(get_language_name("zz").is_err());
}

#[test]
fn test_resolveTargetLanguage_shouldAcceptCodesAndNames() {
    assert_eq!(resolve_target_language("fr"), "French");
    assert_eq!(resolve_target_language("Klingon"), "Klingon");
}

#[test]
fn test_languageTag_shouldNormalizeFreeText() {
    assert_eq!(language_tag("es"), "es");
    assert_eq!(language_tag("  Simplified   Chinese "), "simplified_chinese");
}
