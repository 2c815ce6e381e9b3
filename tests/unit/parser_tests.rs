/*!
 * Tests for the response parser fallback chain
 */

use batchlate::translation::parser::{
    FALLBACK_CHAIN, normalize_id, parse_fence_stripped, parse_line_patterns, parse_repaired, parse_strict,
};
use batchlate::translation::{ParseOutcome, ParseStrategy, RawResponse, ResponseParser, TruncationStatus};

use crate::common;

fn ids(entries: &[(String, String)]) -> Vec<&str> {
    entries.iter().map(|(id, _)| id.as_str()).collect()
}

#[test]
fn test_fallbackChain_shouldBeOrderedFromStrictToLinePattern() {
    let order: Vec<ParseStrategy> = FALLBACK_CHAIN.iter().map(|(s, _)| *s).collect();
    assert_eq!(
        order,
        vec![
            ParseStrategy::Strict,
            ParseStrategy::FenceStripped,
            ParseStrategy::Repaired,
            ParseStrategy::LinePattern,
        ]
    );
}

#[test]
fn test_normalizeId_shouldStripMarkerAndWhitespace() {
    assert_eq!(normalize_id("[ID:P0087]"), "P0087");
    assert_eq!(normalize_id(" [ID: 42 ] "), "42");
    assert_eq!(normalize_id("  17 "), "17");
}

#[test]
fn test_parseStrict_fencedBody_shouldYieldNothing() {
    assert!(parse_strict("```json\n{\"1\": \"a\"}\n```").is_none());
}

#[test]
fn test_parseFenceStripped_proseOnBothSides_shouldYieldEntries() {
    let body = "Sure, here you go:\n```\n{\"P0087\": \"Kraftstoffdruck zu niedrig\"}\n```\nAnything else?";
    let entries = parse_fence_stripped(body).unwrap();
    assert_eq!(ids(&entries), vec!["P0087"]);
    assert_eq!(entries[0].1, "Kraftstoffdruck zu niedrig");
}

#[test]
fn test_parseRepaired_truncatedFencedBody_shouldKeepCompleteEntries() {
    let body = "```json\n{\n  \"1\": \"eins\",\n  \"2\": \"zwei\",\n  \"3\": \"dr";
    let entries = parse_repaired(body).unwrap();
    assert_eq!(ids(&entries), vec!["1", "2"]);
}

#[test]
fn test_parseRepaired_completeBody_shouldYieldNothing() {
    assert!(parse_repaired(r#"{"1": "eins"}"#).is_none());
}

#[test]
fn test_parseLinePatterns_markerKeysInFragments_shouldBeNormalized() {
    let body = "\"[ID:7]\": \"sieben\" and then \"[ID:8]\": \"acht\"";
    let entries = parse_line_patterns(body).unwrap();
    assert_eq!(ids(&entries), vec!["7", "8"]);
}

#[test]
fn test_parseLinePatterns_echoedPrompt_shouldRecoverIds() {
    let body = "1. [ID:P0301] Zylinder 1 Fehlzündung erkannt\n2) [ID:P0217] Motorkühlmittel Übertemperatur";
    let entries = parse_line_patterns(body).unwrap();
    assert_eq!(ids(&entries), vec!["P0301", "P0217"]);
    assert_eq!(entries[1].1, "Motorkühlmittel Übertemperatur");
}

#[test]
fn test_responseParser_statusZero_shouldParseAsSuccess() {
    let batch = common::batch(1, &["1"]);
    let parsed = ResponseParser::new().parse(&RawResponse::new("batch-0001", 0, r#"{"1": "eins zwei"}"#), Some(&batch));
    assert_eq!(parsed.outcome, ParseOutcome::Clean);
}

#[test]
fn test_responseParser_serviceError_shouldKeepShortExcerpt() {
    let body = "x".repeat(1000);
    let parsed = ResponseParser::new().parse(&RawResponse::new("batch-0001", 429, body), None);

    assert_eq!(parsed.http_status, 429);
    assert_eq!(parsed.service_error.as_deref().map(str::len), Some(200));
}

#[test]
fn test_responseParser_unrepairableTruncation_shouldRecordOpenDelimiters() {
    let parsed = ResponseParser::new().parse(&RawResponse::new("batch-0001", 200, "{\"1\": \"abgeschn"), None);

    assert_eq!(parsed.outcome, ParseOutcome::Failed);
    assert!(matches!(parsed.truncation, TruncationStatus::Unrepairable { open_delimiters } if open_delimiters >= 1));
}

#[test]
fn test_responseParser_entriesOutsideBatch_shouldStillBeReturned() {
    let batch = common::batch(1, &["1"]);
    let parsed = ResponseParser::new().parse(
        &RawResponse::new("batch-0001", 200, r#"{"1": "eins zwei", "99": "neunundneunzig"}"#),
        Some(&batch),
    );

    assert!(parsed.translations.contains_key("99"));
    assert!(!parsed.translations["99"].suspicious);
}
