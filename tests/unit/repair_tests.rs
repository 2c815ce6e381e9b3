/*!
 * Tests for the truncation repairer
 */

use batchlate::translation::{RepairOutcome, TruncationRepairer};

fn repaired_text(body: &str) -> String {
    match TruncationRepairer::repair(body) {
        RepairOutcome::Repaired(r) => r.text,
        other => panic!("expected a repair, got {:?}", other),
    }
}

#[test]
fn test_truncationRepairer_scenarioB_shouldAppendSingleCloser() {
    let body = r#"{"1":"a","2":"b""#;
    match TruncationRepairer::repair(body) {
        RepairOutcome::Repaired(r) => {
            assert_eq!(r.text, r#"{"1":"a","2":"b"}"#);
            assert_eq!(r.dropped_tail, "");
            assert_eq!(r.closers_added, 1);
        }
        other => panic!("expected a repair, got {:?}", other),
    }
}

#[test]
fn test_truncationRepairer_repair_shouldOnlyAppendClosers() {
    let bodies = [
        r#"{"1": "a", "2": "b", "3": "partial"#,
        r#"{"1": "a", "2": {"x": "nested""#,
        r#"{"1": "a", "2": ["x", "y""#,
        r#"{"1": "a, with {braces}", "2": "b", "3""#,
        r#"{"1": 5, "2": true, "3": "c"#,
    ];

    for body in bodies {
        match TruncationRepairer::repair(body) {
            RepairOutcome::Repaired(r) => {
                assert!(body.starts_with(r.kept_prefix()), "not a prefix for {}", body);
                let appended = &r.text[r.kept_prefix().len()..];
                assert!(appended.chars().all(|c| c == '}' || c == ']'), "invented content for {}", body);
                assert!(serde_json::from_str::<serde_json::Value>(&r.text).is_ok(), "invalid JSON for {}", body);
            }
            other => panic!("expected a repair for {}, got {:?}", body, other),
        }
    }
}

#[test]
fn test_truncationRepairer_nestedTruncation_shouldCloseInnerFirst() {
    assert_eq!(
        repaired_text(r#"{"1": "a", "2": {"x": "nested""#),
        r#"{"1": "a", "2": {"x": "nested"}}"#
    );
    // Array items are not entries, so a cut-off array is dropped whole
    assert_eq!(repaired_text(r#"{"1": "a", "2": ["x", "y""#), r#"{"1": "a"}"#);
}

#[test]
fn test_truncationRepairer_closedBody_shouldBeNotTruncated() {
    assert_eq!(TruncationRepairer::repair(r#"{"1": "a"}"#), RepairOutcome::NotTruncated);
    assert_eq!(TruncationRepairer::repair("plain text"), RepairOutcome::NotTruncated);
}

#[test]
fn test_truncationRepairer_noCompleteEntry_shouldBeUnrepairable() {
    assert!(matches!(
        TruncationRepairer::repair(r#"{"1": "never finish"#),
        RepairOutcome::Unrepairable { .. }
    ));
    assert!(matches!(TruncationRepairer::repair("{"), RepairOutcome::Unrepairable { open_delimiters: 1 }));
}

#[test]
fn test_truncationRepairer_looksTruncated_shouldCheckEnds() {
    assert!(TruncationRepairer::looks_truncated(r#"{"1": "a""#));
    assert!(TruncationRepairer::looks_truncated("```json\n{\"1\": \"a\""));
    assert!(!TruncationRepairer::looks_truncated(r#"{"1": "a"}"#));
    assert!(!TruncationRepairer::looks_truncated("no structure"));
}

#[test]
fn test_truncationRepairer_openDelimiters_shouldIgnoreStringContents() {
    assert_eq!(TruncationRepairer::open_delimiters(r#"{"1": "{[{["#), 1);
    assert_eq!(TruncationRepairer::open_delimiters(r#"{"1": ["a", {"b": "c""#), 3);
    assert_eq!(TruncationRepairer::open_delimiters(r#"{"1": "a"}"#), 0);
}
