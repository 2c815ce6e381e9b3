/*!
 * Reconstruction scenarios and ordering properties across the whole chain
 */

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use batchlate::app_controller::Controller;
use batchlate::ledger::BatchStatus;
use batchlate::providers::mock::{MockBatchService, MockPoll};
use batchlate::translation::{
    Batch, ErrorCategory, IdReconciler, ParseOutcome, ParsedBatch, RawResponse, Reconciliation, RequestBatcher,
    ResponseParser, SourceRecord,
};

use crate::common;

fn reconcile(batches: &[Batch], responses: &[RawResponse]) -> (Vec<ParsedBatch>, Reconciliation) {
    let parser = ResponseParser::new();
    let parsed: Vec<ParsedBatch> = responses
        .iter()
        .map(|r| parser.parse(r, batches.iter().find(|b| b.batch_id == r.batch_id)))
        .collect();
    let reconciliation = IdReconciler::reconcile(batches, &parsed);
    (parsed, reconciliation)
}

fn translations(reconciliation: &Reconciliation) -> BTreeMap<String, String> {
    reconciliation
        .table
        .iter()
        .map(|(id, t)| (id.clone(), t.text.clone()))
        .collect()
}

fn records(count: usize) -> Vec<SourceRecord> {
    (1..=count)
        .map(|n| SourceRecord::new(format!("DTC{:03}", n), format!("Diagnostic message number {}", n)))
        .collect()
}

#[test]
fn test_reconstruction_scenarioA_missingIdShouldBeReported() {
    let plan = RequestBatcher::new(10).prepare(vec![
        SourceRecord::new("1", "Fuel pressure low"),
        SourceRecord::new("2", "Misfire detected"),
        SourceRecord::new("3", "Coolant temperature high"),
    ]);

    let (_, result) = reconcile(
        &plan.batches,
        &[RawResponse::new(
            "batch-0001",
            200,
            r#"{"1": "Kraftstoffdruck niedrig", "3": "Kühlmitteltemperatur hoch"}"#,
        )],
    );

    assert_eq!(result.table.keys().collect::<Vec<_>>(), vec!["1", "3"]);
    assert_eq!(result.missing.iter().map(|m| m.id.as_str()).collect::<Vec<_>>(), vec!["2"]);
}

#[test]
fn test_reconstruction_scenarioB_truncatedBodyShouldBeRepaired() {
    let batch = common::batch(1, &["1", "2"]);

    let (parsed, result) = reconcile(
        std::slice::from_ref(&batch),
        &[RawResponse::new("batch-0001", 200, r#"{"1":"a","2":"b""#)],
    );

    assert_eq!(parsed[0].outcome, ParseOutcome::Repaired);
    assert_eq!(parsed[0].translations.len(), 2);
    assert_eq!(result.translation("1"), Some("a"));
    assert_eq!(result.translation("2"), Some("b"));
    assert!(result.missing.is_empty());
}

#[test]
fn test_reconstruction_scenarioC_placeholderShouldBeSuspiciousButKept() {
    let batch = common::batch(1, &["3", "4"]);

    let (_, result) = reconcile(
        std::slice::from_ref(&batch),
        &[RawResponse::new("batch-0001", 200, r#"{"3": "Quelle drei", "4": "null"}"#)],
    );

    assert_eq!(result.suspicious, vec!["4".to_string()]);
    assert_eq!(result.translation("4"), Some("null"));
}

#[tokio::test]
async fn test_reconstruction_scenarioD_regressingStatusShouldBeReported() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let input = common::create_source_csv(dir.path(), "codes.csv", &common::sample_rows()[..3])?;
    let output = dir.path().join("codes.de.csv");
    let service = MockBatchService::with_polls(vec![
        MockPoll::status("finalizing"),
        MockPoll::status("in_progress"),
        MockPoll::status("completed"),
    ])
    .with_responder(MockBatchService::prefixing_responder);
    let controller = Controller::with_service(common::test_config(dir.path()), Arc::new(service))?;

    let outcome = controller.translate_file(&input, &output).await?;

    // Two batches, each refusing the step back to in_progress
    assert_eq!(outcome.report.count(ErrorCategory::LedgerTransitionRejected), 2);
    assert_eq!(outcome.report.success_rate_percentage, 100.0);
    let rows = controller.ledger().find_by_job(outcome.job_id.as_deref().unwrap())?;
    assert!(rows.iter().all(|r| r.status == BatchStatus::Completed));
    Ok(())
}

#[tokio::test]
async fn test_reconstruction_pollTimeoutAfterRegression_shouldStillReportRejections() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let input = common::create_source_csv(dir.path(), "codes.csv", &common::sample_rows()[..3])?;
    let output = dir.path().join("codes.de.csv");
    let mut config = common::test_config(dir.path());
    config.polling.max_polls = 3;
    let service = MockBatchService::with_polls(vec![
        MockPoll::status("finalizing"),
        MockPoll::status("in_progress"),
    ])
    .with_responder(MockBatchService::prefixing_responder);
    let controller = Controller::with_service(config, Arc::new(service))?;

    let outcome = controller.translate_file(&input, &output).await?;

    // Two batches, each refusing in_progress on polls 2 and 3
    assert_eq!(outcome.report.count(ErrorCategory::LedgerTransitionRejected), 4);
    assert_eq!(outcome.report.success_rate_percentage, 0.0);
    let rows = controller.ledger().find_by_job(outcome.job_id.as_deref().unwrap())?;
    assert!(rows.iter().all(|r| r.status == BatchStatus::Finalizing));
    Ok(())
}

#[test]
fn test_reconstruction_shuffledEchoLines_shouldYieldIdenticalTable() {
    let plan = RequestBatcher::new(50).prepare(records(12));
    let batch = &plan.batches[0];
    let lines: Vec<String> = batch
        .records
        .iter()
        .enumerate()
        .map(|(i, r)| format!("{}. [ID:{}] Übersetzung {}", i + 1, r.id, r.text))
        .collect();
    let (_, baseline) = reconcile(&plan.batches, &[RawResponse::new("batch-0001", 200, lines.join("\n"))]);
    assert_eq!(baseline.table.len(), 12);

    for seed in 0..25 {
        let mut shuffled = lines.clone();
        shuffled.shuffle(&mut StdRng::seed_from_u64(seed));

        let (_, result) = reconcile(&plan.batches, &[RawResponse::new("batch-0001", 200, shuffled.join("\n"))]);

        assert_eq!(translations(&result), translations(&baseline), "seed {}", seed);
    }
}

#[test]
fn test_reconstruction_shuffledJsonEntries_shouldYieldIdenticalTable() {
    let plan = RequestBatcher::new(50).prepare(records(10));
    let entries: Vec<String> = plan.batches[0]
        .records
        .iter()
        .map(|r| format!("\"{}\": \"Übersetzung von {}\"", r.id, r.text))
        .collect();
    let (_, baseline) = reconcile(
        &plan.batches,
        &[RawResponse::new("batch-0001", 200, format!("{{{}}}", entries.join(",\n")))],
    );
    assert_eq!(baseline.table.len(), 10);

    for seed in 0..25 {
        let mut shuffled = entries.clone();
        shuffled.shuffle(&mut StdRng::seed_from_u64(seed));
        let body = format!("```json\n{{{}}}\n```", shuffled.join(",\n"));

        let (_, result) = reconcile(&plan.batches, &[RawResponse::new("batch-0001", 200, body)]);

        assert_eq!(translations(&result), translations(&baseline), "seed {}", seed);
        assert!(result.missing.is_empty());
    }
}

#[test]
fn test_reconstruction_shuffledPrettyPrintedLines_shouldYieldIdenticalTable() {
    let plan = RequestBatcher::new(50).prepare(records(6));
    let records = &plan.batches[0].records;
    let mut lines = vec!["{".to_string()];
    for (i, r) in records.iter().enumerate() {
        let comma = if i + 1 < records.len() { "," } else { "" };
        lines.push(format!("  \"{}\": \"Übersetzung von {}\"{}", r.id, r.text, comma));
    }
    lines.push("}".to_string());
    let (parsed, baseline) = reconcile(&plan.batches, &[RawResponse::new("batch-0001", 200, lines.join("\n"))]);
    assert_eq!(parsed[0].outcome, ParseOutcome::Clean);
    assert_eq!(baseline.table.len(), 6);

    // Braces move too, so entries can land outside the object
    for seed in 0..40 {
        let mut shuffled = lines.clone();
        shuffled.shuffle(&mut StdRng::seed_from_u64(seed));

        let (_, result) = reconcile(&plan.batches, &[RawResponse::new("batch-0001", 200, shuffled.join("\n"))]);

        assert_eq!(translations(&result), translations(&baseline), "seed {}", seed);
        assert!(result.missing.is_empty(), "seed {}", seed);
    }
}

#[test]
fn test_reconstruction_shuffledResponseOrder_shouldYieldIdenticalTable() {
    let plan = RequestBatcher::new(3).prepare(records(9));
    let responses: Vec<RawResponse> = plan
        .batches
        .iter()
        .map(|b| {
            let entries: Vec<String> = b.records.iter().map(|r| format!("\"{}\": \"DE {}\"", r.id, r.text)).collect();
            RawResponse::new(b.batch_id.clone(), 200, format!("{{{}}}", entries.join(", ")))
        })
        .collect();
    let (_, baseline) = reconcile(&plan.batches, &responses);

    for seed in 0..10 {
        let mut shuffled = responses.clone();
        shuffled.shuffle(&mut StdRng::seed_from_u64(seed));

        let (_, result) = reconcile(&plan.batches, &shuffled);

        assert_eq!(translations(&result), translations(&baseline));
    }
}

#[test]
fn test_reconstruction_truncatedLastBatch_shouldOnlyLoseTail() {
    let plan = RequestBatcher::new(4).prepare(records(8));
    let responses = [
        RawResponse::new(
            "batch-0001",
            200,
            r#"{"DTC001": "eins", "DTC002": "zwei", "DTC003": "drei", "DTC004": "vier"}"#,
        ),
        RawResponse::new("batch-0002", 200, "```json\n{\"DTC005\": \"fünf\", \"DTC006\": \"sechs\", \"DTC007\": \"sie"),
    ];

    let (parsed, result) = reconcile(&plan.batches, &responses);

    assert_eq!(parsed[1].outcome, ParseOutcome::Repaired);
    assert_eq!(result.table.len(), 6);
    let missing: Vec<&str> = result.missing.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(missing, vec!["DTC007", "DTC008"]);
    assert!(result.orphans.is_empty());
}
