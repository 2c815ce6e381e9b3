/*!
 * End-to-end controller tests against the mock batch service
 */

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;

use batchlate::app_config::Config;
use batchlate::app_controller::Controller;
use batchlate::file_utils::{FileManager, MISSING_TRANSLATION_MARKER};
use batchlate::ledger::BatchStatus;
use batchlate::providers::mock::{MockBatchService, MockPoll};
use batchlate::translation::ErrorCategory;

use crate::common;

fn controller(config: Config, service: MockBatchService) -> Result<Controller> {
    common::init_test_logging();
    Controller::with_service(config, Arc::new(service))
}

/// Data rows of an output CSV as `(id, source, translation)`
fn read_output(path: &Path) -> Result<Vec<(String, String, String)>> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push((record[0].to_string(), record[1].to_string(), record[2].to_string()));
    }
    Ok(rows)
}

#[tokio::test]
async fn test_controller_translateFile_shouldReconstructEveryRowInOrder() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let input = common::create_source_csv(dir.path(), "codes.csv", &common::sample_rows())?;
    let output = dir.path().join("codes.de.csv");
    let service = MockBatchService::completing().with_responder(MockBatchService::prefixing_responder);
    let controller = controller(common::test_config(dir.path()), service)?;

    let outcome = controller.translate_file(&input, &output).await?;

    let rows = read_output(&output)?;
    assert_eq!(rows.len(), 5);
    for ((id, source, translation), (expected_id, expected_source)) in rows.iter().zip(common::sample_rows()) {
        assert_eq!(id, expected_id);
        assert_eq!(source, expected_source);
        assert_eq!(translation, &format!("German:{}", expected_source));
    }

    assert_eq!(outcome.report.total_batches, 3);
    assert_eq!(outcome.report.success_rate_percentage, 100.0);
    assert!(FileManager::sibling_path(&output, ".requests.jsonl").exists());
    assert!(FileManager::sibling_path(&output, ".responses.jsonl").exists());

    let report: serde_json::Value = serde_json::from_str(&FileManager::read_to_string(&outcome.report_path)?)?;
    assert_eq!(report["total_batches"], 3);

    let rows = controller.ledger().find_by_job(outcome.job_id.as_deref().unwrap())?;
    assert_eq!(rows.len(), 3);
    assert!(rows.iter().all(|r| r.status == BatchStatus::Completed && r.target_language == "de"));
    Ok(())
}

#[tokio::test]
async fn test_controller_translateFile_tokenBudget_shouldSplitBeforeRecordLimit() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let input = common::create_source_csv(dir.path(), "codes.csv", &common::sample_rows())?;
    let output = dir.path().join("codes.de.csv");
    let mut config = common::test_config(dir.path());
    config.batching.max_batch_size = 100;
    // Smaller than any single prompt line, so every record gets its own request
    config.batching.max_request_tokens = 1;
    let service = MockBatchService::completing().with_responder(MockBatchService::prefixing_responder);
    let controller = controller(config, service)?;

    let outcome = controller.translate_file(&input, &output).await?;

    assert_eq!(outcome.report.total_batches, 5);
    assert_eq!(outcome.report.success_rate_percentage, 100.0);
    assert_eq!(read_output(&output)?.len(), 5);
    Ok(())
}

#[tokio::test]
async fn test_controller_translateFile_shouldUploadOneRequestPerBatch() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let input = common::create_source_csv(dir.path(), "codes.csv", &common::sample_rows())?;
    let output = dir.path().join("codes.de.csv");
    let service = Arc::new(MockBatchService::completing().with_responder(MockBatchService::prefixing_responder));
    let controller = Controller::with_service(common::test_config(dir.path()), service.clone())?;

    controller.translate_file(&input, &output).await?;

    let uploads = service.uploads();
    assert_eq!(uploads.len(), 1);
    let lines: Vec<&str> = uploads[0].lines().filter(|l| !l.trim().is_empty()).collect();
    assert_eq!(lines.len(), 3);
    let first: serde_json::Value = serde_json::from_str(lines[0])?;
    assert_eq!(first["custom_id"], "batch-0001");
    let prompt = first["body"]["messages"][1]["content"].as_str().unwrap_or_default();
    assert!(prompt.contains("[ID:P0087]"));
    assert!(prompt.contains("[ID:P0301]"));
    assert!(!prompt.contains("[ID:P0217]"));
    Ok(())
}

#[tokio::test]
async fn test_controller_duplicateIds_shouldBeReportedAndLeftOut() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let input = common::create_source_csv(
        dir.path(),
        "codes.csv",
        &[
            ("P0087", "Fuel rail pressure too low"),
            ("P0301", "Cylinder 1 misfire detected"),
            ("P0087", "Fuel rail pressure too high"),
        ],
    )?;
    let output = dir.path().join("codes.de.csv");
    let service = MockBatchService::completing().with_responder(MockBatchService::prefixing_responder);
    let controller = controller(common::test_config(dir.path()), service)?;

    let outcome = controller.translate_file(&input, &output).await?;

    let rows = read_output(&output)?;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].0, "P0301");
    assert_eq!(outcome.report.rejected_records.len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_controller_failedJob_shouldStillWriteEveryOutput() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let input = common::create_source_csv(dir.path(), "codes.csv", &common::sample_rows()[..3])?;
    let output = dir.path().join("codes.de.csv");
    let service = MockBatchService::with_polls(vec![MockPoll::status("in_progress"), MockPoll::status("failed")]);
    let controller = controller(common::test_config(dir.path()), service)?;

    let outcome = controller.translate_file(&input, &output).await?;

    let rows = read_output(&output)?;
    assert_eq!(rows.len(), 3);
    assert!(rows.iter().all(|(_, _, t)| t == MISSING_TRANSLATION_MARKER));
    assert_eq!(outcome.report.success_rate_percentage, 0.0);
    assert_eq!(outcome.report.count(ErrorCategory::MissingTranslation), 3);
    assert!(outcome.log_path.exists());

    let rows = controller.ledger().find_by_job(outcome.job_id.as_deref().unwrap())?;
    assert!(rows.iter().all(|r| r.status == BatchStatus::Failed));
    Ok(())
}

#[tokio::test]
async fn test_controller_emptyInput_shouldSubmitNothing() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let input = common::create_source_csv(dir.path(), "empty.csv", &[])?;
    let output = dir.path().join("empty.de.csv");
    let service = Arc::new(MockBatchService::completing());
    let controller = Controller::with_service(common::test_config(dir.path()), service.clone())?;

    let outcome = controller.translate_file(&input, &output).await?;

    assert!(outcome.job_id.is_none());
    assert!(service.uploads().is_empty());
    assert_eq!(outcome.report.total_batches, 0);
    assert_eq!(outcome.report.success_rate_percentage, 100.0);
    assert!(read_output(&output)?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_controller_missingInput_shouldFail() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let controller = controller(common::test_config(dir.path()), MockBatchService::completing())?;

    let result = controller
        .translate_file(&dir.path().join("nope.csv"), &dir.path().join("nope.de.csv"))
        .await;

    assert!(result.is_err());
    Ok(())
}

#[tokio::test]
async fn test_controller_processOutput_shouldRebuildFromSavedResponses() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let input = common::create_source_csv(dir.path(), "codes.csv", &common::sample_rows())?;
    let responses = [
        MockBatchService::response_line(
            "batch-0002",
            200,
            "```json\n{\"P0217\": \"Motorkühlmittel Übertemperatur\", \"P0420\": \"Katalysator Wirkungsgrad zu niedrig\"}\n```",
        ),
        MockBatchService::response_line(
            "batch-0001",
            200,
            "{\"P0087\": \"Kraftstoffdruck zu niedrig\", \"P0301\": \"Zylinder 1 Fehlzünd",
        ),
    ]
    .join("\n");
    let responses_path = common::create_test_file(dir.path(), "codes.responses.jsonl", &responses)?;
    let output = dir.path().join("codes.de.csv");
    let controller = Controller::offline(common::test_config(dir.path()))?;

    let outcome = controller.process_output(&input, &responses_path, &output).await?;

    let rows = read_output(&output)?;
    let translations: Vec<&str> = rows.iter().map(|(_, _, t)| t.as_str()).collect();
    assert_eq!(
        translations,
        vec![
            "Kraftstoffdruck zu niedrig",
            MISSING_TRANSLATION_MARKER,
            "Motorkühlmittel Übertemperatur",
            "Katalysator Wirkungsgrad zu niedrig",
            MISSING_TRANSLATION_MARKER,
        ]
    );
    assert!(outcome.job_id.is_none());
    assert_eq!(outcome.report.count(ErrorCategory::MissingTranslation), 2);
    assert_eq!(outcome.report.count(ErrorCategory::ParseFailure), 1);
    Ok(())
}

#[tokio::test]
async fn test_controller_offline_shouldRefuseToTranslate() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let input = common::create_source_csv(dir.path(), "codes.csv", &common::sample_rows())?;
    let controller = Controller::offline(common::test_config(dir.path()))?;

    let result = controller.translate_file(&input, &dir.path().join("codes.de.csv")).await;

    assert!(result.is_err());
    Ok(())
}

#[tokio::test]
async fn test_controller_translateFolder_shouldSkipExistingUnlessForced() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let input_dir = dir.path().join("in");
    let output_dir = dir.path().join("out");
    std::fs::create_dir_all(&input_dir)?;
    common::create_source_csv(&input_dir, "engine.csv", &common::sample_rows()[..2])?;
    common::create_source_csv(&input_dir, "brakes.csv", &[("C0035", "Left front wheel speed sensor circuit")])?;
    // Translated files next to their sources are not picked up as inputs
    common::create_source_csv(&input_dir, "old.de.csv", &[("X1", "Ignored")])?;
    std::fs::create_dir_all(&output_dir)?;
    common::create_test_file(&output_dir, "brakes.de.csv", "existing")?;

    let mut config = common::test_config(dir.path());
    // The mock answers from its latest upload, so jobs must not overlap
    config.max_concurrent_files = 1;
    let service = MockBatchService::completing().with_responder(MockBatchService::prefixing_responder);
    let controller = controller(config, service)?;

    let summary = controller.translate_folder(&input_dir, &output_dir, false).await?;

    assert_eq!(summary.processed, 1);
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.failed, 0);
    assert_eq!(FileManager::read_to_string(output_dir.join("brakes.de.csv"))?, "existing");
    assert!(output_dir.join("engine.de.csv").exists());
    assert!(output_dir.join("batchlate.folder.log").exists());

    let summary = controller.translate_folder(&input_dir, &output_dir, true).await?;

    assert_eq!(summary.processed, 2);
    assert_eq!(summary.skipped, 0);
    let rows = read_output(&output_dir.join("brakes.de.csv"))?;
    assert_eq!(rows[0].2, "German:Left front wheel speed sensor circuit");
    Ok(())
}

#[tokio::test]
async fn test_controller_translateFolder_missingDirectory_shouldFail() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let controller = controller(common::test_config(dir.path()), MockBatchService::completing())?;

    let result = controller
        .translate_folder(&dir.path().join("missing"), &dir.path().join("out"), false)
        .await;

    assert!(result.is_err());
    Ok(())
}
