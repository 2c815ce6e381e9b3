/*!
 * Tests for configuration loading and validation
 */

use anyhow::Result;

use batchlate::app_config::{Config, LogLevel};

use crate::common;

#[test]
fn test_config_loadOrCreate_missingFile_shouldWriteDefaults() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let path = dir.path().join("conf.json");

    let config = Config::load_or_create(&path)?;

    assert!(path.exists());
    assert_eq!(config, Config::default());
    let reloaded = Config::load_or_create(&path)?;
    assert_eq!(reloaded, config);
    Ok(())
}

#[test]
fn test_config_loadOrCreate_invalidJson_shouldFail() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let path = common::create_test_file(dir.path(), "conf.json", "{ not json")?;

    let result = Config::load_or_create(&path);

    assert!(result.is_err());
    Ok(())
}

#[test]
fn test_config_saveAndLoad_shouldPreserveChanges() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let path = dir.path().join("conf.json");
    let mut config = common::test_config(dir.path());
    config.service.model = "gpt-4o-mini".to_string();
    config.log_level = LogLevel::Debug;

    config.save(&path)?;
    let loaded = Config::load_or_create(&path)?;

    assert_eq!(loaded, config);
    assert!(std::fs::read_to_string(&path)?.contains("\"log_level\": \"debug\""));
    Ok(())
}

#[test]
fn test_config_validate_shouldRejectZeroLimits() {
    let mut config = Config::default();
    config.batching.max_batch_size = 0;
    assert!(config.validate().is_err());

    let mut config = Config::default();
    config.polling.max_polls = 0;
    assert!(config.validate().is_err());

    let mut config = Config::default();
    config.polling.backoff_multiplier = 0.5;
    assert!(config.validate().is_err());

    let mut config = Config::default();
    config.max_concurrent_files = 0;
    assert!(config.validate().is_err());
}

#[test]
fn test_config_tokenBudget_shouldDefaultAndValidate() {
    let config = Config::default();
    assert_eq!(config.batching.max_request_tokens, 16_000);
    assert_eq!(config.batching.expected_output_factor, 1.2);

    let mut config = Config::default();
    config.batching.expected_output_factor = -0.5;
    assert!(config.validate().is_err());

    let mut config = Config::default();
    config.batching.max_request_tokens = 0;
    assert!(config.validate().is_ok());
}

#[test]
fn test_config_validate_shouldRejectBlankTargetAndBadTemperature() {
    let mut config = Config::default();
    config.target_language = "   ".to_string();
    assert!(config.validate().is_err());

    let mut config = Config::default();
    config.service.temperature = 3.5;
    assert!(config.validate().is_err());
}

#[test]
fn test_config_testConfig_shouldBeValid() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let config = common::test_config(dir.path());
    assert!(config.validate().is_ok());
    assert!(config.system_prompt().contains("German"));
    Ok(())
}

#[test]
fn test_logLevel_toLevelFilter_shouldMapEachLevel() {
    assert_eq!(LogLevel::Error.to_level_filter(), log::LevelFilter::Error);
    assert_eq!(LogLevel::Trace.to_level_filter(), log::LevelFilter::Trace);
    assert_eq!(LogLevel::default(), LogLevel::Info);
}
