/*!
 * Batch output decoding.
 *
 * The service's output file holds one JSON line per request:
 * `{custom_id, response: {status_code, body: {choices: [{message: {content}}]}}, error}`.
 * Each line becomes a `RawResponse`. Lines that cannot be decoded are logged
 * and skipped, never fatal.
 */

use std::collections::HashSet;

use serde::Deserialize;
use serde_json::Value;

use crate::logging::JobLog;

use super::records::RawResponse;

#[derive(Debug, Deserialize)]
struct ResponseLine {
    custom_id: String,
    #[serde(default)]
    response: Option<ResponseEnvelope>,
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ResponseEnvelope {
    #[serde(default)]
    status_code: Option<u16>,
    #[serde(default)]
    body: Option<Value>,
}

/// One decoded output line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedLine {
    pub response: RawResponse,

    /// Error text the service attached to the line
    pub service_error: Option<String>,
}

fn error_text(error: &Value) -> Option<String> {
    match error {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Object(map) => Some(
            map.get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| error.to_string()),
        ),
        other => Some(other.to_string()),
    }
}

/// Decode one output line
pub fn decode_line(line: &str) -> Result<DecodedLine, serde_json::Error> {
    let decoded: ResponseLine = serde_json::from_str(line)?;

    let (http_status, body) = match &decoded.response {
        Some(envelope) => {
            let content = envelope
                .body
                .as_ref()
                .and_then(|b| b.pointer("/choices/0/message/content"))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            (envelope.status_code.unwrap_or(0), content)
        }
        None => (0, String::new()),
    };

    Ok(DecodedLine {
        response: RawResponse::new(decoded.custom_id, http_status, body),
        service_error: decoded.error.as_ref().and_then(error_text),
    })
}

/// Decode a whole output file, keeping the first line seen for each batch id
pub fn read_responses(content: &str, log: &JobLog) -> Vec<RawResponse> {
    let mut seen = HashSet::new();
    let mut responses = Vec::new();

    for (idx, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }

        let decoded = match decode_line(line) {
            Ok(decoded) => decoded,
            Err(e) => {
                log.warn(format!("Skipping undecodable response line {}: {}", idx + 1, e));
                continue;
            }
        };

        if let Some(error) = &decoded.service_error {
            log.error(format!(
                "Service reported an error for {}: {}",
                decoded.response.batch_id, error
            ));
        }

        if !seen.insert(decoded.response.batch_id.clone()) {
            log.warn(format!(
                "Ignoring repeated response for {} on line {}",
                decoded.response.batch_id,
                idx + 1
            ));
            continue;
        }

        responses.push(decoded.response);
    }

    responses
}
