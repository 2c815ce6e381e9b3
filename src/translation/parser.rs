/*!
 * Response parsing with an ordered fallback chain.
 *
 * Each strategy turns a raw response body into `(id, text)` entries in body
 * order. The chain is tried strictly in order and the first strategy that yields
 * at least one entry wins. Every strategy is a plain function so it can be
 * exercised on its own.
 */

use std::collections::BTreeMap;
use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::{Deserializer, MapAccess, Visitor};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::heuristics::is_suspicious;
use super::records::{Batch, ParsedTranslation, RawResponse};
use super::repair::{RepairOutcome, TruncationRepairer};

/// `(id, text)` pairs in the order they appear in the body
pub type Entries = Vec<(String, String)>;

/// Signature shared by every parse strategy
pub type StrategyFn = fn(&str) -> Option<Entries>;

/// Individual parse strategies, in fallback order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseStrategy {
    Strict,
    FenceStripped,
    Repaired,
    LinePattern,
}

impl ParseStrategy {
    /// Outcome tag reported when this strategy wins
    pub fn outcome(self) -> ParseOutcome {
        match self {
            Self::Strict | Self::FenceStripped => ParseOutcome::Clean,
            Self::Repaired => ParseOutcome::Repaired,
            Self::LinePattern => ParseOutcome::Partial,
        }
    }
}

/// Overall result of parsing one response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseOutcome {
    Clean,
    Repaired,
    Partial,
    Failed,
}

impl fmt::Display for ParseOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            Self::Clean => "clean",
            Self::Repaired => "repaired",
            Self::Partial => "partial",
            Self::Failed => "failed",
        };
        f.write_str(tag)
    }
}

/// What the repairer concluded, when the chain got as far as asking it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TruncationStatus {
    NotChecked,
    NotTruncated,
    Repaired { dropped_tail: String, closers_added: usize },
    Unrepairable { open_delimiters: usize },
}

impl From<RepairOutcome> for TruncationStatus {
    fn from(outcome: RepairOutcome) -> Self {
        match outcome {
            RepairOutcome::NotTruncated => Self::NotTruncated,
            RepairOutcome::Repaired(body) => Self::Repaired {
                dropped_tail: body.dropped_tail,
                closers_added: body.closers_added,
            },
            RepairOutcome::Unrepairable { open_delimiters } => Self::Unrepairable { open_delimiters },
        }
    }
}

/// One response after the fallback chain has run
#[derive(Debug, Clone)]
pub struct ParsedBatch {
    pub batch_id: String,
    pub http_status: u16,
    pub outcome: ParseOutcome,

    /// Winning strategy; `None` when every strategy failed
    pub strategy: Option<ParseStrategy>,

    /// Translations keyed by normalized id
    pub translations: BTreeMap<String, ParsedTranslation>,

    /// Ids that occurred more than once in the body; the first occurrence was kept
    pub duplicate_ids: Vec<String>,

    pub truncation: TruncationStatus,

    /// Body excerpt of a response rejected for its status
    pub service_error: Option<String>,
}

impl ParsedBatch {
    fn empty(response: &RawResponse) -> Self {
        Self {
            batch_id: response.batch_id.clone(),
            http_status: response.http_status,
            outcome: ParseOutcome::Failed,
            strategy: None,
            translations: BTreeMap::new(),
            duplicate_ids: Vec::new(),
            truncation: TruncationStatus::NotChecked,
            service_error: None,
        }
    }

    /// Whether the response was refused because of its status code
    pub fn is_service_error(&self) -> bool {
        self.service_error.is_some()
    }
}

/// The fallback chain, in the order strategies are tried
pub const FALLBACK_CHAIN: &[(ParseStrategy, StrategyFn)] = &[
    (ParseStrategy::Strict, parse_strict),
    (ParseStrategy::FenceStripped, parse_fence_stripped),
    (ParseStrategy::Repaired, parse_repaired),
    (ParseStrategy::LinePattern, parse_line_patterns),
];

const SERVICE_ERROR_EXCERPT_CHARS: usize = 200;

static ID_KEY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\[ID:\s*(.+?)\s*\]$").expect("Invalid id key regex")
});

static ENTRY_FRAGMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#""((?:[^"\\]|\\.)+)"\s*:\s*"((?:[^"\\]|\\.)*)""#).expect("Invalid entry fragment regex")
});

static ECHO_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(?:\d+[.)]\s*)?\[ID:\s*([^\]]+?)\s*\]\s*(.+?)\s*$").expect("Invalid echo line regex")
});

/// Strip an `[ID:x]` wrapper from a key
pub fn normalize_id(key: &str) -> String {
    let key = key.trim();
    match ID_KEY.captures(key) {
        Some(caps) => caps[1].to_string(),
        None => key.to_string(),
    }
}

/// Top-level JSON object with its members in body order, repeats included
struct OrderedObject(Vec<(String, Value)>);

impl<'de> Deserialize<'de> for OrderedObject {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct ObjectVisitor;

        impl<'de> Visitor<'de> for ObjectVisitor {
            type Value = OrderedObject;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a JSON object")
            }

            fn visit_map<A>(self, mut map: A) -> Result<OrderedObject, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut members = Vec::new();
                while let Some((key, value)) = map.next_entry::<String, Value>()? {
                    members.push((key, value));
                }
                Ok(OrderedObject(members))
            }
        }

        deserializer.deserialize_map(ObjectVisitor)
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn non_empty(entries: Entries) -> Option<Entries> {
    (!entries.is_empty()).then_some(entries)
}

/// Strategy 1: the whole body is a JSON object
pub fn parse_strict(body: &str) -> Option<Entries> {
    let OrderedObject(members) = serde_json::from_str(body.trim()).ok()?;
    let entries = members
        .into_iter()
        .filter_map(|(key, value)| scalar_text(&value).map(|text| (normalize_id(&key), text)))
        .filter(|(id, _)| !id.is_empty())
        .collect();
    non_empty(entries)
}

/// Remove a code fence and any prose around the outermost object
pub fn strip_fences(body: &str) -> String {
    let mut text = body.trim();

    if let Some(start) = text.find("```") {
        let mut inner = &text[start + 3..];
        if let Some(newline) = inner.find('\n') {
            let tag = inner[..newline].trim();
            if tag.chars().all(|c| c.is_ascii_alphanumeric()) {
                inner = &inner[newline + 1..];
            }
        }
        text = match inner.find("```") {
            Some(end) => &inner[..end],
            None => inner,
        };
    }

    let text = text.trim();
    let Some(open) = text.find('{') else {
        return text.to_string();
    };
    let candidate = &text[open..];

    // Trailing prose is cut only when it carries no further entries
    match candidate.rfind('}') {
        Some(close) if !candidate[close + 1..].contains('"') => candidate[..=close].to_string(),
        _ => candidate.to_string(),
    }
}

/// Entries or a closing brace before the object, or entries after the closing fence
fn has_stray_entries(body: &str) -> bool {
    let Some(open) = body.find('{') else {
        return false;
    };
    let leading = &body[..open];

    let after_fence = body
        .find("```")
        .and_then(|start| {
            let rest = &body[start + 3..];
            rest.find("```").map(|end| &rest[end + 3..])
        })
        .unwrap_or("");

    leading.contains('}') || ENTRY_FRAGMENT.is_match(leading) || ENTRY_FRAGMENT.is_match(after_fence)
}

/// Strategy 2: strict parse after removing fences and prose
pub fn parse_fence_stripped(body: &str) -> Option<Entries> {
    if has_stray_entries(body) {
        return None;
    }
    parse_strict(&strip_fences(body))
}

/// Strategy 3: strict parse of the repaired fence-stripped body
pub fn parse_repaired(body: &str) -> Option<Entries> {
    if has_stray_entries(body) {
        return None;
    }
    match TruncationRepairer::repair(&strip_fences(body)) {
        RepairOutcome::Repaired(repaired) => parse_strict(&repaired.text),
        _ => None,
    }
}

fn unescape(raw: &str) -> String {
    serde_json::from_str::<String>(&format!("\"{}\"", raw)).unwrap_or_else(|_| raw.to_string())
}

/// Strategy 4: collect `"id": "text"` fragments and echoed `[ID:x]` lines
pub fn parse_line_patterns(body: &str) -> Option<Entries> {
    let mut entries = Vec::new();

    for line in body.lines() {
        let before = entries.len();
        for caps in ENTRY_FRAGMENT.captures_iter(line) {
            let id = normalize_id(&unescape(&caps[1]));
            let text = unescape(&caps[2]).trim().to_string();
            if !id.is_empty() && !text.is_empty() {
                entries.push((id, text));
            }
        }

        if entries.len() == before {
            if let Some(caps) = ECHO_LINE.captures(line) {
                entries.push((caps[1].to_string(), caps[2].to_string()));
            }
        }
    }

    non_empty(entries)
}

/// Runs the fallback chain over raw responses
#[derive(Debug, Clone, Copy, Default)]
pub struct ResponseParser;

impl ResponseParser {
    pub fn new() -> Self {
        Self
    }

    /// Parse one response; `batch` supplies source texts for the suspicion check
    pub fn parse(&self, response: &RawResponse, batch: Option<&Batch>) -> ParsedBatch {
        let mut parsed = ParsedBatch::empty(response);

        if !response.is_success() {
            let excerpt: String = response.body.trim().chars().take(SERVICE_ERROR_EXCERPT_CHARS).collect();
            parsed.service_error = Some(excerpt);
            return parsed;
        }

        for (strategy, run) in FALLBACK_CHAIN {
            if *strategy == ParseStrategy::Repaired {
                parsed.truncation = TruncationRepairer::repair(&strip_fences(&response.body)).into();
            }

            if let Some(entries) = run(&response.body) {
                parsed.strategy = Some(*strategy);
                parsed.outcome = strategy.outcome();
                self.collect(&mut parsed, entries, batch);
                break;
            }
        }

        parsed
    }

    fn collect(&self, parsed: &mut ParsedBatch, entries: Entries, batch: Option<&Batch>) {
        for (id, text) in entries {
            if parsed.translations.contains_key(&id) {
                if !parsed.duplicate_ids.contains(&id) {
                    parsed.duplicate_ids.push(id);
                }
                continue;
            }

            let source = batch.and_then(|b| b.source_text(&id)).unwrap_or("");
            let suspicious = is_suspicious(source, &text);
            parsed.translations.insert(
                id.clone(),
                ParsedTranslation {
                    id,
                    text,
                    suspicious,
                },
            );
        }
    }
}
