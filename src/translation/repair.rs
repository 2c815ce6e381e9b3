/*!
 * Structural repair of truncated responses.
 *
 * Responses cut off by an output-length limit usually open a JSON object and
 * never close it. The repairer scans the body (string-aware, so delimiters
 * inside translated text are ignored), keeps everything up to the end of the
 * last complete `"id": value` entry and appends the missing closing delimiters.
 *
 * The repaired text is always a prefix of the input followed by closers only,
 * so no translation content is ever invented.
 */

use serde::Serialize;

/// Result of a repair attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepairOutcome {
    /// Every opened delimiter is closed; the body was left alone
    NotTruncated,

    /// The body was cut back to its last complete entry and closed
    Repaired(RepairedBody),

    /// Delimiters are open but no complete entry exists to anchor a repair
    Unrepairable { open_delimiters: usize },
}

/// A successfully repaired body
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepairedBody {
    /// Syntactically closed text
    pub text: String,

    /// Partial trailing fragment that was removed, trimmed
    pub dropped_tail: String,

    /// Number of closing delimiters appended
    pub closers_added: usize,
}

impl RepairedBody {
    /// The part of the repaired text taken verbatim from the input
    pub fn kept_prefix(&self) -> &str {
        &self.text[..self.text.len() - self.closers_added]
    }
}

/// Delimiter state of a scanned body
struct Scan {
    /// Expected closers for every delimiter still open at the end
    open: Vec<char>,

    /// Byte offset just past the last complete entry, with the closers open at that point
    last_entry: Option<(usize, Vec<char>)>,
}

fn scan(body: &str) -> Scan {
    let mut open: Vec<char> = Vec::new();
    let mut last_entry = None;

    let mut in_string = false;
    let mut escaped = false;
    let mut string_is_value = false;
    let mut after_colon = false;
    let mut literal_end: Option<usize> = None;

    for (idx, ch) in body.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
                if string_is_value && !open.is_empty() {
                    last_entry = Some((idx + 1, open.clone()));
                    after_colon = false;
                }
            }
            continue;
        }

        match ch {
            '"' => {
                in_string = true;
                string_is_value = after_colon;
            }
            '{' => {
                open.push('}');
                after_colon = false;
                literal_end = None;
            }
            '[' => {
                open.push(']');
                after_colon = false;
                literal_end = None;
            }
            '}' | ']' => {
                if let Some(end) = literal_end.take() {
                    last_entry = Some((end, open.clone()));
                }
                if open.last() == Some(&ch) {
                    open.pop();
                    // A nested container closing is a complete value
                    if !open.is_empty() {
                        last_entry = Some((idx + 1, open.clone()));
                    }
                }
                after_colon = false;
            }
            ':' => {
                after_colon = true;
                literal_end = None;
            }
            ',' => {
                if let Some(end) = literal_end.take() {
                    last_entry = Some((end, open.clone()));
                }
                after_colon = false;
            }
            c if c.is_whitespace() => {}
            c => {
                if after_colon && !open.is_empty() {
                    literal_end = Some(idx + c.len_utf8());
                }
            }
        }
    }

    Scan { open, last_entry }
}

/// Truncation detector and repairer
pub struct TruncationRepairer;

impl TruncationRepairer {
    /// Cheap pre-check: opens with a fence or delimiter but does not end with a closer
    pub fn looks_truncated(body: &str) -> bool {
        let trimmed = body.trim();
        let opens = trimmed.starts_with('{') || trimmed.starts_with('[') || trimmed.starts_with("```");
        let closes = trimmed.ends_with('}') || trimmed.ends_with(']') || (trimmed.len() > 3 && trimmed.ends_with("```"));
        opens && !closes
    }

    /// Count delimiters still open at the end of `body`
    pub fn open_delimiters(body: &str) -> usize {
        scan(body).open.len()
    }

    /// Repair `body` if it is structurally truncated
    pub fn repair(body: &str) -> RepairOutcome {
        let scan = scan(body);
        if scan.open.is_empty() {
            return RepairOutcome::NotTruncated;
        }

        match scan.last_entry {
            None => RepairOutcome::Unrepairable {
                open_delimiters: scan.open.len(),
            },
            Some((end, closers)) => {
                let mut text = body[..end].to_string();
                text.extend(closers.iter().rev());
                RepairOutcome::Repaired(RepairedBody {
                    text,
                    dropped_tail: body[end..].trim().to_string(),
                    closers_added: closers.len(),
                })
            }
        }
    }
}
