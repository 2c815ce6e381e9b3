/*!
 * Low-confidence translation classifier.
 *
 * Pure pattern checks over a source text and its translation. A suspicious
 * translation is kept in the final table but reported for review.
 */

/// Placeholder tokens the service emits instead of a real translation
const PLACEHOLDER_TOKENS: &[&str] = &[
    "[translation_failed]",
    "plaintext",
    "text",
    "code",
    "output",
    "none",
    "null",
    "undefined",
    "error",
    "failed",
    "missing",
    "empty",
    "json",
    "translation",
    "response",
    "content",
    "message",
    "system",
    "user",
];

/// Leading fragments that indicate markup or structure leaked into the text
const STRUCTURAL_PREFIXES: &[&str] = &["```", "<", "{", "["];

/// Translations shorter than this many characters are suspicious; short words such as "Aus" still pass
const MIN_TRANSLATION_CHARS: usize = 3;

fn is_numeric(text: &str) -> bool {
    !text.is_empty() && text.chars().all(|c| c.is_ascii_digit())
}

/// Whether `translated` looks like a failed or placeholder translation of `source`
pub fn is_suspicious(source: &str, translated: &str) -> bool {
    let source = source.trim();
    let text = translated.trim();

    if text.is_empty() {
        return true;
    }

    let lower = text.to_lowercase();
    if PLACEHOLDER_TOKENS.contains(&lower.as_str()) {
        return true;
    }

    if STRUCTURAL_PREFIXES.iter().any(|p| text.starts_with(p)) {
        return true;
    }

    // Numbers are only legitimate when the source itself is a number
    if is_numeric(text) {
        return !is_numeric(source);
    }

    text.chars().count() < MIN_TRANSLATION_CHARS
        && source.chars().count() >= MIN_TRANSLATION_CHARS
}
