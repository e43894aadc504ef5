use serde_json::Value;
use std::borrow::Cow;

/// Accumulates normalized text and yields complete `\n`-terminated lines.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buffer: String,
}

impl LineBuffer {
    #[must_use]
    pub fn new() -> Self {
        Self {
            buffer: String::new(),
        }
    }

    pub fn push(&mut self, fragment: &str) {
        self.buffer.push_str(fragment);
    }

    /// Next complete line without its terminator.
    pub fn next_line(&mut self) -> Option<String> {
        let boundary = self.buffer.find('\n')?;
        let remaining = self.buffer.split_off(boundary + 1);
        let mut line = std::mem::replace(&mut self.buffer, remaining);
        line.truncate(boundary);
        Some(line)
    }

    /// Unterminated tail left when the stream ends; `None` if blank.
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buffer);
        (!rest.trim().is_empty()).then_some(rest)
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

/// What one trimmed model output line turned out to be.
#[derive(Debug, Clone, PartialEq)]
pub enum LineKind {
    /// Blank or a markdown code fence.
    Skip,
    Record(Value),
    Malformed(String),
}

pub fn classify_line(line: &str) -> LineKind {
    let line = line.trim();
    if line.is_empty() || is_fence(line) {
        return LineKind::Skip;
    }
    match serde_json::from_str::<Value>(line) {
        Ok(value) => LineKind::Record(value),
        Err(err) => LineKind::Malformed(err.to_string()),
    }
}

/// A run of backticks, optionally tagged `json`, `ndjson` or `jsonl`.
pub fn is_fence(line: &str) -> bool {
    let tag = line.trim_start_matches('`');
    if tag.len() == line.len() {
        return false;
    }
    matches!(
        tag.trim().to_ascii_lowercase().as_str(),
        "" | "json" | "ndjson" | "jsonl"
    )
}

/// Collapse a trailing run of more than three backticks to exactly three.
pub fn trim_trailing_backticks(text: &str) -> Cow<'_, str> {
    let body = text.trim_end_matches('`');
    if text.len() - body.len() <= 3 {
        return Cow::Borrowed(text);
    }
    Cow::Owned(format!("{body}```"))
}
