//! Turns free-form model output into newline-delimited JSON records.
//!
//! Fragments are normalized to ASCII, buffered until a newline, and each
//! complete line is parsed on its own so one malformed line never poisons
//! the rest of the stream.

pub mod line;

pub use line::{LineBuffer, LineKind, classify_line, is_fence, trim_trailing_backticks};

use crate::utils::text::normalize_to_ascii;
use serde_json::{Value, json};
use std::future::Future;
use std::pin::Pin;

pub const MALFORMED_LINE_ERROR: &str = "Malformed JSON line from LLM";
pub const TRANSFORM_ERROR: &str = "Record transform failed";

/// Per-record hook run before a parsed record is emitted.
pub trait RecordTransform: Send + Sync {
    fn transform<'a>(
        &'a self,
        record: Value,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Value>> + Send + 'a>>;
}

/// Incremental NDJSON processor for one generation.
pub struct NdjsonProcessor<'t> {
    lines: LineBuffer,
    text: String,
    transform: Option<&'t dyn RecordTransform>,
    records: usize,
    errors: usize,
}

impl<'t> NdjsonProcessor<'t> {
    pub fn new(transform: Option<&'t dyn RecordTransform>) -> Self {
        Self {
            lines: LineBuffer::new(),
            text: String::new(),
            transform,
            records: 0,
            errors: 0,
        }
    }

    /// Normalize and buffer one fragment, returning every output line it
    /// completed. Each output ends with `\n`.
    pub async fn feed(&mut self, fragment: &str) -> Vec<String> {
        let normalized = normalize_to_ascii(fragment);
        self.text.push_str(&normalized);
        self.lines.push(&normalized);

        let mut out = Vec::new();
        while let Some(line) = self.lines.next_line() {
            if let Some(emitted) = self.process_line(&line).await {
                out.push(emitted);
            }
        }
        out
    }

    /// Flush the unterminated remainder as one final line.
    pub async fn finish(&mut self) -> Vec<String> {
        match self.lines.finish() {
            Some(line) => self.process_line(&line).await.into_iter().collect(),
            None => Vec::new(),
        }
    }

    async fn process_line(&mut self, line: &str) -> Option<String> {
        let raw = line.trim();
        match classify_line(raw) {
            LineKind::Skip => None,
            LineKind::Malformed(details) => {
                tracing::warn!(details = %details, "malformed NDJSON line from model");
                self.errors += 1;
                Some(error_record(MALFORMED_LINE_ERROR, raw, &details))
            }
            LineKind::Record(record) => {
                let record = match self.transform {
                    Some(transform) => match transform.transform(record).await {
                        Ok(record) => record,
                        Err(err) => {
                            tracing::warn!(error = %err, "record transform failed");
                            self.errors += 1;
                            return Some(error_record(TRANSFORM_ERROR, raw, &format!("{err:#}")));
                        }
                    },
                    None => record,
                };
                self.records += 1;
                Some(format!("{record}\n"))
            }
        }
    }

    /// Everything fed so far, after normalization.
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn into_text(self) -> String {
        self.text
    }

    pub fn records(&self) -> usize {
        self.records
    }

    pub fn errors(&self) -> usize {
        self.errors
    }
}

fn error_record(error: &str, raw: &str, details: &str) -> String {
    format!(
        "{}\n",
        json!({
            "error": error,
            "raw_content": raw,
            "details": details,
        })
    )
}
