use crate::error::GenerationError;
use std::collections::HashMap;
use std::str::FromStr;

pub const PARAMETERS_ERROR: &str = "failed to process request parameters";

/// Longest accepted theme or word list, brackets included.
pub const MAX_LIST_CHARS: usize = 1000;

/// Read-only view over a request's query parameters.
#[derive(Clone, Copy)]
pub struct Params<'a> {
    raw: &'a HashMap<String, String>,
}

impl<'a> Params<'a> {
    pub fn new(raw: &'a HashMap<String, String>) -> Self {
        Self { raw }
    }

    /// Trimmed value, empty when absent.
    pub fn text(&self, key: &str) -> String {
        self.raw
            .get(key)
            .map(|value| value.trim().to_string())
            .unwrap_or_default()
    }

    /// Parsed value or `default` when absent or blank.
    pub fn number<T: FromStr>(&self, key: &str, default: T) -> Result<T, GenerationError> {
        let value = self.text(key);
        if value.is_empty() {
            return Ok(default);
        }
        value
            .parse()
            .map_err(|_| GenerationError::Validation(format!("{key} must be a valid number")))
    }

    pub fn song_id(&self) -> Result<i64, GenerationError> {
        self.text("song_id")
            .parse()
            .map_err(|_| GenerationError::Validation(PARAMETERS_ERROR.into()))
    }

    /// `prompt` parameter, falling back to `default` when it is not given.
    pub fn prompt_name(&self, default: Option<&str>) -> Result<String, GenerationError> {
        let name = self.text("prompt");
        let name = match (name.is_empty(), default) {
            (false, _) => name,
            (true, Some(default)) => default.to_string(),
            (true, None) => {
                return Err(GenerationError::Validation("prompt name is required".into()));
            }
        };
        if !is_valid_prompt_name(&name) {
            return Err(GenerationError::Validation(
                "prompt name can only contain letters, numbers, hyphens, and underscores".into(),
            ));
        }
        Ok(name)
    }

    /// `[raw]` list for prompt templates, bounded in length.
    pub fn bracketed_list(&self, key: &str) -> Result<String, GenerationError> {
        let list = format!("[{}]", self.text(key));
        if list.chars().count() > MAX_LIST_CHARS {
            return Err(GenerationError::Validation(format!(
                "{key} parameter is too long (max {MAX_LIST_CHARS} characters)"
            )));
        }
        Ok(list)
    }
}

pub fn is_valid_prompt_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}
