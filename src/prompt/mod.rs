mod builtin;
pub mod cache;
pub mod library;

pub use builtin::builtin_prompt;
pub use cache::{PromptCache, PromptTable};
pub use library::YamlPromptLibrary;

use crate::error::PromptError;
use std::collections::HashMap;
use tera::{Context, Tera};

/// Named prompt templates, optionally specialised per model.
pub trait PromptSource: Send + Sync {
    /// Raw template text for `name`, preferring the model-specific variant.
    fn lookup(&self, name: &str, model: Option<&str>) -> Result<Option<String>, PromptError>;

    /// Render the user prompt `name` with `context`.
    fn render_prompt(
        &self,
        name: &str,
        model: Option<&str>,
        context: &Context,
    ) -> Result<String, PromptError> {
        let template = self
            .lookup(name, model)?
            .ok_or_else(|| PromptError::NotFound { name: name.into() })?;
        render_template(name, &template, context)
    }

    /// `{name}.system_prompt` if defined, else the shared `system_prompt`.
    fn render_system_prompt(&self, name: &str, model: Option<&str>) -> Result<String, PromptError> {
        let specific = format!("{name}.system_prompt");
        if let Some(text) = self.lookup(&specific, model)? {
            return Ok(text);
        }
        tracing::debug!(prompt = name, "no dedicated system prompt; using default");
        self.lookup("system_prompt", model)?
            .ok_or(PromptError::NotFound { name: specific })
    }
}

/// Render a one-off template. Undefined variables are errors.
pub fn render_template(name: &str, template: &str, context: &Context) -> Result<String, PromptError> {
    Tera::one_off(template, context, false).map_err(|e| PromptError::Render {
        name: name.into(),
        message: render_error_chain(&e),
    })
}

fn render_error_chain(error: &tera::Error) -> String {
    let mut message = error.to_string();
    let mut source = std::error::Error::source(error);
    while let Some(inner) = source {
        message.push_str(": ");
        message.push_str(&inner.to_string());
        source = inner.source();
    }
    message
}

/// In-memory prompt source. Lookups ignore the model.
#[derive(Debug, Clone, Default)]
pub struct StaticPrompts {
    prompts: HashMap<String, String>,
    with_builtins: bool,
}

impl StaticPrompts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fall back to the built-in templates for unknown names.
    pub fn with_builtins(mut self) -> Self {
        self.with_builtins = true;
        self
    }

    pub fn with(mut self, name: impl Into<String>, template: impl Into<String>) -> Self {
        self.prompts.insert(name.into(), template.into());
        self
    }
}

impl PromptSource for StaticPrompts {
    fn lookup(&self, name: &str, _model: Option<&str>) -> Result<Option<String>, PromptError> {
        let found = self.prompts.get(name).cloned().or_else(|| {
            self.with_builtins
                .then(|| builtin_prompt(name).map(str::to_string))
                .flatten()
        });
        Ok(found)
    }
}
