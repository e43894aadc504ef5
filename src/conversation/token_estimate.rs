use std::sync::OnceLock;
use tiktoken_rs::CoreBPE;

/// Token counting seam. Implementations never fail.
pub trait TokenCounter: Send + Sync {
    fn estimate(&self, text: &str, model_hint: &str) -> usize;
}

/// Character heuristic: `chars / 4`, rounded down.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicCounter;

impl TokenCounter for HeuristicCounter {
    fn estimate(&self, text: &str, _model_hint: &str) -> usize {
        heuristic_tokens(text)
    }
}

/// BPE counter backed by `tiktoken-rs`, falling back to the heuristic when
/// an encoding cannot be loaded.
#[derive(Debug, Clone, Copy, Default)]
pub struct TiktokenCounter;

impl TokenCounter for TiktokenCounter {
    fn estimate(&self, text: &str, model_hint: &str) -> usize {
        if text.is_empty() {
            return 0;
        }
        match encoding_for(model_hint) {
            Some(bpe) => bpe.encode_with_special_tokens(text).len(),
            None => heuristic_tokens(text),
        }
    }
}

pub fn heuristic_tokens(text: &str) -> usize {
    text.chars().count() / 4
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Encoding {
    Cl100k,
    O200k,
}

fn encoding_name_for(model_hint: &str) -> Encoding {
    let model = model_hint.to_ascii_lowercase();
    let model = model.rsplit('/').next().unwrap_or(&model);
    if model.starts_with("gpt-4o")
        || model.starts_with("gpt-4.1")
        || model.starts_with("gpt-5")
        || ["o1", "o3", "o4"]
            .iter()
            .any(|prefix| model == *prefix || model.starts_with(&format!("{prefix}-")))
    {
        Encoding::O200k
    } else {
        Encoding::Cl100k
    }
}

fn encoding_for(model_hint: &str) -> Option<&'static CoreBPE> {
    static CL100K: OnceLock<Option<CoreBPE>> = OnceLock::new();
    static O200K: OnceLock<Option<CoreBPE>> = OnceLock::new();

    let (cell, loader): (_, fn() -> anyhow::Result<CoreBPE>) = match encoding_name_for(model_hint) {
        Encoding::Cl100k => (&CL100K, tiktoken_rs::cl100k_base),
        Encoding::O200k => (&O200K, tiktoken_rs::o200k_base),
    };

    cell.get_or_init(|| match loader() {
        Ok(bpe) => Some(bpe),
        Err(error) => {
            tracing::warn!(error = %error, "token encoding unavailable; using character heuristic");
            None
        }
    })
    .as_ref()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heuristic_floors_character_count() {
        assert_eq!(heuristic_tokens(""), 0);
        assert_eq!(heuristic_tokens("abc"), 0);
        assert_eq!(heuristic_tokens("abcd"), 1);
        assert_eq!(heuristic_tokens("abcdefghi"), 2);
        assert_eq!(HeuristicCounter.estimate(&"x".repeat(4096), "any"), 1024);
    }

    #[test]
    fn model_names_pick_an_encoding() {
        assert_eq!(encoding_name_for("gpt-4o-mini"), Encoding::O200k);
        assert_eq!(encoding_name_for("openai/o3-mini"), Encoding::O200k);
        assert_eq!(encoding_name_for("o1"), Encoding::O200k);
        assert_eq!(encoding_name_for("gpt-4-turbo"), Encoding::Cl100k);
        assert_eq!(encoding_name_for("claude-3-5-sonnet"), Encoding::Cl100k);
        assert_eq!(encoding_name_for("llama3"), Encoding::Cl100k);
        assert_eq!(encoding_name_for("omni"), Encoding::Cl100k);
    }

    #[test]
    fn tiktoken_counts_are_plausible() {
        let counter = TiktokenCounter;
        assert_eq!(counter.estimate("", "gpt-4o"), 0);
        let tokens = counter.estimate("hello world, this is a song about the sea", "gpt-4o");
        assert!((5..=20).contains(&tokens), "got {tokens}");
    }
}
