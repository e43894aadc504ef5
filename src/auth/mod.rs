use crate::config::{Config, UserConfig};
use crate::llm::types::{ModelConfig, ProviderKind};
use std::collections::BTreeMap;
use std::fmt;

/// The identified user a request acts on behalf of.
#[derive(Clone, Default)]
pub struct Actor {
    pub id: String,
    /// Provider name → stored API key
    pub api_keys: BTreeMap<String, String>,
    pub model: Option<ModelConfig>,
    pub summarization_model: Option<ModelConfig>,
    /// Per-user output ceiling; clamped by the model's own maximum
    pub max_tokens: Option<u32>,
    pub include_themes: String,
    pub exclude_themes: String,
}

impl fmt::Debug for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Actor")
            .field("id", &self.id)
            .field("api_keys", &self.api_keys.keys().collect::<Vec<_>>())
            .field("model", &self.model.as_ref().map(|m| &m.name))
            .field(
                "summarization_model",
                &self.summarization_model.as_ref().map(|m| &m.name),
            )
            .field("max_tokens", &self.max_tokens)
            .finish_non_exhaustive()
    }
}

impl Actor {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    pub fn with_model(mut self, model: ModelConfig) -> Self {
        self.model = Some(model);
        self
    }

    pub fn api_key(&self, provider: ProviderKind) -> Option<&str> {
        self.api_keys
            .get(provider.as_str())
            .map(String::as_str)
            .filter(|key| !key.trim().is_empty())
    }

    /// Output ceiling for `model`: the user's setting, never above the model's.
    pub fn effective_max_tokens(&self, model: &ModelConfig) -> u32 {
        self.max_tokens
            .map_or(model.max_tokens, |limit| limit.min(model.max_tokens))
    }

    /// Model used for summaries; the generation model when none is assigned.
    pub fn summarizer_model(&self) -> Option<&ModelConfig> {
        self.summarization_model.as_ref().or(self.model.as_ref())
    }
}

/// Bearer-token lookup over the `[[users]]` configured for the gateway.
pub struct ActorDirectory {
    entries: Vec<(String, Actor)>,
}

impl ActorDirectory {
    pub fn from_config(config: &Config) -> Self {
        let entries = config
            .users
            .iter()
            .map(|user| (user.token.clone(), actor_from_user(config, user)))
            .collect();
        Self { entries }
    }

    pub fn from_actors(entries: impl IntoIterator<Item = (String, Actor)>) -> Self {
        Self {
            entries: entries.into_iter().collect(),
        }
    }

    /// Compare against every token so timing does not reveal a partial match.
    pub fn authenticate(&self, token: &str) -> Option<Actor> {
        let mut found = None;
        for (candidate, actor) in &self.entries {
            if constant_time_eq(candidate, token) && found.is_none() {
                found = Some(actor.clone());
            }
        }
        found
    }

    pub fn find_by_id(&self, id: &str) -> Option<Actor> {
        self.entries
            .iter()
            .find(|(_, actor)| actor.id == id)
            .map(|(_, actor)| actor.clone())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn actor_from_user(config: &Config, user: &UserConfig) -> Actor {
    let resolve = |name: &Option<String>, field: &str| {
        let name = name.as_deref()?;
        let model = config.find_model(name).cloned();
        if model.is_none() {
            tracing::warn!(user = %user.id, field, model = name, "user references unknown model");
        }
        model
    };

    Actor {
        id: user.id.clone(),
        api_keys: user.api_keys.clone(),
        model: resolve(&user.model, "model"),
        summarization_model: resolve(&user.summarization_model, "summarization_model"),
        max_tokens: user.max_tokens,
        include_themes: user.include_themes.clone(),
        exclude_themes: user.exclude_themes.clone(),
    }
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    use subtle::ConstantTimeEq;
    a.as_bytes().ct_eq(b.as_bytes()).into()
}
