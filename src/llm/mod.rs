pub mod client;
pub mod compatible;
pub mod http_client;
pub mod scrub;
pub mod sse;
#[cfg(test)]
pub(crate) mod testing;
pub mod traits;
pub mod types;

pub use client::{CompletionStream, ProviderEndpoints, StreamingCompletionClient, ollama_base_url};
pub use compatible::HttpCompletionBackend;
pub use traits::{CompletionBackend, TextStream};
pub use types::{
    ChatMessage, CompletionEvent, CompletionRequest, MessageRole, ModelConfig, ProviderKind,
    SamplingParams,
};
