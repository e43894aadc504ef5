use super::types::CompletionRequest;
use anyhow::Result;
use futures_util::Stream;
use std::future::Future;
use std::pin::Pin;

/// Raw text fragments as the provider emits them.
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String>> + Send + 'static>>;

/// Wire-level access to a chat completion provider.
///
/// Implementations speak one protocol; credential resolution, sampling
/// policy, and failure shaping live in [`super::StreamingCompletionClient`].
pub trait CompletionBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Start a streamed completion. Errors before the first byte surface here,
    /// errors mid-stream surface as `Err` items.
    fn stream_chat(
        &self,
        request: CompletionRequest,
    ) -> Pin<Box<dyn Future<Output = Result<TextStream>> + Send + '_>>;

    /// Single-shot completion returning the full text.
    fn complete(
        &self,
        request: CompletionRequest,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + '_>>;
}
