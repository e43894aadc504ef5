use super::traits::{CompletionBackend, TextStream};
use super::types::CompletionRequest;
use anyhow::Result;
use futures_util::StreamExt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;

/// Backend that replays a fixed script and records every request.
pub(crate) struct ScriptedBackend {
    pub fragments: Vec<Result<String, String>>,
    pub fail_on_start: Option<String>,
    /// The first `failing_calls` streams fail before producing text.
    pub failing_calls: usize,
    pub completion: Result<String, String>,
    /// Keep the stream open after the last fragment instead of ending it.
    pub hold_open: bool,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedBackend {
    pub fn new(fragments: Vec<Result<String, String>>) -> Self {
        Self {
            fragments,
            fail_on_start: None,
            failing_calls: 0,
            completion: Ok("summary".to_string()),
            hold_open: false,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn text(fragments: &[&str]) -> Self {
        Self::new(fragments.iter().map(|f| Ok((*f).to_string())).collect())
    }

    pub fn with_completion(mut self, completion: Result<String, String>) -> Self {
        self.completion = completion;
        self
    }

    pub fn last_request(&self) -> Option<CompletionRequest> {
        self.requests.lock().unwrap().last().cloned()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

impl CompletionBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    fn stream_chat(
        &self,
        request: CompletionRequest,
    ) -> Pin<Box<dyn Future<Output = Result<TextStream>> + Send + '_>> {
        let call = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(request);
            requests.len()
        };
        let fragments = self.fragments.clone();
        let fail = if call <= self.failing_calls {
            Some(format!("scripted failure on call {call}"))
        } else {
            self.fail_on_start.clone()
        };
        let hold_open = self.hold_open;
        Box::pin(async move {
            if let Some(message) = fail {
                anyhow::bail!(message);
            }
            let scripted = futures_util::stream::iter(
                fragments
                    .into_iter()
                    .map(|item| item.map_err(anyhow::Error::msg)),
            );
            if hold_open {
                Ok(scripted.chain(futures_util::stream::pending()).boxed())
            } else {
                Ok(scripted.boxed())
            }
        })
    }

    fn complete(
        &self,
        request: CompletionRequest,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + '_>> {
        self.requests.lock().unwrap().push(request);
        let completion = self.completion.clone();
        Box::pin(async move { completion.map_err(anyhow::Error::msg) })
    }
}
