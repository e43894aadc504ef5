#![allow(dead_code)]

use futures_util::StreamExt;
use songsmith::llm::{CompletionBackend, CompletionRequest, TextStream};
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;

/// Backend that answers every call from memory and keeps the requests.
pub struct CannedBackend {
    stream: Vec<String>,
    summary: String,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl CannedBackend {
    pub fn new(stream: &[&str], summary: &str) -> Self {
        Self {
            stream: stream.iter().map(|s| (*s).to_string()).collect(),
            summary: summary.to_string(),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl CompletionBackend for CannedBackend {
    fn name(&self) -> &str {
        "canned"
    }

    fn stream_chat(
        &self,
        request: CompletionRequest,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<TextStream>> + Send + '_>> {
        self.requests.lock().unwrap().push(request);
        let fragments = self.stream.clone();
        Box::pin(async move { Ok(futures_util::stream::iter(fragments.into_iter().map(Ok)).boxed()) })
    }

    fn complete(
        &self,
        request: CompletionRequest,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<String>> + Send + '_>> {
        self.requests.lock().unwrap().push(request);
        let summary = self.summary.clone();
        Box::pin(async move { Ok(summary) })
    }
}
