use crate::types::{CompletionRequest, CompletionResponse, Usage};
use crate::{Error, LlmClient};
use std::collections::VecDeque;
use std::sync::Mutex;

/// A scripted vendor for tests: responses are served in the order queued,
/// and every request is recorded for assertions. An exhausted script fails
/// the call, which surfaces tests that make more vendor calls than expected.
#[derive(Default)]
pub struct ScriptedClient {
    responses: Mutex<VecDeque<Result<CompletionResponse, Error>>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_json(&self, content: serde_json::Value, tokens: (u64, u64)) {
        self.push_ok(content.to_string(), tokens);
    }

    pub fn push_ok(&self, content: impl Into<String>, tokens: (u64, u64)) {
        self.responses
            .lock()
            .unwrap()
            .push_back(Ok(CompletionResponse {
                content: content.into(),
                model: "scripted".to_string(),
                usage: Usage {
                    input_tokens: tokens.0,
                    output_tokens: tokens.1,
                },
            }));
    }

    pub fn push_err(&self, error: Error) {
        self.responses.lock().unwrap().push_back(Err(error));
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl LlmClient for ScriptedClient {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, Error> {
        self.requests.lock().unwrap().push(request);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| {
                Err(Error::Unknown(
                    "scripted client exhausted: unexpected vendor call".to_string(),
                ))
            })
    }
}
