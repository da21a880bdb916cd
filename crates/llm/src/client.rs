use crate::types::{CompletionRequest, CompletionResponse, Usage};
use crate::Error;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

/// The vendor call every extractor and classifier goes through.
#[async_trait::async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, Error>;
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub api_key: String,
    pub base_url: String,
    pub timeout: Duration,
}

impl ClientConfig {
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: base_url.into(),
            timeout: Duration::from_secs(120),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Chat-completions client over HTTP. Vision requests carry the image as an
/// inline data URL part.
pub struct HttpLlmClient {
    config: ClientConfig,
    http: reqwest::Client,
}

impl HttpLlmClient {
    pub fn new(config: ClientConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;
        Ok(Self { config, http })
    }

    fn build_body(request: &CompletionRequest) -> serde_json::Value {
        let mut messages = Vec::new();
        if let Some(system) = &request.system {
            messages.push(json!({"role": "system", "content": system}));
        }

        let user_content = match &request.image {
            None => json!(request.user_text),
            Some(image) => json!([
                {"type": "text", "text": request.user_text},
                {
                    "type": "image_url",
                    "image_url": {
                        "url": format!(
                            "data:{};base64,{}",
                            image.media_type, image.base64_data
                        )
                    }
                },
            ]),
        };
        messages.push(json!({"role": "user", "content": user_content}));

        let mut body = json!({
            "model": request.model,
            "messages": messages,
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
        });
        if request.json_output {
            body["response_format"] = json!({"type": "json_object"});
        }
        body
    }
}

#[derive(Deserialize)]
struct WireResponse {
    choices: Vec<WireChoice>,
    #[serde(default)]
    model: String,
    usage: WireUsage,
}

#[derive(Deserialize)]
struct WireChoice {
    message: WireMessage,
}

#[derive(Deserialize)]
struct WireMessage {
    #[serde(default)]
    content: String,
}

#[derive(Deserialize)]
struct WireUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

#[async_trait::async_trait]
impl LlmClient for HttpLlmClient {
    #[tracing::instrument(skip_all, fields(model = %request.model, vision = request.image.is_some()))]
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, Error> {
        let url = format!(
            "{}/v1/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );
        let body = Self::build_body(&request);

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(classify_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(classify_status(status, detail));
        }

        let wire: WireResponse = response
            .json()
            .await
            .map_err(|err| Error::Unknown(format!("decoding vendor response: {err}")))?;

        let content = wire
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| Error::Unknown("vendor response carried no choices".to_string()))?;

        Ok(CompletionResponse {
            content,
            model: wire.model,
            usage: Usage {
                input_tokens: wire.usage.prompt_tokens,
                output_tokens: wire.usage.completion_tokens,
            },
        })
    }
}

fn classify_reqwest(err: reqwest::Error) -> Error {
    if err.is_timeout() {
        Error::Timeout
    } else if err.is_connect() {
        Error::Connection(err.to_string())
    } else {
        Error::Unknown(err.to_string())
    }
}

fn classify_status(status: reqwest::StatusCode, detail: String) -> Error {
    match status.as_u16() {
        429 => Error::RateLimit,
        400 | 404 | 413 | 422 => Error::BadRequest(format!("{status}: {detail}")),
        408 | 504 => Error::Timeout,
        _ => Error::Unknown(format!("{status}: {detail}")),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn vision_request_carries_data_url() {
        let request = CompletionRequest::new("vision-model", "Lies das Dokument.").with_image(
            crate::ImagePayload {
                media_type: "image/png".to_string(),
                base64_data: "QUJD".to_string(),
            },
        );
        let body = HttpLlmClient::build_body(&request);
        let content = &body["messages"][0]["content"];
        assert_eq!(content[0]["type"], "text");
        assert_eq!(
            content[1]["image_url"]["url"],
            "data:image/png;base64,QUJD"
        );
    }

    #[test]
    fn status_classification() {
        assert!(matches!(
            classify_status(reqwest::StatusCode::TOO_MANY_REQUESTS, String::new()),
            Error::RateLimit
        ));
        assert!(matches!(
            classify_status(reqwest::StatusCode::BAD_REQUEST, String::new()),
            Error::BadRequest(_)
        ));
        assert!(matches!(
            classify_status(reqwest::StatusCode::INTERNAL_SERVER_ERROR, String::new()),
            Error::Unknown(_)
        ));
        assert!(classify_status(reqwest::StatusCode::TOO_MANY_REQUESTS, String::new()).is_transient());
        assert!(!classify_status(reqwest::StatusCode::BAD_REQUEST, String::new()).is_transient());
    }
}
