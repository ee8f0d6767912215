use giftpipe_core::{Completion, CompletionRequest, Error, LanguageModel, Result};
use serde::{Deserialize, Serialize};

fn env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn openai_compat_base_url_from_env() -> Option<String> {
    env("GIFTPIPE_OPENAI_COMPAT_BASE_URL")
}

fn openai_compat_api_key_from_env() -> Option<String> {
    env("GIFTPIPE_OPENAI_COMPAT_API_KEY").or_else(|| env("OPENAI_API_KEY"))
}

fn openai_compat_model_from_env() -> Option<String> {
    env("GIFTPIPE_OPENAI_COMPAT_MODEL")
}

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Error bodies that mean "prompt too long" across OpenAI-compatible servers.
fn is_context_length_error(body: &str) -> bool {
    let b = body.to_ascii_lowercase();
    b.contains("context_length_exceeded")
        || b.contains("maximum context length")
        || b.contains("context window")
}

#[derive(Debug, Clone)]
pub struct OpenAiCompatClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

impl OpenAiCompatClient {
    /// Requires an API key; the base URL and model have defaults.
    pub fn from_env(client: reqwest::Client, model_override: Option<String>) -> Result<Self> {
        let api_key = openai_compat_api_key_from_env().ok_or_else(|| {
            Error::NotConfigured(
                "missing GIFTPIPE_OPENAI_COMPAT_API_KEY (or OPENAI_API_KEY)".to_string(),
            )
        })?;
        let base_url =
            openai_compat_base_url_from_env().unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let model = model_override
            .or_else(openai_compat_model_from_env)
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());
        Ok(Self::new(client, base_url, Some(api_key), model))
    }

    pub fn new(
        client: reqwest::Client,
        base_url: String,
        api_key: Option<String>,
        model: String,
    ) -> Self {
        Self {
            client,
            base_url,
            api_key,
            model,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint_chat_completions(&self) -> String {
        format!(
            "{}/v1/chat/completions",
            self.base_url.trim_end_matches('/')
        )
    }
}

#[async_trait::async_trait]
impl LanguageModel for OpenAiCompatClient {
    fn name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, req: &CompletionRequest) -> Result<Completion> {
        let body = ChatCompletionsRequest {
            model: self.model.clone(),
            messages: vec![
                Message {
                    role: "system".to_string(),
                    content: req.system.clone(),
                },
                Message {
                    role: "user".to_string(),
                    content: req.user.clone(),
                },
            ],
            max_tokens: Some(req.max_tokens),
            temperature: Some(req.temperature),
            response_format: req.json_mode.then(|| ResponseFormat {
                kind: "json_object".to_string(),
            }),
            stream: Some(false),
        };

        let mut rb = self
            .client
            .post(self.endpoint_chat_completions())
            .timeout(std::time::Duration::from_millis(req.timeout_ms))
            .header(reqwest::header::CONTENT_TYPE, "application/json");
        if let Some(k) = &self.api_key {
            rb = rb.header(reqwest::header::AUTHORIZATION, format!("Bearer {k}"));
        }

        let resp = rb.json(&body).send().await.map_err(|e| {
            if e.is_timeout() {
                Error::Timeout(req.timeout_ms)
            } else {
                Error::Llm(e.to_string())
            }
        })?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            if is_context_length_error(&text) {
                return Err(Error::LlmContextLength);
            }
            return Err(Error::Llm(format!(
                "openai_compat chat.completions HTTP {status}"
            )));
        }

        let parsed: ChatCompletionsResponse = resp.json().await.map_err(|e| {
            if e.is_timeout() {
                Error::Timeout(req.timeout_ms)
            } else {
                Error::Llm(e.to_string())
            }
        })?;
        let Some(choice) = parsed.choices.into_iter().next() else {
            return Err(Error::Llm("chat.completions returned no choices".to_string()));
        };
        Ok(Completion {
            text: choice.message.content.unwrap_or_default(),
            finish_reason: choice.finish_reason,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
struct ChatCompletionsRequest {
    model: String,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatCompletionsResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Clone, Deserialize)]
struct Choice {
    message: ChoiceMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}
