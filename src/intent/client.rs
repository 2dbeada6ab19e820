//! Language model client
//!
//! The intent parser talks to the model through the `IntentModel` trait so
//! tests can substitute a scripted model. `HttpModel` is the production
//! implementation: one JSON round trip per call, per-provider request and
//! response bodies, a hard timeout on the HTTP client.

use crate::config::ModelConfig;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Model transport errors
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("model API error: {0}")]
    Api(String),
    #[error("model configuration error: {0}")]
    Config(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("response decode error: {0}")]
    Decode(String),
}

pub type ModelResult<T> = Result<T, ModelError>;

/// Supported language model providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    Anthropic,
    OpenAI,
    Ollama,
}

/// The single nondeterministic collaborator in the pipeline.
///
/// Implementations send one prompt and return the raw completion text.
/// Everything downstream of this call is deterministic.
#[async_trait]
pub trait IntentModel: Send + Sync {
    async fn complete(&self, system: &str, prompt: &str) -> ModelResult<String>;
}

/// HTTP implementation of `IntentModel`
pub struct HttpModel {
    client: reqwest::Client,
    config: ModelConfig,
    api_base_url: String,
}

impl HttpModel {
    pub fn new(config: &ModelConfig) -> ModelResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| ModelError::Config(e.to_string()))?;

        let api_base_url = config.api_base_url.clone().unwrap_or_else(|| {
            match config.provider {
                LlmProvider::Anthropic => "https://api.anthropic.com/v1".to_string(),
                LlmProvider::OpenAI => "https://api.openai.com/v1".to_string(),
                LlmProvider::Ollama => "http://localhost:11434".to_string(),
            }
        });

        Ok(Self {
            client,
            config: config.clone(),
            api_base_url,
        })
    }

    async fn anthropic_messages(&self, system: &str, prompt: &str) -> ModelResult<String> {
        #[derive(Serialize)]
        struct Message<'a> {
            role: &'a str,
            content: &'a str,
        }

        #[derive(Serialize)]
        struct Request<'a> {
            model: &'a str,
            max_tokens: u32,
            system: &'a str,
            messages: Vec<Message<'a>>,
            temperature: f32,
        }

        #[derive(Deserialize)]
        struct Response {
            content: Vec<ContentBlock>,
        }

        #[derive(Deserialize)]
        struct ContentBlock {
            #[serde(default)]
            text: String,
        }

        let api_key = self
            .config
            .api_key
            .as_ref()
            .ok_or_else(|| ModelError::Config("Anthropic requires an API key".to_string()))?;

        let url = format!("{}/messages", self.api_base_url);
        let resp = self
            .client
            .post(&url)
            .header("x-api-key", api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&Request {
                model: &self.config.model,
                max_tokens: 1024,
                system,
                messages: vec![Message {
                    role: "user",
                    content: prompt,
                }],
                temperature: 0.0,
            })
            .send()
            .await
            .map_err(|e| ModelError::Network(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(ModelError::Api(format!("Anthropic error: {}", resp.status())));
        }

        let result: Response = resp
            .json()
            .await
            .map_err(|e| ModelError::Decode(e.to_string()))?;
        Ok(result
            .content
            .first()
            .map(|block| block.text.clone())
            .unwrap_or_default())
    }

    async fn openai_chat(&self, system: &str, prompt: &str) -> ModelResult<String> {
        #[derive(Serialize)]
        struct Message<'a> {
            role: &'a str,
            content: &'a str,
        }

        #[derive(Serialize)]
        struct Request<'a> {
            model: &'a str,
            messages: Vec<Message<'a>>,
            temperature: f32,
        }

        #[derive(Deserialize)]
        struct Response {
            choices: Vec<Choice>,
        }

        #[derive(Deserialize)]
        struct Choice {
            message: MessageContent,
        }

        #[derive(Deserialize)]
        struct MessageContent {
            content: String,
        }

        let api_key = self
            .config
            .api_key
            .as_ref()
            .ok_or_else(|| ModelError::Config("OpenAI requires an API key".to_string()))?;

        let url = format!("{}/chat/completions", self.api_base_url);
        let resp = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", api_key))
            .json(&Request {
                model: &self.config.model,
                messages: vec![
                    Message {
                        role: "system",
                        content: system,
                    },
                    Message {
                        role: "user",
                        content: prompt,
                    },
                ],
                temperature: 0.0,
            })
            .send()
            .await
            .map_err(|e| ModelError::Network(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(ModelError::Api(format!("OpenAI error: {}", resp.status())));
        }

        let result: Response = resp
            .json()
            .await
            .map_err(|e| ModelError::Decode(e.to_string()))?;
        Ok(result
            .choices
            .first()
            .map(|c| c.message.content.clone())
            .unwrap_or_default())
    }

    async fn ollama_generate(&self, system: &str, prompt: &str) -> ModelResult<String> {
        #[derive(Serialize)]
        struct Request<'a> {
            model: &'a str,
            prompt: &'a str,
            system: &'a str,
            stream: bool,
        }

        #[derive(Deserialize)]
        struct Response {
            response: String,
        }

        let url = format!("{}/api/generate", self.api_base_url);
        let resp = self
            .client
            .post(&url)
            .json(&Request {
                model: &self.config.model,
                prompt,
                system,
                stream: false,
            })
            .send()
            .await
            .map_err(|e| ModelError::Network(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(ModelError::Api(format!("Ollama error: {}", resp.status())));
        }

        let result: Response = resp
            .json()
            .await
            .map_err(|e| ModelError::Decode(e.to_string()))?;
        Ok(result.response)
    }
}

#[async_trait]
impl IntentModel for HttpModel {
    async fn complete(&self, system: &str, prompt: &str) -> ModelResult<String> {
        match self.config.provider {
            LlmProvider::Anthropic => self.anthropic_messages(system, prompt).await,
            LlmProvider::OpenAI => self.openai_chat(system, prompt).await,
            LlmProvider::Ollama => self.ollama_generate(system, prompt).await,
        }
    }
}
