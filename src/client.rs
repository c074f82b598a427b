//! HTTP client for the backend's streaming `/api/generate` endpoint.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use url::Url;

use crate::config::Config;
use crate::decode::{Answer, LineSplitter, StreamDecoder};
use crate::store::ActiveModelStore;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Returned by [`Laisis::send_message`] when the request fails.
pub const ERROR_ANSWER: &str = "[ERROR]";

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("backend not reachable at {0}. Start it with: start ollama")]
    NotRunning(String),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("backend returned {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("invalid backend URL: {0}")]
    Url(#[from] url::ParseError),
}

/// Something that turns a prompt into an [`Answer`].
#[async_trait]
pub trait Backend: Send + Sync {
    async fn generate(&self, model: &str, prompt: &str) -> Result<Answer, ClientError>;
}

#[async_trait]
impl<B: Backend + ?Sized> Backend for Box<B> {
    async fn generate(&self, model: &str, prompt: &str) -> Result<Answer, ClientError> {
        (**self).generate(model, prompt).await
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Debug, Clone)]
pub struct GenerateClient {
    client: reqwest::Client,
    base_url: String,
    endpoint: Url,
}

impl GenerateClient {
    pub fn new(base_url: &str, timeout: Option<Duration>) -> Result<Self, ClientError> {
        let endpoint = Url::parse(base_url)?.join("/api/generate")?;
        let mut builder = reqwest::Client::builder().connect_timeout(CONNECT_TIMEOUT);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            client: builder.build()?,
            base_url: base_url.to_string(),
            endpoint,
        })
    }

    pub fn from_config(cfg: &Config, port: u16) -> Result<Self, ClientError> {
        Self::new(&cfg.backend_url(port), cfg.request_timeout())
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl Backend for GenerateClient {
    async fn generate(&self, model: &str, prompt: &str) -> Result<Answer, ClientError> {
        let request = GenerateRequest {
            model,
            prompt,
            stream: true,
        };

        let mut response = self
            .client
            .post(self.endpoint.clone())
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    ClientError::NotRunning(self.base_url.clone())
                } else {
                    ClientError::Http(e)
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Status {
                status,
                body: body.trim().to_string(),
            });
        }

        let mut decoder = StreamDecoder::new();
        let mut splitter = LineSplitter::new();
        'stream: while let Some(bytes) = response.chunk().await? {
            for line in splitter.push(&bytes) {
                if decoder.push_line(&line).is_finished() {
                    break 'stream;
                }
            }
        }
        if !decoder.is_finished() {
            if let Some(rest) = splitter.finish() {
                decoder.push_line(&rest);
            }
        }

        let answer = decoder.finish();
        tracing::debug!(
            "Generate finished ({} chars, complete: {})",
            answer.text().len(),
            answer.is_complete()
        );
        Ok(answer)
    }
}

/// One-shot facade bound to a port and a model.
///
/// The model is read once at construction; with no active model the
/// configured fallback is used.
pub struct Laisis<B = GenerateClient> {
    backend: B,
    model: String,
    fallback: bool,
}

impl Laisis<GenerateClient> {
    pub fn connect(cfg: &Config, port: u16) -> Result<Self, ClientError> {
        let backend = GenerateClient::from_config(cfg, port)?;
        Ok(Self::from_store(
            &cfg.active_model_store(),
            &cfg.fallback_model,
            backend,
        ))
    }
}

impl<B: Backend> Laisis<B> {
    pub fn with_backend(backend: B, model: impl Into<String>) -> Self {
        Self {
            backend,
            model: model.into(),
            fallback: false,
        }
    }

    /// Bind to the active model in `models`, or to `fallback` when none is set.
    pub fn from_store(models: &ActiveModelStore, fallback: &str, backend: B) -> Self {
        match models.get() {
            Some(model) => Self::with_backend(backend, model),
            None => {
                tracing::warn!("No active model found, using fallback '{fallback}'");
                Self {
                    backend,
                    model: fallback.to_string(),
                    fallback: true,
                }
            }
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// True when no model was active and the fallback was chosen.
    pub fn uses_fallback(&self) -> bool {
        self.fallback
    }

    /// The decoded answer, or [`ERROR_ANSWER`] if the request failed.
    pub async fn send_message(&self, message: &str) -> String {
        match self.backend.generate(&self.model, message).await {
            Ok(answer) => answer.into_text(),
            Err(e) => {
                tracing::error!("Error sending to model '{}': {e}", self.model);
                ERROR_ANSWER.to_string()
            }
        }
    }
}
