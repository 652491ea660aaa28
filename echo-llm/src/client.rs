//! LLM Client — unified interface for OpenAI-compatible and Ollama backends.

use std::time::{Duration, Instant};

use reqwest::Client;
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::error::{LlmError, Result};
use crate::types::{LlmRequest, LlmResponse};

/// Provider backend for LLM inference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LlmProvider {
    /// Ollama running locally.
    Ollama {
        /// Server root, e.g. `http://localhost:11434`.
        base_url: String,
    },
    /// OpenAI-compatible chat completions API.
    OpenAiCompatible {
        /// API root, e.g. `https://api.openai.com`.
        base_url: String,
        /// Bearer token.
        api_key: String,
    },
    /// No LLM available; every call fails with `Unavailable`.
    None,
}

impl LlmProvider {
    /// Build a provider from its configured name.
    ///
    /// An OpenAI-compatible backend without an API key degrades to
    /// [`LlmProvider::None`] with a warning, so the session can still run
    /// environment actions.
    ///
    /// # Errors
    /// `ConfigError` for an unknown provider name.
    pub fn from_settings(name: &str, base_url: &str, api_key: Option<String>) -> Result<Self> {
        let base_url = base_url.trim_end_matches('/').to_string();
        match name.to_ascii_lowercase().as_str() {
            "openai" | "openai_compatible" => match api_key.filter(|k| !k.trim().is_empty()) {
                Some(api_key) => Ok(Self::OpenAiCompatible { base_url, api_key }),
                None => {
                    warn!("No API key configured; character replies are unavailable");
                    Ok(Self::None)
                }
            },
            "ollama" => Ok(Self::Ollama { base_url }),
            "none" => Ok(Self::None),
            other => Err(LlmError::ConfigError(format!("unknown provider '{other}'"))),
        }
    }
}

/// The main LLM client that routes requests to the configured backend.
#[derive(Debug, Clone)]
pub struct LlmClient {
    provider: LlmProvider,
    http: Client,
    max_retries: u32,
}

impl LlmClient {
    /// Create a new LLM client.
    #[must_use]
    pub fn new(provider: LlmProvider, max_retries: u32) -> Self {
        Self {
            provider,
            http: Client::new(),
            max_retries,
        }
    }

    /// Create a client with no LLM backend.
    #[must_use]
    pub fn none() -> Self {
        Self::new(LlmProvider::None, 0)
    }

    /// The configured backend.
    #[must_use]
    pub fn provider(&self) -> &LlmProvider {
        &self.provider
    }

    /// Check if the LLM client has a backend configured.
    #[must_use]
    pub fn is_available(&self) -> bool {
        !matches!(self.provider, LlmProvider::None)
    }

    /// Generate a response from the LLM.
    ///
    /// # Errors
    /// `Unavailable` without a backend, `ParseError` for an undecodable
    /// envelope, `Timeout` when every HTTP attempt timed out,
    /// `RetriesExhausted` when every attempt failed otherwise.
    pub async fn generate(&self, request: &LlmRequest) -> Result<LlmResponse> {
        match &self.provider {
            LlmProvider::None => Err(LlmError::Unavailable("No LLM provider configured".into())),
            LlmProvider::Ollama { base_url } => self.generate_ollama(base_url, request).await,
            LlmProvider::OpenAiCompatible { base_url, api_key } => {
                self.generate_openai(base_url, api_key, request).await
            }
        }
    }

    /// Generate using Ollama's chat API.
    async fn generate_ollama(&self, base_url: &str, request: &LlmRequest) -> Result<LlmResponse> {
        let url = format!("{base_url}/api/chat");
        let body = json!({
            "model": request.model,
            "messages": [
                { "role": "system", "content": request.system },
                { "role": "user", "content": request.user },
            ],
            "stream": false,
            "format": "json",
            "options": {
                "temperature": request.temperature,
                "num_predict": request.max_tokens,
            }
        });

        let (json, latency_ms) = self.post_with_retries("Ollama", &url, None, &body, request.timeout_ms).await?;
        let text = json["message"]["content"]
            .as_str()
            .ok_or_else(|| LlmError::ParseError("missing message.content".into()))?
            .to_string();
        Ok(LlmResponse {
            text,
            tokens_generated: token_count(&json["eval_count"]),
            latency_ms,
            model: request.model.clone(),
        })
    }

    /// Generate using OpenAI-compatible API.
    async fn generate_openai(&self, base_url: &str, api_key: &str, request: &LlmRequest) -> Result<LlmResponse> {
        let url = format!("{base_url}/v1/chat/completions");
        let body = json!({
            "model": request.model,
            "messages": [
                { "role": "system", "content": request.system },
                { "role": "user", "content": request.user },
            ],
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
        });

        let (json, latency_ms) = self
            .post_with_retries("OpenAI", &url, Some(api_key), &body, request.timeout_ms)
            .await?;
        let text = json["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| LlmError::ParseError("missing choices[0].message.content".into()))?
            .to_string();
        Ok(LlmResponse {
            text,
            tokens_generated: token_count(&json["usage"]["completion_tokens"]),
            latency_ms,
            model: json["model"].as_str().unwrap_or(&request.model).to_string(),
        })
    }

    /// POST `body` up to `max_retries + 1` times, returning the first
    /// successful JSON body and its latency.
    ///
    /// Fails with `Timeout` only when every attempt timed out.
    async fn post_with_retries(
        &self,
        backend: &str,
        url: &str,
        bearer: Option<&str>,
        body: &Value,
        timeout_ms: u64,
    ) -> Result<(Value, u64)> {
        let mut last_error = String::new();
        let mut all_timed_out = true;
        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                debug!(backend, attempt = attempt + 1, of = self.max_retries + 1, "Retrying LLM call");
            }

            let start = Instant::now();
            let mut builder = self.http.post(url).json(body).timeout(Duration::from_millis(timeout_ms));
            if let Some(key) = bearer {
                builder = builder.bearer_auth(key);
            }
            let result = builder.send().await;
            let latency_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

            match result {
                Ok(resp) if resp.status().is_success() => {
                    let json: Value = match resp.json().await {
                        Ok(json) => json,
                        Err(e) if e.is_timeout() => {
                            last_error = e.to_string();
                            warn!(backend, timeout_ms, "LLM response body timed out");
                            continue;
                        }
                        Err(e) => return Err(LlmError::ParseError(e.to_string())),
                    };
                    debug!(backend, latency_ms, "LLM call succeeded");
                    return Ok((json, latency_ms));
                }
                Ok(resp) => {
                    all_timed_out = false;
                    let status = resp.status();
                    last_error = format!("HTTP {status}: {}", resp.text().await.unwrap_or_default());
                    warn!(backend, %status, "LLM backend returned error");
                }
                Err(e) => {
                    last_error = e.to_string();
                    if e.is_timeout() {
                        warn!(backend, timeout_ms, "LLM request timed out");
                    } else {
                        all_timed_out = false;
                        warn!(backend, error = %last_error, "LLM request failed");
                    }
                }
            }
        }

        if all_timed_out {
            return Err(LlmError::Timeout(timeout_ms));
        }

        Err(LlmError::RetriesExhausted {
            attempts: self.max_retries + 1,
            last_error,
        })
    }
}

fn token_count(value: &Value) -> u32 {
    value.as_u64().and_then(|n| u32::try_from(n).ok()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_names_are_parsed() {
        assert_eq!(
            LlmProvider::from_settings("ollama", "http://localhost:11434/", None).expect("known"),
            LlmProvider::Ollama {
                base_url: "http://localhost:11434".into()
            }
        );
        assert_eq!(
            LlmProvider::from_settings("OpenAI", "https://api.openai.com", Some("sk-test".into())).expect("known"),
            LlmProvider::OpenAiCompatible {
                base_url: "https://api.openai.com".into(),
                api_key: "sk-test".into()
            }
        );
        assert_eq!(LlmProvider::from_settings("none", "", None).expect("known"), LlmProvider::None);
        assert!(matches!(
            LlmProvider::from_settings("carrier-pigeon", "", None),
            Err(LlmError::ConfigError(_))
        ));
    }

    #[test]
    fn openai_without_key_degrades_to_none() {
        let provider = LlmProvider::from_settings("openai", "https://api.openai.com", Some("  ".into())).expect("known");
        assert_eq!(provider, LlmProvider::None);
    }

    #[tokio::test]
    async fn none_provider_is_unavailable() {
        let client = LlmClient::none();
        assert!(!client.is_available());
        let err = client
            .generate(&LlmRequest::new("sys", "usr", "any"))
            .await
            .expect_err("no backend");
        assert!(matches!(err, LlmError::Unavailable(_)));
    }

    #[tokio::test]
    async fn unreachable_backend_exhausts_retries() {
        let client = LlmClient::new(
            LlmProvider::Ollama {
                base_url: "http://127.0.0.1:9".into(),
            },
            2,
        );
        let err = client
            .generate(&LlmRequest::new("sys", "usr", "llama3").with_timeout(500))
            .await
            .expect_err("nothing listens there");
        match err {
            LlmError::RetriesExhausted { attempts, .. } => assert_eq!(attempts, 3),
            other => panic!("expected RetriesExhausted, got {other:?}"),
        }
    }

    /// Accepts connections and never answers them.
    async fn silent_backend() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("binds");
        let addr = listener.local_addr().expect("bound address");
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn silent_backend_is_a_timeout() {
        let client = LlmClient::new(LlmProvider::Ollama { base_url: silent_backend().await }, 1);
        let err = client
            .generate(&LlmRequest::new("sys", "usr", "llama3").with_timeout(200))
            .await
            .expect_err("never answers");
        assert!(matches!(err, LlmError::Timeout(200)), "got {err:?}");
    }
}
