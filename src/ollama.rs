// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Ollama API client for local AI inference

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::config::EngineConfig;
use crate::suggest::InferenceBackend;
use crate::{AblageError, Result};

/// Ollama API client
pub struct OllamaClient {
    client: Client,
    base_url: String,
    model: String,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

#[derive(Deserialize)]
struct TagsResponse {
    models: Vec<ModelInfo>,
}

#[derive(Deserialize)]
struct ModelInfo {
    name: String,
}

impl OllamaClient {
    /// Create a new Ollama client
    pub fn new(base_url: &str, model: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AblageError::Config(format!("Failed to create HTTP client: {}", e)))?;

        // Normalize URL
        let base_url = base_url
            .trim_end_matches('/')
            .replace("/api/generate", "")
            .replace("/api/chat", "");

        Ok(Self {
            client,
            base_url,
            model: model.to_string(),
        })
    }

    pub fn from_config(config: &EngineConfig) -> Result<Self> {
        Self::new(&config.url, &config.model, config.timeout())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Check if Ollama is available
    pub async fn health_check(&self) -> Result<()> {
        let url = format!("{}/api/tags", self.base_url);

        self.client
            .get(&url)
            .timeout(Duration::from_secs(10))
            .send()
            .await
            .map_err(|e| {
                AblageError::Backend(format!(
                    "Cannot connect to Ollama at {}: {}",
                    self.base_url, e
                ))
            })?;

        Ok(())
    }

    /// List available models
    pub async fn list_models(&self) -> Result<Vec<String>> {
        let url = format!("{}/api/tags", self.base_url);

        let response = self.client.get(&url).send().await?;

        let tags: TagsResponse = response.json().await?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    /// Check if the configured model is available
    pub async fn model_available(&self) -> Result<bool> {
        let models = self.list_models().await?;
        Ok(models.iter().any(|m| {
            m.starts_with(&self.model) || m == &format!("{}:latest", self.model)
        }))
    }

    /// Generate text completion
    pub async fn generate(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/api/generate", self.base_url);

        let request = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
        };

        debug!("Sending request to Ollama: model={}", self.model);

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| AblageError::Backend(describe(&e)))?;

        if !response.status().is_success() {
            return Err(AblageError::Backend(format!(
                "Ollama returned status {}",
                response.status()
            )));
        }

        let result: GenerateResponse = response
            .json()
            .await
            .map_err(|e| AblageError::Backend(format!("Malformed Ollama envelope: {}", e)))?;
        Ok(result.response)
    }
}

fn describe(e: &reqwest::Error) -> String {
    if e.is_timeout() {
        format!("request timed out: {}", e)
    } else if e.is_connect() {
        format!("connection failed: {}", e)
    } else {
        e.to_string()
    }
}

#[async_trait]
impl InferenceBackend for OllamaClient {
    async fn generate(&self, prompt: &str) -> Result<String> {
        OllamaClient::generate(self, prompt).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, routing::post, Json, Router};

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}/api/generate", addr)
    }

    #[test]
    fn test_url_normalized() {
        let client = OllamaClient::new("http://localhost:11434/api/generate/", "m", Duration::from_secs(1)).unwrap();
        assert_eq!(client.base_url(), "http://localhost:11434");
    }

    #[tokio::test]
    async fn test_generate_sends_model_and_prompt() {
        let router = Router::new().route(
            "/api/generate",
            post(|Json(body): Json<serde_json::Value>| async move {
                assert_eq!(body["stream"], false);
                Json(serde_json::json!({
                    "response": format!("{}|{}", body["model"].as_str().unwrap(), body["prompt"].as_str().unwrap())
                }))
            }),
        );
        let url = serve(router).await;

        let client = OllamaClient::new(&url, "qwen2.5:7b-instruct", Duration::from_secs(5)).unwrap();
        let answer = client.generate("hallo").await.unwrap();
        assert_eq!(answer, "qwen2.5:7b-instruct|hallo");
    }

    #[tokio::test]
    async fn test_error_status_is_backend_error() {
        let router = Router::new().route(
            "/api/generate",
            post(|| async { StatusCode::SERVICE_UNAVAILABLE }),
        );
        let url = serve(router).await;

        let client = OllamaClient::new(&url, "m", Duration::from_secs(5)).unwrap();
        let err = client.generate("x").await.unwrap_err();
        assert!(matches!(err, AblageError::Backend(_)));
    }

    #[tokio::test]
    async fn test_slow_backend_times_out() {
        let router = Router::new().route(
            "/api/generate",
            post(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Json(serde_json::json!({"response": "late"}))
            }),
        );
        let url = serve(router).await;

        let client = OllamaClient::new(&url, "m", Duration::from_millis(100)).unwrap();
        let err = client.generate("x").await.unwrap_err();
        assert!(err.to_string().contains("timed out"), "{}", err);
    }
}
