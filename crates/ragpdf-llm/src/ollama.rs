use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use ragpdf_core::config::LlmSettings;
use ragpdf_core::error::{Error, Result};
use ragpdf_core::traits::Generator;
use ragpdf_core::types::GenerationParams;

/// Blocking client for a local Ollama server (`/api/generate`).
pub struct OllamaGenerator {
    client: Client,
    base_url: String,
    model: String,
    timeout: Duration,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagModel>,
}

#[derive(Deserialize)]
struct TagModel {
    name: String,
}

impl OllamaGenerator {
    pub fn new(settings: &LlmSettings) -> Result<Self> {
        Self::with_timeout(&settings.base_url, &settings.model_name, Duration::from_secs(settings.timeout_secs))
    }

    pub fn with_timeout(base_url: &str, model: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::GenerationUnavailable(format!("building HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            timeout,
        })
    }

    pub fn base_url(&self) -> &str { &self.base_url }

    /// Ask the server whether the configured model has been pulled.
    pub fn check_model(&self) -> Result<()> {
        let url = format!("{}/api/tags", self.base_url);
        debug!("Ollama request to {}", url);
        let response = self.client.get(&url).send().map_err(|e| self.transport_error(e))?;
        if !response.status().is_success() {
            return Err(Error::GenerationUnavailable(format!(
                "{} answered HTTP {}",
                self.base_url,
                response.status().as_u16()
            )));
        }
        let tags: TagsResponse = response.json().map_err(|e| self.transport_error(e))?;
        if tags.models.iter().any(|m| model_matches(&m.name, &self.model)) {
            Ok(())
        } else {
            Err(self.model_not_found())
        }
    }

    fn model_not_found(&self) -> Error {
        Error::ModelNotFound {
            model: self.model.clone(),
            detail: format!("run `ollama pull {}`", self.model),
        }
    }

    fn transport_error(&self, e: reqwest::Error) -> Error {
        if e.is_timeout() {
            Error::GenerationTimeout(self.timeout)
        } else if e.is_connect() {
            Error::GenerationUnavailable(format!("cannot reach Ollama at {} (is `ollama serve` running?): {}", self.base_url, e))
        } else {
            Error::GenerationUnavailable(format!("{}: {}", self.base_url, e))
        }
    }
}

impl Generator for OllamaGenerator {
    fn model_id(&self) -> &str { &self.model }

    fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<String> {
        let url = format!("{}/api/generate", self.base_url);
        let body = json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
            "options": {
                "temperature": params.temperature,
                "num_predict": params.max_tokens,
            },
        });

        debug!("Ollama request to {}", url);
        let response = self.client.post(&url).json(&body).send().map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            let text = response.text().unwrap_or_default();
            if text.to_lowercase().contains("not found") {
                return Err(self.model_not_found());
            }
            return Err(Error::GenerationUnavailable(format!("{} answered HTTP 404: {}", url, text)));
        }
        if !status.is_success() {
            let text = response.text().unwrap_or_default();
            return Err(Error::GenerationUnavailable(format!("HTTP {}: {}", status.as_u16(), text)));
        }

        let parsed: GenerateResponse = response.json().map_err(|e| self.transport_error(e))?;
        Ok(parsed.response.trim().to_string())
    }
}

/// `mistral` matches `mistral:latest`; an explicit tag must match exactly.
fn model_matches(listed: &str, wanted: &str) -> bool {
    listed == wanted || (!wanted.contains(':') && listed.split(':').next() == Some(wanted))
}
