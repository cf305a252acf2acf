use crate::error::{Result, StatementImportError};
use crate::llm::prompts::{EXTRACTION_SYSTEM_PROMPT, EXTRACTION_USER_PROMPT};
use crate::llm::types::*;
use crate::remote::{response_schema, RemoteExtractor};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use log::debug;
use reqwest::Client;

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const API_KEY_VAR: &str = "GEMINI_API_KEY";

#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl GeminiClient {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: GEMINI_BASE_URL.to_string(),
            model: model.into(),
        }
    }

    /// Reads the key from `GEMINI_API_KEY`.
    pub fn from_env(model: impl Into<String>) -> Result<Self> {
        let api_key = std::env::var(API_KEY_VAR).map_err(|_| {
            StatementImportError::InvalidConfig(format!("{} is not set", API_KEY_VAR))
        })?;
        Ok(Self::new(api_key, model))
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub(crate) async fn generate_content(
        &self,
        system_prompt: &str,
        contents: Vec<Content>,
        response_schema: Option<serde_json::Value>,
    ) -> Result<String> {
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        );

        let payload = GenerateContentRequest {
            contents,
            system_instruction: Some(Content::user(system_prompt)),
            generation_config: GenerationConfig {
                response_mime_type: "application/json".to_string(),
                response_schema,
                temperature: Some(0.0),
            },
        };

        let res = self.client.post(&url).json(&payload).send().await?;
        let status = res.status();

        if !status.is_success() {
            let err_text = res.text().await?;
            return Err(classify_failure(status.as_u16(), &err_text));
        }

        let body: GenerateContentResponse = res.json().await?;
        let candidate = body
            .candidates
            .and_then(|c| c.into_iter().next())
            .ok_or_else(|| {
                StatementImportError::ExtractionFailed("No candidates returned".to_string())
            })?;

        if candidate.finish_reason.as_deref() == Some("MAX_TOKENS") {
            return Err(StatementImportError::ResponseTooComplex {
                details: "output hit the model's token limit".to_string(),
            });
        }

        let text: String = candidate
            .content
            .map(|c| c.parts)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|part| match part {
                Part::Text { text } => Some(text),
                Part::InlineData { .. } => None,
            })
            .collect();

        if text.trim().is_empty() {
            return Err(StatementImportError::ExtractionFailed(
                "Model returned no text".to_string(),
            ));
        }
        Ok(text)
    }
}

#[async_trait]
impl RemoteExtractor for GeminiClient {
    async fn extract(&self, payload: &[u8], mime_type: &str) -> Result<String> {
        debug!(
            "Sending {} bytes ({}) to {}",
            payload.len(),
            mime_type,
            self.model
        );
        let document = Content::user_with_document(
            EXTRACTION_USER_PROMPT,
            mime_type,
            STANDARD.encode(payload),
        );
        self.generate_content(
            EXTRACTION_SYSTEM_PROMPT,
            vec![document],
            Some(response_schema()?),
        )
        .await
    }
}

/// Maps a non-2xx answer onto the retry classes.
pub fn classify_failure(status: u16, body: &str) -> StatementImportError {
    let detail: ApiErrorBody = serde_json::from_str(body).unwrap_or_default();
    let api_status = detail.error.status.to_ascii_uppercase();
    let message = if detail.error.message.is_empty() {
        format!("status {}: {}", status, body.trim())
    } else {
        format!("status {}: {}", status, detail.error.message)
    };

    if status == 429 || api_status == "RESOURCE_EXHAUSTED" {
        StatementImportError::QuotaExhausted(message)
    } else if status == 503
        || api_status == "UNAVAILABLE"
        || body.to_lowercase().contains("overloaded")
    {
        StatementImportError::Overloaded(message)
    } else {
        StatementImportError::ExtractionFailed(message)
    }
}
