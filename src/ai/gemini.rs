//! Gemini `generateContent` client.
//!
//! Sends the file inline (base64) next to a fixed instruction prompt and
//! reads the model's text answer back as JSON.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::AiConfig;
use crate::models::{Upload, DEFAULT_CONTENT_TYPE};

use super::response::{parse_receipt, parse_statement};
use super::{AiError, ReceiptAnalyzer, ReceiptScan, StatementEntry};

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const GEMINI_MODEL: &str = "gemini-2.0-flash";

const RECEIPT_PROMPT: &str = "Bu fişi analiz et ve şu JSON formatında yanıt ver: \
{\"title\": \"işyeri adı\", \"date\": \"YYYY-MM-DD\", \"amount\": toplam tutar (sadece sayı), \
\"category_guess\": \"food|transport|shopping|bills|other\" (tahmin et)}. Sadece JSON döndür.";

const STATEMENT_PROMPT: &str = "Bu hesap ekstresindeki tüm işlemleri çıkar ve şu formatta bir JSON dizisi olarak yanıt ver: \
[{\"date\": \"YYYY-MM-DD\", \"title\": \"açıklama\", \"amount\": tutar (sadece pozitif sayı), \
\"type\": \"income|expense\", \"category\": \"food|transport|shopping|bills|salary|other\"}]. \
İşlemleri ekstredeki sırayla listele. Sadece JSON döndür.";

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Part<'a> {
    Text { text: &'a str },
    Inline { inline_data: InlineData<'a> },
}

#[derive(Debug, Serialize)]
struct InlineData<'a> {
    mime_type: &'a str,
    data: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
}

impl GenerateResponse {
    fn text(&self) -> Option<String> {
        let candidate = self.candidates.first()?;
        let text: String = candidate
            .content
            .as_ref()?
            .parts
            .iter()
            .filter_map(|p| p.text.as_deref())
            .collect();
        if text.trim().is_empty() {
            None
        } else {
            Some(text)
        }
    }
}

/// Gemini-backed extraction client.
pub struct GeminiClient {
    client: Client,
    base_url: String,
    model: String,
    api_key: Option<SecretString>,
}

impl GeminiClient {
    /// A missing key is accepted here; calls fail fast with
    /// [`AiError::MissingApiKey`] instead.
    pub fn new(api_key: Option<SecretString>) -> Self {
        Self {
            client: Client::new(),
            base_url: GEMINI_BASE_URL.to_string(),
            model: GEMINI_MODEL.to_string(),
            api_key,
        }
    }

    pub fn from_config(config: &AiConfig, api_key: Option<SecretString>) -> Self {
        Self::new(api_key)
            .with_base_url(config.base_url.clone())
            .with_model(config.model.clone())
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        )
    }

    /// One request/response exchange; returns the model's raw text answer.
    async fn generate(&self, prompt: &str, upload: &Upload) -> Result<String, AiError> {
        let api_key = self.api_key.as_ref().ok_or(AiError::MissingApiKey)?;

        info!(
            file = %upload.file_name,
            content_type = %upload.content_type,
            size = upload.len(),
            model = %self.model,
            "Analyzing file"
        );

        let mime_type = if upload.content_type.trim().is_empty() {
            DEFAULT_CONTENT_TYPE
        } else {
            upload.content_type.as_str()
        };
        let request = GenerateRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![
                    Part::Text { text: prompt },
                    Part::Inline {
                        inline_data: InlineData {
                            mime_type,
                            data: BASE64.encode(&upload.bytes),
                        },
                    },
                ],
            }],
        };

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", api_key.expose_secret())
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "AI request failed");
                AiError::Service(e.to_string())
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AiError::Service(e.to_string()))?;

        if !status.is_success() {
            let message = serde_json::from_str::<ErrorEnvelope>(&body)
                .map(|e| e.error.message)
                .unwrap_or_else(|_| body.chars().take(200).collect());
            warn!(status = %status, message = %message, "AI service returned an error");
            return Err(AiError::Service(format!("HTTP {status}: {message}")));
        }

        let parsed: GenerateResponse = serde_json::from_str(&body)
            .map_err(|e| AiError::Parse(format!("unexpected response envelope ({e})")))?;
        match parsed.text() {
            Some(text) => {
                debug!(chars = text.len(), "AI response received");
                Ok(text)
            }
            None => {
                let reason = parsed
                    .candidates
                    .first()
                    .and_then(|c| c.finish_reason.clone())
                    .unwrap_or_else(|| "no candidates".to_string());
                Err(AiError::Parse(format!("empty response ({reason})")))
            }
        }
    }
}

#[async_trait]
impl ReceiptAnalyzer for GeminiClient {
    async fn analyze_receipt(&self, upload: &Upload) -> Result<ReceiptScan, AiError> {
        let text = self.generate(RECEIPT_PROMPT, upload).await?;
        parse_receipt(&text)
    }

    async fn analyze_statement(&self, upload: &Upload) -> Result<Vec<StatementEntry>, AiError> {
        let text = self.generate(STATEMENT_PROMPT, upload).await?;
        let entries = parse_statement(&text)?;
        info!(count = entries.len(), "Statement entries extracted");
        Ok(entries)
    }

    fn name(&self) -> &str {
        "gemini"
    }
}
