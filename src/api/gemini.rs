//! REST client for the Gemini `generateContent` endpoint.
//!
//! The response carries a list of candidates, each with a list of content
//! parts. When a response is a single text part it is used directly; otherwise
//! every text part of the first candidate is concatenated in order.

use super::GenerativeModel;
use crate::config::GenerationParams;
use crate::utils::truncate_for_log;
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt;
use std::time::{Duration as StdDuration, Instant};
use tracing::{debug, instrument, warn};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: WireGenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<RequestPart<'a>>,
}

#[derive(Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WireGenerationConfig {
    temperature: f32,
    top_p: f32,
    top_k: u32,
    max_output_tokens: u32,
}

impl From<&GenerationParams> for WireGenerationConfig {
    fn from(p: &GenerationParams) -> Self {
        Self {
            temperature: p.temperature,
            top_p: p.top_p,
            top_k: p.top_k,
            max_output_tokens: p.max_output_tokens,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Default, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

impl GenerateResponse {
    /// The single text part, when the response has exactly one.
    fn simple_text(&self) -> Option<&str> {
        match self.candidates.as_slice() {
            [only] => match only.content.as_ref()?.parts.as_slice() {
                [part] => part.text.as_deref(),
                _ => None,
            },
            _ => None,
        }
    }

    /// Text of the response: the simple accessor when available, otherwise
    /// every text part of the first candidate concatenated in order.
    pub(crate) fn text(&self) -> Option<String> {
        if let Some(text) = self.simple_text() {
            return Some(text.to_string());
        }
        let parts = &self.candidates.first()?.content.as_ref()?.parts;
        let joined: String = parts.iter().filter_map(|p| p.text.as_deref()).collect();
        if joined.is_empty() { None } else { Some(joined) }
    }

    fn finish_reason(&self) -> Option<&str> {
        self.candidates.first()?.finish_reason.as_deref()
    }
}

/// Gemini `generateContent` client.
pub struct GeminiModel {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl fmt::Debug for GeminiModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeminiModel")
            .field("client", &"<reqwest::Client>")
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl GeminiModel {
    /// Build a client for `model`, failing when no API key is available.
    pub fn new(api_key: Option<String>, model: &str, timeout: StdDuration) -> Result<Self, Box<dyn Error>> {
        let api_key = api_key
            .filter(|k| !k.trim().is_empty())
            .ok_or("Gemini API key not provided. Set GEMINI_API_KEY environment variable.")?;
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_key,
            model: model.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }

    /// Point the client at a different API root (proxies, test servers).
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url,
            urlencoding::encode(&self.model),
            urlencoding::encode(&self.api_key)
        )
    }
}

impl GenerativeModel for GeminiModel {
    fn name(&self) -> &str {
        &self.model
    }

    #[instrument(level = "info", skip_all, fields(model = %self.model, max_output_tokens = params.max_output_tokens))]
    async fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<String, Box<dyn Error>> {
        let t0 = Instant::now();
        let request = GenerateRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![RequestPart { text: prompt }],
            }],
            generation_config: params.into(),
        };

        let resp = self
            .client
            .post(self.endpoint())
            .header(CONTENT_TYPE, "application/json")
            .body(serde_json::to_vec(&request)?)
            .send()
            .await?;
        let status = resp.status();
        let body = resp.text().await?;
        let dt = t0.elapsed();

        if !status.is_success() {
            warn!(%status, elapsed_ms = dt.as_millis() as u128, body = %truncate_for_log(&body, 300), "Gemini API error");
            return Err(format!("Gemini API error: HTTP {}", status).into());
        }

        let parsed: GenerateResponse = serde_json::from_str(&body)?;
        if parsed.finish_reason() == Some("MAX_TOKENS") {
            warn!(max_output_tokens = params.max_output_tokens, "Response hit the output token cap; expect truncated JSON");
        }
        match parsed.text() {
            Some(text) => {
                debug!(elapsed_ms = dt.as_millis() as u128, chars = text.len(), "Gemini response received");
                Ok(text)
            }
            None => {
                warn!(feedback = ?parsed.prompt_feedback, finish_reason = ?parsed.finish_reason(), "Gemini response carried no text");
                Err("Gemini response carried no text".into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_text_accessor() {
        let body = r#"{"candidates":[{"content":{"parts":[{"text":"{\"a\":1}"}]},"finishReason":"STOP"}]}"#;
        let parsed: GenerateResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.text().as_deref(), Some("{\"a\":1}"));
        assert_eq!(parsed.finish_reason(), Some("STOP"));
    }

    #[test]
    fn test_multi_part_response_is_concatenated_in_order() {
        let body = r#"{"candidates":[{"content":{"parts":[{"text":"{\"a\":"},{"thought":true},{"text":"1}"}]}}]}"#;
        let parsed: GenerateResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.text().as_deref(), Some("{\"a\":1}"));
    }

    #[test]
    fn test_blocked_response_has_no_text() {
        let body = r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#;
        let parsed: GenerateResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.text(), None);
    }

    #[test]
    fn test_request_wire_shape() {
        let params = GenerationParams::factual(2048);
        let request = GenerateRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![RequestPart { text: "hello" }],
            }],
            generation_config: (&params).into(),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["generationConfig"]["maxOutputTokens"], 2048);
        assert_eq!(json["generationConfig"]["topK"], 40);
        assert_eq!(json["contents"][0]["parts"][0]["text"], "hello");
    }

    #[test]
    fn test_missing_api_key_is_rejected() {
        let err = GeminiModel::new(None, "gemini-2.5-flash", StdDuration::from_secs(5)).unwrap_err();
        assert!(err.to_string().contains("GEMINI_API_KEY"));
        assert!(GeminiModel::new(Some("  ".to_string()), "m", StdDuration::from_secs(5)).is_err());
    }

    #[test]
    fn test_endpoint_encodes_key() {
        let model = GeminiModel::new(Some("a/b".to_string()), "gemini-2.5-flash", StdDuration::from_secs(5))
            .unwrap()
            .with_base_url("http://localhost:9/v1/");
        assert_eq!(
            model.endpoint(),
            "http://localhost:9/v1/models/gemini-2.5-flash:generateContent?key=a%2Fb"
        );
    }
}
