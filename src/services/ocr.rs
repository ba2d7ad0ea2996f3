use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const LLAVA_MODEL: &str = "@cf/llava-hf/llava-1.5-7b-hf";

/// Recognition is restricted to the VIN alphabet (no I, O or Q).
const VIN_PROMPT: &str = concat!(
    "This image shows a vehicle identification number (VIN) plate or sticker. ",
    "Transcribe the 17-character VIN exactly as printed. ",
    "Use only the characters ABCDEFGHJKLMNPRSTUVWXYZ0123456789; ",
    "the letters I, O and Q never appear in a VIN. ",
    "Return ONLY the characters, with no other text."
);

/// Text recognition over an encoded image.
#[async_trait]
pub trait TextRecognizer: Send + Sync {
    /// Recognize the text in a PNG image.
    async fn recognize(&self, png: Vec<u8>) -> Result<String, OcrError>;
}

/// Client for Cloudflare Workers AI LLaVA model.
pub struct WorkersAiClient {
    http: Client,
    url: String,
    api_token: String,
}

#[derive(Serialize)]
struct LlavaRequest<'a> {
    image: Vec<u8>,
    prompt: &'a str,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct LlavaResponse {
    result: LlavaResult,
}

#[derive(Deserialize)]
struct LlavaResult {
    description: String,
}

impl WorkersAiClient {
    pub fn new(account_id: &str, api_token: &str, timeout: Duration) -> Result<Self, OcrError> {
        let http = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            http,
            url: format!(
                "https://api.cloudflare.com/client/v4/accounts/{account_id}/ai/run/{LLAVA_MODEL}"
            ),
            api_token: api_token.to_string(),
        })
    }
}

#[async_trait]
impl TextRecognizer for WorkersAiClient {
    async fn recognize(&self, png: Vec<u8>) -> Result<String, OcrError> {
        let request_body = LlavaRequest {
            image: png,
            prompt: VIN_PROMPT,
            max_tokens: 64,
        };

        let response = self
            .http
            .post(&self.url)
            .bearer_auth(&self.api_token)
            .json(&request_body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(OcrError::Status(response.status().as_u16()));
        }

        let body = response.text().await?;
        let llava_resp: LlavaResponse = serde_json::from_str(&body)?;
        Ok(llava_resp.result.description)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum OcrError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Workers AI returned HTTP {0}")]
    Status(u16),

    #[error("Failed to parse LLaVA response: {0}")]
    Parse(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_carries_raw_image_bytes() {
        let body = serde_json::to_value(LlavaRequest {
            image: vec![137, 80, 78, 71],
            prompt: VIN_PROMPT,
            max_tokens: 64,
        })
        .unwrap();
        assert_eq!(body["image"], serde_json::json!([137, 80, 78, 71]));
        assert_eq!(body["max_tokens"], 64);
    }

    #[test]
    fn test_response_description() {
        let body = r#"{"result":{"description":" 1HGBH41JXMN109186"},"success":true,"errors":[]}"#;
        let parsed: LlavaResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.result.description.trim(), "1HGBH41JXMN109186");
    }

    #[test]
    fn test_prompt_excludes_forbidden_letters_from_alphabet() {
        let alphabet = VIN_PROMPT
            .split("characters ")
            .nth(1)
            .and_then(|rest| rest.split(';').next())
            .unwrap();
        assert!(!alphabet.contains(['I', 'O', 'Q']));
        assert_eq!(alphabet.len(), 33);
    }
}
