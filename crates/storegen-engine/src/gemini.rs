use std::env;
use std::thread;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use reqwest::blocking::{Client as HttpClient, Response as HttpResponse};
use serde_json::{json, Map, Value};
use storegen_contracts::errors::UpstreamError;

use crate::service::{
    InlineImage, ModelRequest, ModelResponse, ModelService, PromptPart, ResponseFormat,
};

const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);
const TRANSPORT_RETRIES: usize = 1;
const TRANSPORT_RETRY_BACKOFF: Duration = Duration::from_millis(1200);

/// `generateContent` transport for Gemini models.
pub struct GeminiService {
    api_base: String,
    api_key: Option<String>,
    http: HttpClient,
}

impl GeminiService {
    pub fn from_env() -> Self {
        let api_base = env::var("GEMINI_API_BASE")
            .ok()
            .map(|value| value.trim().trim_end_matches('/').to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string());
        let api_key = non_empty_env("GEMINI_API_KEY").or_else(|| non_empty_env("GOOGLE_API_KEY"));
        Self::new(api_base, api_key)
    }

    pub fn new(api_base: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            api_base: api_base.into().trim_end_matches('/').to_string(),
            api_key,
            http: HttpClient::new(),
        }
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    fn endpoint_for_model(&self, model: &str) -> String {
        let trimmed = model.trim();
        let model_path = if trimmed.starts_with("models/") {
            trimmed.to_string()
        } else {
            format!("models/{trimmed}")
        };
        format!("{}/{}:generateContent", self.api_base, model_path)
    }

    fn post_with_transport_retries(
        &self,
        endpoint: &str,
        api_key: &str,
        payload: &Value,
        model: &str,
    ) -> Result<HttpResponse, UpstreamError> {
        let mut attempt = 0;
        loop {
            let sent = self
                .http
                .post(endpoint)
                .query(&[("key", api_key)])
                .timeout(REQUEST_TIMEOUT)
                .json(payload)
                .send();
            match sent {
                Ok(response) => return Ok(response),
                Err(err) => {
                    let retryable = err.is_timeout() || err.is_connect();
                    if !retryable || attempt >= TRANSPORT_RETRIES {
                        return Err(UpstreamError::fatal(
                            model,
                            format!("Gemini request failed ({endpoint}): {err}"),
                        ));
                    }
                    attempt += 1;
                    tracing::warn!(
                        model,
                        attempt,
                        "Gemini transport retry after request failure: {err}"
                    );
                    thread::sleep(TRANSPORT_RETRY_BACKOFF);
                }
            }
        }
    }
}

impl ModelService for GeminiService {
    fn name(&self) -> &str {
        "gemini"
    }

    fn generate(&self, request: &ModelRequest) -> Result<ModelResponse, UpstreamError> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Err(UpstreamError::fatal(
                &request.model,
                "GEMINI_API_KEY or GOOGLE_API_KEY not set",
            ));
        };
        let endpoint = self.endpoint_for_model(&request.model);
        let payload = build_payload(request);
        let response =
            self.post_with_transport_retries(&endpoint, api_key, &payload, &request.model)?;
        let body = response_json_or_error(&request.model, response)?;
        parse_response(&request.model, &body)
    }
}

pub(crate) fn build_payload(request: &ModelRequest) -> Value {
    let parts: Vec<Value> = request
        .parts
        .iter()
        .map(|part| match part {
            PromptPart::Text(text) => json!({ "text": text }),
            PromptPart::Image(image) => json!({
                "inlineData": {
                    "mimeType": image.mime_type,
                    "data": image.to_base64(),
                }
            }),
        })
        .collect();

    let mut generation_config = Map::new();
    match request.response_format {
        ResponseFormat::Json => {
            generation_config.insert(
                "responseMimeType".to_string(),
                Value::String("application/json".to_string()),
            );
        }
        ResponseFormat::Image => {
            generation_config.insert(
                "responseModalities".to_string(),
                json!(["TEXT", "IMAGE"]),
            );
        }
        ResponseFormat::Text => {}
    }
    if let Some(tokens) = request.max_output_tokens {
        generation_config.insert("maxOutputTokens".to_string(), Value::from(tokens));
    }

    let mut payload = Map::new();
    payload.insert(
        "contents".to_string(),
        json!([{ "role": "user", "parts": parts }]),
    );
    if !generation_config.is_empty() {
        payload.insert(
            "generationConfig".to_string(),
            Value::Object(generation_config),
        );
    }
    Value::Object(payload)
}

/// Text parts are concatenated in order; inline images are decoded.
pub(crate) fn parse_response(model: &str, body: &Value) -> Result<ModelResponse, UpstreamError> {
    if let Some(reason) = body
        .get("promptFeedback")
        .and_then(|feedback| feedback.get("blockReason"))
        .and_then(Value::as_str)
    {
        return Err(UpstreamError::fatal(
            model,
            format!("prompt blocked: {reason}"),
        ));
    }

    let candidates = body
        .get("candidates")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    let mut out = ModelResponse::default();
    for candidate in candidates {
        let parts = candidate
            .get("content")
            .and_then(|content| content.get("parts"))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        for part in parts {
            if let Some(text) = part.get("text").and_then(Value::as_str) {
                out.text.push_str(text);
                continue;
            }
            let Some(inline) = part
                .get("inlineData")
                .or_else(|| part.get("inline_data"))
                .and_then(Value::as_object)
            else {
                continue;
            };
            let data = inline.get("data").and_then(Value::as_str).unwrap_or_default();
            if data.is_empty() {
                continue;
            }
            let bytes = BASE64.decode(data.as_bytes()).map_err(|err| {
                UpstreamError::fatal(model, format!("Gemini image base64 decode failed: {err}"))
            })?;
            let mime_type = inline
                .get("mimeType")
                .or_else(|| inline.get("mime_type"))
                .and_then(Value::as_str)
                .unwrap_or("image/png")
                .to_string();
            out.images.push(InlineImage {
                mime_type,
                data: bytes,
            });
        }
    }
    Ok(out)
}

/// Builds the error for a non-success HTTP response. The upstream status
/// string (e.g. `RESOURCE_EXHAUSTED`) is kept in the message so the
/// classification sees it.
pub(crate) fn error_from_body(model: &str, code: u16, body: &str) -> UpstreamError {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let detail = parsed.as_ref().and_then(|value| value.get("error"));
    let message = match detail {
        Some(error) => {
            let status = error.get("status").and_then(Value::as_str).unwrap_or("");
            let text = error.get("message").and_then(Value::as_str).unwrap_or("");
            match (status.is_empty(), text.is_empty()) {
                (false, false) => format!("{status}: {text}"),
                (false, true) => status.to_string(),
                (true, false) => text.to_string(),
                (true, true) => truncate_text(body, 512),
            }
        }
        None => truncate_text(body, 512),
    };
    UpstreamError::classified(model, Some(code), message)
}

fn response_json_or_error(model: &str, response: HttpResponse) -> Result<Value, UpstreamError> {
    let status = response.status();
    let code = status.as_u16();
    let body = response.text().map_err(|err| {
        UpstreamError::fatal(model, format!("Gemini response body read failed: {err}"))
    })?;
    if !status.is_success() {
        return Err(error_from_body(model, code, &body));
    }
    serde_json::from_str(&body).map_err(|err| {
        UpstreamError::fatal(model, format!("Gemini returned invalid JSON payload: {err}"))
    })
}

fn truncate_text(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= max_chars {
        return trimmed.to_string();
    }
    let mut out: String = trimmed.chars().take(max_chars).collect();
    out.push('…');
    out
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::Operation;

    #[test]
    fn endpoint_accepts_bare_and_prefixed_model_names() {
        let service = GeminiService::new("https://example.test/v1beta/", None);
        assert_eq!(
            service.endpoint_for_model("gemini-2.5-flash"),
            "https://example.test/v1beta/models/gemini-2.5-flash:generateContent"
        );
        assert_eq!(
            service.endpoint_for_model("models/gemini-2.5-flash"),
            "https://example.test/v1beta/models/gemini-2.5-flash:generateContent"
        );
    }

    #[test]
    fn json_payload_carries_parts_and_generation_config() {
        let request = ModelRequest::new(Operation::ProductDetails, "gemini-2.5-flash")
            .image(InlineImage {
                mime_type: "image/jpeg".to_string(),
                data: b"jpg".to_vec(),
            })
            .text("Describe this product")
            .format(ResponseFormat::Json)
            .max_output_tokens(4000);
        let payload = build_payload(&request);

        let parts = &payload["contents"][0]["parts"];
        assert_eq!(parts[0]["inlineData"]["mimeType"], json!("image/jpeg"));
        assert_eq!(parts[0]["inlineData"]["data"], json!("anBn"));
        assert_eq!(parts[1]["text"], json!("Describe this product"));
        assert_eq!(
            payload["generationConfig"]["responseMimeType"],
            json!("application/json")
        );
        assert_eq!(payload["generationConfig"]["maxOutputTokens"], json!(4000));
    }

    #[test]
    fn image_payload_requests_image_modality() {
        let request = ModelRequest::new(Operation::Logo, "gemini-2.5-flash-image")
            .text("Minimalist vector logo")
            .format(ResponseFormat::Image);
        let payload = build_payload(&request);
        assert_eq!(
            payload["generationConfig"]["responseModalities"],
            json!(["TEXT", "IMAGE"])
        );
        assert!(payload["generationConfig"].get("maxOutputTokens").is_none());
    }

    #[test]
    fn response_text_and_images_are_collected() -> anyhow::Result<()> {
        let body = json!({
            "candidates": [{
                "content": {"parts": [
                    {"text": "{\"storeName\":"},
                    {"text": "\"Volt\"}"},
                    {"inlineData": {"mimeType": "image/png", "data": "cG5n"}}
                ]}
            }]
        });
        let response = parse_response("gemini-2.5-flash", &body)?;
        assert_eq!(response.text, "{\"storeName\":\"Volt\"}");
        assert_eq!(response.images.len(), 1);
        assert_eq!(response.images[0].data, b"png".to_vec());
        Ok(())
    }

    #[test]
    fn blocked_prompt_is_fatal() {
        let body = json!({"promptFeedback": {"blockReason": "SAFETY"}});
        let err = parse_response("gemini-2.5-flash", &body).unwrap_err();
        assert!(!err.is_transient());
        assert!(err.to_string().contains("SAFETY"));
    }

    #[test]
    fn error_bodies_are_classified() {
        let quota = error_from_body(
            "gemini-2.5-flash",
            429,
            r#"{"error":{"code":429,"status":"RESOURCE_EXHAUSTED","message":"Quota exceeded"}}"#,
        );
        assert!(quota.is_transient());
        assert_eq!(quota.status(), Some(429));

        let overloaded = error_from_body("gemini-2.5-flash", 503, "Service Unavailable");
        assert!(overloaded.is_transient());

        let invalid = error_from_body(
            "gemini-2.5-flash",
            400,
            r#"{"error":{"code":400,"status":"INVALID_ARGUMENT","message":"bad image"}}"#,
        );
        assert!(!invalid.is_transient());
        assert!(invalid.to_string().contains("INVALID_ARGUMENT: bad image"));
    }

    #[test]
    fn missing_api_key_fails_without_network() {
        let service = GeminiService::new(DEFAULT_API_BASE, None);
        let err = service
            .generate(&ModelRequest::new(Operation::BrandStrategy, "gemini-2.5-flash"))
            .unwrap_err();
        assert!(!err.is_transient());
        assert!(err.to_string().contains("GEMINI_API_KEY"));
    }
}
