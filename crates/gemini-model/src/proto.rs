use lumos_model::{
    ErrorKind, GenerationConfig as ModelGenerationConfig, ModelFinishReason,
    ModelMessage, ModelRequest,
};
use serde::{Deserialize, Serialize};

// ------------------------
// Types sent to the server
// ------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct Part {
    pub text: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    pub parts: Vec<Part>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    temperature: f32,
    top_k: u32,
    max_output_tokens: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

// ------------------------------
// Types received from the server
// ------------------------------

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct ResponsePart {
    pub text: Option<String>,
    /// Set on "thinking" parts, which are not part of the reply.
    #[serde(default)]
    pub thought: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct ResponseContent {
    #[serde(default)]
    pub parts: Vec<ResponsePart>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub content: Option<ResponseContent>,
    pub finish_reason: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptFeedback {
    pub block_reason: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    pub prompt_feedback: Option<PromptFeedback>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct ErrorDetail {
    pub reason: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct ApiError {
    pub code: Option<u16>,
    #[serde(default)]
    pub message: String,
    pub status: Option<String>,
    #[serde(default)]
    pub details: Vec<ErrorDetail>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct ErrorEnvelope {
    pub error: ApiError,
}

/// One `data` payload of the event stream.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum StreamPayload {
    Error(ErrorEnvelope),
    Response(GenerateContentResponse),
}

impl GenerateContentResponse {
    /// Returns the reply text carried by the first candidate.
    pub fn text(&self) -> Option<String> {
        let parts = &self.candidates.first()?.content.as_ref()?.parts;
        let text: String = parts
            .iter()
            .filter(|p| !p.thought)
            .filter_map(|p| p.text.as_deref())
            .collect();
        Some(text).filter(|t| !t.is_empty())
    }

    /// Returns why the reply ended, if this chunk ends it.
    pub fn finish_reason(&self) -> Option<ModelFinishReason> {
        if let Some(reason) = self
            .candidates
            .first()
            .and_then(|c| c.finish_reason.as_deref())
        {
            return Some(match reason {
                "STOP" => ModelFinishReason::Stop,
                "MAX_TOKENS" => ModelFinishReason::MaxTokens,
                _ => ModelFinishReason::Blocked,
            });
        }
        // A blocked prompt comes back with feedback and no candidates.
        self.prompt_feedback
            .as_ref()
            .and_then(|f| f.block_reason.as_ref())
            .map(|_| ModelFinishReason::Blocked)
    }
}

// -----------
// Conversions
// -----------

const API_KEY_REASONS: &[&str] = &["API_KEY_INVALID", "API_KEY_EXPIRED"];

/// Maps an HTTP status and the optional Google error body to an
/// [`ErrorKind`].
pub fn classify_error(status: Option<u16>, error: Option<&ApiError>) -> ErrorKind {
    let status = status.or_else(|| error.and_then(|e| e.code));
    let key_reason = error.is_some_and(|e| {
        e.details.iter().any(|d| {
            d.reason
                .as_deref()
                .is_some_and(|r| API_KEY_REASONS.contains(&r))
        })
    });
    let auth_status = error
        .and_then(|e| e.status.as_deref())
        .is_some_and(|s| s == "UNAUTHENTICATED" || s == "PERMISSION_DENIED");

    match status {
        Some(401 | 403) => ErrorKind::AuthRejected,
        _ if key_reason || auth_status => ErrorKind::AuthRejected,
        Some(429) => ErrorKind::RateLimitExceeded,
        _ => ErrorKind::Other,
    }
}

#[inline]
pub fn create_request(req: &ModelRequest) -> GenerateContentRequest {
    GenerateContentRequest {
        system_instruction: req.system_instruction().map(|text| Content {
            role: None,
            parts: vec![Part { text }],
        }),
        contents: req.messages.iter().filter_map(create_content).collect(),
        generation_config: create_generation_config(&req.generation),
    }
}

#[inline]
fn create_content(msg: &ModelMessage) -> Option<Content> {
    let (role, text) = match msg {
        // Carried by `systemInstruction` instead.
        ModelMessage::System(_) => return None,
        ModelMessage::User(text) => (Role::User, text),
        ModelMessage::Model(text) => (Role::Model, text),
    };
    Some(Content {
        role: Some(role),
        parts: vec![Part { text: text.clone() }],
    })
}

#[inline]
fn create_generation_config(config: &ModelGenerationConfig) -> GenerationConfig {
    GenerationConfig {
        temperature: config.temperature,
        top_k: config.top_k,
        max_output_tokens: config.max_output_tokens,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_create_request() {
        let request = ModelRequest {
            messages: vec![
                ModelMessage::System("You are Lumos AI.".to_owned()),
                ModelMessage::User("Hallo".to_owned()),
                ModelMessage::Model("Hallo! Wie kann ich helfen?".to_owned()),
                ModelMessage::User("Preise?".to_owned()),
            ],
            generation: ModelGenerationConfig {
                temperature: 0.5,
                top_k: 40,
                max_output_tokens: 800,
            },
        };
        let body = serde_json::to_value(create_request(&request)).unwrap();
        assert_eq!(
            body,
            json!({
                "systemInstruction": { "parts": [{ "text": "You are Lumos AI." }] },
                "contents": [
                    { "role": "user", "parts": [{ "text": "Hallo" }] },
                    { "role": "model", "parts": [{ "text": "Hallo! Wie kann ich helfen?" }] },
                    { "role": "user", "parts": [{ "text": "Preise?" }] }
                ],
                "generationConfig": {
                    "temperature": 0.5,
                    "topK": 40,
                    "maxOutputTokens": 800
                }
            })
        );
    }

    #[test]
    fn test_decode_stream_payload() {
        let payload: StreamPayload = serde_json::from_value(json!({
            "candidates": [{
                "content": {
                    "role": "model",
                    "parts": [
                        { "text": "planning...", "thought": true },
                        { "text": "Hi" },
                        { "text": " there" }
                    ]
                },
                "finishReason": "STOP",
                "index": 0
            }],
            "usageMetadata": { "totalTokenCount": 12 }
        }))
        .unwrap();
        let StreamPayload::Response(resp) = payload else {
            panic!("expected a response payload");
        };
        assert_eq!(resp.text().as_deref(), Some("Hi there"));
        assert_eq!(resp.finish_reason(), Some(ModelFinishReason::Stop));

        let payload: StreamPayload = serde_json::from_value(json!({
            "promptFeedback": { "blockReason": "SAFETY" }
        }))
        .unwrap();
        let StreamPayload::Response(resp) = payload else {
            panic!("expected a response payload");
        };
        assert_eq!(resp.text(), None);
        assert_eq!(resp.finish_reason(), Some(ModelFinishReason::Blocked));
    }

    #[test]
    fn test_classify_error() {
        let invalid_key: ErrorEnvelope = serde_json::from_value(json!({
            "error": {
                "code": 400,
                "message": "API key not valid. Please pass a valid API key.",
                "status": "INVALID_ARGUMENT",
                "details": [{
                    "@type": "type.googleapis.com/google.rpc.ErrorInfo",
                    "reason": "API_KEY_INVALID",
                    "domain": "googleapis.com"
                }]
            }
        }))
        .unwrap();
        assert_eq!(
            classify_error(Some(400), Some(&invalid_key.error)),
            ErrorKind::AuthRejected
        );

        let bad_request: ErrorEnvelope = serde_json::from_value(json!({
            "error": {
                "code": 400,
                "message": "Invalid JSON payload received.",
                "status": "INVALID_ARGUMENT"
            }
        }))
        .unwrap();
        assert_eq!(
            classify_error(Some(400), Some(&bad_request.error)),
            ErrorKind::Other
        );

        assert_eq!(classify_error(Some(403), None), ErrorKind::AuthRejected);
        assert_eq!(classify_error(Some(401), None), ErrorKind::AuthRejected);
        assert_eq!(classify_error(Some(429), None), ErrorKind::RateLimitExceeded);
        assert_eq!(classify_error(Some(500), None), ErrorKind::Other);
        assert_eq!(classify_error(None, None), ErrorKind::Other);
    }
}
