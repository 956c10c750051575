//! Adapter for the Gemini `generateContent` API.
//!
//! Gemini has no `assistant` role and takes a flat `contents` list. The system
//! prompt goes out as a leading user turn tagged `(system)`, not through
//! `systemInstruction`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::chat_types::{coerce_text, null_as_default, MessagesRule, ResolvedChat};
use super::ChatAdapter;
use crate::error::{ProxyError, Result};

// ---------------------------------------------------------------------------
// Request types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    pub contents: Vec<Content>,
    pub generation_config: GenerationConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Content {
    pub role: String,
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Part {
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    pub temperature: f64,
}

impl Content {
    fn text(role: &str, text: String) -> Self {
        Self {
            role: role.to_string(),
            parts: vec![Part { text }],
        }
    }
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

/// Parts are kept as raw JSON: a `null` part must not fail decoding, it only
/// disables concatenation (see [`GenerateContentResponse::text`]).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GenerateContentResponse {
    #[serde(default, deserialize_with = "null_as_default")]
    pub candidates: Vec<Option<Candidate>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Candidate {
    #[serde(default)]
    pub content: Option<CandidateContent>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CandidateContent {
    #[serde(default)]
    pub parts: Option<Vec<Value>>,
}

impl GenerateContentResponse {
    /// Text of the first candidate: all parts joined, else the first part, else `""`.
    pub fn text(&self) -> String {
        let Some(parts) = self
            .candidates
            .first()
            .and_then(Option::as_ref)
            .and_then(|c| c.content.as_ref())
            .and_then(|c| c.parts.as_deref())
        else {
            return String::new();
        };

        joined_parts(parts)
            .or_else(|| parts.first()?.get("text").map(coerce_text))
            .unwrap_or_default()
    }
}

/// Concatenate every part's text; a part with no text adds nothing.
/// Gives up (`None`) on a null part.
fn joined_parts(parts: &[Value]) -> Option<String> {
    parts
        .iter()
        .map(|p| {
            if p.is_null() {
                None
            } else {
                Some(p.get("text").map(coerce_text).unwrap_or_default())
            }
        })
        .collect()
}

/// Translate a resolved chat into a `generateContent` request.
pub fn to_generate_content(chat: &ResolvedChat) -> GenerateContentRequest {
    let mut contents = Vec::with_capacity(chat.messages.len() + 1);

    if let Some(ref system) = chat.system {
        contents.push(Content::text("user", format!("(system) {system}")));
    }

    for turn in &chat.messages {
        let role = if turn.is_assistant() { "model" } else { "user" };
        contents.push(Content::text(role, turn.text()));
    }

    GenerateContentRequest {
        contents,
        generation_config: GenerationConfig {
            temperature: chat.temperature,
        },
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GeminiAdapter;

impl ChatAdapter for GeminiAdapter {
    fn name(&self) -> &'static str {
        "gemini"
    }

    fn messages_rule(&self) -> MessagesRule {
        MessagesRule::NonEmpty
    }

    fn build_payload(&self, chat: &ResolvedChat) -> Result<Value> {
        Ok(serde_json::to_value(to_generate_content(chat))?)
    }

    fn endpoint(&self, base_url: &str, model: &str) -> String {
        format!(
            "{}/models/{}:generateContent",
            base_url.trim_end_matches('/'),
            model
        )
    }

    fn authorize(&self, request: reqwest::RequestBuilder, api_key: &str) -> reqwest::RequestBuilder {
        request.query(&[("key", api_key)])
    }

    fn extract_content(&self, body: &str) -> Result<String> {
        let resp: GenerateContentResponse = serde_json::from_str(body).map_err(|e| {
            ProxyError::translation(format!("Failed to parse provider response: {e}"))
        })?;
        Ok(resp.text())
    }
}
