//! Adapter for [OpenAI Chat Completions](https://platform.openai.com/docs/api-reference/chat)
//! and the many providers that clone it.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::chat_types::{coerce_text, null_as_default, ChatTurn, MessagesRule, ResolvedChat};
use super::ChatAdapter;
use crate::error::{ProxyError, Result};

// ---------------------------------------------------------------------------
// Request types (what we send TO the provider)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatTurn>,
    pub temperature: f64,
}

// ---------------------------------------------------------------------------
// Response types (what we receive FROM the provider)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatCompletionResponse {
    #[serde(default, deserialize_with = "null_as_default")]
    pub choices: Vec<Option<Choice>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Choice {
    #[serde(default)]
    pub message: Option<ChoiceMessage>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChoiceMessage {
    #[serde(default)]
    pub content: Option<Value>,
}

impl ChatCompletionResponse {
    /// `choices[0].message.content`, empty when any link is missing.
    pub fn text(&self) -> String {
        self.choices
            .first()
            .and_then(Option::as_ref)
            .and_then(|c| c.message.as_ref())
            .and_then(|m| m.content.as_ref())
            .map(coerce_text)
            .unwrap_or_default()
    }
}

/// Translate a resolved chat into a Chat Completions request.
/// The system prompt, if any, becomes a leading `system` message; turns pass through as sent.
pub fn to_chat_completion(chat: &ResolvedChat) -> ChatCompletionRequest {
    let mut messages = Vec::with_capacity(chat.messages.len() + 1);

    if let Some(ref system) = chat.system {
        messages.push(ChatTurn::new("system", system.clone()));
    }
    messages.extend(chat.messages.iter().cloned());

    ChatCompletionRequest {
        model: chat.model.clone(),
        messages,
        temperature: chat.temperature,
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct OpenAiAdapter;

impl ChatAdapter for OpenAiAdapter {
    fn name(&self) -> &'static str {
        "openai"
    }

    fn messages_rule(&self) -> MessagesRule {
        MessagesRule::Present
    }

    fn build_payload(&self, chat: &ResolvedChat) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(to_chat_completion(chat))?)
    }

    fn endpoint(&self, base_url: &str, _model: &str) -> String {
        format!("{}/chat/completions", base_url.trim_end_matches('/'))
    }

    fn authorize(&self, request: reqwest::RequestBuilder, api_key: &str) -> reqwest::RequestBuilder {
        request.bearer_auth(api_key)
    }

    fn extract_content(&self, body: &str) -> Result<String> {
        let resp: ChatCompletionResponse = serde_json::from_str(body).map_err(|e| {
            ProxyError::translation(format!("Failed to parse provider response: {e}"))
        })?;
        Ok(resp.text())
    }
}
