//! Translation between the relay's uniform chat shape and each upstream API.
//!
//! Every upstream format is a [`ChatAdapter`]. The proxy pipeline is written
//! once against the trait; the adapters only know how to shape a payload,
//! where to send it, and how to dig the generated text back out. All of it is
//! pure: no I/O happens here.

pub mod body;
pub mod chat_types;
pub mod gemini;
pub mod openai;

use std::sync::Arc;

use crate::error::Result;
use crate::providers::ApiFormat;
use chat_types::{MessagesRule, ResolvedChat};

pub trait ChatAdapter: Send + Sync {
    fn name(&self) -> &'static str;

    fn messages_rule(&self) -> MessagesRule;

    /// Build the JSON body posted upstream.
    fn build_payload(&self, chat: &ResolvedChat) -> Result<serde_json::Value>;

    /// Full URL for a completion call against `base_url`.
    fn endpoint(&self, base_url: &str, model: &str) -> String;

    /// Attach the API key the way the vendor expects it.
    fn authorize(&self, request: reqwest::RequestBuilder, api_key: &str) -> reqwest::RequestBuilder;

    /// Pull the generated text out of a successful response body.
    fn extract_content(&self, body: &str) -> Result<String>;
}

#[must_use]
pub fn adapter_for(format: ApiFormat) -> Arc<dyn ChatAdapter> {
    match format {
        ApiFormat::OpenAi => Arc::new(openai::OpenAiAdapter),
        ApiFormat::Gemini => Arc::new(gemini::GeminiAdapter),
    }
}
