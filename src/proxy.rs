use crate::error::{ProxyError, Result};
use crate::logging::{LogLevel, SharedLogger};
use crate::translate::chat_types::{ChatResponse, ErrorBody, ResolvedChat};
use crate::translate::ChatAdapter;

use serde_json::json;
use uuid::Uuid;

/// Outcome of one upstream call that got an HTTP response back.
#[derive(Debug, Clone, PartialEq)]
pub enum ProxyResult {
    Success(ChatResponse),
    /// Upstream refused: its status and raw body are handed back to the caller.
    Error(ErrorBody, u16),
}

/// Everything needed to reach the configured upstream.
pub struct Upstream<'a> {
    pub adapter: &'a dyn ChatAdapter,
    pub client: &'a reqwest::Client,
    pub base_url: &'a str,
    pub api_key: &'a str,
}

/// Forward one chat through the adapter. Exactly one attempt is made.
pub async fn proxy_chat(
    request_id: Uuid,
    chat: &ResolvedChat,
    upstream: &Upstream<'_>,
    logger: &SharedLogger,
) -> Result<ProxyResult> {
    let adapter = upstream.adapter;
    let url = adapter.endpoint(upstream.base_url, &chat.model);
    let payload = adapter.build_payload(chat)?;

    tracing::info!(
        %request_id,
        provider = adapter.name(),
        model = %chat.model,
        turns = chat.messages.len(),
        "POST {}",
        url
    );

    let request = upstream
        .client
        .post(&url)
        .header("Content-Type", "application/json")
        .json(&payload);

    let response = adapter
        .authorize(request, upstream.api_key)
        .send()
        .await
        .map_err(|e| ProxyError::provider(format!("Request failed: {}", e)))?;

    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| ProxyError::provider(format!("Failed to read response body: {}", e)))?;

    tracing::debug!(%request_id, status = status.as_u16(), body_len = body.len(), "Upstream responded");

    if !status.is_success() {
        tracing::warn!(%request_id, status = status.as_u16(), "Upstream error: {}", truncate(&body, 300));
        logger.request(
            request_id,
            LogLevel::Warn,
            "proxy",
            "Upstream error",
            json!({
                "provider": adapter.name(),
                "model": chat.model,
                "status": status.as_u16(),
                "details": truncate(&body, 500),
            }),
        );
        return Ok(ProxyResult::Error(ErrorBody::upstream(body), status.as_u16()));
    }

    let content = match adapter.extract_content(&body) {
        Ok(content) => content,
        Err(e) => {
            tracing::warn!(%request_id, "Unreadable upstream body: {}", truncate(&body, 300));
            return Err(e);
        }
    };

    logger.request(
        request_id,
        LogLevel::Info,
        "proxy",
        "Completed",
        json!({
            "provider": adapter.name(),
            "model": chat.model,
            "turns": chat.messages.len(),
            "content_len": content.len(),
        }),
    );

    Ok(ProxyResult::Success(ChatResponse { content }))
}

/// Cut `s` to at most `max` bytes without splitting a character.
fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
