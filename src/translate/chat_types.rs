//! The vendor-neutral request and response shapes spoken on `/chat`.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::config::ChatDefaults;
use crate::error::{ProxyError, Result};

// ---------------------------------------------------------------------------
// Request types (what callers send us)
// ---------------------------------------------------------------------------

/// One conversation turn. Decoded leniently: whatever the caller sent is kept
/// so the OpenAI adapter can forward it untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ChatTurn {
    pub fn new(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: Some(role.to_string()),
            content: Some(Value::String(content.into())),
            extra: Map::new(),
        }
    }

    /// Non-object entries and non-string roles degrade to an empty turn instead of failing.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(mut obj) => {
                let role = match obj.remove("role") {
                    Some(Value::String(r)) => Some(r),
                    _ => None,
                };
                let content = obj.remove("content").filter(|c| !c.is_null());
                Self {
                    role,
                    content,
                    extra: obj,
                }
            }
            _ => Self::default(),
        }
    }

    pub fn is_assistant(&self) -> bool {
        self.role.as_deref() == Some("assistant")
    }

    /// Content as plain text, missing as `""`. See [`coerce_text`].
    pub fn text(&self) -> String {
        self.content.as_ref().map(coerce_text).unwrap_or_default()
    }
}

/// Render a JSON value the way a browser client would stringify it:
/// integral numbers without a fraction, arrays comma-joined, objects opaque.
pub fn coerce_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::String(s) => s.clone(),
        Value::Number(n) => match n.as_f64() {
            Some(f) if n.is_f64() && f == 0.0 => "0".to_string(),
            Some(f) if n.is_f64() && f.fract() == 0.0 && f.abs() < 1e21 => format!("{f:.0}"),
            _ => n.to_string(),
        },
        Value::Array(items) => items.iter().map(coerce_text).collect::<Vec<_>>().join(","),
        Value::Object(_) => "[object Object]".to_string(),
    }
}

/// `deserialize_with` helper: an explicit `null` decodes like a missing field.
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// How strictly an adapter checks the `messages` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessagesRule {
    /// Must be an array; `[]` is forwarded as-is.
    Present,
    /// Must be a non-empty array.
    NonEmpty,
}

impl MessagesRule {
    pub fn rejection(self) -> &'static str {
        match self {
            Self::Present => "Request must include a messages array",
            Self::NonEmpty => "Request must include a non-empty messages array",
        }
    }

    fn accepts(self, messages: &[Value]) -> bool {
        match self {
            Self::Present => true,
            Self::NonEmpty => !messages.is_empty(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatRequest {
    pub messages: Vec<ChatTurn>,
    pub system: Option<String>,
    pub model: Option<String>,
    pub temperature: Option<f64>,
}

impl ChatRequest {
    /// Validate and pick apart an already-normalized body.
    /// Fields of the wrong JSON type are treated as absent, except that an
    /// explicit `"system": null` disables the system prompt.
    pub fn from_value(body: Value, rule: MessagesRule) -> Result<Self> {
        let mut obj = match body {
            Value::Object(obj) => obj,
            _ => Map::new(),
        };

        let messages = match obj.remove("messages") {
            Some(Value::Array(items)) if rule.accepts(&items) => items,
            _ => return Err(ProxyError::invalid_request(rule.rejection())),
        };

        let system = if matches!(obj.get("system"), Some(Value::Null)) {
            Some(String::new())
        } else {
            take_string(&mut obj, "system")
        };

        Ok(Self {
            messages: messages.into_iter().map(ChatTurn::from_value).collect(),
            system,
            model: take_string(&mut obj, "model"),
            temperature: obj.get("temperature").and_then(Value::as_f64),
        })
    }

    /// Fill in whatever the caller left out. An empty system prompt counts as none.
    pub fn resolve(self, defaults: &ChatDefaults, default_model: &str) -> ResolvedChat {
        let system = self
            .system
            .or_else(|| defaults.system.clone())
            .filter(|s| !s.is_empty());

        ResolvedChat {
            model: self.model.unwrap_or_else(|| default_model.to_string()),
            temperature: self.temperature.unwrap_or(defaults.temperature),
            system,
            messages: self.messages,
        }
    }
}

fn take_string(obj: &mut Map<String, Value>, key: &str) -> Option<String> {
    match obj.remove(key) {
        Some(Value::String(s)) => Some(s),
        _ => None,
    }
}

/// A chat request with every default applied, ready for an adapter.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedChat {
    pub model: String,
    pub temperature: f64,
    pub system: Option<String>,
    pub messages: Vec<ChatTurn>,
}

// ---------------------------------------------------------------------------
// Response types (what callers get back)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorBody {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn method_not_allowed() -> Self {
        Self::new("Method Not Allowed")
    }

    pub fn upstream(details: impl Into<String>) -> Self {
        Self::new("Upstream error").with_details(details)
    }

    pub fn server(details: impl Into<String>) -> Self {
        Self::new("Server error").with_details(details)
    }
}
