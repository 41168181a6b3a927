//! Wire shapes exchanged with the backend.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Free-form key/value data attached to sensory inputs.
pub type Metadata = Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensoryCategory {
    Text,
    Emotion,
    Audio,
}

impl SensoryCategory {
    pub const ALL: [SensoryCategory; 3] = [
        SensoryCategory::Text,
        SensoryCategory::Emotion,
        SensoryCategory::Audio,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SensoryCategory::Text => "text",
            SensoryCategory::Emotion => "emotion",
            SensoryCategory::Audio => "audio",
        }
    }
}

impl fmt::Display for SensoryCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SensoryCategory {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(SensoryCategory::Text),
            "emotion" => Ok(SensoryCategory::Emotion),
            "audio" => Ok(SensoryCategory::Audio),
            other => Err(Error::Other(format!("unknown sensory category: {}", other))),
        }
    }
}

/// Transcribed speech.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextInput {
    pub text: String,
    #[serde(default)]
    pub metadata: Metadata,
}

impl TextInput {
    pub fn new(text: &str, metadata: Option<Metadata>) -> Self {
        Self {
            text: text.to_string(),
            metadata: metadata.unwrap_or_default(),
        }
    }
}

/// Emotional state on the arousal/valence plane.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmotionInput {
    pub arousal: f64,
    pub valence: f64,
    #[serde(default)]
    pub metadata: Metadata,
}

impl EmotionInput {
    pub fn new(arousal: f64, valence: f64, metadata: Option<Metadata>) -> Self {
        Self {
            arousal,
            valence,
            metadata: metadata.unwrap_or_default(),
        }
    }
}

/// Audio features are forwarded as-is; the backend owns their schema.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AudioFeatures(pub Map<String, Value>);

impl AudioFeatures {
    pub fn new(features: Map<String, Value>) -> Self {
        Self(features)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SensoryPayload {
    Text(TextInput),
    Emotion(EmotionInput),
    Audio(AudioFeatures),
}

impl SensoryPayload {
    pub fn category(&self) -> SensoryCategory {
        match self {
            SensoryPayload::Text(_) => SensoryCategory::Text,
            SensoryPayload::Emotion(_) => SensoryCategory::Emotion,
            SensoryPayload::Audio(_) => SensoryCategory::Audio,
        }
    }
}

/// A backend-issued instruction. `type` selects the handler; every other
/// field is passed through untouched.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Command {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub command_type: Option<String>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Command {
    pub fn new(command_type: &str) -> Self {
        Self {
            command_type: Some(command_type.to_string()),
            fields: Map::new(),
        }
    }

    pub fn with_field(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }

    pub fn kind(&self) -> Option<&str> {
        self.command_type.as_deref()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }

    /// Reinterprets the command as one of the typed views below.
    pub fn parse_as<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.to_value())?)
    }

    pub fn to_value(&self) -> Value {
        let mut map = self.fields.clone();
        if let Some(kind) = &self.command_type {
            map.insert("type".to_string(), Value::String(kind.clone()));
        }
        Value::Object(map)
    }
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeechCommand {
    #[serde(default)]
    pub text: String,
    #[serde(default = "empty_object")]
    pub prosody: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbaCommand {
    #[serde(default)]
    pub strategy: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HidCommand {
    #[serde(default)]
    pub action: String,
}

/// Status map posted to `/api/status`, e.g. `{"type": "speech_complete", "text": "hi"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    #[serde(rename = "type")]
    pub status_type: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl StatusReport {
    pub fn new(status_type: &str) -> Self {
        Self {
            status_type: status_type.to_string(),
            fields: Map::new(),
        }
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }
}

/// What a 2xx backend reply turned into.
///
/// A body that does not parse is reported as a value rather than an error:
/// retrying would not fix it.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendResponse {
    Json(Value),
    InvalidJson { message: String },
}

impl BackendResponse {
    pub const INVALID_JSON: &'static str = "invalid_json";

    pub fn empty() -> Self {
        BackendResponse::Json(empty_object())
    }

    pub fn invalid_json(message: impl Into<String>) -> Self {
        BackendResponse::InvalidJson {
            message: message.into(),
        }
    }

    pub fn is_invalid_json(&self) -> bool {
        matches!(self, BackendResponse::InvalidJson { .. })
    }

    pub fn json(&self) -> Option<&Value> {
        match self {
            BackendResponse::Json(v) => Some(v),
            BackendResponse::InvalidJson { .. } => None,
        }
    }

    /// Renders the response in its wire form; invalid bodies become
    /// `{"error": "invalid_json", "message": ...}`.
    pub fn into_value(self) -> Value {
        match self {
            BackendResponse::Json(v) => v,
            BackendResponse::InvalidJson { message } => serde_json::json!({
                "error": Self::INVALID_JSON,
                "message": message,
            }),
        }
    }
}

impl From<BackendResponse> for Value {
    fn from(resp: BackendResponse) -> Self {
        resp.into_value()
    }
}
