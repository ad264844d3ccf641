// SPDX-License-Identifier: MIT OR Apache-2.0

//! Sample encoder configuration and JSON parsing.
//!
//! [`MultiModalSampleConfig`] bundles the image placeholder token, the label
//! value ignored by the loss, and the conversation settings used to build
//! chat messages.  Defaults target Llama 3.2 Vision.
//!
//! # Usage
//!
//! ```
//! use candle_mm_encode::MultiModalSampleConfig;
//!
//! let json: serde_json::Value = serde_json::from_str(r#"{
//!     "image_token": { "token_str": "<image>", "token_id": 32000 },
//!     "conversation_template_config": { "system": "You are helpful." }
//! }"#).unwrap();
//! let config = MultiModalSampleConfig::from_json(&json).unwrap();
//! assert_eq!(config.image_token.token_id, 32000);
//! assert_eq!(config.ignore_place_holder, -100);
//! ```

use std::fmt;

use serde_json::Value;

use crate::error::{MMError, Result};

/// Default image placeholder string (Llama 3.2 Vision).
pub const DEFAULT_IMAGE_TOKEN_STR: &str = "<|image|>";
/// Default image placeholder id (Llama 3.2 Vision).
pub const DEFAULT_IMAGE_TOKEN_ID: u32 = 128_256;
/// Default label value excluded from the loss.
pub const DEFAULT_IGNORE_PLACE_HOLDER: i64 = -100;
/// Default end-of-turn string appended to answers when locating labels.
pub const DEFAULT_STOP_STRING: &str = "<|eot_id|>";

// ---------------------------------------------------------------------------
// ImageToken
// ---------------------------------------------------------------------------

/// Placeholder token standing in for an image in the prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageToken {
    /// Literal string marking the image in rendered prompts.
    pub token_str: String,
    /// Token id substituted for each occurrence of [`token_str`](Self::token_str).
    pub token_id: u32,
}

impl Default for ImageToken {
    fn default() -> Self {
        Self {
            token_str: DEFAULT_IMAGE_TOKEN_STR.to_owned(),
            token_id: DEFAULT_IMAGE_TOKEN_ID,
        }
    }
}

impl fmt::Display for ImageToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.token_str, self.token_id)
    }
}

// ---------------------------------------------------------------------------
// ConversationTemplateConfig
// ---------------------------------------------------------------------------

/// Conversation settings used when building chat messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationTemplateConfig {
    /// Optional system prompt placed before the first turn.
    pub system: Option<String>,
    /// Role names for the asking and answering side, in that order.
    pub roles: [String; 2],
    /// End-of-turn string the template emits after each answer.
    ///
    /// Appended to answers before tokenizing them so that the model also
    /// learns to stop.
    pub stop_string: Option<String>,
}

impl Default for ConversationTemplateConfig {
    fn default() -> Self {
        Self {
            system: None,
            roles: ["user".to_owned(), "assistant".to_owned()],
            stop_string: Some(DEFAULT_STOP_STRING.to_owned()),
        }
    }
}

impl ConversationTemplateConfig {
    /// Parse from a JSON object; absent fields keep their defaults.
    ///
    /// `"stop_string": null` disables the stop string.
    ///
    /// # Errors
    ///
    /// Returns [`MMError::Config`] if a field has the wrong type or
    /// `roles` does not hold exactly two strings.
    pub fn from_json(config: &Value) -> Result<Self> {
        let defaults = Self::default();

        let roles = match config.get("roles") {
            None => defaults.roles,
            Some(value) => parse_roles(value)?,
        };
        let stop_string = match config.get("stop_string") {
            None => defaults.stop_string,
            Some(Value::Null) => None,
            Some(_) => Some(get_str(config, "stop_string")?),
        };

        Ok(Self {
            system: get_optional_str(config, "system")?,
            roles,
            stop_string,
        })
    }
}

fn parse_roles(value: &Value) -> Result<[String; 2]> {
    let items = value
        .as_array()
        .ok_or_else(|| MMError::Config("field 'roles' must be an array".into()))?;
    match items.as_slice() {
        [first, second] => {
            let as_role = |v: &Value| {
                v.as_str()
                    .map(str::to_owned)
                    .ok_or_else(|| MMError::Config("roles must be strings".into()))
            };
            Ok([as_role(first)?, as_role(second)?])
        }
        other => Err(MMError::Config(format!(
            "field 'roles' must hold exactly 2 entries, got {}",
            other.len()
        ))),
    }
}

// ---------------------------------------------------------------------------
// MultiModalSampleConfig
// ---------------------------------------------------------------------------

/// Configuration for encoding image-text samples.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultiModalSampleConfig {
    /// Image placeholder token.
    pub image_token: ImageToken,
    /// Label value for positions that do not contribute to the loss.
    pub ignore_place_holder: i64,
    /// Conversation settings.
    pub conversation_template_config: ConversationTemplateConfig,
}

impl Default for MultiModalSampleConfig {
    fn default() -> Self {
        Self {
            image_token: ImageToken::default(),
            ignore_place_holder: DEFAULT_IGNORE_PLACE_HOLDER,
            conversation_template_config: ConversationTemplateConfig::default(),
        }
    }
}

impl MultiModalSampleConfig {
    /// Parse a [`MultiModalSampleConfig`] from a JSON value.
    ///
    /// Every field is optional and falls back to the Llama 3.2 Vision
    /// defaults.
    ///
    /// # Errors
    ///
    /// Returns [`MMError::Config`] if the value is not an object or a
    /// present field has the wrong type.
    pub fn from_json(config: &Value) -> Result<Self> {
        if !config.is_object() {
            return Err(MMError::Config("sample config must be a JSON object".into()));
        }

        let image_token = match config.get("image_token") {
            None => ImageToken::default(),
            Some(token) => ImageToken {
                token_str: get_str_or(token, "token_str", DEFAULT_IMAGE_TOKEN_STR)?,
                token_id: get_u32_or(token, "token_id", DEFAULT_IMAGE_TOKEN_ID)?,
            },
        };
        let conversation_template_config = match config.get("conversation_template_config") {
            None => ConversationTemplateConfig::default(),
            Some(conv) => ConversationTemplateConfig::from_json(conv)?,
        };

        Ok(Self {
            image_token,
            ignore_place_holder: get_i64_or(
                config,
                "ignore_place_holder",
                DEFAULT_IGNORE_PLACE_HOLDER,
            )?,
            conversation_template_config,
        })
    }

    /// Parse from a JSON string.
    ///
    /// # Errors
    ///
    /// Returns [`MMError::Config`] on invalid JSON or invalid fields.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(json)
            .map_err(|e| MMError::Config(format!("invalid JSON: {e}")))?;
        Self::from_json(&value)
    }
}

// ---------------------------------------------------------------------------
// JSON extraction helpers
// ---------------------------------------------------------------------------

/// Extract a required string field.
fn get_str(config: &Value, key: &str) -> Result<String> {
    config
        .get(key)
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| MMError::Config(format!("missing or invalid field '{key}'")))
}

/// Extract an optional string field; `null` counts as absent.
fn get_optional_str(config: &Value, key: &str) -> Result<Option<String>> {
    match config.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(_) => get_str(config, key).map(Some),
    }
}

/// Extract a string field, returning a default if absent.
fn get_str_or(config: &Value, key: &str, default: &str) -> Result<String> {
    Ok(get_optional_str(config, key)?.unwrap_or_else(|| default.to_owned()))
}

/// Extract an `i64` field, returning a default if absent.
fn get_i64_or(config: &Value, key: &str, default: i64) -> Result<i64> {
    match config.get(key) {
        None => Ok(default),
        Some(v) => v
            .as_i64()
            .ok_or_else(|| MMError::Config(format!("field '{key}' must be an integer"))),
    }
}

/// Extract a `u32` field, returning a default if absent.
fn get_u32_or(config: &Value, key: &str, default: u32) -> Result<u32> {
    match config.get(key) {
        None => Ok(default),
        Some(v) => {
            let val = v.as_u64().ok_or_else(|| {
                MMError::Config(format!("field '{key}' must be a non-negative integer"))
            })?;
            u32::try_from(val)
                .map_err(|_| MMError::Config(format!("field '{key}' value {val} overflows u32")))
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
