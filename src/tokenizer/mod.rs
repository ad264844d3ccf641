// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tokenizer wrapper around the `HuggingFace` `tokenizers` crate.
//!
//! [`MMTokenizer`] exposes the few operations the sample encoder and the
//! lexicon builder need: raw encoding (no special tokens), token strings,
//! and vocabulary lookups.

use std::str::FromStr;

use crate::error::{MMError, Result};

/// Text tokenizer used for prompts, answers, and lexicon spellings.
///
/// # Example
///
/// ```no_run
/// use candle_mm_encode::MMTokenizer;
///
/// # fn main() -> candle_mm_encode::Result<()> {
/// let tok = MMTokenizer::from_hf_path("tokenizer.json")?;
/// let (ids, tokens) = tok.encode_raw_with_tokens("Describe the image.")?;
/// assert_eq!(ids.len(), tokens.len());
/// # Ok(())
/// # }
/// ```
#[non_exhaustive]
pub enum MMTokenizer {
    /// `HuggingFace` `tokenizers` backend.
    HuggingFace(Box<tokenizers::Tokenizer>),
}

impl MMTokenizer {
    /// Load a `HuggingFace` tokenizer from a `tokenizer.json` file.
    ///
    /// # Errors
    ///
    /// Returns [`MMError::Tokenizer`] if the file cannot be loaded or parsed.
    pub fn from_hf_path(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let tok = tokenizers::Tokenizer::from_file(path.as_ref()).map_err(|e| {
            MMError::Tokenizer(format!(
                "failed to load HF tokenizer from {}: {e}",
                path.as_ref().display()
            ))
        })?;
        Ok(Self::HuggingFace(Box::new(tok)))
    }

    /// Parse a `HuggingFace` tokenizer from the contents of a `tokenizer.json`.
    ///
    /// # Errors
    ///
    /// Returns [`MMError::Tokenizer`] if the JSON is not a valid tokenizer.
    pub fn from_hf_json(json: &str) -> Result<Self> {
        let tok = tokenizers::Tokenizer::from_str(json)
            .map_err(|e| MMError::Tokenizer(format!("failed to parse HF tokenizer: {e}")))?;
        Ok(Self::HuggingFace(Box::new(tok)))
    }

    /// Encode text into token IDs **without** adding special tokens.
    ///
    /// This is how prompt chunks and answers are tokenized: the chat
    /// template already carries its own control tokens.
    ///
    /// # Errors
    ///
    /// Returns [`MMError::Tokenizer`] if encoding fails.
    pub fn encode_raw(&self, text: &str) -> Result<Vec<u32>> {
        self.encode_raw_with_tokens(text).map(|(ids, _)| ids)
    }

    /// Encode text without special tokens, returning IDs and token strings.
    ///
    /// # Errors
    ///
    /// Returns [`MMError::Tokenizer`] if encoding fails.
    pub fn encode_raw_with_tokens(&self, text: &str) -> Result<(Vec<u32>, Vec<String>)> {
        match self {
            Self::HuggingFace(tok) => {
                let encoding = tok
                    .encode(text, false)
                    .map_err(|e| MMError::Tokenizer(format!("HF encode failed: {e}")))?;
                Ok((encoding.get_ids().to_vec(), encoding.get_tokens().to_vec()))
            }
        }
    }

    /// Look up the ID of a vocabulary entry (including added tokens).
    #[must_use]
    pub fn token_to_id(&self, token: &str) -> Option<u32> {
        match self {
            Self::HuggingFace(tok) => tok.token_to_id(token),
        }
    }
}

impl std::fmt::Debug for MMTokenizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::HuggingFace(_) => f.debug_tuple("HuggingFace").field(&"...").finish(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
