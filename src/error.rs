// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for candle-mm-encode.

/// Errors that can occur while encoding multimodal samples.
#[derive(Debug, thiserror::Error)]
pub enum MMError {
    /// Tensor construction or conversion error (wraps candle).
    #[error("tensor error: {0}")]
    Tensor(#[from] candle_core::Error),

    /// Tokenizer loading, encoding, or decoding error.
    #[error("tokenizer error: {0}")]
    Tokenizer(String),

    /// Sample configuration parsing error.
    #[error("config error: {0}")]
    Config(String),

    /// Conversation or chat template error.
    #[error("template error: {0}")]
    Template(String),

    /// Malformed input or output sample.
    #[error("sample error: {0}")]
    Sample(String),

    /// ARPA parsing or lexicon writing error.
    #[error("lexicon error: {0}")]
    Lexicon(String),

    /// I/O error.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Result type alias for candle-mm-encode operations.
pub type Result<T> = std::result::Result<T, MMError>;
