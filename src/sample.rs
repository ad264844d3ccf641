// SPDX-License-Identifier: MIT OR Apache-2.0

//! Input and output records of the sample encoder.
//!
//! - [`VqaSample`] — one visual question answering example: an image plus
//!   one or more question/answer turns.
//! - [`ImageTextSample`] — the encoded result: shifted tokens and labels,
//!   loss mask, vision mask, and preprocessed image tensors.
//! - [`ImageProcessor`] — seam for the external image preprocessing step.

use candle_core::{Device, Tensor};

use crate::error::Result;
use crate::util::masks::VisionMask;

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

/// Question or answer text of a sample.
///
/// Context and answers of one sample must use the same shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Conversation {
    /// A single turn.
    Single(String),
    /// Several turns, paired positionally with the other side.
    Turns(Vec<String>),
}

impl Conversation {
    /// The turns as a slice of strings.
    pub fn as_slice(&self) -> &[String] {
        match self {
            Self::Single(text) => std::slice::from_ref(text),
            Self::Turns(turns) => turns,
        }
    }
}

impl From<&str> for Conversation {
    fn from(text: &str) -> Self {
        Self::Single(text.to_owned())
    }
}

impl From<String> for Conversation {
    fn from(text: String) -> Self {
        Self::Single(text)
    }
}

impl From<Vec<String>> for Conversation {
    fn from(turns: Vec<String>) -> Self {
        Self::Turns(turns)
    }
}

/// A visual question answering sample.
#[derive(Debug, Clone)]
pub struct VqaSample {
    /// Sample key, carried through to the output.
    pub key: String,
    /// Raw image handed to the [`ImageProcessor`].
    pub image: Tensor,
    /// Questions (user side).
    pub context: Conversation,
    /// Answers (assistant side).
    pub answers: Conversation,
}

// ---------------------------------------------------------------------------
// Image preprocessing seam
// ---------------------------------------------------------------------------

/// Batched output of an [`ImageProcessor`].
///
/// Every tensor carries a leading batch dimension; the encoder keeps the
/// first entry.
#[derive(Debug, Clone)]
pub struct ProcessedImage {
    /// Tiled pixel values, `[batch, ...]`.
    pub pixel_values: Tensor,
    /// Aspect ratio ids, `[batch, ...]`.
    pub aspect_ratio_ids: Tensor,
    /// Aspect ratio mask, `[batch, ...]`.
    pub aspect_ratio_mask: Tensor,
    /// Number of tiles per batch entry.
    pub num_tiles: Vec<usize>,
}

/// Turns a raw image into model-ready tensors.
pub trait ImageProcessor: Send + Sync {
    /// Preprocess one image.
    ///
    /// # Errors
    ///
    /// Implementations return [`MMError::Tensor`](crate::MMError::Tensor) or
    /// [`MMError::Sample`](crate::MMError::Sample) when the image cannot be
    /// processed.
    fn preprocess(&self, image: &Tensor) -> Result<ProcessedImage>;
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

/// An encoded image-text training sample.
///
/// `tokens`, `labels` and `loss_mask` have the same length: the input
/// sequence minus one, with labels shifted left by one position.
#[derive(Debug, Clone)]
pub struct ImageTextSample {
    /// Key of the source sample.
    pub key: String,
    /// Pixel values of the (first) processed image.
    pub images: Tensor,
    /// Aspect ratio ids of the image.
    pub aspect_ratio_ids: Tensor,
    /// Aspect ratio mask of the image.
    pub aspect_ratio_mask: Tensor,
    /// Number of tiles of the image.
    pub num_tiles: usize,
    /// Input token ids.
    pub tokens: Vec<u32>,
    /// Next-token labels; ignored positions hold the configured placeholder.
    pub labels: Vec<i64>,
    /// `1.0` where the label contributes to the loss, `0.0` elsewhere.
    pub loss_mask: Vec<f32>,
    /// Regions of `tokens` attending to the image.
    pub vision_mask: VisionMask,
}

impl ImageTextSample {
    /// Number of input tokens.
    pub const fn seq_len(&self) -> usize {
        self.tokens.len()
    }

    /// Tokens as a `u32` tensor of shape `[seq_len]`.
    ///
    /// # Errors
    ///
    /// Returns [`MMError::Tensor`](crate::MMError::Tensor) on tensor construction failure.
    pub fn tokens_tensor(&self, device: &Device) -> Result<Tensor> {
        Ok(Tensor::new(self.tokens.as_slice(), device)?)
    }

    /// Labels as an `i64` tensor of shape `[seq_len]`.
    ///
    /// # Errors
    ///
    /// Returns [`MMError::Tensor`](crate::MMError::Tensor) on tensor construction failure.
    pub fn labels_tensor(&self, device: &Device) -> Result<Tensor> {
        Ok(Tensor::new(self.labels.as_slice(), device)?)
    }

    /// Loss mask as an `f32` tensor of shape `[seq_len]`.
    ///
    /// # Errors
    ///
    /// Returns [`MMError::Tensor`](crate::MMError::Tensor) on tensor construction failure.
    pub fn loss_mask_tensor(&self, device: &Device) -> Result<Tensor> {
        Ok(Tensor::new(self.loss_mask.as_slice(), device)?)
    }

    /// Vision mask as an `i64` tensor of shape `[num_regions, 2]`.
    ///
    /// # Errors
    ///
    /// See [`VisionMask::to_tensor`].
    pub fn vision_mask_tensor(&self, device: &Device) -> Result<Tensor> {
        self.vision_mask.to_tensor(device)
    }
}
