// SPDX-License-Identifier: MIT OR Apache-2.0

//! Llama 3 vision sample encoder.
//!
//! [`Llama3SampleEncoder`] turns a [`VqaSample`] into an
//! [`ImageTextSample`]:
//!
//! 1. build chat messages and render the prompt ([`ChatTemplate`])
//! 2. tokenize, substituting the image token id for each placeholder
//! 3. label the answer spans, everything else gets the ignore value
//! 4. shift tokens and labels for next-token prediction
//! 5. derive the loss mask and the [`VisionMask`]
//! 6. preprocess the image ([`ImageProcessor`])

use candle_core::Tensor;
use tracing::{debug, warn};

use crate::config::MultiModalSampleConfig;
use crate::error::{MMError, Result};
use crate::sample::{ImageProcessor, ImageTextSample, ProcessedImage, VqaSample};
use crate::template::{ChatTemplate, Llama3ChatTemplate, build_messages};
use crate::tokenizer::MMTokenizer;
use crate::util::masks::{VisionMask, VisionMaskBuilder};
use crate::util::positioning::{TextSegment, find_pattern, split_on_marker};

/// Encoder for Llama 3.2 Vision style image-text samples.
pub struct Llama3SampleEncoder {
    tokenizer: MMTokenizer,
    image_processor: Box<dyn ImageProcessor>,
    chat_template: Box<dyn ChatTemplate>,
    config: MultiModalSampleConfig,
    vision_masks: VisionMaskBuilder,
}

impl Llama3SampleEncoder {
    /// Create an encoder using the [`Llama3ChatTemplate`].
    pub fn new(
        tokenizer: MMTokenizer,
        image_processor: impl ImageProcessor + 'static,
        config: MultiModalSampleConfig,
    ) -> Self {
        let vision_masks = VisionMaskBuilder::new(config.image_token.token_id);
        Self {
            tokenizer,
            image_processor: Box::new(image_processor),
            chat_template: Box::new(Llama3ChatTemplate),
            config,
            vision_masks,
        }
    }

    /// Replace the chat template.
    #[must_use]
    pub fn with_chat_template(mut self, template: impl ChatTemplate + 'static) -> Self {
        self.chat_template = Box::new(template);
        self
    }

    /// The encoder configuration.
    pub const fn config(&self) -> &MultiModalSampleConfig {
        &self.config
    }

    /// The text tokenizer.
    pub const fn tokenizer(&self) -> &MMTokenizer {
        &self.tokenizer
    }

    /// Render the conversation of `sample` into a prompt string.
    ///
    /// # Errors
    ///
    /// Returns [`MMError::Template`] if the sample's context and answers
    /// have different shapes or the template fails.
    pub fn apply_prompt_template(&self, sample: &VqaSample) -> Result<String> {
        debug!(
            context = ?sample.context,
            answers = ?sample.answers,
            "apply prompt template"
        );
        let messages = build_messages(
            &self.config.conversation_template_config,
            &sample.context,
            &sample.answers,
        )?;
        let prompt = self.chat_template.render(&messages)?;
        debug!(%prompt, "templated prompt");
        Ok(prompt)
    }

    /// Tokenize a rendered prompt.
    ///
    /// Each image placeholder string becomes exactly one image token id;
    /// the text between placeholders is tokenized without special tokens.
    ///
    /// # Errors
    ///
    /// Returns [`MMError::Tokenizer`] if encoding a text chunk fails.
    pub fn tokenize(&self, prompt: &str) -> Result<Vec<u32>> {
        let image_token = &self.config.image_token;
        let mut tokens = Vec::new();
        for segment in split_on_marker(prompt, &image_token.token_str) {
            match segment {
                TextSegment::Marker => tokens.push(image_token.token_id),
                TextSegment::Text(text) => tokens.extend(self.tokenizer.encode_raw(text)?),
            }
        }
        Ok(tokens)
    }

    /// Label the answer spans of `tokens`.
    ///
    /// Each answer (followed by the stop string) is searched after the end
    /// of the previous match; matched positions take their token id as
    /// label, all others the ignore placeholder.  Answers that cannot be
    /// located are skipped with a warning.
    ///
    /// # Errors
    ///
    /// Returns [`MMError::Tokenizer`] if an answer cannot be tokenized.
    pub fn compute_labels(&self, tokens: &[u32], sample: &VqaSample) -> Result<Vec<i64>> {
        let mut labels = vec![self.config.ignore_place_holder; tokens.len()];
        let stop_string = self
            .config
            .conversation_template_config
            .stop_string
            .as_deref()
            .unwrap_or_default();

        let mut search_from = 0;
        for answer in sample.answers.as_slice() {
            let pattern = self.tokenizer.encode_raw(&format!("{answer}{stop_string}"))?;
            let Some((start, end)) = find_pattern(tokens, &pattern, search_from) else {
                warn!(
                    key = %sample.key,
                    answer = %answer,
                    "answer not found in tokenized prompt, leaving it unlabeled"
                );
                continue;
            };
            for (label, &token) in labels[start..end].iter_mut().zip(&tokens[start..end]) {
                *label = i64::from(token);
            }
            search_from = end;
        }
        Ok(labels)
    }

    /// Loss mask for `labels`: `1.0` for real labels, `0.0` for ignored ones.
    pub fn compute_loss_mask(&self, labels: &[i64]) -> Vec<f32> {
        labels
            .iter()
            .map(|&label| if label < 0 { 0.0 } else { 1.0 })
            .collect()
    }

    /// Vision regions of `tokens` for the configured image token.
    pub fn vision_mask(&self, tokens: &[u32]) -> VisionMask {
        self.vision_masks.build(tokens)
    }

    /// Preprocess an image with the configured [`ImageProcessor`].
    ///
    /// # Errors
    ///
    /// Propagates the processor's error.
    pub fn process_image(&self, image: &Tensor) -> Result<ProcessedImage> {
        self.image_processor.preprocess(image)
    }

    /// Encode one sample.
    ///
    /// # Errors
    ///
    /// Returns [`MMError::Template`], [`MMError::Tokenizer`] or
    /// [`MMError::Sample`] when a step fails, and [`MMError::Tensor`] on
    /// tensor errors from image processing.
    pub fn encode(&self, sample: &VqaSample) -> Result<ImageTextSample> {
        let prompt = self.apply_prompt_template(sample)?;
        let full_tokens = self.tokenize(&prompt)?;
        let full_labels = self.compute_labels(&full_tokens, sample)?;

        let tokens = full_tokens
            .split_last()
            .map(|(_, rest)| rest.to_vec())
            .unwrap_or_default();
        let labels = full_labels.get(1..).map(<[i64]>::to_vec).unwrap_or_default();
        debug!(key = %sample.key, ?tokens, "encoded tokens");
        debug!(key = %sample.key, ?labels, "encoded labels");

        let loss_mask = self.compute_loss_mask(&labels);
        let vision_mask = self.vision_mask(&tokens);

        let processed = self.process_image(&sample.image)?;
        let num_tiles = processed.num_tiles.first().copied().ok_or_else(|| {
            MMError::Sample(format!("image processor returned no tiles for '{}'", sample.key))
        })?;

        Ok(ImageTextSample {
            key: sample.key.clone(),
            images: first_entry(&processed.pixel_values, "pixel_values")?,
            aspect_ratio_ids: first_entry(&processed.aspect_ratio_ids, "aspect_ratio_ids")?,
            aspect_ratio_mask: first_entry(&processed.aspect_ratio_mask, "aspect_ratio_mask")?,
            num_tiles,
            tokens,
            labels,
            loss_mask,
            vision_mask,
        })
    }
}

impl std::fmt::Debug for Llama3SampleEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Llama3SampleEncoder")
            .field("tokenizer", &self.tokenizer)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// First entry along the batch dimension of a processor output.
fn first_entry(tensor: &Tensor, name: &str) -> Result<Tensor> {
    match tensor.dims().first() {
        Some(&n) if n > 0 => Ok(tensor.get(0)?),
        _ => Err(MMError::Sample(format!(
            "image processor output '{name}' has no batch entry (shape {:?})",
            tensor.dims()
        ))),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
