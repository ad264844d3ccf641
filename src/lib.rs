// SPDX-License-Identifier: MIT OR Apache-2.0

//! # candle-mm-encode
//!
//! Multimodal sample encoding for vision-language training pipelines built
//! on [candle](https://github.com/huggingface/candle).
//!
//! The centerpiece is the [`VisionMask`]: the half-open token ranges that
//! attend to each image placeholder of a tokenized prompt.  Around it, the
//! crate provides a Llama 3.2 Vision style [`Llama3SampleEncoder`] that
//! renders a VQA sample into tokens, next-token labels, a loss mask, and a
//! vision mask, plus a [`lexicon`] utility that derives decoder lexicons
//! from `KenLM` ARPA files.
//!
//! ## Quick start
//!
//! ```
//! use candle_mm_encode::build_vision_mask;
//!
//! // Two adjacent image tiles followed by text.
//! let mask = build_vision_mask(&[5, 5, 1, 2], 5);
//! assert_eq!(mask.as_pairs(), vec![(0, 4), (1, 4)]);
//! ```

#![deny(warnings)]
#![warn(missing_docs)]

pub mod config;
pub mod encoder;
pub mod error;
pub mod lexicon;
pub mod sample;
pub mod template;
pub mod tokenizer;
pub mod util;

pub use config::{ConversationTemplateConfig, ImageToken, MultiModalSampleConfig};
pub use encoder::Llama3SampleEncoder;
pub use error::{MMError, Result};
pub use sample::{Conversation, ImageProcessor, ImageTextSample, ProcessedImage, VqaSample};
pub use template::{ChatMessage, ChatTemplate, Llama3ChatTemplate, build_messages};
pub use tokenizer::MMTokenizer;
pub use util::masks::{VisionMask, VisionMaskBuilder, VisionRegion, build_vision_mask};
