// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests: encode VQA samples end to end with an in-memory
//! word-level tokenizer and a stub image processor.
//!
//! Run:
//!   `cargo test --test encode_sample`

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing,
    missing_docs
)]

use candle_core::{DType, Device, Tensor};
use candle_mm_encode::{
    ChatMessage, ChatTemplate, Conversation, ImageProcessor, Llama3SampleEncoder, MMError,
    MMTokenizer, MultiModalSampleConfig, ProcessedImage, VqaSample,
};

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

const TOKENIZER_JSON: &str = r#"{
    "version": "1.0",
    "truncation": null,
    "padding": null,
    "added_tokens": [
        { "id": 50, "content": "</s>", "single_word": false, "lstrip": false, "rstrip": false, "normalized": false, "special": true }
    ],
    "normalizer": null,
    "pre_tokenizer": { "type": "Whitespace" },
    "post_processor": null,
    "decoder": null,
    "model": {
        "type": "WordLevel",
        "vocab": {
            "<unk>": 0, "USER": 1, "BOT": 2, ":": 3, "how": 4, "many": 5,
            "dogs": 6, "two": 7, "which": 8, "is": 9, "left": 10, "the": 11, "brown": 12,
            "</s>": 50
        },
        "unk_token": "<unk>"
    }
}"#;

const CONFIG_JSON: &str = r#"{
    "image_token": { "token_str": "<image>", "token_id": 999 },
    "conversation_template_config": {
        "roles": ["USER", "BOT"],
        "stop_string": "</s>"
    }
}"#;

/// `ROLE: content</s>` per message, no header tokens.
struct PlainTemplate;

impl ChatTemplate for PlainTemplate {
    fn render(&self, messages: &[ChatMessage]) -> candle_mm_encode::Result<String> {
        Ok(messages
            .iter()
            .map(|m| format!("{} : {}</s>", m.role, m.content))
            .collect::<Vec<_>>()
            .join(" "))
    }
}

/// Splits a `[tiles, c, h, w]` image into a batch of one.
struct TileProcessor;

impl ImageProcessor for TileProcessor {
    fn preprocess(&self, image: &Tensor) -> candle_mm_encode::Result<ProcessedImage> {
        let tiles = image.dims().first().copied().unwrap_or(0);
        let device = image.device();
        Ok(ProcessedImage {
            pixel_values: image.unsqueeze(0)?,
            aspect_ratio_ids: Tensor::new(&[[u32::try_from(tiles).unwrap_or(0)]], device)?,
            aspect_ratio_mask: Tensor::ones((1, 4), DType::U8, device)?,
            num_tiles: vec![tiles],
        })
    }
}

fn encoder() -> Llama3SampleEncoder {
    let config = MultiModalSampleConfig::from_json_str(CONFIG_JSON).unwrap();
    let tokenizer = MMTokenizer::from_hf_json(TOKENIZER_JSON).unwrap();
    Llama3SampleEncoder::new(tokenizer, TileProcessor, config).with_chat_template(PlainTemplate)
}

fn image(tiles: usize) -> Tensor {
    Tensor::zeros((tiles, 3, 4, 4), DType::F32, &Device::Cpu).unwrap()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[test]
fn single_turn_sample() {
    let enc = encoder();
    let sample = VqaSample {
        key: "vqa-1".into(),
        image: image(2),
        context: "<image> how many dogs".into(),
        answers: "two".into(),
    };
    let out = enc.encode(&sample).unwrap();

    // USER : <image> how many dogs </s> BOT : two </s>, minus the last token.
    assert_eq!(out.tokens, vec![1, 3, 999, 4, 5, 6, 50, 2, 3, 7]);
    assert_eq!(
        out.labels,
        vec![-100, -100, -100, -100, -100, -100, -100, -100, 7, 50]
    );
    assert_eq!(out.loss_mask, vec![0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 1.0]);
    assert_eq!(out.vision_mask.as_pairs(), vec![(2, 10)]);
    assert_eq!(out.num_tiles, 2);
    assert_eq!(out.images.dims(), &[2, 3, 4, 4]);
}

#[test]
fn adjacent_image_tokens_overlap_in_mask() {
    let enc = encoder();
    let sample = VqaSample {
        key: "vqa-2".into(),
        image: image(1),
        context: "<image><image> which is left".into(),
        answers: "the brown".into(),
    };
    let out = enc.encode(&sample).unwrap();

    let n = out.tokens.len();
    assert_eq!(&out.tokens[2..4], &[999, 999]);
    assert_eq!(out.vision_mask.as_pairs(), vec![(2, n), (3, n)]);
    assert_eq!(out.vision_mask.deduplicated().as_pairs(), vec![(2, n)]);

    let tensor = out.vision_mask_tensor(&Device::Cpu).unwrap();
    assert_eq!(tensor.dims(), &[2, 2]);
}

#[test]
fn multi_turn_with_image_in_each_question() {
    let enc = encoder();
    let sample = VqaSample {
        key: "vqa-3".into(),
        image: image(1),
        context: Conversation::Turns(vec![
            "<image> how many dogs".into(),
            "<image> which is left".into(),
        ]),
        answers: Conversation::Turns(vec!["two".into(), "the brown".into()]),
    };
    let out = enc.encode(&sample).unwrap();

    let image_positions: Vec<usize> = out
        .tokens
        .iter()
        .enumerate()
        .filter_map(|(i, &t)| (t == 999).then_some(i))
        .collect();
    assert_eq!(image_positions.len(), 2);
    assert_eq!(
        out.vision_mask.as_pairs(),
        vec![
            (image_positions[0], image_positions[1]),
            (image_positions[1], out.tokens.len()),
        ]
    );

    let labeled: Vec<i64> = out.labels.iter().copied().filter(|&l| l >= 0).collect();
    assert_eq!(labeled, vec![7, 50, 11, 12, 50]);

    let labels = out.labels_tensor(&Device::Cpu).unwrap();
    assert_eq!(labels.dims(), &[out.seq_len()]);
}

#[test]
fn text_only_sample_has_empty_vision_mask() {
    let enc = encoder();
    let sample = VqaSample {
        key: "text".into(),
        image: image(1),
        context: "how many dogs".into(),
        answers: "two".into(),
    };
    let out = enc.encode(&sample).unwrap();
    assert!(out.vision_mask.is_empty());
    assert_eq!(out.vision_mask_tensor(&Device::Cpu).unwrap().dims(), &[0, 2]);
}

#[test]
fn mismatched_conversation_is_rejected() {
    let enc = encoder();
    let sample = VqaSample {
        key: "bad".into(),
        image: image(1),
        context: Conversation::Turns(vec!["how".into()]),
        answers: "two".into(),
    };
    assert!(matches!(enc.encode(&sample), Err(MMError::Template(_))));
}
