use std::path::Path;

use tokenizers::{PaddingParams, PaddingStrategy, Tokenizer, TruncationParams};

use crate::error::{ScoreError, ScoreResult};

pub const DEFAULT_MAX_TOKENS: usize = 128;

/// One tokenized line, always exactly `max_len` long.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedInput {
    pub ids: Vec<u32>,
    pub attention_mask: Vec<u32>,
    pub type_ids: Vec<u32>,
}

impl EncodedInput {
    /// Number of real (non-padding) tokens.
    pub fn real_tokens(&self) -> usize {
        self.attention_mask.iter().filter(|&&m| m != 0).count()
    }
}

/// Tokenizer configured to truncate and pad every input to a fixed length.
pub struct FixedLengthEncoder {
    tokenizer: Tokenizer,
    max_len: usize,
}

impl FixedLengthEncoder {
    pub fn load(path: &Path, max_len: usize) -> ScoreResult<Self> {
        if !path.exists() {
            return Err(ScoreError::ModelUnavailable(format!(
                "tokenizer.json not found at {}",
                path.display()
            )));
        }
        let tokenizer = Tokenizer::from_file(path).map_err(|e| {
            ScoreError::ModelUnavailable(format!("tokenizer load failed ({}): {e}", path.display()))
        })?;
        Self::new(tokenizer, max_len)
    }

    pub fn new(mut tokenizer: Tokenizer, max_len: usize) -> ScoreResult<Self> {
        let max_len = max_len.max(1);
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: max_len,
                ..Default::default()
            }))
            .map_err(|e| ScoreError::ModelUnavailable(format!("tokenizer truncation config failed: {e}")))?;

        let pad_id = pad_token_id(&tokenizer);
        let pad_token = tokenizer
            .id_to_token(pad_id)
            .unwrap_or_else(|| "[PAD]".to_string());
        tokenizer.with_padding(Some(PaddingParams {
            strategy: PaddingStrategy::Fixed(max_len),
            pad_id,
            pad_token,
            ..Default::default()
        }));

        Ok(Self { tokenizer, max_len })
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }

    pub fn encode(&self, text: &str) -> ScoreResult<EncodedInput> {
        let enc = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| ScoreError::Inference(format!("tokenizer encode error: {e}")))?;

        Ok(EncodedInput {
            ids: enc.get_ids().to_vec(),
            attention_mask: enc.get_attention_mask().to_vec(),
            type_ids: enc.get_type_ids().to_vec(),
        })
    }
}

fn pad_token_id(tokenizer: &Tokenizer) -> u32 {
    tokenizer
        .get_padding()
        .map(|params| params.pad_id)
        .or_else(|| tokenizer.token_to_id("[PAD]"))
        .or_else(|| tokenizer.token_to_id("<pad>"))
        .unwrap_or(0)
}

#[cfg(test)]
pub(crate) mod fixtures {
    use std::str::FromStr;

    use tokenizers::Tokenizer;

    pub const WORDS: &[&str] = &[
        "oh", "great", "another", "monday", "love", "it", "rain", "sun", "the", "is",
    ];

    /// Lowercasing whitespace word-level tokenizer over a ten-word vocabulary.
    pub fn word_tokenizer() -> Tokenizer {
        let mut vocab = vec![r#""[PAD]": 0"#.to_string(), r#""[UNK]": 1"#.to_string()];
        vocab.extend(
            WORDS
                .iter()
                .enumerate()
                .map(|(i, w)| format!(r#""{w}": {}"#, i + 2)),
        );
        let json = format!(
            r#"{{
                "version": "1.0",
                "truncation": null,
                "padding": null,
                "added_tokens": [],
                "normalizer": {{ "type": "Lowercase" }},
                "pre_tokenizer": {{ "type": "Whitespace" }},
                "post_processor": null,
                "decoder": null,
                "model": {{
                    "type": "WordLevel",
                    "vocab": {{ {} }},
                    "unk_token": "[UNK]"
                }}
            }}"#,
            vocab.join(", ")
        );
        Tokenizer::from_str(&json).expect("fixture tokenizer")
    }

    /// `count` vocabulary words, cycling through the list.
    pub fn words(count: usize) -> String {
        (0..count)
            .map(|i| WORDS[i % WORDS.len()])
            .collect::<Vec<_>>()
            .join(" ")
    }
}
