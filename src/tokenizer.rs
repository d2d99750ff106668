//! Tokenizer adapter contract (spec §2.12): the engine treats tokenization
//! as an external concern and depends only on this trait. No reference
//! implementation ships here — callers plug in their own adapter over
//! whatever tokenizer bundle `tokenizer.json` actually is.

use crate::error::DopplerResult;

pub trait TokenizerAdapter: Send + Sync {
    fn encode(&self, text: &str) -> DopplerResult<Vec<u32>>;
    fn decode(&self, tokens: &[u32]) -> DopplerResult<String>;
    fn vocab_size(&self) -> usize;
    fn eos_token_ids(&self) -> &[u32];
}

/// Minimal whitespace-splitting adapter used by the test suite and the CLI
/// when no real tokenizer bundle is supplied. Never used to claim real
/// tokenizer fidelity, only to exercise the pipeline end to end.
pub struct IdentityTokenizer {
    vocab_size: usize,
    eos_token_ids: Vec<u32>,
}

impl IdentityTokenizer {
    pub fn new(vocab_size: usize, eos_token_ids: Vec<u32>) -> Self {
        Self { vocab_size, eos_token_ids }
    }
}

impl TokenizerAdapter for IdentityTokenizer {
    fn encode(&self, text: &str) -> DopplerResult<Vec<u32>> {
        Ok(text
            .split_whitespace()
            .map(|word| (word.len() as u32) % self.vocab_size.max(1) as u32)
            .collect())
    }

    fn decode(&self, tokens: &[u32]) -> DopplerResult<String> {
        Ok(tokens.iter().map(|t| t.to_string()).collect::<Vec<_>>().join(" "))
    }

    fn vocab_size(&self) -> usize {
        self.vocab_size
    }

    fn eos_token_ids(&self) -> &[u32] {
        &self.eos_token_ids
    }
}

const DEFAULT_VOCAB_SIZE: usize = 32_000;

/// Build the best tokenizer adapter we can from an optional
/// `tokenizer.json` byte blob, falling back to `IdentityTokenizer` when no
/// bundle is present or it doesn't parse. No real tokenizer fidelity is
/// claimed here (spec §2.12) — this only recovers a plausible vocab size and
/// EOS ids so the pipeline's `vocab_size`/`stop_tokens` inference has
/// something better than hardcoded defaults to work with.
pub fn load_tokenizer_bundle(bytes: Option<&[u8]>) -> Box<dyn TokenizerAdapter> {
    let Some(bytes) = bytes else {
        return Box::new(IdentityTokenizer::new(DEFAULT_VOCAB_SIZE, vec![0]));
    };

    let parsed: Option<serde_json::Value> = serde_json::from_slice(bytes).ok();
    let vocab_size = parsed
        .as_ref()
        .and_then(|v| v.pointer("/model/vocab"))
        .and_then(|v| v.as_object())
        .map(|m| m.len())
        .unwrap_or(DEFAULT_VOCAB_SIZE);
    let eos_token_ids = parsed
        .as_ref()
        .and_then(|v| v.get("added_tokens"))
        .and_then(|v| v.as_array())
        .map(|tokens| {
            tokens
                .iter()
                .filter(|t| t.get("special").and_then(|s| s.as_bool()).unwrap_or(false))
                .filter_map(|t| t.get("id").and_then(|id| id.as_u64()))
                .map(|id| id as u32)
                .collect::<Vec<_>>()
        })
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| vec![0]);

    Box::new(IdentityTokenizer::new(vocab_size, eos_token_ids))
}
