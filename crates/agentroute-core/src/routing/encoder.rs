//! Deterministic task text encoder
//!
//! Turns free text into a fixed-length, L2-normalized feature vector and a
//! compact discrete [`StateKey`] the Q-table is indexed by.
//!
//! ## Feature layout
//!
//! | Block | Width | Content |
//! |-------|-------|---------|
//! | keywords | 32 | presence of a keyword as a word prefix |
//! | length | 5 | one-hot character-length bucket |
//! | words | 4 | one-hot word-count bucket |
//! | extensions | 8 | presence of a file-extension hint |
//! | bigrams | 8 | hashed adjacent word pairs |
//!
//! The state key quantizes each normalized component into a 2-bit bucket
//! and folds the non-zero buckets into one 64-bit hash. Similar texts share
//! buckets and therefore keys, which keeps the table bounded at the cost of
//! exact fidelity.

use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use serde::{Deserialize, Serialize};

/// Keyword vocabulary, grouped loosely by the route it hints at
pub const KEYWORDS: [&str; 32] = [
    "implement", "create", "build", "code", "write", "feature",
    "test", "spec", "coverage", "verify",
    "review", "audit", "quality",
    "design", "architecture", "schema", "refactor",
    "research", "analyze", "investigate", "explore",
    "security", "auth", "vulnerability",
    "performance", "optimize", "latency", "memory",
    "document", "docs", "readme", "explain",
];

/// Upper bounds (exclusive) of the character-length buckets; the last bucket is open
const LENGTH_BOUNDS: [usize; 4] = [20, 50, 100, 200];

/// Upper bounds (exclusive) of the word-count buckets; the last bucket is open
const WORD_BOUNDS: [usize; 3] = [3, 8, 16];

/// File-extension hints
pub const EXTENSIONS: [&str; 8] = [".ts", ".js", ".py", ".rs", ".go", ".java", ".md", ".json"];

const BIGRAM_BUCKETS: usize = 8;

const KEYWORD_OFFSET: usize = 0;
const LENGTH_OFFSET: usize = KEYWORD_OFFSET + KEYWORDS.len();
const WORD_OFFSET: usize = LENGTH_OFFSET + LENGTH_BOUNDS.len() + 1;
const EXTENSION_OFFSET: usize = WORD_OFFSET + WORD_BOUNDS.len() + 1;
const BIGRAM_OFFSET: usize = EXTENSION_OFFSET + EXTENSIONS.len();

/// Length of every feature vector
pub const FEATURE_DIM: usize = BIGRAM_OFFSET + BIGRAM_BUCKETS;

/// Quantization levels per component when deriving a state key
const QUANT_LEVELS: f64 = 4.0;

const GENERIC_STATE: &str = "s:generic";

/// Compact, opaque state identifier derived from task text
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateKey(String);

impl StateKey {
    /// Key used for empty or featureless input
    pub fn generic() -> Self {
        Self(GENERIC_STATE.to_string())
    }

    /// Borrow the key as a string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for StateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for StateKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Encoded form of a task
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedTask {
    /// L2-normalized feature vector of length [`FEATURE_DIM`]
    pub features: Arc<[f64]>,
    /// Discrete state key
    pub state: StateKey,
}

/// Text encoder with a bounded memo cache
#[derive(Debug)]
pub struct FeatureEncoder {
    memo: LruCache<String, EncodedTask>,
    hits: u64,
}

impl FeatureEncoder {
    /// Create an encoder memoizing up to `capacity` texts
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            memo: LruCache::new(capacity),
            hits: 0,
        }
    }

    /// Encode text, consulting the memo first
    pub fn encode(&mut self, text: &str) -> EncodedTask {
        if let Some(cached) = self.memo.get(text) {
            self.hits += 1;
            return cached.clone();
        }
        let encoded = encode_text(text);
        self.memo.put(text.to_string(), encoded.clone());
        encoded
    }

    /// Number of memo hits so far
    pub fn memo_hits(&self) -> u64 {
        self.hits
    }

    /// Number of memoized texts
    #[cfg(test)]
    pub fn memo_len(&self) -> usize {
        self.memo.len()
    }
}

impl Default for FeatureEncoder {
    fn default() -> Self {
        Self::new(1000)
    }
}

/// Encode text without memoization
pub fn encode_text(text: &str) -> EncodedTask {
    let features = feature_vector(text);
    let state = state_key(&features);
    EncodedTask {
        features: features.into(),
        state,
    }
}

/// Build the normalized feature vector for a text
pub fn feature_vector(text: &str) -> Vec<f64> {
    let mut v = vec![0.0; FEATURE_DIM];
    let lower = text.to_lowercase();
    let raw_words: Vec<&str> = lower.split_whitespace().collect();
    if raw_words.is_empty() {
        return v;
    }

    let words: Vec<&str> = raw_words
        .iter()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()))
        .filter(|w| !w.is_empty())
        .collect();

    for (i, keyword) in KEYWORDS.iter().enumerate() {
        if words.iter().any(|w| w.starts_with(keyword)) {
            v[KEYWORD_OFFSET + i] = 1.0;
        }
    }

    let chars = text.chars().count();
    v[LENGTH_OFFSET + bucket(chars, &LENGTH_BOUNDS)] = 1.0;
    v[WORD_OFFSET + bucket(raw_words.len(), &WORD_BOUNDS)] = 1.0;

    for (i, ext) in EXTENSIONS.iter().enumerate() {
        let hinted = raw_words.iter().any(|w| {
            w.trim_end_matches(|c: char| !c.is_alphanumeric())
                .ends_with(ext)
        });
        if hinted {
            v[EXTENSION_OFFSET + i] = 1.0;
        }
    }

    if words.len() > 1 {
        let pairs = words.len() - 1;
        let weight = 1.0 / pairs as f64;
        for pair in words.windows(2) {
            let h = mix32(fnv1a32(pair[0].as_bytes()) ^ fnv1a32(pair[1].as_bytes()).rotate_left(16));
            v[BIGRAM_OFFSET + (h as usize % BIGRAM_BUCKETS)] += weight;
        }
    }

    let norm = v.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm > 0.0 {
        v.iter_mut().for_each(|x| *x /= norm);
    }
    v
}

/// Quantize a normalized vector into a state key
pub fn state_key(features: &[f64]) -> StateKey {
    let mut hash: u64 = FNV64_OFFSET;
    let mut active = 0usize;
    for (i, value) in features.iter().enumerate() {
        let level = ((value.max(0.0) * QUANT_LEVELS) as u64).min(QUANT_LEVELS as u64 - 1);
        if level == 0 && *value <= 0.0 {
            continue;
        }
        active += 1;
        for byte in (i as u16).to_le_bytes().into_iter().chain([level as u8 + 1]) {
            hash ^= byte as u64;
            hash = hash.wrapping_mul(FNV64_PRIME);
        }
    }
    if active == 0 {
        return StateKey::generic();
    }
    StateKey(format!("s:{:016x}", hash))
}

fn bucket(value: usize, bounds: &[usize]) -> usize {
    bounds
        .iter()
        .position(|&upper| value < upper)
        .unwrap_or(bounds.len())
}

const FNV32_OFFSET: u32 = 0x811c_9dc5;
const FNV32_PRIME: u32 = 0x0100_0193;
const FNV64_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV64_PRIME: u64 = 0x0000_0100_0000_01b3;

fn fnv1a32(bytes: &[u8]) -> u32 {
    bytes.iter().fold(FNV32_OFFSET, |h, &b| (h ^ b as u32).wrapping_mul(FNV32_PRIME))
}

/// Murmur3 finalizer
fn mix32(mut h: u32) -> u32 {
    h ^= h >> 16;
    h = h.wrapping_mul(0x85eb_ca6b);
    h ^= h >> 13;
    h = h.wrapping_mul(0xc2b2_ae35);
    h ^= h >> 16;
    h
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_feature_dim() {
        assert_eq!(FEATURE_DIM, 57);
        assert_eq!(feature_vector("implement user authentication").len(), FEATURE_DIM);
    }

    #[test]
    fn test_vector_is_normalized() {
        let v = feature_vector("Refactor the auth module in src/main.rs for better latency");
        let norm = v.iter().map(|x| x * x).sum::<f64>().sqrt();
        assert!((norm - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_keyword_and_extension_flags() {
        let v = feature_vector("write tests for parser.py");
        let test_idx = KEYWORDS.iter().position(|k| *k == "test").unwrap();
        let write_idx = KEYWORDS.iter().position(|k| *k == "write").unwrap();
        let py_idx = EXTENSIONS.iter().position(|e| *e == ".py").unwrap();
        assert!(v[KEYWORD_OFFSET + test_idx] > 0.0);
        assert!(v[KEYWORD_OFFSET + write_idx] > 0.0);
        assert!(v[EXTENSION_OFFSET + py_idx] > 0.0);
        let rs_idx = EXTENSIONS.iter().position(|e| *e == ".rs").unwrap();
        assert_eq!(v[EXTENSION_OFFSET + rs_idx], 0.0);
    }

    #[test]
    fn test_keyword_requires_word_prefix() {
        let v = feature_vector("the latest release");
        let test_idx = KEYWORDS.iter().position(|k| *k == "test").unwrap();
        assert_eq!(v[KEYWORD_OFFSET + test_idx], 0.0);
    }

    #[test]
    fn test_length_and_word_buckets_are_one_hot() {
        let v = feature_vector("fix bug");
        let length_block = &v[LENGTH_OFFSET..WORD_OFFSET];
        let word_block = &v[WORD_OFFSET..EXTENSION_OFFSET];
        assert_eq!(length_block.iter().filter(|x| **x > 0.0).count(), 1);
        assert_eq!(word_block.iter().filter(|x| **x > 0.0).count(), 1);
        assert!(length_block[0] > 0.0);
        assert!(word_block[0] > 0.0);
    }

    #[test]
    fn test_empty_input_is_generic() {
        assert_eq!(encode_text("").state, StateKey::generic());
        assert_eq!(encode_text("   \n\t").state, StateKey::generic());
        assert!(encode_text("").features.iter().all(|x| *x == 0.0));
    }

    #[test]
    fn test_different_tasks_get_different_keys() {
        let a = encode_text("implement user authentication");
        let b = encode_text("write documentation for the readme in docs.md");
        assert_ne!(a.state, b.state);
        assert!(a.state.as_str().starts_with("s:"));
    }

    #[test]
    fn test_memo_cache_hits_and_bound() {
        let mut encoder = FeatureEncoder::new(2);
        let first = encoder.encode("optimize query latency");
        let second = encoder.encode("optimize query latency");
        assert_eq!(first, second);
        assert_eq!(encoder.memo_hits(), 1);

        encoder.encode("b");
        encoder.encode("c");
        assert_eq!(encoder.memo_len(), 2);
    }

    #[test]
    fn test_bigram_hash_is_stable() {
        assert_eq!(fnv1a32(b""), FNV32_OFFSET);
        assert_eq!(mix32(fnv1a32(b"user")), mix32(fnv1a32(b"user")));
        assert_ne!(mix32(1), mix32(2));
    }

    proptest! {
        #[test]
        fn prop_encoding_is_deterministic(text in ".{0,200}") {
            let a = encode_text(&text);
            let b = encode_text(&text);
            prop_assert_eq!(&a.state, &b.state);
            let bits_a: Vec<u64> = a.features.iter().map(|x| x.to_bits()).collect();
            let bits_b: Vec<u64> = b.features.iter().map(|x| x.to_bits()).collect();
            prop_assert_eq!(bits_a, bits_b);
        }

        #[test]
        fn prop_features_are_finite_and_bounded(text in ".{0,200}") {
            let v = feature_vector(&text);
            prop_assert_eq!(v.len(), FEATURE_DIM);
            prop_assert!(v.iter().all(|x| x.is_finite() && *x >= 0.0 && *x <= 1.0));
        }
    }
}
