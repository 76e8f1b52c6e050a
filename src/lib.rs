//! Byte-pair encoding generalized to sequences over any alphabet.
//!
//! Two tokenizers share one vocabulary representation:
//! - [`ClassicTokenizer`]: deterministic greedy BPE producing a single
//!   segmentation
//! - [`UniversalTokenizer`]: weighted encoder enumerating up to `top_n`
//!   segmentations through a prefix-search trie and dynamic programming
//!
//! Training learns merges from the most frequent adjacent pairs, batching
//! several non-overlapping merges per pass over the corpus, and can prune
//! and renumber the vocabulary by information weight afterwards. Documents
//! are sequences of any hashable element type; encoded output is sequences
//! of dense 32-bit token ids.

pub mod core;

pub use crate::core::{
    nlargest, nsmallest, ClassicTokenizer, Counter, PairCount, PairCounter, Result, SSSTree,
    SplitConfig, SplitMode, SplitPipeline, TextRegex, TextToken, Token, TokenizerError, TopK,
    UniversalTokenizer, Vocab,
};
