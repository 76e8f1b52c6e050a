//! Core training and encoding engine.
//!
//! The engine is organized leaves-first:
//!
//! - [`TopK`], [`nlargest`], [`nsmallest`]: bounded top-k selection with
//!   stable tie-breaking
//! - [`Counter`]: multiset with `most_common`
//! - [`PairCounter`]: per-pair document and occurrence statistics driving
//!   candidate selection
//! - [`SSSTree`]: radix trie whose signature query enumerates every stored
//!   key that prefixes a sequence at an arbitrary offset
//! - [`Vocab`]: shared vocabulary state (alphabet, merge maps, weights) and
//!   weight-based pruning
//! - [`ClassicTokenizer`] / [`UniversalTokenizer`]: the two encoders
//! - [`SplitPipeline`]: pre-tokenization into base-id sub-sequences

mod byte_level;
mod classic;
mod counter;
mod error;
mod heap;
mod merge;
mod pair_counter;
mod split;
mod ssstree;
mod universal;
mod vocab;

pub use byte_level::{byte_to_char, byte_to_char_str, char_to_byte, chars_to_bytes};
pub use classic::ClassicTokenizer;
pub use counter::Counter;
pub use error::{Result, TokenizerError};
pub use heap::{nlargest, nsmallest, TopK};
pub use pair_counter::{PairCount, PairCounter};
pub use split::{SplitConfig, SplitMode, SplitPipeline, TextRegex, TextToken};
pub use ssstree::SSSTree;
pub use universal::UniversalTokenizer;
pub use vocab::{Token, Vocab};
