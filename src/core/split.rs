//! Pre-tokenization: splitting documents into base-id sub-sequences.
//!
//! A [`SplitPipeline`] cuts a document along known words, break tokens, a
//! regex and stop tokens, in that order, controlled per call by a
//! [`SplitMode`] bitset. The output is what the tokenizers train on: a list
//! of base-id sequences.

use std::ops::{BitAnd, BitOr, BitOrAssign};

use regex::Regex;
use rustc_hash::{FxHashMap, FxHashSet};

use super::byte_level::{byte_to_char_str, chars_to_bytes};
use super::error::{Result, TokenizerError};
use super::ssstree::SSSTree;
use super::vocab::Token;

/// Bitset of split stages to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SplitMode(u8);

impl SplitMode {
    pub const NONE: SplitMode = SplitMode(0);
    /// Cut out known words, emitting each as its own single-token part.
    pub const KNOWN_WORDS: SplitMode = SplitMode(1 << 0);
    /// Split at break tokens.
    pub const BREAK_TOKENS: SplitMode = SplitMode(1 << 1);
    /// Keep only regex matches (findall semantics).
    pub const REGEX: SplitMode = SplitMode(1 << 2);
    /// Split at stop tokens.
    pub const STOP_TOKENS: SplitMode = SplitMode(1 << 3);
    /// All stages.
    pub const FULL: SplitMode = SplitMode(0b1111);

    pub fn contains(self, other: SplitMode) -> bool {
        self.0 & other.0 != 0
    }
}

impl BitOr for SplitMode {
    type Output = SplitMode;

    fn bitor(self, rhs: SplitMode) -> SplitMode {
        SplitMode(self.0 | rhs.0)
    }
}

impl BitOrAssign for SplitMode {
    fn bitor_assign(&mut self, rhs: SplitMode) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for SplitMode {
    type Output = SplitMode;

    fn bitand(self, rhs: SplitMode) -> SplitMode {
        SplitMode(self.0 & rhs.0)
    }
}

/// Token types whose sequences can be rendered as text and back, enabling
/// the regex stage over non-string alphabets.
pub trait TextToken: Token {
    fn render(seq: &[Self]) -> String;
    fn parse(text: &str) -> Vec<Self>;
}

impl TextToken for char {
    fn render(seq: &[Self]) -> String {
        seq.iter().collect()
    }

    fn parse(text: &str) -> Vec<Self> {
        text.chars().collect()
    }
}

impl TextToken for u8 {
    fn render(seq: &[Self]) -> String {
        byte_to_char_str(seq)
    }

    fn parse(text: &str) -> Vec<Self> {
        chars_to_bytes(text)
    }
}

/// A compiled regex bound to a token type's text rendering. Only
/// constructible for [`TextToken`] alphabets, so pipelines over opaque
/// token types simply cannot configure the regex stage.
#[derive(Debug, Clone)]
pub struct TextRegex<T> {
    regex: Regex,
    split_fn: fn(&Regex, &[T]) -> Vec<Vec<T>>,
}

fn regex_findall<T: TextToken>(regex: &Regex, part: &[T]) -> Vec<Vec<T>> {
    let text = T::render(part);
    regex
        .find_iter(&text)
        .map(|found| T::parse(found.as_str()))
        .collect()
}

impl<T: TextToken> TextRegex<T> {
    pub fn new(pattern: &str) -> Result<Self> {
        let regex = Regex::new(pattern).map_err(|err| {
            TokenizerError::InvalidConfiguration(format!("regex pattern: {}", err))
        })?;
        Ok(Self {
            regex,
            split_fn: regex_findall::<T>,
        })
    }
}

impl<T> TextRegex<T> {
    fn split(&self, part: &[T]) -> Vec<Vec<T>> {
        (self.split_fn)(&self.regex, part)
    }
}

/// Pipeline configuration. Empty collections disable their stage.
#[derive(Debug, Clone)]
pub struct SplitConfig<T> {
    /// Words cut out wholesale and numbered from `alphabet_size` upwards in
    /// the order given.
    pub known_words: Vec<Vec<T>>,
    /// Tokens to split at; tokens outside the alphabet are ignored.
    pub break_tokens: Vec<T>,
    /// Tokens to split at after the regex stage; tokens outside the
    /// alphabet are ignored.
    pub stop_tokens: Vec<T>,
    /// Regex whose matches are kept (non-matching stretches are dropped).
    pub regex: Option<TextRegex<T>>,
}

impl<T> Default for SplitConfig<T> {
    fn default() -> Self {
        Self {
            known_words: Vec::new(),
            break_tokens: Vec::new(),
            stop_tokens: Vec::new(),
            regex: None,
        }
    }
}

/// Splits documents into base-id sub-sequences for the tokenizers.
#[derive(Debug, Clone)]
pub struct SplitPipeline<T> {
    alphabet: FxHashMap<T, u32>,
    known_words: Option<SSSTree<T, u32>>,
    break_tokens: Option<FxHashSet<T>>,
    stop_tokens: Option<FxHashSet<T>>,
    regex: Option<TextRegex<T>>,
}

impl<T: Token> SplitPipeline<T> {
    pub fn new(alphabet: FxHashMap<T, u32>, config: SplitConfig<T>) -> Result<Self> {
        let mut known_words = None;
        if !config.known_words.is_empty() {
            let mut tree = SSSTree::new();
            let mut next_token = alphabet.len() as u32;
            for word in config.known_words {
                if word.is_empty() {
                    return Err(TokenizerError::InvalidConfiguration(
                        "known words must be non-empty".to_string(),
                    ));
                }
                tree.insert(word, next_token);
                next_token += 1;
            }
            known_words = Some(tree);
        }

        let break_tokens: FxHashSet<T> = config
            .break_tokens
            .into_iter()
            .filter(|token| alphabet.contains_key(token))
            .collect();
        let stop_tokens: FxHashSet<T> = config
            .stop_tokens
            .into_iter()
            .filter(|token| alphabet.contains_key(token))
            .collect();

        Ok(Self {
            alphabet,
            known_words,
            break_tokens: (!break_tokens.is_empty()).then_some(break_tokens),
            stop_tokens: (!stop_tokens.is_empty()).then_some(stop_tokens),
            regex: config.regex,
        })
    }

    /// Split `doc` with every configured stage, keeping separators.
    pub fn split_all(&self, doc: &[T]) -> Result<Vec<Vec<u32>>> {
        self.split(doc, SplitMode::FULL, true)
    }

    /// Split `doc` into base-id sub-sequences.
    ///
    /// With `leave_separators` the separating tokens and known words stay
    /// in the output as single-element parts; without it they are dropped.
    pub fn split(
        &self,
        doc: &[T],
        mode: SplitMode,
        leave_separators: bool,
    ) -> Result<Vec<Vec<u32>>> {
        if let (true, Some(tree)) = (mode.contains(SplitMode::KNOWN_WORDS), &self.known_words) {
            let mut parts = Vec::new();
            let mut begin = 0;
            let mut i = 0;
            while i < doc.len() {
                let hits = tree.prefix_lens(doc, i)?;
                let Some(&(word_len, word_token)) = hits.last() else {
                    i += 1;
                    continue;
                };
                if begin < i {
                    self.split_rest(&doc[begin..i], mode, leave_separators, &mut parts)?;
                }
                if leave_separators {
                    parts.push(vec![word_token]);
                }
                i += word_len;
                begin = i;
            }
            if begin < doc.len() {
                self.split_rest(&doc[begin..], mode, leave_separators, &mut parts)?;
            }
            return Ok(parts);
        }

        let mut parts = Vec::new();
        self.split_rest(doc, mode, leave_separators, &mut parts)?;
        Ok(parts)
    }

    /// Run the non-known-word stages over `part` and append the id-mapped
    /// results to `out`.
    fn split_rest(
        &self,
        part: &[T],
        mode: SplitMode,
        leave_separators: bool,
        out: &mut Vec<Vec<u32>>,
    ) -> Result<()> {
        let mut parts: Vec<Vec<T>> = if part.is_empty() {
            Vec::new()
        } else {
            vec![part.to_vec()]
        };

        if mode.contains(SplitMode::BREAK_TOKENS) {
            if let Some(tokens) = &self.break_tokens {
                parts = parts
                    .iter()
                    .flat_map(|part| split_at_tokens(part, tokens, leave_separators))
                    .collect();
            }
        }

        if mode.contains(SplitMode::REGEX) {
            if let Some(regex) = &self.regex {
                parts = parts.iter().flat_map(|part| regex.split(part)).collect();
            }
        }

        if mode.contains(SplitMode::STOP_TOKENS) {
            if let Some(tokens) = &self.stop_tokens {
                parts = parts
                    .iter()
                    .flat_map(|part| split_at_tokens(part, tokens, leave_separators))
                    .collect();
            }
        }

        for part in parts {
            out.push(self.to_ids(&part)?);
        }
        Ok(())
    }

    fn to_ids(&self, part: &[T]) -> Result<Vec<u32>> {
        part.iter()
            .map(|token| {
                self.alphabet.get(token).copied().ok_or_else(|| {
                    TokenizerError::InvalidInput(
                        "document contains an element outside the alphabet".to_string(),
                    )
                })
            })
            .collect()
    }
}

fn split_at_tokens<T: Token>(
    part: &[T],
    tokens: &FxHashSet<T>,
    leave_separators: bool,
) -> Vec<Vec<T>> {
    let mut parts = Vec::new();
    let mut begin = 0;
    for (i, element) in part.iter().enumerate() {
        if !tokens.contains(element) {
            continue;
        }
        if begin < i {
            parts.push(part[begin..i].to_vec());
        }
        if leave_separators {
            parts.push(vec![element.clone()]);
        }
        begin = i + 1;
    }
    if begin < part.len() {
        parts.push(part[begin..].to_vec());
    }
    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alphabet() -> FxHashMap<char, u32> {
        "abcd .".chars().zip(0u32..).collect()
    }

    fn id(ch: char) -> u32 {
        alphabet()[&ch]
    }

    #[test]
    fn test_mode_bitset() {
        let mode = SplitMode::BREAK_TOKENS | SplitMode::REGEX;
        assert!(mode.contains(SplitMode::BREAK_TOKENS));
        assert!(mode.contains(SplitMode::REGEX));
        assert!(!mode.contains(SplitMode::STOP_TOKENS));
        assert!(!SplitMode::NONE.contains(SplitMode::FULL));
        assert!(SplitMode::FULL.contains(SplitMode::KNOWN_WORDS));
    }

    #[test]
    fn test_break_tokens() {
        let config = SplitConfig {
            break_tokens: vec![' '],
            ..SplitConfig::default()
        };
        let pipeline = SplitPipeline::new(alphabet(), config).unwrap();
        let doc: Vec<char> = "ab cd".chars().collect();
        let parts = pipeline
            .split(&doc, SplitMode::BREAK_TOKENS, true)
            .unwrap();
        assert_eq!(
            parts,
            vec![
                vec![id('a'), id('b')],
                vec![id(' ')],
                vec![id('c'), id('d')],
            ]
        );
    }

    #[test]
    fn test_break_tokens_dropped() {
        let config = SplitConfig {
            break_tokens: vec![' '],
            ..SplitConfig::default()
        };
        let pipeline = SplitPipeline::new(alphabet(), config).unwrap();
        let doc: Vec<char> = "a b".chars().collect();
        let parts = pipeline
            .split(&doc, SplitMode::BREAK_TOKENS, false)
            .unwrap();
        assert_eq!(parts, vec![vec![id('a')], vec![id('b')]]);
    }

    #[test]
    fn test_break_tokens_outside_alphabet_ignored() {
        let config = SplitConfig {
            break_tokens: vec!['!'],
            ..SplitConfig::default()
        };
        let pipeline = SplitPipeline::new(alphabet(), config).unwrap();
        let doc: Vec<char> = "ab".chars().collect();
        let parts = pipeline
            .split(&doc, SplitMode::BREAK_TOKENS, true)
            .unwrap();
        assert_eq!(parts, vec![vec![id('a'), id('b')]]);
    }

    #[test]
    fn test_known_words_cut_out() {
        let config = SplitConfig {
            known_words: vec!["cd".chars().collect()],
            ..SplitConfig::default()
        };
        let pipeline = SplitPipeline::new(alphabet(), config).unwrap();
        let doc: Vec<char> = "abcda".chars().collect();
        let parts = pipeline.split(&doc, SplitMode::FULL, true).unwrap();
        // "cd" is numbered right after the 6-element alphabet.
        assert_eq!(
            parts,
            vec![vec![id('a'), id('b')], vec![6], vec![id('a')]]
        );
    }

    #[test]
    fn test_known_words_longest_match() {
        let config = SplitConfig {
            known_words: vec!["ab".chars().collect(), "abc".chars().collect()],
            ..SplitConfig::default()
        };
        let pipeline = SplitPipeline::new(alphabet(), config).unwrap();
        let doc: Vec<char> = "abcd".chars().collect();
        let parts = pipeline.split(&doc, SplitMode::KNOWN_WORDS, true).unwrap();
        // The longer known word wins: "abc" carries id 7.
        assert_eq!(parts, vec![vec![7], vec![id('d')]]);
    }

    #[test]
    fn test_stop_tokens_after_regex() {
        let config = SplitConfig {
            stop_tokens: vec!['.'],
            ..SplitConfig::default()
        };
        let pipeline = SplitPipeline::new(alphabet(), config).unwrap();
        let doc: Vec<char> = "ab.cd".chars().collect();
        let parts = pipeline.split(&doc, SplitMode::STOP_TOKENS, true).unwrap();
        assert_eq!(
            parts,
            vec![
                vec![id('a'), id('b')],
                vec![id('.')],
                vec![id('c'), id('d')],
            ]
        );
    }

    #[test]
    fn test_regex_findall() {
        let config = SplitConfig {
            regex: Some(TextRegex::new("[ab]+").unwrap()),
            ..SplitConfig::default()
        };
        let pipeline = SplitPipeline::new(alphabet(), config).unwrap();
        let doc: Vec<char> = "abccba".chars().collect();
        let parts = pipeline.split(&doc, SplitMode::REGEX, true).unwrap();
        assert_eq!(
            parts,
            vec![vec![id('a'), id('b')], vec![id('b'), id('a')]]
        );
    }

    #[test]
    fn test_disabled_stage_passes_through() {
        let config = SplitConfig {
            break_tokens: vec![' '],
            ..SplitConfig::default()
        };
        let pipeline = SplitPipeline::new(alphabet(), config).unwrap();
        let doc: Vec<char> = "a b".chars().collect();
        let parts = pipeline.split(&doc, SplitMode::NONE, true).unwrap();
        assert_eq!(parts, vec![vec![id('a'), id(' '), id('b')]]);
    }

    #[test]
    fn test_empty_document() {
        let pipeline = SplitPipeline::new(alphabet(), SplitConfig::default()).unwrap();
        assert!(pipeline.split(&[], SplitMode::FULL, true).unwrap().is_empty());
    }

    #[test]
    fn test_unknown_element_is_error() {
        let pipeline = SplitPipeline::new(alphabet(), SplitConfig::default()).unwrap();
        let doc: Vec<char> = "ax".chars().collect();
        assert!(pipeline.split(&doc, SplitMode::FULL, true).is_err());
    }

    #[test]
    fn test_empty_known_word_rejected() {
        let config = SplitConfig {
            known_words: vec![Vec::new()],
            ..SplitConfig::default()
        };
        assert!(SplitPipeline::<char>::new(alphabet(), config).is_err());
    }
}
