//! End-to-end scenarios for the universal top-N tokenizer.

use rustc_hash::FxHashMap;
use ubpe::{TokenizerError, UniversalTokenizer};

fn char_alphabet(chars: &str) -> FxHashMap<char, u32> {
    chars.chars().zip(0u32..).collect()
}

fn chars(text: &str) -> Vec<char> {
    text.chars().collect()
}

fn corpus(texts: &[&str]) -> Vec<Vec<char>> {
    texts.iter().map(|text| chars(text)).collect()
}

fn fitted(n_tokens: u32, texts: &[&str]) -> UniversalTokenizer<char> {
    let alphabet = char_alphabet("abcd ");
    let mut tokenizer = UniversalTokenizer::with_alphabet(n_tokens, 5, alphabet).unwrap();
    tokenizer.fit(&corpus(texts)).unwrap();
    tokenizer
}

#[test]
fn test_expansions_hold_base_ids_only() {
    let tokenizer = fitted(16, &["abab cdcd", "ab ab cd", "abcd abcd"]);
    for expansion in tokenizer.backward_mapper().values() {
        assert!(expansion.len() >= 2);
        for &id in expansion {
            assert!(id < tokenizer.alphabet_size());
        }
    }
}

#[test]
fn test_every_segmentation_expands_to_the_document() {
    let tokenizer = fitted(16, &["abab cdcd", "ab ab cd"]);
    for text in ["abab", "ab cd", "dcba", "abab cdcd"] {
        let doc = chars(text);
        let segmentations = tokenizer.encode_top_n(&doc, 5).unwrap();
        assert!(!segmentations.is_empty());
        assert!(segmentations.len() <= 5);
        for (tokens, _) in segmentations {
            assert_eq!(tokenizer.decode(&tokens).unwrap(), doc);
        }
    }
}

#[test]
fn test_segmentations_are_distinct_and_descending() {
    let tokenizer = fitted(16, &["abab cdcd", "ab ab cd"]);
    let doc = chars("abab cd");
    let segmentations = tokenizer.encode_top_n(&doc, 8).unwrap();
    for pair in segmentations.windows(2) {
        assert!(pair[0].1 >= pair[1].1);
        assert_ne!(pair[0].0, pair[1].0);
    }
}

#[test]
fn test_top_one_matches_default_encode() {
    let tokenizer = fitted(16, &["abab cdcd", "ab ab cd"]);
    let doc = chars("abab cdcd");
    let best = tokenizer.encode(&doc).unwrap();
    let top = tokenizer.encode_top_n(&doc, 4).unwrap();
    assert_eq!(best.len(), 1);
    assert_eq!(best[0], top[0]);
}

#[test]
fn test_vocabulary_respects_n_tokens() {
    for n_tokens in [6, 9, 20] {
        let tokenizer = fitted(n_tokens, &["abab cdcd abab", "ab cd ab cd"]);
        assert!(tokenizer.vocab_size() <= n_tokens as usize);
    }
}

#[test]
fn test_forward_backward_are_inverse() {
    let tokenizer = fitted(14, &["abab cdcd", "abcd abcd abcd"]);
    for (id, expansion) in tokenizer.backward_mapper() {
        assert_eq!(tokenizer.forward_mapper()[expansion], *id);
    }
    assert_eq!(
        tokenizer.forward_mapper().len(),
        tokenizer.backward_mapper().len()
    );
}

#[test]
fn test_restore_from_accessors() {
    let tokenizer = fitted(14, &["abab cdcd", "ab cd ab"]);
    let restored = UniversalTokenizer::restore(
        tokenizer.n_tokens(),
        tokenizer.alphabet_size(),
        tokenizer.alphabet().clone(),
        tokenizer.inverse_alphabet().clone(),
        tokenizer.forward_mapper().clone(),
        tokenizer.backward_mapper().clone(),
        tokenizer.weights().clone(),
    )
    .unwrap();
    let doc = chars("abab cd");
    assert_eq!(
        restored.encode_top_n(&doc, 4).unwrap(),
        tokenizer.encode_top_n(&doc, 4).unwrap()
    );
}

#[test]
fn test_restore_rejects_short_expansion() {
    let base: UniversalTokenizer<char> =
        UniversalTokenizer::with_alphabet(6, 5, char_alphabet("abcd ")).unwrap();
    let mut forward = FxHashMap::default();
    forward.insert(vec![0u32], 5u32);
    let mut backward = FxHashMap::default();
    backward.insert(5u32, vec![0u32]);
    let mut weights = FxHashMap::default();
    weights.insert(5u32, 1.0);
    let restored = UniversalTokenizer::restore(
        6,
        5,
        base.alphabet().clone(),
        base.inverse_alphabet().clone(),
        forward,
        backward,
        weights,
    );
    assert!(matches!(
        restored,
        Err(TokenizerError::InvalidConfiguration(_))
    ));
}

#[test]
fn test_unfitted_tokenizer_is_rejected() {
    let tokenizer =
        UniversalTokenizer::with_alphabet(10, 5, char_alphabet("abcd ")).unwrap();
    assert!(matches!(
        tokenizer.encode(&chars("ab")),
        Err(TokenizerError::NotFitted)
    ));
}

#[test]
fn test_empty_document_encodes_to_nothing() {
    let tokenizer = fitted(12, &["abab cdcd"]);
    assert!(tokenizer.encode(&[]).unwrap().is_empty());
    assert!(tokenizer.encode_top_n(&[], 4).unwrap().is_empty());
}

#[test]
fn test_batch_apis_match_sequential() {
    let tokenizer = fitted(16, &["abab cdcd", "ab ab cd"]);
    let docs = corpus(&["abab", "cd cd", "", "abcd"]);
    let encoded = tokenizer.encode_batch(&docs, 3).unwrap();
    for (doc, enc) in docs.iter().zip(&encoded) {
        assert_eq!(enc, &tokenizer.encode_top_n(doc, 3).unwrap());
    }
}

#[test]
fn test_single_character_document() {
    let tokenizer = fitted(16, &["abab cdcd"]);
    let encoded = tokenizer.encode(&chars("a")).unwrap();
    assert_eq!(encoded.len(), 1);
    assert_eq!(encoded[0].0, vec![0]);
    assert_eq!(encoded[0].1, 0.0);
}
