//! Weighted top-N segmentation.

use std::cmp::Ordering;

use log::{debug, info};
use rayon::prelude::*;
use rustc_hash::FxHashMap;

use super::counter::Counter;
use super::error::{Result, TokenizerError};
use super::merge::{
    merge_weight, select_candidates, sequence_weight, substitute_pairs, Substitutions,
};
use super::heap::TopK;
use super::pair_counter::PairCounter;
use super::ssstree::SSSTree;
use super::vocab::{Token, Vocab};

const DEFAULT_N_CANDIDATES: usize = 50;

/// One candidate tail in the dynamic program: the best continuations of the
/// document from some position to its end.
#[derive(Debug, Clone)]
struct Tail {
    weight: f64,
    tokens: Vec<u32>,
    counts: Counter<u32>,
}

impl PartialEq for Tail {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Tail {}

impl PartialOrd for Tail {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Tail {
    fn cmp(&self, other: &Self) -> Ordering {
        // Heavier wins; among equal weights the shorter token sequence
        // wins, favouring fewer, larger merges.
        self.weight
            .total_cmp(&other.weight)
            .then_with(|| other.tokens.len().cmp(&self.tokens.len()))
            .then_with(|| other.tokens.cmp(&self.tokens))
    }
}

/// Universal byte-pair encoding: enumerates up to `top_n` segmentations of
/// a document, highest information weight first.
///
/// Each learned merge stores its full base-id expansion, and a lookup trie
/// over all expansions (plus every single-id key) is cached after training.
/// Encoding walks the trie to collect every token matching at every
/// reachable position, then extends tails right-to-left, keeping the best
/// `top_n` per position in a bounded heap.
pub struct UniversalTokenizer<T> {
    vocab: Vocab<T>,
    lookup: SSSTree<u32, u32>,
}

impl<T: Token> UniversalTokenizer<T> {
    /// Auto-assign base ids `0..alphabet_size` to the first values of `T`.
    pub fn new(n_tokens: u32, alphabet_size: u32) -> Result<Self>
    where
        T: TryFrom<u32>,
    {
        Ok(Self {
            vocab: Vocab::new(n_tokens, alphabet_size)?,
            lookup: SSSTree::new(),
        })
    }

    /// Use a caller-supplied alphabet bijection.
    pub fn with_alphabet(
        n_tokens: u32,
        alphabet_size: u32,
        alphabet: FxHashMap<T, u32>,
    ) -> Result<Self> {
        Ok(Self {
            vocab: Vocab::with_alphabet(n_tokens, alphabet_size, alphabet)?,
            lookup: SSSTree::new(),
        })
    }

    /// Restore a fitted tokenizer from dumped state. The backward mapper
    /// must hold full base-id expansions; the lookup trie is rebuilt.
    #[allow(clippy::too_many_arguments)]
    pub fn restore(
        n_tokens: u32,
        alphabet_size: u32,
        alphabet: FxHashMap<T, u32>,
        inverse_alphabet: FxHashMap<u32, T>,
        forward: FxHashMap<Vec<u32>, u32>,
        backward: FxHashMap<u32, Vec<u32>>,
        weights: FxHashMap<u32, f64>,
    ) -> Result<Self> {
        for (&id, expansion) in &backward {
            if expansion.len() < 2 {
                return Err(TokenizerError::InvalidConfiguration(format!(
                    "expansion of merge {} is shorter than two ids",
                    id
                )));
            }
            if expansion.iter().any(|&el| el >= alphabet_size) {
                return Err(TokenizerError::InvalidConfiguration(format!(
                    "expansion of merge {} contains a non-base id",
                    id
                )));
            }
        }
        let mut tokenizer = Self {
            vocab: Vocab::restore(
                n_tokens,
                alphabet_size,
                alphabet,
                inverse_alphabet,
                forward,
                backward,
                weights,
            )?,
            lookup: SSSTree::new(),
        };
        tokenizer.rebuild_lookup();
        Ok(tokenizer)
    }

    fn rebuild_lookup(&mut self) {
        self.lookup = SSSTree::new();
        for id in 0..self.vocab.alphabet_size() {
            self.lookup.insert(vec![id], id);
        }
        for (expansion, &id) in self.vocab.forward_mapper() {
            self.lookup.insert(expansion.clone(), id);
        }
    }

    /// Train with default options (50 candidates per iteration, rearrange
    /// by weight afterwards).
    pub fn fit(&mut self, corpus: &[Vec<T>]) -> Result<()> {
        self.fit_with_options(corpus, DEFAULT_N_CANDIDATES, true)
    }

    /// Train on `corpus`. Differs from the classic trainer only in what a
    /// merge stores: the full expansion obtained by concatenating both
    /// children's expansions.
    pub fn fit_with_options(
        &mut self,
        corpus: &[Vec<T>],
        n_candidates: usize,
        rearrange: bool,
    ) -> Result<()> {
        if n_candidates == 0 {
            return Err(TokenizerError::InvalidConfiguration(
                "n_candidates must be positive".to_string(),
            ));
        }

        let mut working: Vec<Vec<u32>> = corpus
            .iter()
            .map(|doc| self.vocab.doc_to_ids(doc))
            .collect::<Result<_>>()?;
        let corpus_docs = corpus.len() as u64;

        self.vocab.clear_merges();

        info!(
            "universal fit: {} documents, alphabet {}, target {} tokens",
            corpus.len(),
            self.vocab.alphabet_size(),
            self.vocab.n_tokens()
        );

        while self.vocab.has_room() {
            let counter = PairCounter::from_corpus(&working);
            let most_common = counter.most_common(n_candidates);
            if most_common.is_empty() {
                break;
            }

            let batch = select_candidates(&most_common, &counter);
            let mut sub: Substitutions = Substitutions::default();
            for &(pair, _) in &batch {
                let weight = merge_weight(corpus_docs, counter.get(pair).documents);
                let expansion = self.expand(pair);
                let id = self.vocab.push_merge(expansion, weight);
                sub.insert(pair.0, (pair.1, id));
            }

            for doc in &mut working {
                substitute_pairs(doc, &sub);
            }
            debug!(
                "universal fit: merged {} pairs, vocabulary at {}",
                batch.len(),
                self.vocab.vocab_size()
            );
        }

        if rearrange || self.vocab.vocab_size() > self.vocab.n_tokens() as usize {
            self.vocab.rearrange_by_weight();
        }
        self.rebuild_lookup();

        info!(
            "universal fit: done, {} merges learned",
            self.vocab.backward_mapper().len()
        );
        Ok(())
    }

    /// Concatenate the full expansions of both ids of `pair`.
    fn expand(&self, pair: (u32, u32)) -> Vec<u32> {
        let mut expansion = Vec::new();
        for id in [pair.0, pair.1] {
            match self.vocab.backward_mapper().get(&id) {
                Some(children) => expansion.extend_from_slice(children),
                None => expansion.push(id),
            }
        }
        expansion
    }

    fn ensure_fitted(&self) -> Result<()> {
        if self.lookup.is_empty() || !self.vocab.is_fitted() {
            Err(TokenizerError::NotFitted)
        } else {
            Ok(())
        }
    }

    /// Encode one document into its single best segmentation.
    pub fn encode(&self, doc: &[T]) -> Result<Vec<(Vec<u32>, f64)>> {
        self.encode_top_n(doc, 1)
    }

    /// Encode one document into up to `top_n` segmentations, heaviest
    /// first. An empty document encodes to an empty result.
    pub fn encode_top_n(&self, doc: &[T], top_n: usize) -> Result<Vec<(Vec<u32>, f64)>> {
        self.ensure_fitted()?;
        if doc.is_empty() {
            return Ok(Vec::new());
        }

        let ids = self.vocab.doc_to_ids(doc)?;
        let len = ids.len();

        // Forward sweep: collect the trie matches at position 0, then after
        // the longest match, and so on until the end of the document. Every
        // position has at least its single-id match, so the sweep advances.
        let mut stacks: Vec<(usize, Vec<(usize, u32)>)> = Vec::new();
        let mut start = 0;
        while start < len {
            let matches = self.lookup.prefix_lens(&ids, start)?;
            let longest = matches
                .last()
                .map(|&(match_len, _)| match_len)
                .unwrap_or(1);
            stacks.push((start, matches));
            start += longest;
        }

        // Backward node construction: transitions out of every position
        // reachable from 0, scheduling the match set of every end position
        // a match lands on.
        let mut nodes: FxHashMap<usize, Vec<(u32, usize)>> = FxHashMap::default();
        while let Some((start, matches)) = stacks.pop() {
            if nodes.contains_key(&start) {
                continue;
            }
            let mut transitions = Vec::with_capacity(matches.len());
            for &(match_len, id) in &matches {
                let next = start + match_len;
                transitions.push((id, next));
                if next != len && !nodes.contains_key(&next) {
                    stacks.push((next, self.lookup.prefix_lens(&ids, next)?));
                }
            }
            nodes.insert(start, transitions);
        }

        // Tail extension right to left, keeping the best `top_n` per
        // position.
        let empty: Vec<(u32, usize)> = Vec::new();
        let mut tails: Vec<Vec<Tail>> = vec![Vec::new(); len + 1];
        tails[len] = vec![Tail {
            weight: 0.0,
            tokens: Vec::new(),
            counts: Counter::new(),
        }];
        for start in (0..len).rev() {
            let mut best = TopK::new(top_n);
            for &(id, next) in nodes.get(&start).unwrap_or(&empty) {
                for tail in &tails[next] {
                    let mut tokens = Vec::with_capacity(tail.tokens.len() + 1);
                    tokens.push(id);
                    tokens.extend_from_slice(&tail.tokens);
                    let mut counts = tail.counts.clone();
                    counts.add(id);
                    let weight = sequence_weight(&counts, self.vocab.weights());
                    best.push(Tail {
                        weight,
                        tokens,
                        counts,
                    });
                }
            }
            tails[start] = best.into_sorted();
        }

        Ok(tails
            .swap_remove(0)
            .into_iter()
            .map(|tail| (tail.tokens, tail.weight))
            .collect())
    }

    /// Decode ids back to a document: merged ids expand wholesale to their
    /// cached base-id expansion, base ids pass through.
    pub fn decode(&self, tokens: &[u32]) -> Result<Vec<T>> {
        self.ensure_fitted()?;
        if tokens.is_empty() {
            return Ok(Vec::new());
        }

        let mut expanded = Vec::with_capacity(tokens.len() * 2);
        for token in tokens {
            match self.vocab.backward_mapper().get(token) {
                Some(expansion) => expanded.extend_from_slice(expansion),
                None => expanded.push(*token),
            }
        }
        self.vocab.ids_to_doc(&expanded)
    }

    /// Encode many documents in parallel.
    pub fn encode_batch(&self, docs: &[Vec<T>], top_n: usize) -> Result<Vec<Vec<(Vec<u32>, f64)>>>
    where
        T: Send + Sync,
    {
        docs.par_iter()
            .map(|doc| self.encode_top_n(doc, top_n))
            .collect()
    }

    /// Decode many id sequences in parallel.
    pub fn decode_batch(&self, token_lists: &[Vec<u32>]) -> Result<Vec<Vec<T>>>
    where
        T: Send + Sync,
    {
        token_lists
            .par_iter()
            .map(|tokens| self.decode(tokens))
            .collect()
    }

    pub fn n_tokens(&self) -> u32 {
        self.vocab.n_tokens()
    }

    pub fn alphabet_size(&self) -> u32 {
        self.vocab.alphabet_size()
    }

    pub fn vocab_size(&self) -> usize {
        self.vocab.vocab_size()
    }

    pub fn forward_mapper(&self) -> &FxHashMap<Vec<u32>, u32> {
        self.vocab.forward_mapper()
    }

    pub fn backward_mapper(&self) -> &FxHashMap<u32, Vec<u32>> {
        self.vocab.backward_mapper()
    }

    pub fn weights(&self) -> &FxHashMap<u32, f64> {
        self.vocab.weights()
    }

    pub fn alphabet(&self) -> &FxHashMap<T, u32> {
        self.vocab.alphabet()
    }

    pub fn inverse_alphabet(&self) -> &FxHashMap<u32, T> {
        self.vocab.inverse_alphabet()
    }
}

impl<T: Token> Clone for UniversalTokenizer<T> {
    fn clone(&self) -> Self {
        Self {
            vocab: self.vocab.clone(),
            lookup: self.lookup.clone(),
        }
    }
}
