//! Deterministic greedy BPE.

use std::hash::{Hash, Hasher};
use std::num::NonZeroUsize;
use std::sync::Mutex;

use log::{debug, info};
use lru::LruCache;
use rayon::prelude::*;
use rustc_hash::{FxHashMap, FxHashSet, FxHasher};

use super::counter::Counter;
use super::error::{Result, TokenizerError};
use super::merge::{
    merge_weight, select_candidates, sequence_weight, substitute_pairs, Substitutions,
};
use super::pair_counter::PairCounter;
use super::vocab::{Token, Vocab};

/// Default number of candidate pairs examined per training iteration.
const DEFAULT_N_CANDIDATES: usize = 50;

/// Default capacity of the encoded-document cache.
const DEFAULT_CACHE_SIZE: usize = 4096;

/// Classic byte-pair encoding over sequences of any alphabet.
///
/// Training batches several non-overlapping merges per pass over the
/// corpus. Each learned merge stores its immediate pair of children, so the
/// merge graph is a DAG walked during decoding. Encoding greedily applies
/// the highest-priority pair present in the document until none matches,
/// and always returns a single segmentation.
pub struct ClassicTokenizer<T> {
    vocab: Vocab<T>,
    /// Immediate children of each merged id.
    pairwise: FxHashMap<u32, (u32, u32)>,
    /// Children pairs ordered by id: the greedy application priority.
    pairs: Vec<(u32, u32)>,
    cache: Mutex<LruCache<u64, (Vec<u32>, f64)>>,
    cache_size: usize,
}

fn new_cache(size: usize) -> Mutex<LruCache<u64, (Vec<u32>, f64)>> {
    let capacity = NonZeroUsize::new(size.max(1)).expect("cache size is at least one");
    Mutex::new(LruCache::new(capacity))
}

fn hash_ids(ids: &[u32]) -> u64 {
    let mut hasher = FxHasher::default();
    ids.hash(&mut hasher);
    hasher.finish()
}

impl<T: Token> ClassicTokenizer<T> {
    /// Auto-assign base ids `0..alphabet_size` to the first values of `T`.
    pub fn new(n_tokens: u32, alphabet_size: u32) -> Result<Self>
    where
        T: TryFrom<u32>,
    {
        Ok(Self::from_vocab(Vocab::new(n_tokens, alphabet_size)?))
    }

    /// Use a caller-supplied alphabet bijection.
    pub fn with_alphabet(
        n_tokens: u32,
        alphabet_size: u32,
        alphabet: FxHashMap<T, u32>,
    ) -> Result<Self> {
        Ok(Self::from_vocab(Vocab::with_alphabet(
            n_tokens,
            alphabet_size,
            alphabet,
        )?))
    }

    /// Restore a fitted tokenizer from dumped state. The backward mapper
    /// must hold the immediate children pair of every merge.
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
        for (&id, children) in &backward {
            if children.len() != 2 {
                return Err(TokenizerError::InvalidConfiguration(format!(
                    "merge {} does not have exactly two children",
                    id
                )));
            }
        }
        let vocab = Vocab::restore(
            n_tokens,
            alphabet_size,
            alphabet,
            inverse_alphabet,
            forward,
            backward,
            weights,
        )?;
        let mut tokenizer = Self::from_vocab(vocab);
        tokenizer.rebuild_pair_caches();
        Ok(tokenizer)
    }

    fn from_vocab(vocab: Vocab<T>) -> Self {
        Self {
            vocab,
            pairwise: FxHashMap::default(),
            pairs: Vec::new(),
            cache: new_cache(DEFAULT_CACHE_SIZE),
            cache_size: DEFAULT_CACHE_SIZE,
        }
    }

    /// Resize the encoded-document cache.
    pub fn with_cache_size(mut self, cache_size: usize) -> Self {
        self.cache_size = cache_size;
        self.cache = new_cache(cache_size);
        self
    }

    /// Train with default options (50 candidates per iteration, rearrange
    /// by weight afterwards).
    pub fn fit(&mut self, corpus: &[Vec<T>]) -> Result<()> {
        self.fit_with_options(corpus, DEFAULT_N_CANDIDATES, true)
    }

    /// Train on `corpus`.
    ///
    /// `n_candidates` bounds how many top pairs each iteration may merge in
    /// one batch; `rearrange` renumbers the learned vocabulary by weight
    /// when training ends. Training always prunes back to `n_tokens` if the
    /// final batch overshot.
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
        self.pairwise.clear();
        self.pairs.clear();

        info!(
            "classic fit: {} documents, alphabet {}, target {} tokens",
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
                let id = self.vocab.push_merge(vec![pair.0, pair.1], weight);
                sub.insert(pair.0, (pair.1, id));
            }

            for doc in &mut working {
                substitute_pairs(doc, &sub);
            }
            debug!(
                "classic fit: merged {} pairs, vocabulary at {}",
                batch.len(),
                self.vocab.vocab_size()
            );
        }

        if rearrange || self.vocab.vocab_size() > self.vocab.n_tokens() as usize {
            self.vocab.rearrange_by_weight();
        }
        self.rebuild_pair_caches();
        self.clear_cache();

        info!(
            "classic fit: done, {} merges learned",
            self.vocab.backward_mapper().len()
        );
        Ok(())
    }

    fn rebuild_pair_caches(&mut self) {
        self.pairwise = self
            .vocab
            .backward_mapper()
            .iter()
            .map(|(&id, children)| (id, (children[0], children[1])))
            .collect();

        let mut ordered: Vec<(u32, (u32, u32))> = self.pairwise.iter().map(|(&id, &p)| (id, p)).collect();
        ordered.sort_unstable_by_key(|&(id, _)| id);
        self.pairs = ordered.into_iter().map(|(_, pair)| pair).collect();
    }

    fn ensure_fitted(&self) -> Result<()> {
        if self.vocab.is_fitted() {
            Ok(())
        } else {
            Err(TokenizerError::NotFitted)
        }
    }

    /// Encode one document.
    ///
    /// Returns at most one `(ids, weight)` segmentation; greedy application
    /// is deterministic, so there is never an alternative to report. An
    /// empty document encodes to an empty result.
    pub fn encode(&self, doc: &[T]) -> Result<Vec<(Vec<u32>, f64)>> {
        self.ensure_fitted()?;
        if doc.is_empty() {
            return Ok(Vec::new());
        }

        let ids = self.vocab.doc_to_ids(doc)?;
        let key = hash_ids(&ids);
        if let Ok(mut cache) = self.cache.lock() {
            if let Some(hit) = cache.get(&key) {
                return Ok(vec![hit.clone()]);
            }
        }

        let encoded = self.reduce(ids);
        if let Ok(mut cache) = self.cache.lock() {
            cache.put(key, encoded.clone());
        }
        Ok(vec![encoded])
    }

    /// Greedy encoding has a unique result, so `top_n` is accepted for
    /// interface parity with the universal tokenizer and ignored.
    pub fn encode_top_n(&self, doc: &[T], _top_n: usize) -> Result<Vec<(Vec<u32>, f64)>> {
        self.encode(doc)
    }

    /// Greedily rewrite `ids` until no learned pair is present, then score
    /// the fixed point.
    fn reduce(&self, mut ids: Vec<u32>) -> (Vec<u32>, f64) {
        loop {
            let present: FxHashSet<(u32, u32)> = ids
                .windows(2)
                .map(|window| (window[0], window[1]))
                .collect();
            let Some(first) = self
                .pairs
                .iter()
                .position(|pair| present.contains(pair))
            else {
                break;
            };

            // Collect a batch starting from the highest-priority hit: stop
            // at the first id conflict, skip pairs no longer present.
            let mut sub: Substitutions = Substitutions::default();
            let mut used: FxHashSet<u32> = FxHashSet::default();
            for &pair in &self.pairs[first..] {
                if used.contains(&pair.0) || used.contains(&pair.1) {
                    break;
                }
                if !present.contains(&pair) {
                    continue;
                }
                let id = self.vocab.forward_mapper()[&vec![pair.0, pair.1]];
                sub.insert(pair.0, (pair.1, id));
                used.insert(pair.0);
                used.insert(pair.1);
            }

            substitute_pairs(&mut ids, &sub);
        }

        let mut counts = Counter::new();
        for &id in &ids {
            counts.add(id);
        }
        let weight = sequence_weight(&counts, self.vocab.weights());
        (ids, weight)
    }

    /// Decode ids back to a document, expanding each merge through its
    /// children until only base ids remain.
    pub fn decode(&self, tokens: &[u32]) -> Result<Vec<T>> {
        self.ensure_fitted()?;
        if tokens.is_empty() {
            return Ok(Vec::new());
        }

        let mut expanded = Vec::with_capacity(tokens.len() * 2);
        let mut pending: Vec<u32> = Vec::new();
        for &token in tokens {
            pending.push(token);
            while let Some(id) = pending.pop() {
                match self.pairwise.get(&id) {
                    Some(&(first, second)) => {
                        pending.push(second);
                        pending.push(first);
                    }
                    None => expanded.push(id),
                }
            }
        }
        self.vocab.ids_to_doc(&expanded)
    }

    /// Encode many documents in parallel.
    pub fn encode_batch(&self, docs: &[Vec<T>]) -> Result<Vec<Vec<(Vec<u32>, f64)>>>
    where
        T: Send + Sync,
    {
        docs.par_iter().map(|doc| self.encode(doc)).collect()
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

    /// Drop all cached encodings.
    pub fn clear_cache(&self) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.clear();
        }
    }

    /// Number of cached encodings.
    pub fn cache_len(&self) -> usize {
        self.cache.lock().map(|cache| cache.len()).unwrap_or(0)
    }
}

impl<T: Token> Clone for ClassicTokenizer<T> {
    fn clone(&self) -> Self {
        // Caches are not shared between clones.
        Self {
            vocab: self.vocab.clone(),
            pairwise: self.pairwise.clone(),
            pairs: self.pairs.clone(),
            cache: new_cache(self.cache_size),
            cache_size: self.cache_size,
        }
    }
}
