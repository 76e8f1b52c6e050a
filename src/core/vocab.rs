//! Shared vocabulary state for both tokenizers.
//!
//! A [`Vocab`] owns the alphabet bijection, the forward/backward merge maps
//! and the merge weights, along with the weight-based pruning that trims and
//! renumbers the learned vocabulary. The tokenizers differ in behavior, not
//! in state, so they compose this struct instead of inheriting anything.

use std::hash::Hash;

use rustc_hash::{FxHashMap, FxHashSet};

use super::error::{Result, TokenizerError};

/// Element type of documents: anything hashable and comparable.
pub trait Token: Clone + Eq + Hash {}

impl<T: Clone + Eq + Hash> Token for T {}

/// Vocabulary state: alphabet, merge maps and weights.
///
/// Base ids are `0..alphabet_size`; merged ids are dense above that. The
/// backward map holds each merge's children list (its immediate pair for
/// the classic tokenizer, the full base-id expansion for the universal
/// one); the forward map is its inverse.
#[derive(Debug, Clone)]
pub struct Vocab<T> {
    n_tokens: u32,
    alphabet_size: u32,
    alphabet: FxHashMap<T, u32>,
    inverse_alphabet: FxHashMap<u32, T>,
    forward: FxHashMap<Vec<u32>, u32>,
    backward: FxHashMap<u32, Vec<u32>>,
    weights: FxHashMap<u32, f64>,
}

impl<T: Token> Vocab<T> {
    /// Auto-assign base ids `0..alphabet_size` to the first values of `T`.
    pub fn new(n_tokens: u32, alphabet_size: u32) -> Result<Self>
    where
        T: TryFrom<u32>,
    {
        let mut alphabet = FxHashMap::default();
        let mut inverse_alphabet = FxHashMap::default();
        for id in 0..alphabet_size {
            let token = T::try_from(id).map_err(|_| {
                TokenizerError::InvalidConfiguration(format!(
                    "token type cannot represent base id {}",
                    id
                ))
            })?;
            alphabet.insert(token.clone(), id);
            inverse_alphabet.insert(id, token);
        }
        Ok(Self {
            n_tokens,
            alphabet_size,
            alphabet,
            inverse_alphabet,
            forward: FxHashMap::default(),
            backward: FxHashMap::default(),
            weights: FxHashMap::default(),
        })
    }

    /// Use a caller-supplied alphabet bijection.
    pub fn with_alphabet(
        n_tokens: u32,
        alphabet_size: u32,
        alphabet: FxHashMap<T, u32>,
    ) -> Result<Self> {
        if alphabet.len() != alphabet_size as usize {
            return Err(TokenizerError::InvalidConfiguration(format!(
                "alphabet has {} entries, expected alphabet_size = {}",
                alphabet.len(),
                alphabet_size
            )));
        }
        let inverse_alphabet: FxHashMap<u32, T> = alphabet
            .iter()
            .map(|(token, &id)| (id, token.clone()))
            .collect();
        if inverse_alphabet.len() != alphabet.len() {
            return Err(TokenizerError::InvalidConfiguration(
                "alphabet ids are not distinct".to_string(),
            ));
        }
        Ok(Self {
            n_tokens,
            alphabet_size,
            alphabet,
            inverse_alphabet,
            forward: FxHashMap::default(),
            backward: FxHashMap::default(),
            weights: FxHashMap::default(),
        })
    }

    /// Restore a fully fitted state, e.g. when loading a dump.
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
        if alphabet.len() != alphabet_size as usize {
            return Err(TokenizerError::InvalidConfiguration(format!(
                "alphabet has {} entries, expected alphabet_size = {}",
                alphabet.len(),
                alphabet_size
            )));
        }
        if inverse_alphabet.len() != alphabet.len() {
            return Err(TokenizerError::InvalidConfiguration(
                "alphabet and inverse alphabet differ in size".to_string(),
            ));
        }
        if forward.len() != backward.len() {
            return Err(TokenizerError::InvalidConfiguration(
                "forward and backward mappers differ in size".to_string(),
            ));
        }
        for (&id, expansion) in &backward {
            if forward.get(expansion) != Some(&id) {
                return Err(TokenizerError::InvalidConfiguration(format!(
                    "forward and backward mappers disagree on id {}",
                    id
                )));
            }
            if !weights.contains_key(&id) {
                return Err(TokenizerError::InvalidConfiguration(format!(
                    "missing weight for id {}",
                    id
                )));
            }
        }
        Ok(Self {
            n_tokens,
            alphabet_size,
            alphabet,
            inverse_alphabet,
            forward,
            backward,
            weights,
        })
    }

    pub fn n_tokens(&self) -> u32 {
        self.n_tokens
    }

    pub fn alphabet_size(&self) -> u32 {
        self.alphabet_size
    }

    /// Alphabet plus learned merges.
    pub fn vocab_size(&self) -> usize {
        self.alphabet_size as usize + self.backward.len()
    }

    /// Whether another merge id may still be allocated before `n_tokens`.
    pub fn has_room(&self) -> bool {
        self.vocab_size() < self.n_tokens as usize
    }

    pub fn is_fitted(&self) -> bool {
        !self.backward.is_empty()
    }

    pub fn forward_mapper(&self) -> &FxHashMap<Vec<u32>, u32> {
        &self.forward
    }

    pub fn backward_mapper(&self) -> &FxHashMap<u32, Vec<u32>> {
        &self.backward
    }

    pub fn weights(&self) -> &FxHashMap<u32, f64> {
        &self.weights
    }

    pub fn alphabet(&self) -> &FxHashMap<T, u32> {
        &self.alphabet
    }

    pub fn inverse_alphabet(&self) -> &FxHashMap<u32, T> {
        &self.inverse_alphabet
    }

    /// Render a document as base ids.
    pub fn doc_to_ids(&self, doc: &[T]) -> Result<Vec<u32>> {
        doc.iter()
            .map(|token| {
                self.alphabet.get(token).copied().ok_or_else(|| {
                    TokenizerError::InvalidInput(
                        "document contains an element outside the alphabet".to_string(),
                    )
                })
            })
            .collect()
    }

    /// Render base ids back as a document.
    pub fn ids_to_doc(&self, ids: &[u32]) -> Result<Vec<T>> {
        ids.iter()
            .map(|id| {
                self.inverse_alphabet.get(id).cloned().ok_or_else(|| {
                    TokenizerError::InvalidInput(format!("id {} is not a base id", id))
                })
            })
            .collect()
    }

    /// Drop all learned merges, keeping the alphabet.
    pub fn clear_merges(&mut self) {
        self.forward.clear();
        self.backward.clear();
        self.weights.clear();
    }

    /// Allocate the next merge id for `expansion` with `weight`.
    pub fn push_merge(&mut self, expansion: Vec<u32>, weight: f64) -> u32 {
        let id = self.alphabet_size + self.backward.len() as u32;
        self.weights.insert(id, weight);
        self.forward.insert(expansion.clone(), id);
        self.backward.insert(id, expansion);
        id
    }

    /// Prune the vocabulary to `n_tokens` and renumber merges by weight.
    ///
    /// Merges are sorted by ascending weight (ties by id) and the weakest
    /// are marked for deletion until the vocabulary fits. A deletion mark
    /// propagates to every merge whose children list references a deleted
    /// id, transitively, so no survivor can dangle. Survivors are then
    /// renumbered densely from `alphabet_size`, highest weight first, and
    /// all maps are rewritten through the old-to-new id mapping.
    pub fn rearrange_by_weight(&mut self) {
        if self.backward.is_empty() {
            return;
        }

        let mut buf: Vec<(u32, Vec<u32>)> = self
            .backward
            .iter()
            .map(|(&id, expansion)| (id, expansion.clone()))
            .collect();
        buf.sort_by(|a, b| {
            self.weights[&a.0]
                .total_cmp(&self.weights[&b.0])
                .then_with(|| a.0.cmp(&b.0))
        });

        let quota = self.vocab_size().saturating_sub(self.n_tokens as usize);

        let mut delete_idx: FxHashSet<usize> = FxHashSet::default();
        for i in 0..buf.len() {
            if delete_idx.contains(&i) {
                continue;
            }
            if delete_idx.len() >= quota {
                break;
            }
            // Mark `i` and, transitively, every later entry whose children
            // reference a marked id.
            let mut pending = vec![i];
            while let Some(x) = pending.pop() {
                if !delete_idx.insert(x) {
                    continue;
                }
                let id = buf[x].0;
                for (j, entry) in buf.iter().enumerate().skip(x + 1) {
                    if !delete_idx.contains(&j) && entry.1.contains(&id) {
                        pending.push(j);
                    }
                }
            }
        }

        let deleted: FxHashSet<u32> = delete_idx.iter().map(|&i| buf[i].0).collect();

        // Highest weight first so it receives the smallest new id.
        buf.reverse();

        let mut transformer: FxHashMap<u32, u32> =
            (0..self.alphabet_size).map(|id| (id, id)).collect();
        let mut next = self.alphabet_size;
        for (id, _) in &buf {
            if !deleted.contains(id) {
                transformer.insert(*id, next);
                next += 1;
            }
        }

        let mut weights = FxHashMap::default();
        let mut forward = FxHashMap::default();
        let mut backward = FxHashMap::default();
        for (id, expansion) in &buf {
            if deleted.contains(id) {
                continue;
            }
            let new_id = transformer[id];
            let new_expansion: Vec<u32> = expansion.iter().map(|el| transformer[el]).collect();
            weights.insert(new_id, self.weights[id]);
            forward.insert(new_expansion.clone(), new_id);
            backward.insert(new_id, new_expansion);
        }

        self.weights = weights;
        self.forward = forward;
        self.backward = backward;
    }
}
