//! Fit machinery shared by both tokenizers: candidate batch selection, the
//! batch substitution pass, and the weight formulas.

use rustc_hash::{FxHashMap, FxHashSet};

use super::counter::Counter;
use super::pair_counter::PairCounter;

/// Substitution map: first id of a pair to (second id, replacement id).
/// Keys must be pairwise disjoint from every pair's second id, which the
/// batch selection guarantees.
pub(crate) type Substitutions = FxHashMap<u32, (u32, u32)>;

/// Replace every adjacent pair found in `sub` in a single left-to-right
/// two-pointer pass, in place.
pub(crate) fn substitute_pairs(doc: &mut Vec<u32>, sub: &Substitutions) {
    let mut left = 0;
    let mut right = 0;

    while right + 1 < doc.len() {
        match sub.get(&doc[right]) {
            Some(&(second, replacement)) if doc[right + 1] == second => {
                doc[left] = replacement;
                left += 1;
                right += 2;
            }
            _ => {
                doc[left] = doc[right];
                left += 1;
                right += 1;
            }
        }
    }
    if right < doc.len() {
        doc[left] = doc[right];
        left += 1;
    }

    doc.truncate(left);
}

/// Select the merge batch for one training iteration.
///
/// The most common pair seeds the batch; every further candidate must not
/// share an id with an accepted pair, and the pairs it would form at the
/// border of each accepted pair must occur strictly less often than the
/// candidate itself.
pub(crate) fn select_candidates(
    most_common: &[((u32, u32), u64)],
    counter: &PairCounter,
) -> Vec<((u32, u32), u64)> {
    let Some(&(seed, seed_count)) = most_common.first() else {
        return Vec::new();
    };

    let mut batch = vec![(seed, seed_count)];
    let mut used: FxHashSet<u32> = FxHashSet::default();
    used.insert(seed.0);
    used.insert(seed.1);

    for &(pair, count) in most_common.iter().skip(1) {
        if used.contains(&pair.0) || used.contains(&pair.1) {
            continue;
        }
        let acceptable = batch.iter().all(|&(accepted, _)| {
            counter.get((pair.1, accepted.0)).occurrences < count
                && counter.get((accepted.1, pair.0)).occurrences < count
        });
        if acceptable {
            batch.push((pair, count));
            used.insert(pair.0);
            used.insert(pair.1);
        }
    }

    batch
}

/// Information weight of a merge: `ln((1 + D) / (1 + d))` for a corpus of
/// `D` documents of which `d` contain the pair.
pub(crate) fn merge_weight(corpus_docs: u64, pair_docs: u64) -> f64 {
    ((1 + corpus_docs) as f64 / (1 + pair_docs) as f64).ln()
}

/// Score of an encoded sequence: over its distinct ids,
/// `(1 + ln(count)) * weight`; ids without a weight (the alphabet)
/// contribute nothing.
pub(crate) fn sequence_weight(counts: &Counter<u32>, weights: &FxHashMap<u32, f64>) -> f64 {
    counts
        .iter()
        .filter_map(|(id, &count)| {
            weights
                .get(id)
                .map(|weight| (1.0 + (count as f64).ln()) * weight)
        })
        .sum()
}
