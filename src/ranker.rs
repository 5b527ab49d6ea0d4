//! The ranked-list source consumed by every comparison method.
//!
//! Scoring and learning live outside this crate; a [`Ranker`] only has to hand out a
//! per-query ranking one document at a time and report how likely each remaining document is
//! to come next. Two reference implementations are provided:
//!
//! - [`DeterministicRanker`]: always yields the top remaining document.
//! - [`ProbabilisticRanker`]: samples documents with probability proportional to
//!   `1 / (rank + 1)^tau` over the remaining ones (the softmax-over-ranks distribution used by
//!   probabilistic interleaving).
//!
//! Both order a query's candidates by a fixed preference over document ids; candidates the
//! preference does not mention follow in query order.

use rand::{Rng, RngCore};

use crate::alloc::{rank_weights, DEFAULT_TAU};
use crate::document::{DocId, Document, Query};

/// Stateful per-query source of ranked documents.
///
/// Contract: after [`init_ranking`](Ranker::init_ranking), repeated `next*` calls yield the
/// available documents without repetition until exhausted, and
/// [`document_probability`](Ranker::document_probability) is consistent with what
/// [`next`](Ranker::next) would draw. Running out of documents is not an error; callers
/// simply produce shorter lists.
pub trait Ranker {
    /// Reset to a fresh ranking for `query`.
    fn init_ranking(&mut self, query: &Query);

    /// Draw the next document according to the ranker's own distribution.
    fn next(&mut self, rng: &mut dyn RngCore) -> Option<Document>;

    /// Pop the highest-ranked remaining document.
    fn next_det(&mut self) -> Option<Document>;

    /// Pop a uniformly random remaining document.
    fn next_random(&mut self, rng: &mut dyn RngCore) -> Option<Document>;

    /// Probability that [`next`](Ranker::next) would return `doc` now.
    fn document_probability(&self, doc: &Document) -> f64;

    /// Make `doc` unavailable (keeps several rankers' availability in sync).
    fn rm_document(&mut self, doc: &Document);

    /// Number of documents still available.
    fn document_count(&self) -> usize;
}

/// Order `query`'s candidates by `preference`; unmentioned documents follow in query order.
fn order_documents(query: &Query, preference: &[DocId]) -> Vec<Document> {
    let mut docs: Vec<(usize, usize, Document)> = query
        .documents()
        .iter()
        .enumerate()
        .map(|(i, d)| {
            let key = preference
                .iter()
                .position(|&p| p == d.id())
                .unwrap_or(preference.len());
            (key, i, d.clone())
        })
        .collect();
    docs.sort_by_key(|(key, i, _)| (*key, *i));
    docs.into_iter().map(|(_, _, d)| d).collect()
}

fn pop_random(remaining: &mut Vec<Document>, rng: &mut dyn RngCore) -> Option<Document> {
    if remaining.is_empty() {
        return None;
    }
    let i = rng.random_range(0..remaining.len());
    Some(remaining.remove(i))
}

/// Ranker that always returns its top remaining document.
#[derive(Debug, Clone)]
pub struct DeterministicRanker {
    preference: Vec<DocId>,
    remaining: Vec<Document>,
}

impl DeterministicRanker {
    /// Rank documents in the order of `preference`.
    pub fn new(preference: impl IntoIterator<Item = DocId>) -> Self {
        Self {
            preference: preference.into_iter().collect(),
            remaining: Vec::new(),
        }
    }

    /// A ranker that replays `list` (used to chain comparisons through a synthetic ranker).
    pub fn from_list(list: &[Document]) -> Self {
        Self::new(list.iter().map(Document::id))
    }

    /// Remaining documents in rank order.
    pub fn remaining(&self) -> &[Document] {
        &self.remaining
    }
}

impl Ranker for DeterministicRanker {
    fn init_ranking(&mut self, query: &Query) {
        self.remaining = order_documents(query, &self.preference);
    }

    fn next(&mut self, _rng: &mut dyn RngCore) -> Option<Document> {
        self.next_det()
    }

    fn next_det(&mut self) -> Option<Document> {
        if self.remaining.is_empty() {
            None
        } else {
            Some(self.remaining.remove(0))
        }
    }

    fn next_random(&mut self, rng: &mut dyn RngCore) -> Option<Document> {
        pop_random(&mut self.remaining, rng)
    }

    fn document_probability(&self, doc: &Document) -> f64 {
        match self.remaining.first() {
            Some(top) if top == doc => 1.0,
            _ => 0.0,
        }
    }

    fn rm_document(&mut self, doc: &Document) {
        self.remaining.retain(|d| d != doc);
    }

    fn document_count(&self) -> usize {
        self.remaining.len()
    }
}

/// Ranker that samples documents with probability `∝ 1 / (rank + 1)^tau`.
///
/// Ranks are fixed at [`init_ranking`](Ranker::init_ranking); removing documents renormalizes
/// over the remaining ones without re-ranking them.
#[derive(Debug, Clone)]
pub struct ProbabilisticRanker {
    preference: Vec<DocId>,
    tau: f64,
    remaining: Vec<(Document, f64)>,
}

impl ProbabilisticRanker {
    /// Rank documents in the order of `preference` with the default decay (`tau = 3`).
    pub fn new(preference: impl IntoIterator<Item = DocId>) -> Self {
        Self::with_tau(preference, DEFAULT_TAU)
    }

    pub fn with_tau(preference: impl IntoIterator<Item = DocId>, tau: f64) -> Self {
        Self {
            preference: preference.into_iter().collect(),
            tau,
            remaining: Vec::new(),
        }
    }

    fn total_weight(&self) -> f64 {
        self.remaining.iter().map(|(_, w)| w).sum()
    }
}

impl Ranker for ProbabilisticRanker {
    fn init_ranking(&mut self, query: &Query) {
        let docs = order_documents(query, &self.preference);
        let weights = rank_weights(docs.len(), self.tau);
        self.remaining = docs.into_iter().zip(weights).collect();
    }

    fn next(&mut self, rng: &mut dyn RngCore) -> Option<Document> {
        if self.remaining.is_empty() {
            return None;
        }
        let total = self.total_weight();
        let r: f64 = rng.random::<f64>() * total;
        let mut acc = 0.0;
        let mut chosen = self.remaining.len() - 1;
        for (i, (_, w)) in self.remaining.iter().enumerate() {
            acc += w;
            if r < acc {
                chosen = i;
                break;
            }
        }
        Some(self.remaining.remove(chosen).0)
    }

    fn next_det(&mut self) -> Option<Document> {
        if self.remaining.is_empty() {
            None
        } else {
            Some(self.remaining.remove(0).0)
        }
    }

    fn next_random(&mut self, rng: &mut dyn RngCore) -> Option<Document> {
        if self.remaining.is_empty() {
            return None;
        }
        let i = rng.random_range(0..self.remaining.len());
        Some(self.remaining.remove(i).0)
    }

    fn document_probability(&self, doc: &Document) -> f64 {
        let total = self.total_weight();
        if total <= 0.0 {
            return 0.0;
        }
        self.remaining
            .iter()
            .find(|(d, _)| d == doc)
            .map(|(_, w)| w / total)
            .unwrap_or(0.0)
    }

    fn rm_document(&mut self, doc: &Document) {
        self.remaining.retain(|(d, _)| d != doc);
    }

    fn document_count(&self) -> usize {
        self.remaining.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::doc_ids;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn query() -> Query {
        Query::with_ids("q", 0..4)
    }

    #[test]
    fn deterministic_ranker_follows_preference() {
        let mut rng = StdRng::seed_from_u64(0);
        let mut r = DeterministicRanker::new([2, 0]);
        r.init_ranking(&query());
        assert_eq!(doc_ids(r.remaining()), vec![2, 0, 1, 3]);
        assert_eq!(r.document_probability(&Document::new(2)), 1.0);
        assert_eq!(r.document_probability(&Document::new(0)), 0.0);
        assert_eq!(r.next(&mut rng).map(|d| d.id()), Some(2));
        r.rm_document(&Document::new(1));
        assert_eq!(r.document_count(), 2);
        assert_eq!(r.next_det().map(|d| d.id()), Some(0));
        assert_eq!(r.next_det().map(|d| d.id()), Some(3));
        assert!(r.next_det().is_none());
    }

    #[test]
    fn init_ranking_resets_state() {
        let mut r = DeterministicRanker::new([3, 2, 1, 0]);
        r.init_ranking(&query());
        r.next_det();
        r.next_det();
        r.init_ranking(&query());
        assert_eq!(r.document_count(), 4);
    }

    #[test]
    fn probabilistic_ranker_probabilities_sum_to_one() {
        let mut r = ProbabilisticRanker::new([1, 0, 3, 2]);
        r.init_ranking(&query());
        let total: f64 = query()
            .documents()
            .iter()
            .map(|d| r.document_probability(d))
            .sum();
        assert!((total - 1.0).abs() < 1e-12);

        r.rm_document(&Document::new(1));
        let total: f64 = query()
            .documents()
            .iter()
            .map(|d| r.document_probability(d))
            .sum();
        assert!((total - 1.0).abs() < 1e-12);
        assert_eq!(r.document_probability(&Document::new(1)), 0.0);
    }

    #[test]
    fn probabilistic_ranker_draws_without_repetition() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut r = ProbabilisticRanker::new([1, 0, 3, 2]);
        r.init_ranking(&query());
        let mut seen = Vec::new();
        while let Some(d) = r.next(&mut rng) {
            assert!(!seen.contains(&d));
            seen.push(d);
        }
        assert_eq!(seen.len(), 4);
    }

    #[test]
    fn probabilistic_ranker_prefers_top_document() {
        let mut rng = StdRng::seed_from_u64(11);
        let mut r = ProbabilisticRanker::new([1, 0, 3, 2]);
        let mut top_hits = 0;
        for _ in 0..500 {
            r.init_ranking(&query());
            if r.next(&mut rng).map(|d| d.id()) == Some(1) {
                top_hits += 1;
            }
        }
        // P(top) = 1 / (1 + 1/8 + 1/27 + 1/64) ≈ 0.85
        assert!(top_hits > 350, "top_hits={top_hits}");
    }
}
