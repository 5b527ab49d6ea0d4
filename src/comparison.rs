//! The comparison-method capability exposed to experiment drivers and samplers.
//!
//! Every method implements [`InterleavedComparison`]: build a shown list plus a [`Context`]
//! with `interleave`, then turn a click vector into an [`Outcome`] with `infer_outcome`.
//! Methods that can reuse logged impressions under a different ranker pair additionally
//! implement [`HistoricalComparison`].
//!
//! Rankers are passed as `&mut [&mut dyn Ranker]`, which keeps both traits object-safe and
//! makes it impossible to pass one ranker in two slots.
//!
//! # Example
//!
//! ```rust
//! use multileave::{DeterministicRanker, InterleavedComparison, Query, Ranker, TeamDraft};
//! use rand::rngs::StdRng;
//! use rand::SeedableRng;
//!
//! let query = Query::with_ids("q", 0..4);
//! let mut a = DeterministicRanker::new([1, 2, 3, 0]);
//! let mut b = DeterministicRanker::new([0, 1, 3, 2]);
//! let mut rng = StdRng::seed_from_u64(0);
//!
//! let method = TeamDraft::default();
//! let mut rankers: [&mut dyn Ranker; 2] = [&mut a, &mut b];
//! let shown = method.interleave(&mut rankers, &query, 4, &mut rng).unwrap();
//! let clicks = vec![false; shown.list.len()];
//! let outcome = method
//!     .infer_outcome(&shown.list, &shown.context, &clicks, &query)
//!     .unwrap();
//! assert!(outcome.is_tie());
//! ```

use rand::RngCore;

use crate::context::{Context, Outcome};
use crate::document::{Document, Query};
use crate::error::ComparisonError;
use crate::ranker::Ranker;

/// A shown list together with the context needed to attribute clicks on it.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Interleaving {
    pub list: Vec<Document>,
    pub context: Context,
}

/// Online comparison of two (or, for multileaving, more) rankers.
pub trait InterleavedComparison {
    /// Stable method name (the registry spelling).
    fn name(&self) -> &'static str;

    /// Combine the rankers' results for `query` into one list of at most `length` documents.
    ///
    /// The list is shorter than `length` when a ranker runs out of documents.
    fn interleave(
        &self,
        rankers: &mut [&mut dyn Ranker],
        query: &Query,
        length: usize,
        rng: &mut dyn RngCore,
    ) -> Result<Interleaving, ComparisonError>;

    /// Draw `repeats` independent interleavings for the same query.
    fn interleave_n(
        &self,
        rankers: &mut [&mut dyn Ranker],
        query: &Query,
        length: usize,
        repeats: usize,
        rng: &mut dyn RngCore,
    ) -> Result<Vec<Interleaving>, ComparisonError> {
        (0..repeats)
            .map(|_| self.interleave(rankers, query, length, rng))
            .collect()
    }

    /// Attribute `clicks` (aligned with `list`) to the rankers.
    ///
    /// No clicks always yields a tie.
    fn infer_outcome(
        &self,
        list: &[Document],
        context: &Context,
        clicks: &[bool],
        query: &Query,
    ) -> Result<Outcome, ComparisonError>;
}

/// Outcome inference for a logged impression under a different (target) ranker pair.
pub trait HistoricalComparison {
    /// Stable method name (the registry spelling).
    fn name(&self) -> &'static str;

    /// Estimate the target rankers' preference from a logged `(list, context, clicks)`.
    ///
    /// Impressions the target pair could not have produced yield a tie rather than an error.
    fn infer_outcome_for(
        &self,
        list: &[Document],
        context: &Context,
        clicks: &[bool],
        targets: &mut [&mut dyn Ranker],
        query: &Query,
        rng: &mut dyn RngCore,
    ) -> Result<Outcome, ComparisonError>;
}

pub(crate) fn check_clicks(list: &[Document], clicks: &[bool]) -> Result<(), ComparisonError> {
    if list.len() != clicks.len() {
        return Err(ComparisonError::ClickLengthMismatch {
            list: list.len(),
            clicks: clicks.len(),
        });
    }
    Ok(())
}

pub(crate) fn no_clicks(clicks: &[bool]) -> bool {
    !clicks.iter().any(|c| *c)
}

pub(crate) fn wrong_context(method: &'static str, context: &Context) -> ComparisonError {
    ComparisonError::ContextMismatch {
        method,
        found: context.family(),
    }
}

pub(crate) fn pair_count_error(method: &'static str, found: usize) -> ComparisonError {
    ComparisonError::RankerCount {
        method,
        expected: "exactly 2",
        found,
    }
}

/// Reset both rankers and draw their top `min(length, available)` documents with `next`.
pub(crate) fn draw_rankings(
    a: &mut dyn Ranker,
    b: &mut dyn Ranker,
    query: &Query,
    length: usize,
    rng: &mut dyn RngCore,
) -> [Vec<Document>; 2] {
    a.init_ranking(query);
    b.init_ranking(query);
    let length = length.min(a.document_count()).min(b.document_count());
    let first: Vec<Document> = (0..length).map_while(|_| a.next(rng)).collect();
    let second: Vec<Document> = (0..length).map_while(|_| b.next(rng)).collect();
    [first, second]
}

/// Reset `ranker` and pop its top `length` documents deterministically.
pub(crate) fn top_documents(
    ranker: &mut dyn Ranker,
    query: &Query,
    length: usize,
) -> Vec<Document> {
    ranker.init_ranking(query);
    (0..length).map_while(|_| ranker.next_det()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn click_length_must_match() {
        let list = vec![Document::new(0), Document::new(1)];
        assert!(check_clicks(&list, &[true, false]).is_ok());
        assert_eq!(
            check_clicks(&list, &[true]),
            Err(ComparisonError::ClickLengthMismatch { list: 2, clicks: 1 })
        );
    }

    #[test]
    fn no_clicks_detects_all_false() {
        assert!(no_clicks(&[]));
        assert!(no_clicks(&[false, false]));
        assert!(!no_clicks(&[false, true]));
    }
}
