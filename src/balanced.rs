//! Balanced interleaving.
//!
//! The two rankings are merged with a pointer into each: whichever pointer is behind advances
//! next, and a single starting-side decision breaks ties for the whole list. Documents already
//! shown are skipped. Outcome inference looks at the lowest click: with `k` the better of the
//! two ranks that document has in the source rankings, each side is credited with the clicked
//! documents among its own top `k + 1`.

use rand::{Rng, RngCore};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use crate::comparison::{
    check_clicks, draw_rankings, no_clicks, pair_count_error, wrong_context, InterleavedComparison,
    Interleaving,
};
use crate::context::{Context, Outcome};
use crate::document::{rank_in, Document, Query};
use crate::error::ComparisonError;
use crate::ranker::Ranker;
use crate::utils::prefer;

/// Which ranking the balanced merge starts from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum StartingList {
    /// Fair coin per impression.
    #[default]
    Random,
    /// Always the first ranker (`fixed` is an alias).
    First,
    /// Always the second ranker.
    Second,
}

impl StartingList {
    /// Resolve to a side index, flipping a coin for [`StartingList::Random`].
    pub fn pick(&self, rng: &mut dyn RngCore) -> usize {
        match self {
            Self::Random => usize::from(rng.random_bool(0.5)),
            Self::First => 0,
            Self::Second => 1,
        }
    }
}

impl FromStr for StartingList {
    type Err = ComparisonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "random" => Ok(Self::Random),
            "fixed" | "first" | "0" => Ok(Self::First),
            "second" | "1" => Ok(Self::Second),
            other => Err(ComparisonError::UnknownStartingList(other.to_string())),
        }
    }
}

impl fmt::Display for StartingList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Random => "random",
            Self::First => "first",
            Self::Second => "second",
        })
    }
}

/// Configuration shared by balanced interleave and document constraints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BalancedConfig {
    pub starting_list: StartingList,
}

/// Balanced merge starting from side `first` (0 or 1).
pub(crate) fn balanced_merge(
    rankings: &[Vec<Document>; 2],
    first: usize,
    length: usize,
) -> Vec<Document> {
    let mut list = Vec::with_capacity(length);
    let mut placed: HashSet<Document> = HashSet::new();
    let mut cursor = [0usize; 2];
    while list.len() < length {
        let side = if cursor[0] < cursor[1] {
            0
        } else if cursor[1] < cursor[0] {
            1
        } else {
            first
        };
        let side = if cursor[side] < rankings[side].len() {
            side
        } else if cursor[1 - side] < rankings[1 - side].len() {
            1 - side
        } else {
            break;
        };
        let doc = &rankings[side][cursor[side]];
        cursor[side] += 1;
        if placed.insert(doc.clone()) {
            list.push(doc.clone());
        }
    }
    list
}

/// Clicked documents each ranking places at or above the lowest click's cut-off.
///
/// Returns `None` when there are no clicks.
pub(crate) fn lowest_click_counts(
    list: &[Document],
    rankings: &[Vec<Document>; 2],
    clicks: &[bool],
) -> Option<[f64; 2]> {
    let lowest = clicks.iter().rposition(|c| *c)?;
    let doc = &list[lowest];
    let k = rank_in(&rankings[0], doc).min(rank_in(&rankings[1], doc));
    let clicked: HashSet<&Document> = list
        .iter()
        .zip(clicks)
        .filter(|(_, c)| **c)
        .map(|(d, _)| d)
        .collect();
    let count = |ranking: &[Document]| {
        ranking
            .iter()
            .take(k + 1)
            .filter(|d| clicked.contains(d))
            .count() as f64
    };
    Some([count(rankings[0].as_slice()), count(rankings[1].as_slice())])
}

/// Balanced interleave.
#[derive(Debug, Clone, Copy, Default)]
pub struct BalancedInterleave {
    cfg: BalancedConfig,
}

impl BalancedInterleave {
    pub fn new(cfg: BalancedConfig) -> Self {
        Self { cfg }
    }

    pub fn config(&self) -> BalancedConfig {
        self.cfg
    }
}

/// Shared construction for the balanced family.
pub(crate) fn balanced_interleave(
    method: &'static str,
    starting_list: StartingList,
    rankers: &mut [&mut dyn Ranker],
    query: &Query,
    length: usize,
    rng: &mut dyn RngCore,
) -> Result<Interleaving, ComparisonError> {
    let found = rankers.len();
    let [a, b] = rankers else {
        return Err(pair_count_error(method, found));
    };
    let rankings = draw_rankings(&mut **a, &mut **b, query, length, rng);
    let length = rankings[0].len().min(rankings[1].len());
    let first = starting_list.pick(rng);
    let list = balanced_merge(&rankings, first, length);
    Ok(Interleaving {
        list,
        context: Context::Balanced { rankings },
    })
}

impl InterleavedComparison for BalancedInterleave {
    fn name(&self) -> &'static str {
        "balanced_interleave"
    }

    fn interleave(
        &self,
        rankers: &mut [&mut dyn Ranker],
        query: &Query,
        length: usize,
        rng: &mut dyn RngCore,
    ) -> Result<Interleaving, ComparisonError> {
        balanced_interleave(
            self.name(),
            self.cfg.starting_list,
            rankers,
            query,
            length,
            rng,
        )
    }

    fn infer_outcome(
        &self,
        list: &[Document],
        context: &Context,
        clicks: &[bool],
        _query: &Query,
    ) -> Result<Outcome, ComparisonError> {
        check_clicks(list, clicks)?;
        let Context::Balanced { rankings } = context else {
            return Err(wrong_context(self.name(), context));
        };
        if no_clicks(clicks) {
            return Ok(Outcome::TIE);
        }
        Ok(match lowest_click_counts(list, rankings, clicks) {
            Some([a, b]) => Outcome::Pairwise(prefer(a, b)),
            None => Outcome::TIE,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::doc_ids;

    fn docs(ids: &[usize]) -> Vec<Document> {
        ids.iter().copied().map(Document::new).collect()
    }

    #[test]
    fn merge_alternates_and_skips_duplicates() {
        let rankings = [docs(&[1, 2, 3, 0]), docs(&[0, 1, 3, 2])];
        assert_eq!(doc_ids(&balanced_merge(&rankings, 0, 4)), vec![1, 0, 2, 3]);
        assert_eq!(doc_ids(&balanced_merge(&rankings, 1, 4)), vec![0, 1, 2, 3]);
    }

    #[test]
    fn merge_stops_when_both_rankings_are_spent() {
        let rankings = [docs(&[1, 2]), docs(&[2, 1])];
        assert_eq!(doc_ids(&balanced_merge(&rankings, 0, 4)), vec![1, 2]);
    }

    #[test]
    fn lowest_click_decides_cutoff() {
        let rankings = [docs(&[1, 2, 3, 0]), docs(&[0, 1, 3, 2])];
        let list = docs(&[1, 0, 2, 3]);
        // Click on document 1 only: it is rank 0 in the first ranking, so k = 0.
        let counts = lowest_click_counts(&list, &rankings, &[true, false, false, false]).unwrap();
        assert_eq!(counts, [1.0, 0.0]);
        let o = BalancedInterleave::default()
            .infer_outcome(
                &list,
                &Context::Balanced {
                    rankings: rankings.clone(),
                },
                &[true, false, false, false],
                &Query::with_ids("q", 0..4),
            )
            .unwrap();
        assert_eq!(o, Outcome::Pairwise(-1.0));
    }

    #[test]
    fn starting_list_parsing() {
        assert_eq!("fixed".parse::<StartingList>(), Ok(StartingList::First));
        assert_eq!("random".parse::<StartingList>(), Ok(StartingList::Random));
        assert_eq!("second".parse::<StartingList>(), Ok(StartingList::Second));
        assert_eq!(
            "sideways".parse::<StartingList>(),
            Err(ComparisonError::UnknownStartingList("sideways".to_string()))
        );
    }
}
