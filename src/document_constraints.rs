//! Document constraints: balanced construction, pairwise-constraint inference.
//!
//! Clicks are turned into "clicked document should rank above this non-clicked neighbour"
//! constraints; each source ranking is charged one violation per constraint it orders the
//! other way round, and the ranking with fewer violations wins. The constraint level selects
//! which neighbours count:
//!
//! 1. the non-clicked document directly above each click;
//! 2. additionally the non-clicked document directly below each click;
//! 3. both directions, walking past clicked neighbours to the nearest non-clicked document.

use rand::RngCore;
use std::collections::BTreeSet;

use crate::balanced::{balanced_interleave, StartingList};
use crate::comparison::{
    check_clicks, no_clicks, wrong_context, InterleavedComparison, Interleaving,
};
use crate::context::{Context, Outcome};
use crate::document::{rank_in, Document, Query};
use crate::error::ComparisonError;
use crate::ranker::Ranker;
use crate::utils::prefer;

/// Configuration for [`DocumentConstraints`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DocumentConstraintsConfig {
    pub starting_list: StartingList,
    /// Constraint level, `1..=3`.
    pub constraints: u8,
}

impl Default for DocumentConstraintsConfig {
    fn default() -> Self {
        Self {
            starting_list: StartingList::Random,
            constraints: 1,
        }
    }
}

impl DocumentConstraintsConfig {
    pub fn validate(&self) -> Result<(), ComparisonError> {
        if !(1..=3).contains(&self.constraints) {
            return Err(ComparisonError::invalid_option(
                "constraints",
                self.constraints.to_string(),
                "expected a level between 1 and 3",
            ));
        }
        Ok(())
    }
}

/// Document constraints interleaving.
#[derive(Debug, Clone, Copy)]
pub struct DocumentConstraints {
    cfg: DocumentConstraintsConfig,
}

impl Default for DocumentConstraints {
    fn default() -> Self {
        Self {
            cfg: DocumentConstraintsConfig::default(),
        }
    }
}

impl DocumentConstraints {
    pub fn new(cfg: DocumentConstraintsConfig) -> Result<Self, ComparisonError> {
        cfg.validate()?;
        Ok(Self { cfg })
    }

    pub fn config(&self) -> DocumentConstraintsConfig {
        self.cfg
    }

    /// `(better, worse)` position pairs inferred from `clicks`.
    pub fn constraints(&self, clicks: &[bool]) -> Vec<(usize, usize)> {
        let level = self.cfg.constraints;
        let mut pairs: BTreeSet<(usize, usize)> = BTreeSet::new();
        for (i, _) in clicks.iter().enumerate().filter(|(_, c)| **c) {
            let above = if level >= 3 {
                (0..i).rev().find(|&j| !clicks[j])
            } else {
                i.checked_sub(1).filter(|&j| !clicks[j])
            };
            if let Some(j) = above {
                pairs.insert((i, j));
            }
            if level >= 2 {
                let below = if level >= 3 {
                    (i + 1..clicks.len()).find(|&j| !clicks[j])
                } else {
                    Some(i + 1).filter(|&j| j < clicks.len() && !clicks[j])
                };
                if let Some(j) = below {
                    pairs.insert((i, j));
                }
            }
        }
        pairs.into_iter().collect()
    }

    /// Violations of the click constraints by each source ranking.
    pub fn violations(
        &self,
        list: &[Document],
        rankings: &[Vec<Document>; 2],
        clicks: &[bool],
    ) -> [usize; 2] {
        let pairs = self.constraints(clicks);
        let count = |ranking: &[Document]| {
            pairs
                .iter()
                .filter(|(better, worse)| {
                    rank_in(ranking, &list[*better]) > rank_in(ranking, &list[*worse])
                })
                .count()
        };
        [count(rankings[0].as_slice()), count(rankings[1].as_slice())]
    }
}

impl InterleavedComparison for DocumentConstraints {
    fn name(&self) -> &'static str {
        "document_constraints"
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
        let [v1, v2] = self.violations(list, rankings, clicks);
        // Fewer violations wins, so the tallies enter reversed.
        Ok(Outcome::Pairwise(prefer(v2 as f64, v1 as f64)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dc(level: u8) -> DocumentConstraints {
        DocumentConstraints::new(DocumentConstraintsConfig {
            constraints: level,
            ..DocumentConstraintsConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn level_one_only_looks_directly_above() {
        let clicks = [false, true, false, true];
        assert_eq!(dc(1).constraints(&clicks), vec![(1, 0), (3, 2)]);
    }

    #[test]
    fn level_two_adds_the_document_below() {
        let clicks = [false, true, false, false];
        assert_eq!(dc(2).constraints(&clicks), vec![(1, 0), (1, 2)]);
    }

    #[test]
    fn level_three_walks_past_clicked_neighbours() {
        let clicks = [false, true, true, false];
        assert_eq!(dc(1).constraints(&clicks), vec![(1, 0)]);
        assert_eq!(
            dc(3).constraints(&clicks),
            vec![(1, 0), (1, 3), (2, 0), (2, 3)]
        );
    }

    #[test]
    fn invalid_level_is_rejected() {
        let err = DocumentConstraints::new(DocumentConstraintsConfig {
            constraints: 4,
            ..DocumentConstraintsConfig::default()
        })
        .unwrap_err();
        assert!(matches!(err, ComparisonError::InvalidOption { .. }));
    }
}
