//! Stochastic balanced interleaving.
//!
//! Instead of the deterministic "whoever is behind goes next" rule, every position draws its
//! source with a biased coin: the second (exploratory) ranking with probability `k`, the first
//! otherwise. When the chosen ranking has nothing unused left the other one supplies the
//! document. Inference is the balanced lowest-click comparison, but when `k != 0.5` each side's
//! click count is scaled by `plays_total / (2 * plays_side)`, which undoes the over-exposure
//! of the favored ranking.

use rand::RngCore;
use rand_distr::{Bernoulli, Distribution};
use std::collections::HashSet;
use tracing::trace;

use crate::balanced::lowest_click_counts;
use crate::comparison::{
    check_clicks, draw_rankings, no_clicks, pair_count_error, wrong_context, InterleavedComparison,
    Interleaving,
};
use crate::context::{Context, Outcome};
use crate::document::{Document, Query};
use crate::error::ComparisonError;
use crate::ranker::Ranker;
use crate::team_draft::next_unused;
use crate::utils::prefer;

/// Rates this close to one half count as unbiased.
const BALANCED_RATE_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StochasticBalancedConfig {
    /// Probability of drawing the next document from the second ranking.
    pub exploration_rate: f64,
}

impl Default for StochasticBalancedConfig {
    fn default() -> Self {
        Self {
            exploration_rate: 0.5,
        }
    }
}

impl StochasticBalancedConfig {
    pub fn validate(&self) -> Result<(), ComparisonError> {
        let k = self.exploration_rate;
        if !k.is_finite() || !(0.0..=1.0).contains(&k) {
            return Err(ComparisonError::invalid_option(
                "exploration_rate",
                k.to_string(),
                "expected a probability in [0, 1]",
            ));
        }
        Ok(())
    }
}

/// Balanced interleaving with a biased per-position source coin.
#[derive(Debug, Clone, Copy, Default)]
pub struct StochasticBalancedInterleave {
    cfg: StochasticBalancedConfig,
}

impl StochasticBalancedInterleave {
    pub fn new(cfg: StochasticBalancedConfig) -> Result<Self, ComparisonError> {
        cfg.validate()?;
        Ok(Self { cfg })
    }

    pub fn config(&self) -> StochasticBalancedConfig {
        self.cfg
    }

    fn coin(&self) -> Result<Bernoulli, ComparisonError> {
        Bernoulli::new(self.cfg.exploration_rate).map_err(|e| {
            ComparisonError::invalid_option(
                "exploration_rate",
                self.cfg.exploration_rate.to_string(),
                e.to_string(),
            )
        })
    }
}

/// Scale raw click counts by the realized exposure of each side.
pub(crate) fn exposure_weighted(counts: [f64; 2], plays: [usize; 2], rate: f64) -> [f64; 2] {
    if (rate - 0.5).abs() <= BALANCED_RATE_TOLERANCE {
        return counts;
    }
    let total = (plays[0] + plays[1]) as f64;
    let weight = |side: usize| {
        if plays[side] == 0 {
            1.0
        } else {
            total / (2.0 * plays[side] as f64)
        }
    };
    [counts[0] * weight(0), counts[1] * weight(1)]
}

impl InterleavedComparison for StochasticBalancedInterleave {
    fn name(&self) -> &'static str {
        "stochastic_balanced_interleave"
    }

    fn interleave(
        &self,
        rankers: &mut [&mut dyn Ranker],
        query: &Query,
        length: usize,
        rng: &mut dyn RngCore,
    ) -> Result<Interleaving, ComparisonError> {
        let found = rankers.len();
        let [a, b] = rankers else {
            return Err(pair_count_error(self.name(), found));
        };
        let rankings = draw_rankings(&mut **a, &mut **b, query, length, rng);
        let length = rankings[0].len().min(rankings[1].len());
        let coin = self.coin()?;

        let mut list = Vec::with_capacity(length);
        let mut placed: HashSet<Document> = HashSet::new();
        let mut plays = [0usize; 2];
        while list.len() < length {
            let side = usize::from(coin.sample(rng));
            let pick = next_unused(&rankings[side], &placed)
                .map(|d| (side, d))
                .or_else(|| next_unused(&rankings[1 - side], &placed).map(|d| (1 - side, d)));
            let Some((side, doc)) = pick else {
                break;
            };
            let doc = doc.clone();
            placed.insert(doc.clone());
            list.push(doc);
            plays[side] += 1;
        }
        trace!(
            target: "multileave.stochastic_balanced",
            plays_first = plays[0],
            plays_second = plays[1],
            rate = self.cfg.exploration_rate,
            "interleaved"
        );
        Ok(Interleaving {
            list,
            context: Context::StochasticBalanced {
                rankings,
                plays,
                exploration_rate: self.cfg.exploration_rate,
            },
        })
    }

    fn infer_outcome(
        &self,
        list: &[Document],
        context: &Context,
        clicks: &[bool],
        _query: &Query,
    ) -> Result<Outcome, ComparisonError> {
        check_clicks(list, clicks)?;
        let Context::StochasticBalanced {
            rankings,
            plays,
            exploration_rate,
        } = context
        else {
            return Err(wrong_context(self.name(), context));
        };
        if no_clicks(clicks) {
            return Ok(Outcome::TIE);
        }
        let Some(counts) = lowest_click_counts(list, rankings, clicks) else {
            return Ok(Outcome::TIE);
        };
        let [a, b] = exposure_weighted(counts, *plays, *exploration_rate);
        Ok(Outcome::Pairwise(prefer(a, b)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ranker::DeterministicRanker;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn unbiased_rate_leaves_counts_alone() {
        assert_eq!(exposure_weighted([2.0, 1.0], [3, 1], 0.5), [2.0, 1.0]);
    }

    #[test]
    fn over_exposed_side_is_discounted() {
        // Three plays from the first side, one from the second.
        let w = exposure_weighted([3.0, 1.0], [3, 1], 0.2);
        assert!((w[0] - 2.0).abs() < 1e-12);
        assert!((w[1] - 2.0).abs() < 1e-12);
    }

    #[test]
    fn rate_one_draws_only_from_second_ranking() {
        let method = StochasticBalancedInterleave::new(StochasticBalancedConfig {
            exploration_rate: 1.0,
        })
        .unwrap();
        let q = Query::with_ids("q", 0..4);
        let mut a = DeterministicRanker::new([0, 1, 2, 3]);
        let mut b = DeterministicRanker::new([3, 2, 1, 0]);
        let mut rng = StdRng::seed_from_u64(1);
        let mut rankers: [&mut dyn Ranker; 2] = [&mut a, &mut b];
        let shown = method.interleave(&mut rankers, &q, 4, &mut rng).unwrap();
        assert_eq!(crate::document::doc_ids(&shown.list), vec![3, 2, 1, 0]);
        let Context::StochasticBalanced { plays, .. } = shown.context else {
            panic!("unexpected context");
        };
        assert_eq!(plays, [0, 4]);
    }

    #[test]
    fn rate_outside_unit_interval_is_rejected() {
        for k in [-0.1, 1.5, f64::NAN] {
            assert!(StochasticBalancedInterleave::new(StochasticBalancedConfig {
                exploration_rate: k,
            })
            .is_err());
        }
    }
}
