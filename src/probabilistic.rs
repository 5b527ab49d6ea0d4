//! Probabilistic interleaving with marginalized outcome inference.
//!
//! Construction: at every position a fair coin picks one of the two rankers, which draws its
//! next document from its own distribution; the document is then removed from the other ranker
//! so neither can repeat it. The context records the realized coins and, for every position,
//! the probability each ranker had of drawing the shown document given the documents above it.
//!
//! Inference: rather than trusting the realized coins, [`marginalize`] sums over every coin
//! sequence that could have produced the shown list. Each clicked position splits the
//! probability mass between "credited to the first ranker" and "credited to the second",
//! weighted by `½·p₁` and `½·p₂`; paths with zero probability are pruned. The leaves are
//! grouped by the sign of the click balance into [`SideMasses`], and an [`Aggregation`] turns
//! those masses into a pairwise outcome.
//!
//! The masses are joint probabilities `P(list, outcome)`; their total equals
//! [`probability_of_list`], the quantity the historical estimators reweight by.

use rand::{Rng, RngCore};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::comparison::{
    check_clicks, no_clicks, pair_count_error, wrong_context, InterleavedComparison, Interleaving,
};
use crate::context::{Context, Outcome};
use crate::document::{Document, Query};
use crate::error::ComparisonError;
use crate::ranker::Ranker;
use crate::utils::{prefer, sign};

/// Smoothing mass for the ratio-based aggregations.
pub const MASS_FLOOR: f64 = 1e-12;

/// How side masses are turned into one pairwise value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Aggregation {
    /// `m₂ − m₁`.
    #[default]
    Expectation,
    /// `logit(m₂/m) − logit(m₁/m)`.
    LogLikelihoodRatio,
    /// `sign(m₂ − m₁) · (max/min − 1)`.
    LikelihoodRatio,
    /// `ln(m₂ / m₁)`.
    LogRatio,
    /// `sign(m₂ − m₁)`.
    Binary,
}

/// Probability mass of the latent assignments, split by which side the clicks favor.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SideMasses {
    /// Mass of assignments crediting more clicks to the first ranker.
    pub first: f64,
    /// Mass of assignments crediting more clicks to the second ranker.
    pub second: f64,
    /// Mass of assignments with balanced credit.
    pub tie: f64,
}

impl SideMasses {
    pub fn total(&self) -> f64 {
        self.first + self.second + self.tie
    }

    /// The masses conditioned on the list, i.e. divided by [`total`](Self::total).
    pub fn conditional(&self) -> Self {
        let total = self.total();
        if total <= 0.0 {
            return Self::default();
        }
        Self {
            first: self.first / total,
            second: self.second / total,
            tie: self.tie / total,
        }
    }
}

impl Aggregation {
    pub fn aggregate(&self, masses: &SideMasses) -> f64 {
        let (m1, m2) = (masses.first, masses.second);
        if m1 + m2 <= 0.0 {
            return 0.0;
        }
        match self {
            Self::Expectation => m2 - m1,
            Self::Binary => sign(m2 - m1),
            Self::LogRatio => ((m2 + MASS_FLOOR) / (m1 + MASS_FLOOR)).ln(),
            Self::LikelihoodRatio => {
                let (lo, hi) = if m1 < m2 { (m1, m2) } else { (m2, m1) };
                sign(m2 - m1) * ((hi + MASS_FLOOR) / (lo + MASS_FLOOR) - 1.0)
            }
            Self::LogLikelihoodRatio => {
                let total = masses.total();
                let logit = |m: f64| {
                    let p = (m / total).clamp(MASS_FLOOR, 1.0 - MASS_FLOOR);
                    (p / (1.0 - p)).ln()
                };
                logit(m2) - logit(m1)
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Expectation => "expectation",
            Self::LogLikelihoodRatio => "log-likelihood-ratio",
            Self::LikelihoodRatio => "likelihood-ratio",
            Self::LogRatio => "log-ratio",
            Self::Binary => "binary",
        }
    }
}

impl FromStr for Aggregation {
    type Err = ComparisonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "expectation" => Ok(Self::Expectation),
            "log-likelihood-ratio" => Ok(Self::LogLikelihoodRatio),
            "likelihood-ratio" => Ok(Self::LikelihoodRatio),
            "log-ratio" => Ok(Self::LogRatio),
            "binary" => Ok(Self::Binary),
            _ => Err(ComparisonError::invalid_option(
                "aggregate",
                s,
                "expected `expectation`, `log-likelihood-ratio`, `likelihood-ratio`, `log-ratio` or `binary`",
            )),
        }
    }
}

impl fmt::Display for Aggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `[p₁, p₂]` per position: the chance each ranker draws `list[i]` once `list[..i]` is gone.
///
/// Both rankers are re-initialized for `query` and left with the list's documents removed.
pub fn document_probabilities(
    list: &[Document],
    first: &mut dyn Ranker,
    second: &mut dyn Ranker,
    query: &Query,
) -> Vec<[f64; 2]> {
    first.init_ranking(query);
    second.init_ranking(query);
    list.iter()
        .map(|doc| {
            let p = [
                first.document_probability(doc),
                second.document_probability(doc),
            ];
            first.rm_document(doc);
            second.rm_document(doc);
            p
        })
        .collect()
}

/// `Π ½(p₁ + p₂)` over positions.
pub fn list_probability(probabilities: &[[f64; 2]]) -> f64 {
    probabilities
        .iter()
        .map(|[p, q]| 0.5 * (p + q))
        .product()
}

/// Probability that probabilistic interleaving of `first` and `second` shows exactly `list`.
pub fn probability_of_list(
    list: &[Document],
    first: &mut dyn Ranker,
    second: &mut dyn Ranker,
    query: &Query,
) -> f64 {
    list_probability(&document_probabilities(list, first, second, query))
}

/// Joint mass of every coin sequence consistent with the list, grouped by click balance.
pub fn marginalize(probabilities: &[[f64; 2]], clicks: &[bool]) -> SideMasses {
    // click balance (second minus first) -> joint mass
    let mut frontier: BTreeMap<i64, f64> = BTreeMap::from([(0, 1.0)]);
    for (p, clicked) in probabilities.iter().zip(clicks) {
        if *clicked {
            let mut next: BTreeMap<i64, f64> = BTreeMap::new();
            for (&balance, &mass) in &frontier {
                for (side, delta) in [(0usize, -1i64), (1, 1)] {
                    let w = 0.5 * p[side];
                    if w > 0.0 {
                        *next.entry(balance + delta).or_insert(0.0) += mass * w;
                    }
                }
            }
            frontier = next;
        } else {
            let w = 0.5 * (p[0] + p[1]);
            if w <= 0.0 {
                return SideMasses::default();
            }
            for mass in frontier.values_mut() {
                *mass *= w;
            }
        }
        if frontier.is_empty() {
            return SideMasses::default();
        }
    }
    let mut masses = SideMasses::default();
    for (balance, mass) in frontier {
        match balance.signum() {
            -1 => masses.first += mass,
            1 => masses.second += mass,
            _ => masses.tie += mass,
        }
    }
    masses
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ProbabilisticConfig {
    pub aggregation: Aggregation,
    /// Marginalize over latent coins; `false` compares clicks against the realized coins.
    pub marginalize: bool,
}

impl Default for ProbabilisticConfig {
    fn default() -> Self {
        Self {
            aggregation: Aggregation::Expectation,
            marginalize: true,
        }
    }
}

/// Probabilistic interleave.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProbabilisticInterleave {
    cfg: ProbabilisticConfig,
}

impl ProbabilisticInterleave {
    pub fn new(cfg: ProbabilisticConfig) -> Self {
        Self { cfg }
    }

    pub fn config(&self) -> ProbabilisticConfig {
        self.cfg
    }

    /// Outcome from per-position probabilities, independent of the realized coins.
    pub fn marginalized_outcome(&self, probabilities: &[[f64; 2]], clicks: &[bool]) -> f64 {
        self.cfg
            .aggregation
            .aggregate(&marginalize(probabilities, clicks))
    }
}

impl InterleavedComparison for ProbabilisticInterleave {
    fn name(&self) -> &'static str {
        "probabilistic_interleave"
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
        let (a, b): (&mut dyn Ranker, &mut dyn Ranker) = (&mut **a, &mut **b);
        a.init_ranking(query);
        b.init_ranking(query);
        let length = length.min(a.document_count()).min(b.document_count());

        let mut list = Vec::with_capacity(length);
        let mut coins = Vec::with_capacity(length);
        while list.len() < length {
            let coin = usize::from(rng.random_bool(0.5));
            let (chosen, other) = if coin == 0 {
                (&mut *a, &mut *b)
            } else {
                (&mut *b, &mut *a)
            };
            let Some(doc) = chosen.next(rng) else {
                break;
            };
            other.rm_document(&doc);
            list.push(doc);
            coins.push(coin);
        }
        let probabilities = document_probabilities(&list, a, b, query);
        Ok(Interleaving {
            list,
            context: Context::Probabilistic {
                coins,
                probabilities,
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
        let Context::Probabilistic {
            coins,
            probabilities,
        } = context
        else {
            return Err(wrong_context(self.name(), context));
        };
        if no_clicks(clicks) {
            return Ok(Outcome::TIE);
        }
        if self.cfg.marginalize {
            return Ok(Outcome::Pairwise(
                self.marginalized_outcome(probabilities, clicks),
            ));
        }
        let mut counts = [0.0; 2];
        for (coin, _) in coins.iter().zip(clicks).filter(|(_, c)| **c) {
            if let Some(c) = counts.get_mut(*coin) {
                *c += 1.0;
            }
        }
        Ok(Outcome::Pairwise(prefer(counts[0], counts[1])))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ranker::{DeterministicRanker, ProbabilisticRanker};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn deterministic_probabilities_are_indicator_vectors() {
        let q = Query::with_ids("q", 0..5);
        let mut a = DeterministicRanker::new([1, 2, 3, 0, 4]);
        let mut b = DeterministicRanker::new([0, 1, 3, 4, 2]);
        let list: Vec<Document> = [1, 0, 3, 2].map(Document::new).to_vec();
        let probs = document_probabilities(&list, &mut a, &mut b, &q);
        assert_eq!(probs, vec![[1.0, 0.0], [0.0, 1.0], [0.0, 1.0], [1.0, 0.0]]);
        assert!((list_probability(&probs) - 0.0625).abs() < 1e-12);
    }

    #[test]
    fn marginal_masses_sum_to_list_probability() {
        let probs = [[0.6, 0.2], [0.3, 0.5], [0.5, 0.5]];
        let masses = marginalize(&probs, &[true, true, false]);
        assert!((masses.total() - list_probability(&probs)).abs() < 1e-12);
        assert!(masses.first > 0.0 && masses.second > 0.0 && masses.tie > 0.0);
    }

    #[test]
    fn impossible_list_has_no_mass() {
        let probs = [[0.0, 0.0], [1.0, 0.0]];
        assert_eq!(marginalize(&probs, &[false, true]), SideMasses::default());
        assert_eq!(
            Aggregation::LogRatio.aggregate(&SideMasses::default()),
            0.0
        );
    }

    #[test]
    fn aggregations_are_antisymmetric() {
        let m = SideMasses {
            first: 0.1,
            second: 0.3,
            tie: 0.05,
        };
        let swapped = SideMasses {
            first: m.second,
            second: m.first,
            tie: m.tie,
        };
        for agg in [
            Aggregation::Expectation,
            Aggregation::LogLikelihoodRatio,
            Aggregation::LikelihoodRatio,
            Aggregation::LogRatio,
            Aggregation::Binary,
        ] {
            let v = agg.aggregate(&m);
            assert!(v > 0.0, "{agg}: {v}");
            assert!((v + agg.aggregate(&swapped)).abs() < 1e-9, "{agg}");
            assert_eq!(agg.as_str().parse::<Aggregation>(), Ok(agg));
        }
    }

    #[test]
    fn interleaved_list_has_no_duplicates_and_consistent_coins() {
        let q = Query::with_ids("q", 0..8);
        let mut a = ProbabilisticRanker::new([0, 1, 2, 3, 4, 5, 6, 7]);
        let mut b = ProbabilisticRanker::new([7, 6, 5, 4, 3, 2, 1, 0]);
        let mut rng = StdRng::seed_from_u64(5);
        let mut rankers: [&mut dyn Ranker; 2] = [&mut a, &mut b];
        let shown = ProbabilisticInterleave::default()
            .interleave(&mut rankers, &q, 6, &mut rng)
            .unwrap();
        assert_eq!(shown.list.len(), 6);
        let Context::Probabilistic {
            coins,
            probabilities,
        } = &shown.context
        else {
            panic!("unexpected context");
        };
        assert_eq!(coins.len(), 6);
        // The realized coin always had positive probability of drawing the shown document.
        for (coin, p) in coins.iter().zip(probabilities) {
            assert!(p[*coin] > 0.0);
        }
    }

    #[test]
    fn naive_outcome_follows_realized_coins() {
        let method = ProbabilisticInterleave::new(ProbabilisticConfig {
            marginalize: false,
            ..ProbabilisticConfig::default()
        });
        let list: Vec<Document> = [1, 0].map(Document::new).to_vec();
        let ctx = Context::Probabilistic {
            coins: vec![1, 0],
            probabilities: vec![[0.5, 0.5], [0.5, 0.5]],
        };
        let q = Query::with_ids("q", 0..2);
        let o = method.infer_outcome(&list, &ctx, &[true, false], &q).unwrap();
        assert_eq!(o, Outcome::Pairwise(1.0));
    }
}
