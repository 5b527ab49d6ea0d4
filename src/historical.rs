//! Reusing logged impressions to compare a different (target) pair of rankers.
//!
//! An impression logged while comparing a source pair carries a shown list, its context and
//! the clicks it received. The estimators here ask what those clicks say about a target pair:
//!
//! - [`HistTeamDraft`] reconstructs a team assignment the target pair could have produced for
//!   the logged list. When none exists the impression carries no signal.
//! - [`HistBalancedInterleave`] / [`HistDocumentConstraints`] accept the logged list only if a
//!   balanced merge of the target rankings reproduces it exactly.
//! - [`HistProbabilisticInterleave`] marginalizes under the target pair and, unless `biased`,
//!   corrects for the distribution shift with the importance weight
//!   `P(list | target) / P(list | source)`.
//!
//! Every "could not have happened" case resolves to a tie.

use rand::{Rng, RngCore};
use std::collections::HashSet;
use tracing::trace;

use crate::balanced::{balanced_merge, BalancedConfig, BalancedInterleave};
use crate::comparison::{
    check_clicks, draw_rankings, no_clicks, pair_count_error, wrong_context, HistoricalComparison,
    InterleavedComparison,
};
use crate::context::{Context, Outcome, Team};
use crate::document::{Document, Query};
use crate::document_constraints::{DocumentConstraints, DocumentConstraintsConfig};
use crate::error::ComparisonError;
use crate::probabilistic::{document_probabilities, list_probability, marginalize, Aggregation};
use crate::ranker::Ranker;
use crate::team_draft::{next_unused, team_outcome};

/// Team assignment the target rankings could have produced for `list`, if any.
///
/// Mirrors the team-draft merge: a shared prefix first, then the side with fewer contributions
/// picks (either side when level, with `coin` deciding if both could have placed the document).
pub(crate) fn reconstruct_teams(
    list: &[Document],
    rankings: &[Vec<Document>; 2],
    mut coin: impl FnMut() -> bool,
) -> Option<Vec<Team>> {
    let mut teams = Vec::with_capacity(list.len());
    let mut placed: HashSet<Document> = HashSet::new();

    let shared = rankings[0]
        .iter()
        .zip(&rankings[1])
        .take_while(|(a, b)| a == b)
        .count()
        .min(list.len());
    for (doc, expected) in list.iter().zip(&rankings[0]).take(shared) {
        if doc != expected {
            return None;
        }
        placed.insert(doc.clone());
        teams.push(Team::Shared);
    }

    let mut counts = [0usize; 2];
    for doc in &list[shared..] {
        let allowed: &[usize] = if counts[0] < counts[1] {
            &[0]
        } else if counts[1] < counts[0] {
            &[1]
        } else {
            &[0, 1]
        };
        let mut matching: Vec<usize> = Vec::with_capacity(2);
        for &side in allowed {
            let pick = next_unused(&rankings[side], &placed)
                .map(|d| (side, d))
                .or_else(|| next_unused(&rankings[1 - side], &placed).map(|d| (1 - side, d)));
            if let Some((actual, candidate)) = pick {
                if candidate == doc && !matching.contains(&actual) {
                    matching.push(actual);
                }
            }
        }
        let side = match matching.as_slice() {
            [] => return None,
            [only] => *only,
            [first, second, ..] => {
                if coin() {
                    *second
                } else {
                    *first
                }
            }
        };
        placed.insert(doc.clone());
        teams.push(Team::Ranker(side));
        counts[side] += 1;
    }
    Some(teams)
}

/// Team draft reuse by assignment reconstruction.
#[derive(Debug, Clone, Copy, Default)]
pub struct HistTeamDraft;

impl HistTeamDraft {
    pub fn new() -> Self {
        Self
    }
}

impl HistoricalComparison for HistTeamDraft {
    fn name(&self) -> &'static str {
        "team_draft"
    }

    fn infer_outcome_for(
        &self,
        list: &[Document],
        _context: &Context,
        clicks: &[bool],
        targets: &mut [&mut dyn Ranker],
        query: &Query,
        rng: &mut dyn RngCore,
    ) -> Result<Outcome, ComparisonError> {
        check_clicks(list, clicks)?;
        let found = targets.len();
        let [a, b] = targets else {
            return Err(pair_count_error(self.name(), found));
        };
        if no_clicks(clicks) {
            return Ok(Outcome::TIE);
        }
        let rankings = draw_rankings(&mut **a, &mut **b, query, query.len(), rng);
        match reconstruct_teams(list, &rankings, || rng.random_bool(0.5)) {
            Some(teams) => Ok(team_outcome(&teams, clicks)),
            None => {
                trace!(
                    target: "multileave.historical",
                    method = self.name(),
                    query = query.id(),
                    "no team assignment explains the logged list"
                );
                Ok(Outcome::TIE)
            }
        }
    }
}

/// Target rankings, if a balanced merge of them reproduces `list`.
fn balanced_rankings_for(
    method: &'static str,
    list: &[Document],
    targets: &mut [&mut dyn Ranker],
    query: &Query,
    rng: &mut dyn RngCore,
) -> Result<Option<[Vec<Document>; 2]>, ComparisonError> {
    let found = targets.len();
    let [a, b] = targets else {
        return Err(pair_count_error(method, found));
    };
    let rankings = draw_rankings(&mut **a, &mut **b, query, list.len(), rng);
    let explained = (0..2).any(|first| balanced_merge(&rankings, first, list.len()) == list);
    if !explained {
        trace!(
            target: "multileave.historical",
            method,
            query = query.id(),
            "balanced merge of the target rankings does not reproduce the logged list"
        );
        return Ok(None);
    }
    Ok(Some(rankings))
}

/// Balanced interleave reuse.
#[derive(Debug, Clone, Copy, Default)]
pub struct HistBalancedInterleave {
    live: BalancedInterleave,
}

impl HistBalancedInterleave {
    pub fn new(cfg: BalancedConfig) -> Self {
        Self {
            live: BalancedInterleave::new(cfg),
        }
    }
}

impl HistoricalComparison for HistBalancedInterleave {
    fn name(&self) -> &'static str {
        "balanced_interleave"
    }

    fn infer_outcome_for(
        &self,
        list: &[Document],
        _context: &Context,
        clicks: &[bool],
        targets: &mut [&mut dyn Ranker],
        query: &Query,
        rng: &mut dyn RngCore,
    ) -> Result<Outcome, ComparisonError> {
        check_clicks(list, clicks)?;
        if no_clicks(clicks) {
            return Ok(Outcome::TIE);
        }
        match balanced_rankings_for(self.name(), list, targets, query, rng)? {
            Some(rankings) => {
                self.live
                    .infer_outcome(list, &Context::Balanced { rankings }, clicks, query)
            }
            None => Ok(Outcome::TIE),
        }
    }
}

/// Document constraints reuse.
#[derive(Debug, Clone, Copy, Default)]
pub struct HistDocumentConstraints {
    live: DocumentConstraints,
}

impl HistDocumentConstraints {
    pub fn new(cfg: DocumentConstraintsConfig) -> Result<Self, ComparisonError> {
        Ok(Self {
            live: DocumentConstraints::new(cfg)?,
        })
    }
}

impl HistoricalComparison for HistDocumentConstraints {
    fn name(&self) -> &'static str {
        "document_constraints"
    }

    fn infer_outcome_for(
        &self,
        list: &[Document],
        _context: &Context,
        clicks: &[bool],
        targets: &mut [&mut dyn Ranker],
        query: &Query,
        rng: &mut dyn RngCore,
    ) -> Result<Outcome, ComparisonError> {
        check_clicks(list, clicks)?;
        if no_clicks(clicks) {
            return Ok(Outcome::TIE);
        }
        match balanced_rankings_for(self.name(), list, targets, query, rng)? {
            Some(rankings) => {
                self.live
                    .infer_outcome(list, &Context::Balanced { rankings }, clicks, query)
            }
            None => Ok(Outcome::TIE),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct HistProbabilisticConfig {
    pub aggregation: Aggregation,
    /// Skip the importance-sampling correction.
    pub biased: bool,
}

/// Probabilistic interleave reuse with importance-sampling correction.
#[derive(Debug, Clone, Copy, Default)]
pub struct HistProbabilisticInterleave {
    cfg: HistProbabilisticConfig,
}

impl HistProbabilisticInterleave {
    pub fn new(cfg: HistProbabilisticConfig) -> Self {
        Self { cfg }
    }

    pub fn config(&self) -> HistProbabilisticConfig {
        self.cfg
    }

    /// Outcome of a logged list under `targets`, given the list's probability under the source.
    pub fn reweighted_outcome(
        &self,
        list: &[Document],
        source_probability: f64,
        clicks: &[bool],
        targets: &mut [&mut dyn Ranker],
        query: &Query,
    ) -> Result<f64, ComparisonError> {
        check_clicks(list, clicks)?;
        let found = targets.len();
        let [a, b] = targets else {
            return Err(pair_count_error(self.name(), found));
        };
        if no_clicks(clicks) {
            return Ok(0.0);
        }
        let probabilities = document_probabilities(list, &mut **a, &mut **b, query);
        let masses = marginalize(&probabilities, clicks);
        if self.cfg.biased {
            return Ok(self.cfg.aggregation.aggregate(&masses));
        }
        let target_probability = list_probability(&probabilities);
        if target_probability == 0.0 || source_probability == 0.0 {
            trace!(
                target: "multileave.historical",
                query = query.id(),
                target_probability,
                source_probability,
                "logged list has zero probability; skipping"
            );
            return Ok(0.0);
        }
        let conditional = self.cfg.aggregation.aggregate(&masses.conditional());
        Ok(conditional * target_probability / source_probability)
    }
}

impl HistoricalComparison for HistProbabilisticInterleave {
    fn name(&self) -> &'static str {
        "probabilistic_interleave"
    }

    fn infer_outcome_for(
        &self,
        list: &[Document],
        context: &Context,
        clicks: &[bool],
        targets: &mut [&mut dyn Ranker],
        query: &Query,
        _rng: &mut dyn RngCore,
    ) -> Result<Outcome, ComparisonError> {
        let Context::Probabilistic { probabilities, .. } = context else {
            return Err(wrong_context(self.name(), context));
        };
        let source_probability = list_probability(probabilities);
        self.reweighted_outcome(list, source_probability, clicks, targets, query)
            .map(Outcome::Pairwise)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ranker::{DeterministicRanker, ProbabilisticRanker};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn docs(ids: &[usize]) -> Vec<Document> {
        ids.iter().copied().map(Document::new).collect()
    }

    #[test]
    fn reconstruction_recovers_a_merge() {
        let rankings = [docs(&[1, 2, 3, 0]), docs(&[0, 1, 3, 2])];
        let teams = reconstruct_teams(&docs(&[1, 0, 2, 3]), &rankings, || false).unwrap();
        assert_eq!(
            teams,
            vec![
                Team::Ranker(0),
                Team::Ranker(1),
                Team::Ranker(0),
                Team::Ranker(1)
            ]
        );
    }

    #[test]
    fn reconstruction_rejects_impossible_lists() {
        let rankings = [docs(&[3, 2, 1, 0]), docs(&[2, 3, 0, 1])];
        assert!(reconstruct_teams(&docs(&[1, 0, 2, 3]), &rankings, || false).is_none());
    }

    #[test]
    fn shared_prefix_must_match() {
        let rankings = [docs(&[4, 1, 2]), docs(&[4, 2, 1])];
        assert!(reconstruct_teams(&docs(&[1, 4, 2]), &rankings, || false).is_none());
        let teams = reconstruct_teams(&docs(&[4, 2, 1]), &rankings, || false).unwrap();
        assert_eq!(teams[0], Team::Shared);
    }

    #[test]
    fn balanced_reuse_rejects_unexplained_list() {
        let q = Query::with_ids("q", 0..4);
        let mut a = DeterministicRanker::new([3, 2, 1, 0]);
        let mut b = DeterministicRanker::new([2, 3, 0, 1]);
        let mut rng = StdRng::seed_from_u64(0);
        let mut targets: [&mut dyn Ranker; 2] = [&mut a, &mut b];
        let list = docs(&[1, 0, 2, 3]);
        let ctx = Context::Balanced {
            rankings: [list.clone(), list.clone()],
        };
        let o = HistBalancedInterleave::default()
            .infer_outcome_for(
                &list,
                &ctx,
                &[true, false, false, false],
                &mut targets,
                &q,
                &mut rng,
            )
            .unwrap();
        assert_eq!(o, Outcome::TIE);
    }

    #[test]
    fn unbiased_reuse_under_the_source_pair_matches_live_conditional() {
        let q = Query::with_ids("q", 0..5);
        let mut a = DeterministicRanker::new([1, 2, 3, 0, 4]);
        let mut b = DeterministicRanker::new([0, 1, 3, 4, 2]);
        let list = docs(&[1, 0, 3, 2]);
        let probabilities = document_probabilities(&list, &mut a, &mut b, &q);
        let ctx = Context::Probabilistic {
            coins: vec![0, 1, 1, 0],
            probabilities,
        };
        let mut rng = StdRng::seed_from_u64(0);
        let mut targets: [&mut dyn Ranker; 2] = [&mut a, &mut b];
        let o = HistProbabilisticInterleave::default()
            .infer_outcome_for(
                &list,
                &ctx,
                &[true, false, false, false],
                &mut targets,
                &q,
                &mut rng,
            )
            .unwrap();
        // Same pair: importance weight 1, the click is certainly the first ranker's.
        assert_eq!(o, Outcome::Pairwise(-1.0));
    }

    fn softmax_source_context(list: &[Document], q: &Query) -> Context {
        let mut a = ProbabilisticRanker::new([0, 1, 2, 3, 4]);
        let mut b = ProbabilisticRanker::new([4, 3, 2, 1, 0]);
        Context::Probabilistic {
            coins: vec![0; list.len()],
            probabilities: document_probabilities(list, &mut a, &mut b, q),
        }
    }

    #[test]
    fn list_impossible_under_targets_is_a_tie() {
        let q = Query::with_ids("q", 0..5);
        let list = docs(&[0, 1, 2, 3]);
        let ctx = softmax_source_context(&list, &q);
        let mut a = DeterministicRanker::new([3, 2, 1, 0, 4]);
        let mut b = DeterministicRanker::new([3, 2, 1, 0, 4]);
        let mut targets: [&mut dyn Ranker; 2] = [&mut a, &mut b];
        let mut rng = StdRng::seed_from_u64(0);
        let o = HistProbabilisticInterleave::default()
            .infer_outcome_for(
                &list,
                &ctx,
                &[true, false, true, false],
                &mut targets,
                &q,
                &mut rng,
            )
            .unwrap();
        assert_eq!(o, Outcome::Pairwise(0.0));
    }

    #[test]
    fn reuse_under_another_pair_applies_the_importance_weight() {
        let q = Query::with_ids("q", 0..5);
        let list = docs(&[0, 1, 2, 3]);
        let clicks = [true, false, true, false];
        let ctx = softmax_source_context(&list, &q);
        let Context::Probabilistic { probabilities, .. } = &ctx else {
            unreachable!()
        };
        let source_probability = list_probability(probabilities);

        let mut a = ProbabilisticRanker::new([1, 0, 2, 3, 4]);
        let mut b = ProbabilisticRanker::new([0, 1, 2, 4, 3]);
        let target = document_probabilities(&list, &mut a, &mut b, &q);
        let target_probability = list_probability(&target);
        assert!((target_probability / source_probability - 1.0).abs() > 1e-3);
        let conditional =
            Aggregation::Expectation.aggregate(&marginalize(&target, &clicks).conditional());
        let expected = conditional * target_probability / source_probability;

        let mut targets: [&mut dyn Ranker; 2] = [&mut a, &mut b];
        let mut rng = StdRng::seed_from_u64(0);
        let got = HistProbabilisticInterleave::default()
            .infer_outcome_for(&list, &ctx, &clicks, &mut targets, &q, &mut rng)
            .unwrap()
            .pairwise()
            .unwrap();
        assert!((got - expected).abs() < 1e-12, "{got} vs {expected}");
        assert!((got - conditional).abs() > 1e-9);
    }

    #[test]
    fn biased_reuse_returns_the_joint_aggregate() {
        let q = Query::with_ids("q", 0..5);
        let list = docs(&[0, 1, 2, 3]);
        let clicks = [true, false, true, false];
        let ctx = softmax_source_context(&list, &q);

        let mut a = ProbabilisticRanker::new([1, 0, 2, 3, 4]);
        let mut b = ProbabilisticRanker::new([0, 1, 2, 4, 3]);
        let target = document_probabilities(&list, &mut a, &mut b, &q);
        let joint = Aggregation::Expectation.aggregate(&marginalize(&target, &clicks));

        let biased = HistProbabilisticInterleave::new(HistProbabilisticConfig {
            biased: true,
            ..Default::default()
        });
        let mut targets: [&mut dyn Ranker; 2] = [&mut a, &mut b];
        let mut rng = StdRng::seed_from_u64(0);
        let got = biased
            .infer_outcome_for(&list, &ctx, &clicks, &mut targets, &q, &mut rng)
            .unwrap();
        assert_eq!(got, Outcome::Pairwise(joint));

        let unbiased = HistProbabilisticInterleave::default()
            .infer_outcome_for(&list, &ctx, &clicks, &mut targets, &q, &mut rng)
            .unwrap();
        assert_ne!(got, unbiased);
    }
}
