//! Team draft interleaving and its multileaving generalization.
//!
//! Team draft: both full rankings are computed up front. Their common prefix (same document at
//! the same rank) is copied as [`Team::Shared`]. After that, the ranker that has contributed
//! fewer documents picks its highest-ranked unused document; ties are broken by a fair coin.
//! A click credits the team that placed the clicked position.
//!
//! Team draft multileave applies the same rule to N rankers: the ranker with the fewest
//! contributions picks next, uniformly at random among ties.

use rand::{Rng, RngCore};
use std::collections::HashSet;

use crate::comparison::{
    check_clicks, draw_rankings, no_clicks, pair_count_error, wrong_context, InterleavedComparison,
    Interleaving,
};
use crate::context::{Context, Outcome, Team};
use crate::document::{Document, Query};
use crate::error::ComparisonError;
use crate::ranker::Ranker;
use crate::utils::prefer;

/// Pairwise team draft interleaving.
#[derive(Debug, Clone, Copy, Default)]
pub struct TeamDraft;

impl TeamDraft {
    pub fn new() -> Self {
        Self
    }
}

/// First document of `ranking` not yet placed.
pub(crate) fn next_unused<'a>(
    ranking: &'a [Document],
    placed: &HashSet<Document>,
) -> Option<&'a Document> {
    ranking.iter().find(|d| !placed.contains(*d))
}

/// Team draft merge of two rankings; `coin` is consulted whenever the teams are level.
pub(crate) fn team_draft_merge(
    rankings: &[Vec<Document>; 2],
    length: usize,
    mut coin: impl FnMut() -> bool,
) -> (Vec<Document>, Vec<Team>) {
    let [first, second] = rankings;
    let mut list = Vec::with_capacity(length);
    let mut teams = Vec::with_capacity(length);
    let mut placed: HashSet<Document> = HashSet::new();

    for (a, b) in first.iter().zip(second.iter()) {
        if list.len() >= length || a != b {
            break;
        }
        placed.insert(a.clone());
        list.push(a.clone());
        teams.push(Team::Shared);
    }

    let mut counts = [0usize; 2];
    while list.len() < length {
        let side = if counts[0] < counts[1] {
            0
        } else if counts[1] < counts[0] {
            1
        } else if coin() {
            1
        } else {
            0
        };
        let pick = next_unused(&rankings[side], &placed)
            .map(|d| (side, d))
            .or_else(|| next_unused(&rankings[1 - side], &placed).map(|d| (1 - side, d)));
        let Some((side, doc)) = pick else {
            break;
        };
        let doc = doc.clone();
        placed.insert(doc.clone());
        list.push(doc);
        teams.push(Team::Ranker(side));
        counts[side] += 1;
    }
    (list, teams)
}

/// Clicks credited to each of `n` teams.
pub(crate) fn team_clicks(teams: &[Team], clicks: &[bool], n: usize) -> Vec<f64> {
    let mut counts = vec![0.0; n];
    for (team, clicked) in teams.iter().zip(clicks) {
        if let (Team::Ranker(r), true) = (team, clicked) {
            if let Some(c) = counts.get_mut(*r) {
                *c += 1.0;
            }
        }
    }
    counts
}

/// Pairwise outcome from per-position teams.
pub(crate) fn team_outcome(teams: &[Team], clicks: &[bool]) -> Outcome {
    let counts = team_clicks(teams, clicks, 2);
    Outcome::Pairwise(prefer(counts[0], counts[1]))
}

impl InterleavedComparison for TeamDraft {
    fn name(&self) -> &'static str {
        "team_draft"
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
        let (list, teams) = team_draft_merge(&rankings, length, || rng.random_bool(0.5));
        Ok(Interleaving {
            list,
            context: Context::TeamDraft { teams },
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
        let Context::TeamDraft { teams } = context else {
            return Err(wrong_context(self.name(), context));
        };
        if no_clicks(clicks) {
            return Ok(Outcome::TIE);
        }
        Ok(team_outcome(teams, clicks))
    }
}

/// Team draft multileaving over two or more rankers.
#[derive(Debug, Clone, Copy, Default)]
pub struct TeamDraftMultileave;

impl TeamDraftMultileave {
    pub fn new() -> Self {
        Self
    }
}

impl InterleavedComparison for TeamDraftMultileave {
    fn name(&self) -> &'static str {
        "team_draft_multileave"
    }

    fn interleave(
        &self,
        rankers: &mut [&mut dyn Ranker],
        query: &Query,
        length: usize,
        rng: &mut dyn RngCore,
    ) -> Result<Interleaving, ComparisonError> {
        if rankers.len() < 2 {
            return Err(ComparisonError::RankerCount {
                method: self.name(),
                expected: "at least 2",
                found: rankers.len(),
            });
        }
        for r in rankers.iter_mut() {
            r.init_ranking(query);
        }
        let length = rankers
            .iter()
            .map(|r| r.document_count())
            .fold(length, usize::min);
        let rankings: Vec<Vec<Document>> = rankers
            .iter_mut()
            .map(|r| (0..length).map_while(|_| r.next(rng)).collect())
            .collect();

        let n = rankings.len();
        let mut list = Vec::with_capacity(length);
        let mut teams = Vec::with_capacity(length);
        let mut placed: HashSet<Document> = HashSet::new();
        let mut counts = vec![0usize; n];
        let mut exhausted = vec![false; n];

        while list.len() < length {
            let active: Vec<usize> = (0..n).filter(|&r| !exhausted[r]).collect();
            let Some(min) = active.iter().map(|&r| counts[r]).min() else {
                break;
            };
            let tied: Vec<usize> = active.into_iter().filter(|&r| counts[r] == min).collect();
            let side = tied[rng.random_range(0..tied.len())];
            match next_unused(&rankings[side], &placed) {
                Some(doc) => {
                    let doc = doc.clone();
                    placed.insert(doc.clone());
                    list.push(doc);
                    teams.push(Team::Ranker(side));
                    counts[side] += 1;
                }
                None => exhausted[side] = true,
            }
        }
        Ok(Interleaving {
            list,
            context: Context::TeamDraftMultileave { teams, rankers: n },
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
        let Context::TeamDraftMultileave { teams, rankers } = context else {
            return Err(wrong_context(self.name(), context));
        };
        let n = (*rankers).max(1);
        let counts = team_clicks(teams, clicks, n);
        let mean = counts.iter().sum::<f64>() / n as f64;
        Ok(Outcome::Multileave(
            counts.into_iter().map(|c| c - mean).collect(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::doc_ids;
    use crate::ranker::DeterministicRanker;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn query() -> Query {
        Query::with_ids("q", 0..4)
    }

    #[test]
    fn shared_prefix_credits_nobody() {
        let rankings = [
            [5, 6, 1, 2].map(Document::new).to_vec(),
            [5, 6, 2, 1].map(Document::new).to_vec(),
        ];
        let (list, teams) = team_draft_merge(&rankings, 4, || false);
        assert_eq!(doc_ids(&list), vec![5, 6, 1, 2]);
        assert_eq!(
            teams,
            vec![Team::Shared, Team::Shared, Team::Ranker(0), Team::Ranker(1)]
        );
        let o = team_outcome(&teams, &[true, true, false, false]);
        assert_eq!(o, Outcome::TIE);
    }

    #[test]
    fn teams_stay_balanced() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut a = DeterministicRanker::new([1, 2, 3, 0]);
        let mut b = DeterministicRanker::new([0, 1, 3, 2]);
        for _ in 0..20 {
            let mut rankers: [&mut dyn Ranker; 2] = [&mut a, &mut b];
            let shown = TeamDraft
                .interleave(&mut rankers, &query(), 4, &mut rng)
                .unwrap();
            let Context::TeamDraft { teams } = &shown.context else {
                panic!("unexpected context");
            };
            let c = team_clicks(teams, &[true; 4], 2);
            assert_eq!(c[0], c[1]);
        }
    }

    #[test]
    fn wrong_context_is_rejected() {
        let list = [0, 1].map(Document::new).to_vec();
        let ctx = Context::Balanced {
            rankings: [list.clone(), list.clone()],
        };
        let err = TeamDraft
            .infer_outcome(&list, &ctx, &[true, false], &query())
            .unwrap_err();
        assert!(matches!(err, ComparisonError::ContextMismatch { .. }));
    }

    #[test]
    fn multileave_credits_sum_to_zero() {
        let mut rng = StdRng::seed_from_u64(9);
        let q = Query::with_ids("q", 0..6);
        let mut a = DeterministicRanker::new([0, 1, 2, 3, 4, 5]);
        let mut b = DeterministicRanker::new([5, 4, 3, 2, 1, 0]);
        let mut c = DeterministicRanker::new([2, 3, 0, 1, 5, 4]);
        let mut rankers: [&mut dyn Ranker; 3] = [&mut a, &mut b, &mut c];
        let shown = TeamDraftMultileave
            .interleave(&mut rankers, &q, 6, &mut rng)
            .unwrap();
        assert_eq!(shown.list.len(), 6);
        let clicks = [true, false, true, false, false, false];
        let o = TeamDraftMultileave
            .infer_outcome(&shown.list, &shown.context, &clicks, &q)
            .unwrap();
        let Outcome::Multileave(credits) = o else {
            panic!("expected multileave outcome");
        };
        assert_eq!(credits.len(), 3);
        assert!(credits.iter().sum::<f64>().abs() < 1e-12);
    }

    #[test]
    fn multileave_credits_rankers_that_never_placed() {
        let mut rng = StdRng::seed_from_u64(2);
        let mut a = DeterministicRanker::new([0, 1, 2, 3]);
        let mut b = DeterministicRanker::new([1, 0, 2, 3]);
        let mut c = DeterministicRanker::new([2, 3, 0, 1]);
        let mut rankers: [&mut dyn Ranker; 3] = [&mut a, &mut b, &mut c];
        let shown = TeamDraftMultileave
            .interleave(&mut rankers, &query(), 2, &mut rng)
            .unwrap();
        let Context::TeamDraftMultileave { teams, rankers } = &shown.context else {
            panic!("unexpected context");
        };
        assert_eq!(*rankers, 3);
        assert_eq!(teams.len(), 2);
        let Team::Ranker(first) = teams[0] else {
            panic!("no shared prefix expected");
        };

        let o = TeamDraftMultileave
            .infer_outcome(&shown.list, &shown.context, &[true, false], &query())
            .unwrap();
        let Outcome::Multileave(credits) = o else {
            panic!("expected multileave outcome");
        };
        assert_eq!(credits.len(), 3);
        for (r, credit) in credits.iter().enumerate() {
            let expected = if r == first { 2.0 / 3.0 } else { -1.0 / 3.0 };
            assert!((credit - expected).abs() < 1e-12, "ranker {r}: {credit}");
        }
    }

    #[test]
    fn multileave_rejects_pairwise_context() {
        let list = [0, 1].map(Document::new).to_vec();
        let ctx = Context::TeamDraft {
            teams: vec![Team::Ranker(0), Team::Ranker(1)],
        };
        let err = TeamDraftMultileave
            .infer_outcome(&list, &ctx, &[true, false], &query())
            .unwrap_err();
        assert!(matches!(err, ComparisonError::ContextMismatch { .. }));
    }

    #[test]
    fn multileave_needs_two_rankers() {
        let mut rng = StdRng::seed_from_u64(0);
        let mut a = DeterministicRanker::new([0, 1]);
        let mut rankers: [&mut dyn Ranker; 1] = [&mut a];
        assert!(TeamDraftMultileave
            .interleave(&mut rankers, &query(), 2, &mut rng)
            .is_err());
    }
}
