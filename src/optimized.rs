//! Optimized interleaving and multileaving.
//!
//! Instead of a greedy merge, the optimized family picks a *distribution* over a feasible
//! leaving set and samples the shown list from it:
//!
//! 1. rank the query with every ranker (top documents, deterministically);
//! 2. enumerate the allowed leavings ([`crate::leavings`]);
//! 3. compute each leaving's per-position credit;
//! 4. solve for probabilities under which, at every prefix length, expected accumulated credit
//!    is zero, maximizing expected sensitivity ([`crate::lp`]);
//! 5. sample a list; its credit vector is the context, and the outcome is the credit summed
//!    over clicked positions.
//!
//! Sensitivity of a list is the entropy of how its position-discounted (`1/(i+1)`) credit mass
//! splits between the rankers: lists that credit both sides evenly tell them apart best.
//!
//! More than two rankers are compared either directly with [`OptimizedMultileave`] or by the
//! pairwise [`OptimizedInterleave::cascade`], which folds each stage's list into a synthetic
//! ranker for the next stage.

use rand::{Rng, RngCore};
use tracing::debug;

use crate::comparison::{
    check_clicks, no_clicks, pair_count_error, top_documents, wrong_context,
    InterleavedComparison, Interleaving,
};
use crate::context::{Context, CreditContext, MultiCreditContext, Outcome};
use crate::credit::{CreditFunction, MultiCreditFunction};
use crate::document::{Document, Query};
use crate::error::ComparisonError;
use crate::leavings::{feasible_leavings, reachable_length, LeavingConfig, MAX_LEAVING_LENGTH};
use crate::lp::solve_unbiased;
use crate::ranker::{DeterministicRanker, Ranker};
use crate::utils::entropy_bits;

/// A solved distribution over a feasible leaving set.
///
/// `C` is the per-position credit: a signed `f64` for pairwise interleaving, one relative credit
/// per ranker for multileaving.
#[derive(Debug, Clone, PartialEq)]
pub struct LeavingDistribution<C = f64> {
    /// Input rankings the leavings and credits were built from.
    pub rankings: Vec<Vec<Document>>,
    pub lists: Vec<Vec<Document>>,
    /// `credits[l][i]`: credit of position `i` of `lists[l]`.
    pub credits: Vec<Vec<C>>,
    pub probabilities: Vec<f64>,
    pub relaxed: bool,
}

impl<C> LeavingDistribution<C> {
    pub fn len(&self) -> usize {
        self.lists.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lists.is_empty()
    }

    /// Index of a list drawn according to `probabilities`.
    pub fn sample(&self, rng: &mut dyn RngCore) -> usize {
        let r: f64 = rng.random::<f64>();
        let mut acc = 0.0;
        for (i, p) in self.probabilities.iter().enumerate() {
            acc += p;
            if r < acc {
                return i;
            }
        }
        // Rounding left `acc` just under one; take the last list with mass.
        self.probabilities
            .iter()
            .rposition(|p| *p > 0.0)
            .unwrap_or(0)
    }
}

impl LeavingDistribution<f64> {
    /// Expected accumulated credit at every prefix length (all zero when unbiased).
    pub fn prefix_bias(&self) -> Vec<f64> {
        let length = self.credits.iter().map(Vec::len).max().unwrap_or(0);
        prefix_rows(&self.credits, length)
            .iter()
            .map(|row| row.iter().zip(&self.probabilities).map(|(c, p)| c * p).sum())
            .collect()
    }
}

impl LeavingDistribution<Vec<f64>> {
    /// Expected accumulated credit per prefix length and ranker.
    pub fn prefix_bias(&self) -> Vec<Vec<f64>> {
        let length = self.credits.iter().map(Vec::len).max().unwrap_or(0);
        let rankers = self.rankings.len();
        (0..length)
            .map(|k| {
                (0..rankers)
                    .map(|j| {
                        self.credits
                            .iter()
                            .zip(&self.probabilities)
                            .map(|(list, p)| {
                                p * list.iter().take(k + 1).map(|c| c[j]).sum::<f64>()
                            })
                            .sum()
                    })
                    .collect()
            })
            .collect()
    }
}

/// `rows[k][l]`: credit accumulated by list `l` over its first `k + 1` positions.
fn prefix_rows(credits: &[Vec<f64>], length: usize) -> Vec<Vec<f64>> {
    (0..length)
        .map(|k| {
            credits
                .iter()
                .map(|list| list.iter().take(k + 1).sum())
                .collect()
        })
        .collect()
}

fn pairwise_sensitivity(credits: &[f64]) -> f64 {
    let mut mass = [0.0; 2];
    for (i, c) in credits.iter().enumerate() {
        let discount = 1.0 / (i + 1) as f64;
        if *c < 0.0 {
            mass[0] -= c * discount;
        } else {
            mass[1] += c * discount;
        }
    }
    entropy_bits(&mass)
}

fn multileave_sensitivity(credits: &[Vec<f64>], rankers: usize) -> f64 {
    let mut mass = vec![0.0; rankers];
    for (i, row) in credits.iter().enumerate() {
        let discount = 1.0 / (i + 1) as f64;
        for (m, c) in mass.iter_mut().zip(row) {
            if *c > 0.0 {
                *m += c * discount;
            }
        }
    }
    entropy_bits(&mass)
}

/// Top documents of every ranker plus the length every leaving will have.
fn rank_all(
    rankers: &mut [&mut dyn Ranker],
    query: &Query,
    length: usize,
) -> Result<(Vec<Vec<Document>>, usize), ComparisonError> {
    let rankings: Vec<Vec<Document>> = rankers
        .iter_mut()
        .map(|r| top_documents(&mut **r, query, length))
        .collect();
    let length = rankings.iter().map(Vec::len).fold(length, usize::min);
    if length > MAX_LEAVING_LENGTH {
        return Err(ComparisonError::LengthExceedsCap {
            length,
            cap: MAX_LEAVING_LENGTH,
        });
    }
    Ok((rankings, length))
}

fn clicked_sum(credits: &[f64], clicks: &[bool]) -> f64 {
    credits
        .iter()
        .zip(clicks)
        .filter(|(_, c)| **c)
        .map(|(v, _)| v)
        .sum()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OptimizedConfig {
    pub credit: CreditFunction,
    pub leavings: LeavingConfig,
}

/// Pairwise optimized interleaving.
#[derive(Debug, Clone, Copy, Default)]
pub struct OptimizedInterleave {
    cfg: OptimizedConfig,
}

impl OptimizedInterleave {
    pub fn new(cfg: OptimizedConfig) -> Result<Self, ComparisonError> {
        cfg.leavings.validate()?;
        Ok(Self { cfg })
    }

    pub fn config(&self) -> OptimizedConfig {
        self.cfg
    }

    /// Enumerate, credit and solve; the distribution shown lists are drawn from.
    pub fn solve(
        &self,
        rankers: &mut [&mut dyn Ranker],
        query: &Query,
        length: usize,
        rng: &mut dyn RngCore,
    ) -> Result<LeavingDistribution, ComparisonError> {
        if rankers.len() != 2 {
            return Err(pair_count_error(self.name(), rankers.len()));
        }
        let (rankings, length) = rank_all(rankers, query, length)?;
        let length = reachable_length(&rankings, length, self.cfg.leavings.prefix_bound);
        let lists = feasible_leavings(&rankings, length, &self.cfg.leavings, rng)?;
        let credits: Vec<Vec<f64>> = lists
            .iter()
            .map(|l| self.cfg.credit.credits(l, &rankings[0], &rankings[1]))
            .collect();
        let sensitivity: Vec<f64> = credits.iter().map(|c| pairwise_sensitivity(c)).collect();
        let solution = solve_unbiased(&prefix_rows(&credits, length), &sensitivity)?;
        debug!(
            target: "multileave.optimized",
            query = query.id(),
            length,
            leavings = lists.len(),
            relaxed = solution.relaxed,
            "solved pairwise leaving distribution"
        );
        Ok(LeavingDistribution {
            rankings,
            lists,
            credits,
            probabilities: solution.probabilities,
            relaxed: solution.relaxed,
        })
    }

    fn draw(&self, dist: &LeavingDistribution, rng: &mut dyn RngCore) -> Interleaving {
        let i = dist.sample(rng);
        Interleaving {
            list: dist.lists[i].clone(),
            context: Context::Credit(CreditContext {
                credits: dist.credits[i].clone(),
                rankings: dist.rankings.clone(),
                credit: self.cfg.credit,
                probability: dist.probabilities[i],
                relaxed: dist.relaxed,
            }),
        }
    }

    /// Chain pairwise comparisons over `rankers`: stage `i` interleaves the previous stage's
    /// list (as a deterministic ranker) with ranker `i + 1`. The last stage's list is shown.
    pub fn cascade(
        &self,
        rankers: &mut [&mut dyn Ranker],
        query: &Query,
        length: usize,
        rng: &mut dyn RngCore,
    ) -> Result<Vec<Interleaving>, ComparisonError> {
        let Some((first, rest)) = rankers.split_first_mut() else {
            return Err(ComparisonError::RankerCount {
                method: self.name(),
                expected: "at least 2",
                found: 0,
            });
        };
        if rest.is_empty() {
            return Err(ComparisonError::RankerCount {
                method: self.name(),
                expected: "at least 2",
                found: 1,
            });
        }
        let mut stages: Vec<Interleaving> = Vec::with_capacity(rest.len());
        let mut synthetic: Option<DeterministicRanker> = None;
        for next in rest.iter_mut() {
            let stage = match synthetic.as_mut() {
                None => {
                    let mut pair: [&mut dyn Ranker; 2] = [&mut **first, &mut **next];
                    self.interleave(&mut pair, query, length, rng)?
                }
                Some(previous) => {
                    let mut pair: [&mut dyn Ranker; 2] = [previous, &mut **next];
                    self.interleave(&mut pair, query, length, rng)?
                }
            };
            synthetic = Some(DeterministicRanker::from_list(&stage.list));
            stages.push(stage);
        }
        Ok(stages)
    }

    /// Score every cascade stage against the list that was actually shown (the last stage's).
    pub fn cascade_outcomes(
        &self,
        stages: &[Interleaving],
        clicks: &[bool],
    ) -> Result<Vec<Outcome>, ComparisonError> {
        let Some(shown) = stages.last() else {
            return Ok(Vec::new());
        };
        check_clicks(&shown.list, clicks)?;
        stages
            .iter()
            .map(|stage| {
                let Context::Credit(ctx) = &stage.context else {
                    return Err(wrong_context(self.name(), &stage.context));
                };
                let [a, b] = ctx.rankings.as_slice() else {
                    return Err(pair_count_error(self.name(), ctx.rankings.len()));
                };
                if no_clicks(clicks) {
                    return Ok(Outcome::TIE);
                }
                let credits = ctx.credit.credits(&shown.list, a, b);
                Ok(Outcome::Pairwise(clicked_sum(&credits, clicks)))
            })
            .collect()
    }
}

impl InterleavedComparison for OptimizedInterleave {
    fn name(&self) -> &'static str {
        "optimized_interleave"
    }

    fn interleave(
        &self,
        rankers: &mut [&mut dyn Ranker],
        query: &Query,
        length: usize,
        rng: &mut dyn RngCore,
    ) -> Result<Interleaving, ComparisonError> {
        let dist = self.solve(rankers, query, length, rng)?;
        Ok(self.draw(&dist, rng))
    }

    /// Solves once and draws `repeats` lists from the same distribution.
    fn interleave_n(
        &self,
        rankers: &mut [&mut dyn Ranker],
        query: &Query,
        length: usize,
        repeats: usize,
        rng: &mut dyn RngCore,
    ) -> Result<Vec<Interleaving>, ComparisonError> {
        let dist = self.solve(rankers, query, length, rng)?;
        Ok((0..repeats).map(|_| self.draw(&dist, rng)).collect())
    }

    fn infer_outcome(
        &self,
        list: &[Document],
        context: &Context,
        clicks: &[bool],
        _query: &Query,
    ) -> Result<Outcome, ComparisonError> {
        check_clicks(list, clicks)?;
        let Context::Credit(ctx) = context else {
            return Err(wrong_context(self.name(), context));
        };
        if no_clicks(clicks) {
            return Ok(Outcome::TIE);
        }
        Ok(Outcome::Pairwise(clicked_sum(&ctx.credits, clicks)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OptimizedMultileaveConfig {
    pub credit: MultiCreditFunction,
    pub leavings: LeavingConfig,
}

/// Optimized multileaving over two or more rankers.
#[derive(Debug, Clone, Copy, Default)]
pub struct OptimizedMultileave {
    cfg: OptimizedMultileaveConfig,
}

impl OptimizedMultileave {
    pub fn new(cfg: OptimizedMultileaveConfig) -> Result<Self, ComparisonError> {
        cfg.leavings.validate()?;
        Ok(Self { cfg })
    }

    pub fn config(&self) -> OptimizedMultileaveConfig {
        self.cfg
    }

    pub fn solve(
        &self,
        rankers: &mut [&mut dyn Ranker],
        query: &Query,
        length: usize,
        rng: &mut dyn RngCore,
    ) -> Result<LeavingDistribution<Vec<f64>>, ComparisonError> {
        if rankers.len() < 2 {
            return Err(ComparisonError::RankerCount {
                method: self.name(),
                expected: "at least 2",
                found: rankers.len(),
            });
        }
        let (rankings, length) = rank_all(rankers, query, length)?;
        let length = reachable_length(&rankings, length, self.cfg.leavings.prefix_bound);
        let n = rankings.len();
        let lists = feasible_leavings(&rankings, length, &self.cfg.leavings, rng)?;
        let credits: Vec<Vec<Vec<f64>>> = lists
            .iter()
            .map(|l| self.cfg.credit.credits(l, &rankings))
            .collect();
        let sensitivity: Vec<f64> = credits
            .iter()
            .map(|c| multileave_sensitivity(c, n))
            .collect();
        // Relative credits sum to zero across rankers, so the last ranker's rows are implied.
        let mut rows = Vec::with_capacity(length * (n - 1));
        for j in 0..n - 1 {
            let per_ranker: Vec<Vec<f64>> = credits
                .iter()
                .map(|list| list.iter().map(|c| c[j]).collect())
                .collect();
            rows.extend(prefix_rows(&per_ranker, length));
        }
        let solution = solve_unbiased(&rows, &sensitivity)?;
        debug!(
            target: "multileave.optimized",
            query = query.id(),
            rankers = n,
            length,
            leavings = lists.len(),
            relaxed = solution.relaxed,
            "solved multileaving distribution"
        );
        Ok(LeavingDistribution {
            rankings,
            lists,
            credits,
            probabilities: solution.probabilities,
            relaxed: solution.relaxed,
        })
    }

    fn draw(&self, dist: &LeavingDistribution<Vec<f64>>, rng: &mut dyn RngCore) -> Interleaving {
        let i = dist.sample(rng);
        Interleaving {
            list: dist.lists[i].clone(),
            context: Context::MultiCredit(MultiCreditContext {
                credits: dist.credits[i].clone(),
                rankings: dist.rankings.clone(),
                credit: self.cfg.credit,
                probability: dist.probabilities[i],
                relaxed: dist.relaxed,
            }),
        }
    }
}

impl InterleavedComparison for OptimizedMultileave {
    fn name(&self) -> &'static str {
        "optimized_multileave"
    }

    fn interleave(
        &self,
        rankers: &mut [&mut dyn Ranker],
        query: &Query,
        length: usize,
        rng: &mut dyn RngCore,
    ) -> Result<Interleaving, ComparisonError> {
        let dist = self.solve(rankers, query, length, rng)?;
        Ok(self.draw(&dist, rng))
    }

    fn interleave_n(
        &self,
        rankers: &mut [&mut dyn Ranker],
        query: &Query,
        length: usize,
        repeats: usize,
        rng: &mut dyn RngCore,
    ) -> Result<Vec<Interleaving>, ComparisonError> {
        let dist = self.solve(rankers, query, length, rng)?;
        Ok((0..repeats).map(|_| self.draw(&dist, rng)).collect())
    }

    fn infer_outcome(
        &self,
        list: &[Document],
        context: &Context,
        clicks: &[bool],
        _query: &Query,
    ) -> Result<Outcome, ComparisonError> {
        check_clicks(list, clicks)?;
        let Context::MultiCredit(ctx) = context else {
            return Err(wrong_context(self.name(), context));
        };
        let mut totals = vec![0.0; ctx.rankings.len()];
        for (row, _) in ctx.credits.iter().zip(clicks).filter(|(_, c)| **c) {
            for (t, c) in totals.iter_mut().zip(row) {
                *t += c;
            }
        }
        Ok(Outcome::Multileave(totals))
    }
}
