//! Method-specific interleaving contexts and comparison outcomes.
//!
//! `interleave` hands back a [`Context`] next to the shown list; `infer_outcome` needs it to
//! attribute clicks. Each method family has its own variant so inference pattern-matches on
//! the concrete shape instead of relying on positional conventions:
//!
//! - [`Context::TeamDraft`]: explicit per-position team (team draft).
//! - [`Context::TeamDraftMultileave`]: per-position team plus the number of competing rankers.
//! - [`Context::Balanced`]: the two source rankings (balanced interleave, document constraints).
//! - [`Context::StochasticBalanced`]: source rankings plus realized draws per side.
//! - [`Context::Probabilistic`]: coin sequence plus per-position document probabilities.
//! - [`Context::Credit`] / [`Context::MultiCredit`]: precomputed credit of the sampled list.
//!
//! Outcome sign convention for pairwise comparisons: negative favors the first ranker,
//! positive favors the second, exactly `0.0` carries no preference.

use crate::credit::{CreditFunction, MultiCreditFunction};
use crate::document::Document;
use crate::utils::sign;

/// Which ranker contributed a position of a team-draft list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Team {
    /// Common prefix of all rankings; credits nobody.
    Shared,
    /// Contributed by the ranker at this index.
    Ranker(usize),
}

/// Context of a pairwise credit-based (optimized) interleaving.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CreditContext {
    /// Credit per position of the sampled list (positive favors the second ranking).
    pub credits: Vec<f64>,
    /// Input rankings the credits were computed against.
    pub rankings: Vec<Vec<Document>>,
    /// Credit function used.
    pub credit: CreditFunction,
    /// Probability with which the sampled list was drawn.
    pub probability: f64,
    /// The unbiasedness constraints had to be relaxed to solve the program.
    pub relaxed: bool,
}

/// Context of a credit-based multileaving.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MultiCreditContext {
    /// `credits[position][ranker]`, relative to the mean credit at that position.
    pub credits: Vec<Vec<f64>>,
    /// Input rankings the credits were computed against.
    pub rankings: Vec<Vec<Document>>,
    /// Credit function used.
    pub credit: MultiCreditFunction,
    /// Probability with which the sampled list was drawn.
    pub probability: f64,
    /// The unbiasedness constraints had to be relaxed to solve the program.
    pub relaxed: bool,
}

fn swap_first_two(teams: &[Team]) -> Vec<Team> {
    teams
        .iter()
        .map(|t| match t {
            Team::Ranker(0) => Team::Ranker(1),
            Team::Ranker(1) => Team::Ranker(0),
            other => *other,
        })
        .collect()
}

/// Everything `infer_outcome` needs to attribute clicks on an interleaved list.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Context {
    TeamDraft {
        teams: Vec<Team>,
    },
    TeamDraftMultileave {
        teams: Vec<Team>,
        /// Rankers that took part, including any that never placed a document.
        rankers: usize,
    },
    Balanced {
        rankings: [Vec<Document>; 2],
    },
    StochasticBalanced {
        rankings: [Vec<Document>; 2],
        /// Documents actually placed from each side.
        plays: [usize; 2],
        /// Probability of drawing from the second ranking.
        exploration_rate: f64,
    },
    Probabilistic {
        /// Realized ranker choice per position (0 or 1).
        coins: Vec<usize>,
        /// `probabilities[i][r]`: probability ranker `r` draws `list[i]` given `list[..i]`.
        probabilities: Vec<[f64; 2]>,
    },
    Credit(CreditContext),
    MultiCredit(MultiCreditContext),
}

impl Context {
    /// Family name used in error messages.
    pub fn family(&self) -> &'static str {
        match self {
            Self::TeamDraft { .. } => "team-draft",
            Self::TeamDraftMultileave { .. } => "team-draft-multileave",
            Self::Balanced { .. } => "balanced",
            Self::StochasticBalanced { .. } => "stochastic-balanced",
            Self::Probabilistic { .. } => "probabilistic",
            Self::Credit(_) => "credit",
            Self::MultiCredit(_) => "multi-credit",
        }
    }

    /// The same context with the roles of the first and second ranker exchanged.
    ///
    /// Inferring an outcome from the swapped context negates a pairwise outcome.
    pub fn swap_sides(&self) -> Self {
        match self {
            Self::TeamDraft { teams } => Self::TeamDraft {
                teams: swap_first_two(teams),
            },
            Self::TeamDraftMultileave { teams, rankers } => Self::TeamDraftMultileave {
                teams: swap_first_two(teams),
                rankers: *rankers,
            },
            Self::Balanced { rankings: [a, b] } => Self::Balanced {
                rankings: [b.clone(), a.clone()],
            },
            Self::StochasticBalanced {
                rankings: [a, b],
                plays: [pa, pb],
                exploration_rate,
            } => Self::StochasticBalanced {
                rankings: [b.clone(), a.clone()],
                plays: [*pb, *pa],
                exploration_rate: 1.0 - exploration_rate,
            },
            Self::Probabilistic {
                coins,
                probabilities,
            } => Self::Probabilistic {
                coins: coins.iter().map(|&c| usize::from(c == 0)).collect(),
                probabilities: probabilities.iter().map(|[p, q]| [*q, *p]).collect(),
            },
            Self::Credit(ctx) => Self::Credit(CreditContext {
                credits: ctx.credits.iter().map(|c| -c).collect(),
                rankings: ctx.rankings.iter().rev().cloned().collect(),
                ..ctx.clone()
            }),
            Self::MultiCredit(ctx) => Self::MultiCredit(MultiCreditContext {
                credits: ctx
                    .credits
                    .iter()
                    .map(|row| row.iter().rev().copied().collect())
                    .collect(),
                rankings: ctx.rankings.iter().rev().cloned().collect(),
                ..ctx.clone()
            }),
        }
    }
}

/// Result of one comparison.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Outcome {
    /// Signed pairwise preference (negative: first ranker, positive: second).
    Pairwise(f64),
    /// One signed credit per ranker (higher wins).
    Multileave(Vec<f64>),
}

impl Outcome {
    /// No evidence either way.
    pub const TIE: Outcome = Outcome::Pairwise(0.0);

    /// The pairwise value, if this is a pairwise outcome.
    pub fn pairwise(&self) -> Option<f64> {
        match self {
            Self::Pairwise(v) => Some(*v),
            Self::Multileave(_) => None,
        }
    }

    /// Per-ranker credits (a pairwise outcome `v` maps to `[-v/2, v/2]`).
    pub fn credits(&self) -> Vec<f64> {
        match self {
            Self::Pairwise(v) => vec![-v / 2.0, v / 2.0],
            Self::Multileave(cs) => cs.clone(),
        }
    }

    /// True when no ranker is preferred over any other.
    pub fn is_tie(&self) -> bool {
        match self {
            Self::Pairwise(v) => *v == 0.0,
            Self::Multileave(cs) => cs.windows(2).all(|w| w[0] == w[1]),
        }
    }

    /// Preference between rankers `i` and `j`: `-1` favors `i`, `1` favors `j`, `0` neither.
    pub fn preference(&self, i: usize, j: usize) -> f64 {
        let cs = self.credits();
        match (cs.get(i), cs.get(j)) {
            (Some(a), Some(b)) => sign(b - a),
            _ => 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn swapping_team_draft_exchanges_rankers_only() {
        let ctx = Context::TeamDraft {
            teams: vec![Team::Shared, Team::Ranker(0), Team::Ranker(1)],
        };
        assert_eq!(
            ctx.swap_sides(),
            Context::TeamDraft {
                teams: vec![Team::Shared, Team::Ranker(1), Team::Ranker(0)],
            }
        );
    }

    #[test]
    fn swap_is_an_involution_for_probabilistic() {
        let ctx = Context::Probabilistic {
            coins: vec![0, 1, 1],
            probabilities: vec![[0.5, 0.25], [0.0, 1.0], [1.0, 1.0]],
        };
        assert_eq!(ctx.swap_sides().swap_sides(), ctx);
    }

    #[test]
    fn multileave_preferences_follow_credits() {
        let o = Outcome::Multileave(vec![1.0, -0.5, -0.5]);
        assert_eq!(o.preference(0, 1), -1.0);
        assert_eq!(o.preference(1, 0), 1.0);
        assert_eq!(o.preference(1, 2), 0.0);
        assert!(!o.is_tie());
        assert!(Outcome::Multileave(vec![0.0; 3]).is_tie());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn contexts_survive_json() {
        let ctx = Context::Balanced {
            rankings: [
                vec![Document::new(1), Document::new(0)],
                vec![Document::new(0), Document::new(1)],
            ],
        };
        let json = serde_json::to_string(&ctx).unwrap();
        let back: Context = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ctx);
    }

    #[test]
    fn pairwise_outcome_maps_to_credits() {
        let o = Outcome::Pairwise(-1.0);
        assert_eq!(o.preference(0, 1), -1.0);
        assert_eq!(o.pairwise(), Some(-1.0));
        assert!(Outcome::TIE.is_tie());
    }
}
