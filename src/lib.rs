//! `multileave`: online comparison of ranking functions by interleaving and multileaving.
//!
//! Designed for "which ranker is better" questions answered from user clicks: two (or more)
//! rankers produce result lists for the same query, a comparison method mixes them into a
//! single shown list, and the clicks on that list are attributed back to the rankers. The
//! caller owns rankers, queries and click simulation; `multileave` owns the mixing and the
//! attribution.
//!
//! Every method implements [`InterleavedComparison`]:
//!
//! - `interleave` builds an [`Interleaving`]: the shown list plus a method-specific
//!   [`Context`].
//! - `infer_outcome` turns a click vector into an [`Outcome`]. Pairwise outcomes are signed:
//!   negative favors the first ranker, positive the second, `0.0` is a tie. Multileaving
//!   returns one credit per ranker.
//!
//! **Methods:**
//! - [`TeamDraft`] / [`TeamDraftMultileave`]: rankers take turns picking their best unused
//!   document; clicks count for the picking team.
//! - [`BalancedInterleave`]: alternate between the two rankings; a click credits every
//!   ranking that ranks the document at or above the lowest click's depth.
//! - [`DocumentConstraints`]: balanced list construction; the ranker violating fewer
//!   click-inferred pairwise constraints wins.
//! - [`StochasticBalancedInterleave`]: balanced interleave with a biased coin, and click
//!   counts reweighted by how often each side was actually shown.
//! - [`ProbabilisticInterleave`]: softmax rankers, per-position coin flips, and an outcome
//!   marginalized over every assignment that could have produced the list.
//! - [`OptimizedInterleave`] / [`OptimizedMultileave`]: solve a linear program for a
//!   distribution over candidate lists under which random clicks are unbiased, then sample.
//!
//! **Historical reuse:** [`HistoricalComparison`] re-evaluates a logged impression under a
//! different (target) ranker pair: [`HistTeamDraft`], [`HistBalancedInterleave`],
//! [`HistDocumentConstraints`] and [`HistProbabilisticInterleave`] (importance weighted).
//! [`ProbabilisticInterleaveWithHistory`] folds a bounded buffer of such reweighted outcomes
//! into each live outcome.
//!
//! **Plumbing:**
//! - [`Ranker`] with [`DeterministicRanker`] and [`ProbabilisticRanker`].
//! - [`registry`]: build methods by name from `--key value` option strings.
//! - [`impression_rng`]: one reproducible random stream per `(seed, query, impression)`.
//!
//! **Non-goals:**
//! - Not a learning-to-rank library: rankers are inputs, never trained here.
//! - No click models, query sampling, or experiment orchestration.
//!
//! # Determinism
//!
//! Methods never own a random generator. Every call that randomizes takes
//! `rng: &mut dyn RngCore`, so an experiment driver decides the seeding policy. Two calls
//! with identically seeded generators and identical inputs return identical lists,
//! contexts and outcomes.
//!
//! # Errors and ties
//!
//! [`ComparisonError`] covers configuration mistakes and broken preconditions (wrong ranker
//! count, mismatched click vectors, a context from another method, lists too long to
//! enumerate). Situations that merely carry no evidence resolve to [`Outcome::TIE`]: no
//! clicks, a logged list with zero probability under the target pair, or a list no team
//! assignment can explain.
//!
//! ## Related work
//!
//! - Team draft: Radlinski, Kurup & Joachims (CIKM 2008).
//! - Balanced interleave: Joachims (KDD 2002; 2003).
//! - Document constraints: He, Zhai & Ounis (ECIR 2009).
//! - Probabilistic interleave and historical reuse: Hofmann, Whiteson & de Rijke (CIKM 2011;
//!   TOIS 2013).
//! - Optimized interleaving: Radlinski & Craswell (WSDM 2013); multileaving: Schuth et al.
//!   (CIKM 2014); vertical-aware leavings: Chuklin et al. (SIGIR 2013).

#![forbid(unsafe_code)]

mod error;
pub use error::*;

mod document;
pub use document::*;

mod ranker;
pub use ranker::*;

mod alloc;
pub use alloc::*;

mod utils;
pub use utils::*;

mod stable_hash;
pub use stable_hash::*;

mod context;
pub use context::*;

mod credit;
pub use credit::*;

mod comparison;
pub use comparison::*;

mod team_draft;
pub use team_draft::*;

mod balanced;
pub use balanced::*;

mod document_constraints;
pub use document_constraints::*;

mod stochastic_balanced;
pub use stochastic_balanced::*;

mod probabilistic;
pub use probabilistic::*;

mod historical;
pub use historical::*;

mod history;
pub use history::*;

mod leavings;
pub use leavings::*;

pub mod lp;

mod optimized;
pub use optimized::*;

pub mod registry;
pub use registry::{build_comparison, build_historical, HistoricalKind, MethodKind};
