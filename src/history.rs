//! Probabilistic interleaving that pools the live impression with reweighted history.
//!
//! The estimator keeps a bounded FIFO of past impressions. Each new impression produces a live
//! outcome (the marginalized outcome conditioned on the shown list) and one importance-weighted
//! outcome per stored impression, re-evaluated under the current pair. Both are on the
//! conditional scale, so replaying an impression under the pair that showed it reproduces its
//! live outcome. An impression without clicks is logged and yields a tie.
//!
//! The two are combined with inverse-variance weights: every historical outcome gets
//! `1 / (1 + σ̂²)` with `σ̂²` the sample variance of the historical outcomes, the live outcome
//! gets weight one. Treating the live outcome as if it had zero variance is a known
//! approximation and kept as is.

use rand::RngCore;
use std::collections::VecDeque;
use tracing::{debug, trace};

use crate::comparison::{
    check_clicks, no_clicks, wrong_context, InterleavedComparison, Interleaving,
};
use crate::context::{Context, Outcome};
use crate::document::{Document, Query};
use crate::error::ComparisonError;
use crate::historical::{HistProbabilisticConfig, HistProbabilisticInterleave};
use crate::probabilistic::{
    list_probability, marginalize, Aggregation, ProbabilisticConfig, ProbabilisticInterleave,
};
use crate::ranker::Ranker;

/// One logged impression.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct HistoryItem {
    pub list: Vec<Document>,
    pub context: Context,
    pub clicks: Vec<bool>,
    pub query: Query,
    /// Probability of `list` under the ranker pair that showed it.
    pub source_probability: f64,
}

/// Bounded FIFO of logged impressions; the oldest item is evicted first.
#[derive(Debug, Clone, Default)]
pub struct HistoryBuffer {
    items: VecDeque<HistoryItem>,
    capacity: usize,
}

impl HistoryBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append `item`, returning the evicted one when full.
    pub fn push(&mut self, item: HistoryItem) -> Option<HistoryItem> {
        if self.capacity == 0 {
            return Some(item);
        }
        let evicted = if self.items.len() >= self.capacity {
            self.items.pop_front()
        } else {
            None
        };
        self.items.push_back(item);
        evicted
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = &HistoryItem> {
        self.items.iter()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct HistoryConfig {
    pub aggregation: Aggregation,
    /// Skip importance weighting of historical outcomes.
    pub biased: bool,
    pub history_length: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            aggregation: Aggregation::Expectation,
            biased: false,
            history_length: 10,
        }
    }
}

/// Inverse-variance combination of one live outcome with historical ones.
pub fn combine_with_history(live: f64, historical: &[f64]) -> f64 {
    let n = historical.len();
    if n == 0 {
        return live;
    }
    let mean = historical.iter().sum::<f64>() / n as f64;
    let variance = if n > 1 {
        historical.iter().map(|h| (h - mean).powi(2)).sum::<f64>() / (n - 1) as f64
    } else {
        0.0
    };
    let w = 1.0 / (1.0 + variance);
    (live + w * historical.iter().sum::<f64>()) / (1.0 + n as f64 * w)
}

/// Probabilistic interleave backed by a history of reweighted impressions.
#[derive(Debug, Clone)]
pub struct ProbabilisticInterleaveWithHistory {
    live: ProbabilisticInterleave,
    reuse: HistProbabilisticInterleave,
    history: HistoryBuffer,
}

impl Default for ProbabilisticInterleaveWithHistory {
    fn default() -> Self {
        Self::new(HistoryConfig::default())
    }
}

impl ProbabilisticInterleaveWithHistory {
    pub fn new(cfg: HistoryConfig) -> Self {
        Self {
            live: ProbabilisticInterleave::new(ProbabilisticConfig {
                aggregation: cfg.aggregation,
                marginalize: true,
            }),
            reuse: HistProbabilisticInterleave::new(HistProbabilisticConfig {
                aggregation: cfg.aggregation,
                biased: cfg.biased,
            }),
            history: HistoryBuffer::new(cfg.history_length),
        }
    }

    pub fn name(&self) -> &'static str {
        "probabilistic_interleave_with_history"
    }

    pub fn history(&self) -> &HistoryBuffer {
        &self.history
    }

    pub fn interleave(
        &self,
        rankers: &mut [&mut dyn Ranker],
        query: &Query,
        length: usize,
        rng: &mut dyn RngCore,
    ) -> Result<Interleaving, ComparisonError> {
        self.live.interleave(rankers, query, length, rng)
    }

    /// Combine the live impression with the history re-evaluated under `rankers`, then log it.
    pub fn infer_outcome(
        &mut self,
        list: &[Document],
        context: &Context,
        clicks: &[bool],
        rankers: &mut [&mut dyn Ranker],
        query: &Query,
    ) -> Result<Outcome, ComparisonError> {
        check_clicks(list, clicks)?;
        let Context::Probabilistic { probabilities, .. } = context else {
            return Err(wrong_context(self.name(), context));
        };
        if no_clicks(clicks) {
            self.remember(list, context, clicks, query, probabilities);
            return Ok(Outcome::TIE);
        }
        let live = self
            .live
            .config()
            .aggregation
            .aggregate(&marginalize(probabilities, clicks).conditional());

        let mut historical = Vec::with_capacity(self.history.len());
        for item in self.history.iter() {
            let h = self.reuse.reweighted_outcome(
                &item.list,
                item.source_probability,
                &item.clicks,
                rankers,
                &item.query,
            )?;
            historical.push(h);
        }
        let combined = combine_with_history(live, &historical);
        debug!(
            target: "multileave.history",
            query = query.id(),
            live,
            history = historical.len(),
            combined,
            "combined live and historical outcomes"
        );

        self.remember(list, context, clicks, query, probabilities);
        Ok(Outcome::Pairwise(combined))
    }

    fn remember(
        &mut self,
        list: &[Document],
        context: &Context,
        clicks: &[bool],
        query: &Query,
        probabilities: &[[f64; 2]],
    ) {
        let evicted = self.history.push(HistoryItem {
            list: list.to_vec(),
            context: context.clone(),
            clicks: clicks.to_vec(),
            query: query.clone(),
            source_probability: list_probability(probabilities),
        });
        if let Some(old) = evicted {
            trace!(
                target: "multileave.history",
                query = old.query.id(),
                capacity = self.history.capacity(),
                "evicted oldest impression"
            );
        }
    }
}
