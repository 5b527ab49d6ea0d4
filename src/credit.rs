//! Credit functions for the optimized (credit-based) family.
//!
//! A credit function maps a document and the input rankings to a signed value. For pairwise
//! interleaving the value favors the second ranking when positive. For multileaving each
//! ranking receives its own raw credit, and the comparison uses the credit relative to the mean
//! over all rankings (so every position's credits sum to zero).
//!
//! Documents absent from a ranking are treated as ranked just past its end.

use std::fmt;
use std::str::FromStr;

use crate::document::{rank_in, Document};
use crate::error::ComparisonError;
use crate::utils::sign;

/// Pairwise credit function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CreditFunction {
    /// `±1` by which ranking places the document higher.
    Binary,
    /// Rank difference `rank_first - rank_second`.
    Linear,
    /// Reciprocal-rank difference `1/(rank_second+1) - 1/(rank_first+1)`.
    #[default]
    Inverse,
}

impl CreditFunction {
    /// Credit of `doc` relative to `first` and `second` (positive favors `second`).
    pub fn credit(&self, doc: &Document, first: &[Document], second: &[Document]) -> f64 {
        let ra = rank_in(first, doc) as f64;
        let rb = rank_in(second, doc) as f64;
        match self {
            Self::Binary => sign(ra - rb),
            Self::Linear => ra - rb,
            Self::Inverse => 1.0 / (rb + 1.0) - 1.0 / (ra + 1.0),
        }
    }

    /// Credits of every position of `list`.
    pub fn credits(&self, list: &[Document], first: &[Document], second: &[Document]) -> Vec<f64> {
        list.iter()
            .map(|d| self.credit(d, first, second))
            .collect()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Binary => "binary",
            Self::Linear => "linear",
            Self::Inverse => "inverse",
        }
    }
}

impl FromStr for CreditFunction {
    type Err = ComparisonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "binary" => Ok(Self::Binary),
            "linear" => Ok(Self::Linear),
            "inverse" => Ok(Self::Inverse),
            _ => Err(ComparisonError::invalid_option(
                "credit",
                s,
                "expected `binary`, `linear` or `inverse`",
            )),
        }
    }
}

impl fmt::Display for CreditFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-ranking credit function for multileaving.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum MultiCreditFunction {
    /// Reciprocal rank `1/(rank+1)`.
    #[default]
    InverseCredit,
    /// Negated rank `-rank`.
    NegativeCredit,
}

impl MultiCreditFunction {
    /// Raw credit of `doc` for one ranking.
    pub fn raw(&self, doc: &Document, ranking: &[Document]) -> f64 {
        let r = rank_in(ranking, doc) as f64;
        match self {
            Self::InverseCredit => 1.0 / (r + 1.0),
            Self::NegativeCredit => -r,
        }
    }

    /// Credit of `doc` for every ranking, minus the mean over rankings.
    pub fn relative(&self, doc: &Document, rankings: &[Vec<Document>]) -> Vec<f64> {
        let raw: Vec<f64> = rankings.iter().map(|r| self.raw(doc, r)).collect();
        if raw.is_empty() {
            return raw;
        }
        let mean = raw.iter().sum::<f64>() / raw.len() as f64;
        raw.into_iter().map(|c| c - mean).collect()
    }

    /// `credits[position][ranking]` for every position of `list`.
    pub fn credits(&self, list: &[Document], rankings: &[Vec<Document>]) -> Vec<Vec<f64>> {
        list.iter().map(|d| self.relative(d, rankings)).collect()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InverseCredit => "inverse_credit",
            Self::NegativeCredit => "negative_credit",
        }
    }
}

impl FromStr for MultiCreditFunction {
    type Err = ComparisonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "inverse_credit" => Ok(Self::InverseCredit),
            "negative_credit" => Ok(Self::NegativeCredit),
            _ => Err(ComparisonError::invalid_option(
                "credit",
                s,
                "expected `inverse_credit` or `negative_credit`",
            )),
        }
    }
}

impl fmt::Display for MultiCreditFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn docs(ids: &[usize]) -> Vec<Document> {
        ids.iter().copied().map(Document::new).collect()
    }

    #[test]
    fn pairwise_credit_favors_the_ranking_that_ranks_higher() {
        let a = docs(&[0, 1, 2]);
        let b = docs(&[2, 1, 0]);
        let d0 = Document::new(0);
        assert_eq!(CreditFunction::Binary.credit(&d0, &a, &b), -1.0);
        assert_eq!(CreditFunction::Linear.credit(&d0, &a, &b), -2.0);
        assert!((CreditFunction::Inverse.credit(&d0, &a, &b) - (1.0 / 3.0 - 1.0)).abs() < 1e-12);
        // Equal ranks carry no credit.
        assert_eq!(CreditFunction::Binary.credit(&Document::new(1), &a, &b), 0.0);
    }

    #[test]
    fn pairwise_credit_is_antisymmetric() {
        let a = docs(&[3, 1, 2]);
        let b = docs(&[1, 2, 0]);
        for f in [
            CreditFunction::Binary,
            CreditFunction::Linear,
            CreditFunction::Inverse,
        ] {
            for id in 0..4 {
                let d = Document::new(id);
                assert_eq!(f.credit(&d, &a, &b), -f.credit(&d, &b, &a));
            }
        }
    }

    #[test]
    fn relative_multi_credit_sums_to_zero() {
        let rankings = vec![docs(&[0, 1, 2]), docs(&[1, 0, 2]), docs(&[2, 1, 0])];
        for f in [
            MultiCreditFunction::InverseCredit,
            MultiCreditFunction::NegativeCredit,
        ] {
            for id in 0..3 {
                let row = f.relative(&Document::new(id), &rankings);
                assert_eq!(row.len(), 3);
                assert!(row.iter().sum::<f64>().abs() < 1e-12);
            }
        }
    }

    #[test]
    fn parse_rejects_unknown_names() {
        assert_eq!("linear".parse::<CreditFunction>(), Ok(CreditFunction::Linear));
        assert!("quadratic".parse::<CreditFunction>().is_err());
        assert_eq!(
            "negative_credit".parse::<MultiCreditFunction>(),
            Ok(MultiCreditFunction::NegativeCredit)
        );
    }
}
