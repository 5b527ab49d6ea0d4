//! Name-based construction of comparison methods.
//!
//! Experiment drivers select methods by name and pass options either as a map or as a legacy
//! flag string (`"--constraints 2 --starting_list random"`). The string is parsed once into
//! [`MethodOptions`]; each method's typed configuration is then built and validated from the
//! map, rejecting keys the method does not know. The set of methods is closed: [`MethodKind`]
//! and [`HistoricalKind`] enumerate them and [`build_comparison`] / [`build_historical`] map
//! each to its implementation.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::balanced::{BalancedConfig, BalancedInterleave, StartingList};
use crate::comparison::{HistoricalComparison, InterleavedComparison};
use crate::document_constraints::{DocumentConstraints, DocumentConstraintsConfig};
use crate::error::ComparisonError;
use crate::historical::{
    HistBalancedInterleave, HistDocumentConstraints, HistProbabilisticConfig,
    HistProbabilisticInterleave, HistTeamDraft,
};
use crate::history::{HistoryConfig, ProbabilisticInterleaveWithHistory};
use crate::leavings::{AllowedLeavings, LeavingConfig};
use crate::optimized::{
    OptimizedConfig, OptimizedInterleave, OptimizedMultileave, OptimizedMultileaveConfig,
};
use crate::probabilistic::{Aggregation, ProbabilisticConfig, ProbabilisticInterleave};
use crate::stochastic_balanced::{StochasticBalancedConfig, StochasticBalancedInterleave};
use crate::team_draft::{TeamDraft, TeamDraftMultileave};

/// Option key to raw value.
pub type MethodOptions = BTreeMap<String, String>;

/// Parse `--key value` pairs (or `--key=value`). Dashes inside keys become underscores.
pub fn parse_option_string(s: &str) -> Result<MethodOptions, ComparisonError> {
    let mut options = MethodOptions::new();
    let mut tokens = s.split_whitespace().peekable();
    while let Some(token) = tokens.next() {
        let Some(flag) = token.strip_prefix("--") else {
            return Err(ComparisonError::invalid_option(
                token,
                token,
                "expected `--key value`",
            ));
        };
        let (key, value) = match flag.split_once('=') {
            Some((k, v)) => (k, v.to_string()),
            None => match tokens.next_if(|t| !t.starts_with("--")) {
                Some(v) => (flag, v.to_string()),
                None => {
                    return Err(ComparisonError::invalid_option(
                        flag,
                        "",
                        "flag has no value",
                    ))
                }
            },
        };
        options.insert(key.replace('-', "_"), value);
    }
    Ok(options)
}

fn check_keys(
    method: &'static str,
    options: &MethodOptions,
    allowed: &[&str],
) -> Result<(), ComparisonError> {
    match options.keys().find(|k| !allowed.contains(&k.as_str())) {
        Some(key) => Err(ComparisonError::UnknownOption {
            option: key.clone(),
            method,
        }),
        None => Ok(()),
    }
}

/// Values whose `FromStr` already reports a [`ComparisonError`].
fn parse_named<T>(options: &MethodOptions, key: &str) -> Result<Option<T>, ComparisonError>
where
    T: FromStr<Err = ComparisonError>,
{
    options.get(key).map(|v| v.parse()).transpose()
}

fn parse_number<T>(options: &MethodOptions, key: &str) -> Result<Option<T>, ComparisonError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    options
        .get(key)
        .map(|v| {
            v.parse::<T>()
                .map_err(|e| ComparisonError::invalid_option(key, v.as_str(), e.to_string()))
        })
        .transpose()
}

fn parse_flag(options: &MethodOptions, key: &str) -> Result<Option<bool>, ComparisonError> {
    options
        .get(key)
        .map(|v| match v.to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" => Ok(false),
            _ => Err(ComparisonError::invalid_option(
                key,
                v.as_str(),
                "expected `true` or `false`",
            )),
        })
        .transpose()
}

impl BalancedConfig {
    pub fn from_options(options: &MethodOptions) -> Result<Self, ComparisonError> {
        check_keys("balanced_interleave", options, &["starting_list"])?;
        Ok(Self {
            starting_list: parse_named::<StartingList>(options, "starting_list")?
                .unwrap_or_default(),
        })
    }
}

impl DocumentConstraintsConfig {
    pub fn from_options(options: &MethodOptions) -> Result<Self, ComparisonError> {
        check_keys(
            "document_constraints",
            options,
            &["starting_list", "constraints"],
        )?;
        let defaults = Self::default();
        let cfg = Self {
            starting_list: parse_named(options, "starting_list")?
                .unwrap_or(defaults.starting_list),
            constraints: parse_number(options, "constraints")?.unwrap_or(defaults.constraints),
        };
        cfg.validate()?;
        Ok(cfg)
    }
}

impl StochasticBalancedConfig {
    pub fn from_options(options: &MethodOptions) -> Result<Self, ComparisonError> {
        check_keys(
            "stochastic_balanced_interleave",
            options,
            &["exploration_rate"],
        )?;
        let cfg = Self {
            exploration_rate: parse_number(options, "exploration_rate")?
                .unwrap_or(Self::default().exploration_rate),
        };
        cfg.validate()?;
        Ok(cfg)
    }
}

impl ProbabilisticConfig {
    pub fn from_options(options: &MethodOptions) -> Result<Self, ComparisonError> {
        check_keys(
            "probabilistic_interleave",
            options,
            &["aggregate", "marginalize"],
        )?;
        let defaults = Self::default();
        Ok(Self {
            aggregation: parse_named(options, "aggregate")?.unwrap_or(defaults.aggregation),
            marginalize: parse_flag(options, "marginalize")?.unwrap_or(defaults.marginalize),
        })
    }
}

impl HistProbabilisticConfig {
    pub fn from_options(options: &MethodOptions) -> Result<Self, ComparisonError> {
        check_keys("probabilistic_interleave", options, &["aggregate", "biased"])?;
        Ok(Self {
            aggregation: parse_named::<Aggregation>(options, "aggregate")?.unwrap_or_default(),
            biased: parse_flag(options, "biased")?.unwrap_or(false),
        })
    }
}

impl HistoryConfig {
    pub fn from_options(options: &MethodOptions) -> Result<Self, ComparisonError> {
        check_keys(
            "probabilistic_interleave_with_history",
            options,
            &["aggregate", "biased", "history_length"],
        )?;
        let defaults = Self::default();
        Ok(Self {
            aggregation: parse_named(options, "aggregate")?.unwrap_or(defaults.aggregation),
            biased: parse_flag(options, "biased")?.unwrap_or(defaults.biased),
            history_length: parse_number(options, "history_length")?
                .unwrap_or(defaults.history_length),
        })
    }
}

const LEAVING_KEYS: [&str; 4] = ["credit", "allowed_leavings", "sample_size", "prefix_bound"];

impl LeavingConfig {
    fn from_options(options: &MethodOptions) -> Result<Self, ComparisonError> {
        let defaults = Self::default();
        let cfg = Self {
            allowed: parse_named::<AllowedLeavings>(options, "allowed_leavings")?
                .unwrap_or(defaults.allowed),
            sample_size: parse_number(options, "sample_size")?.unwrap_or(defaults.sample_size),
            prefix_bound: parse_number(options, "prefix_bound")?.or(defaults.prefix_bound),
        };
        cfg.validate()?;
        Ok(cfg)
    }
}

impl OptimizedConfig {
    pub fn from_options(options: &MethodOptions) -> Result<Self, ComparisonError> {
        check_keys("optimized_interleave", options, &LEAVING_KEYS)?;
        Ok(Self {
            credit: parse_named(options, "credit")?.unwrap_or_default(),
            leavings: LeavingConfig::from_options(options)?,
        })
    }
}

impl OptimizedMultileaveConfig {
    pub fn from_options(options: &MethodOptions) -> Result<Self, ComparisonError> {
        check_keys("optimized_multileave", options, &LEAVING_KEYS)?;
        Ok(Self {
            credit: parse_named(options, "credit")?.unwrap_or_default(),
            leavings: LeavingConfig::from_options(options)?,
        })
    }
}

/// Every live comparison method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum MethodKind {
    TeamDraft,
    TeamDraftMultileave,
    BalancedInterleave,
    DocumentConstraints,
    StochasticBalancedInterleave,
    ProbabilisticInterleave,
    OptimizedInterleave,
    OptimizedMultileave,
}

impl MethodKind {
    pub const ALL: [MethodKind; 8] = [
        Self::TeamDraft,
        Self::TeamDraftMultileave,
        Self::BalancedInterleave,
        Self::DocumentConstraints,
        Self::StochasticBalancedInterleave,
        Self::ProbabilisticInterleave,
        Self::OptimizedInterleave,
        Self::OptimizedMultileave,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TeamDraft => "team_draft",
            Self::TeamDraftMultileave => "team_draft_multileave",
            Self::BalancedInterleave => "balanced_interleave",
            Self::DocumentConstraints => "document_constraints",
            Self::StochasticBalancedInterleave => "stochastic_balanced_interleave",
            Self::ProbabilisticInterleave => "probabilistic_interleave",
            Self::OptimizedInterleave => "optimized_interleave",
            Self::OptimizedMultileave => "optimized_multileave",
        }
    }

    /// Compares more than two rankers at once.
    pub fn is_multileave(&self) -> bool {
        matches!(self, Self::TeamDraftMultileave | Self::OptimizedMultileave)
    }
}

impl FromStr for MethodKind {
    type Err = ComparisonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| ComparisonError::UnknownMethod(s.to_string()))
    }
}

impl fmt::Display for MethodKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Methods that can re-evaluate logged impressions under another ranker pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum HistoricalKind {
    TeamDraft,
    BalancedInterleave,
    DocumentConstraints,
    ProbabilisticInterleave,
}

impl HistoricalKind {
    pub const ALL: [HistoricalKind; 4] = [
        Self::TeamDraft,
        Self::BalancedInterleave,
        Self::DocumentConstraints,
        Self::ProbabilisticInterleave,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TeamDraft => "team_draft",
            Self::BalancedInterleave => "balanced_interleave",
            Self::DocumentConstraints => "document_constraints",
            Self::ProbabilisticInterleave => "probabilistic_interleave",
        }
    }
}

impl FromStr for HistoricalKind {
    type Err = ComparisonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.strip_prefix("hist_").unwrap_or(s);
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == name)
            .ok_or_else(|| ComparisonError::UnknownMethod(s.to_string()))
    }
}

impl fmt::Display for HistoricalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn build_comparison(
    kind: MethodKind,
    options: &MethodOptions,
) -> Result<Box<dyn InterleavedComparison>, ComparisonError> {
    Ok(match kind {
        MethodKind::TeamDraft => {
            check_keys(kind.as_str(), options, &[])?;
            Box::new(TeamDraft::new())
        }
        MethodKind::TeamDraftMultileave => {
            check_keys(kind.as_str(), options, &[])?;
            Box::new(TeamDraftMultileave::new())
        }
        MethodKind::BalancedInterleave => {
            Box::new(BalancedInterleave::new(BalancedConfig::from_options(options)?))
        }
        MethodKind::DocumentConstraints => Box::new(DocumentConstraints::new(
            DocumentConstraintsConfig::from_options(options)?,
        )?),
        MethodKind::StochasticBalancedInterleave => Box::new(StochasticBalancedInterleave::new(
            StochasticBalancedConfig::from_options(options)?,
        )?),
        MethodKind::ProbabilisticInterleave => Box::new(ProbabilisticInterleave::new(
            ProbabilisticConfig::from_options(options)?,
        )),
        MethodKind::OptimizedInterleave => Box::new(OptimizedInterleave::new(
            OptimizedConfig::from_options(options)?,
        )?),
        MethodKind::OptimizedMultileave => Box::new(OptimizedMultileave::new(
            OptimizedMultileaveConfig::from_options(options)?,
        )?),
    })
}

pub fn build_historical(
    kind: HistoricalKind,
    options: &MethodOptions,
) -> Result<Box<dyn HistoricalComparison>, ComparisonError> {
    Ok(match kind {
        HistoricalKind::TeamDraft => {
            check_keys(kind.as_str(), options, &[])?;
            Box::new(HistTeamDraft::new())
        }
        HistoricalKind::BalancedInterleave => Box::new(HistBalancedInterleave::new(
            BalancedConfig::from_options(options)?,
        )),
        HistoricalKind::DocumentConstraints => Box::new(HistDocumentConstraints::new(
            DocumentConstraintsConfig::from_options(options)?,
        )?),
        HistoricalKind::ProbabilisticInterleave => Box::new(HistProbabilisticInterleave::new(
            HistProbabilisticConfig::from_options(options)?,
        )),
    })
}

pub fn build_history_estimator(
    options: &MethodOptions,
) -> Result<ProbabilisticInterleaveWithHistory, ComparisonError> {
    Ok(ProbabilisticInterleaveWithHistory::new(
        HistoryConfig::from_options(options)?,
    ))
}

/// Look up `name` and configure it from a flag string in one step.
pub fn comparison_from_str(
    name: &str,
    option_string: &str,
) -> Result<Box<dyn InterleavedComparison>, ComparisonError> {
    build_comparison(name.parse()?, &parse_option_string(option_string)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credit::CreditFunction;

    fn opts(pairs: &[(&str, &str)]) -> MethodOptions {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn option_strings_become_maps() {
        let o = parse_option_string("--constraints 2 --starting-list random").unwrap();
        assert_eq!(o, opts(&[("constraints", "2"), ("starting_list", "random")]));
        let o = parse_option_string("--aggregate=binary").unwrap();
        assert_eq!(o, opts(&[("aggregate", "binary")]));
        assert!(parse_option_string("").unwrap().is_empty());
    }

    #[test]
    fn dangling_flags_are_rejected() {
        assert!(parse_option_string("--constraints").is_err());
        assert!(parse_option_string("--constraints --starting_list first").is_err());
        assert!(parse_option_string("constraints 2").is_err());
    }

    #[test]
    fn every_method_builds_with_defaults() {
        for kind in MethodKind::ALL {
            let method = build_comparison(kind, &MethodOptions::new()).unwrap();
            assert_eq!(method.name(), kind.as_str());
            assert_eq!(kind.as_str().parse::<MethodKind>(), Ok(kind));
        }
        for kind in HistoricalKind::ALL {
            let method = build_historical(kind, &MethodOptions::new()).unwrap();
            assert_eq!(method.name(), kind.as_str());
        }
    }

    #[test]
    fn unknown_keys_and_bad_values_are_rejected() {
        assert!(matches!(
            build_comparison(MethodKind::TeamDraft, &opts(&[("constraints", "2")])),
            Err(ComparisonError::UnknownOption { .. })
        ));
        assert!(matches!(
            build_comparison(MethodKind::DocumentConstraints, &opts(&[("constraints", "x")])),
            Err(ComparisonError::InvalidOption { .. })
        ));
        assert!(matches!(
            build_comparison(
                MethodKind::BalancedInterleave,
                &opts(&[("starting_list", "middle")])
            ),
            Err(ComparisonError::UnknownStartingList(_))
        ));
        assert!(matches!(
            build_comparison(
                MethodKind::StochasticBalancedInterleave,
                &opts(&[("exploration_rate", "1.5")])
            ),
            Err(ComparisonError::InvalidOption { .. })
        ));
        assert_eq!(
            "interleave_everything".parse::<MethodKind>(),
            Err(ComparisonError::UnknownMethod(
                "interleave_everything".to_string()
            ))
        );
    }

    #[test]
    fn typed_configs_pick_up_values() {
        let cfg = OptimizedConfig::from_options(&opts(&[
            ("credit", "linear"),
            ("allowed_leavings", "sample"),
            ("sample_size", "25"),
            ("prefix_bound", "3"),
        ]))
        .unwrap();
        assert_eq!(cfg.credit, CreditFunction::Linear);
        assert_eq!(cfg.leavings.allowed, AllowedLeavings::Sample);
        assert_eq!(cfg.leavings.sample_size, 25);
        assert_eq!(cfg.leavings.prefix_bound, Some(3));

        let cfg = HistoryConfig::from_options(&opts(&[
            ("history_length", "4"),
            ("biased", "true"),
            ("aggregate", "log-ratio"),
        ]))
        .unwrap();
        assert_eq!(cfg.history_length, 4);
        assert!(cfg.biased);
        assert_eq!(cfg.aggregation, Aggregation::LogRatio);
    }

    #[test]
    fn historical_names_accept_prefix() {
        assert_eq!(
            "hist_team_draft".parse::<HistoricalKind>(),
            Ok(HistoricalKind::TeamDraft)
        );
    }
}
