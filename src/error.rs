//! Error type shared by every comparison method.
//!
//! Only configuration mistakes and violated preconditions are errors. Conditions that merely
//! carry no evidence (no clicks, a list with zero probability under a ranker pair, a logged
//! list that no assignment can explain) resolve to a tie outcome instead.

/// Failure modes of constructing or running a comparison.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ComparisonError {
    /// The method name is not part of the registry.
    #[error("unknown comparison method `{0}`")]
    UnknownMethod(String),

    /// An option key that the selected method does not recognize.
    #[error("unknown option `{option}` for {method}")]
    UnknownOption {
        /// The offending key.
        option: String,
        /// Method the options were meant for.
        method: &'static str,
    },

    /// An option value that could not be parsed or is out of range.
    #[error("invalid value `{value}` for option `{option}`: {reason}")]
    InvalidOption {
        /// Option key.
        option: String,
        /// Raw value as supplied.
        value: String,
        /// What was expected instead.
        reason: String,
    },

    /// The starting-list policy is not one of the supported spellings.
    #[error("unknown starting list `{0}`; expected `random`, `fixed`, `first` or `second`")]
    UnknownStartingList(String),

    /// A method was handed the wrong number of rankers.
    #[error("{method} needs {expected} rankers, got {found}")]
    RankerCount {
        /// Method that rejected the call.
        method: &'static str,
        /// Human-readable requirement, e.g. `"exactly 2"`.
        expected: &'static str,
        /// Number of rankers supplied.
        found: usize,
    },

    /// The click vector is not aligned with the shown list.
    #[error("click vector has {clicks} entries but the list has {list}")]
    ClickLengthMismatch {
        /// Length of the shown list.
        list: usize,
        /// Length of the click vector.
        clicks: usize,
    },

    /// `infer_outcome` received a context produced by a different method family.
    #[error("{method} cannot infer an outcome from a {found} context")]
    ContextMismatch {
        /// Method asked to infer the outcome.
        method: &'static str,
        /// Family of the context that was supplied.
        found: &'static str,
    },

    /// The optimized family only enumerates short lists.
    #[error("list length {length} exceeds the enumeration cap of {cap}")]
    LengthExceedsCap {
        /// Effective list length requested.
        length: usize,
        /// Hard maximum.
        cap: usize,
    },

    /// The input rankings contain more distinct documents than the enumerator can track.
    #[error("{count} distinct documents exceed the enumeration limit of {cap}")]
    TooManyDocuments {
        /// Distinct documents across the input rankings.
        count: usize,
        /// Hard maximum.
        cap: usize,
    },

    /// The feasible leaving set grew beyond the enumeration limit.
    #[error("feasible leaving set exceeds {cap} lists")]
    TooManyLeavings {
        /// Hard maximum.
        cap: usize,
    },

    /// The linear program could not be solved even after relaxation.
    #[error("linear program failed: {0}")]
    Solver(String),
}

impl ComparisonError {
    pub(crate) fn invalid_option(
        option: &str,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidOption {
            option: option.to_string(),
            value: value.into(),
            reason: reason.into(),
        }
    }
}
