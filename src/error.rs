//! Error type shared by every part of the crate.

use std::fmt::Debug;
use thiserror::Error;

/// Errors raised while building, decoding or training a hidden Markov model.
///
/// Offending states and symbols are carried as their `Debug` rendering so the
/// error type does not need to be generic over the alphabets.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// A state that is not part of the model's state alphabet.
    #[error("{operation}: unknown state {state}")]
    InvalidState {
        state: String,
        operation: &'static str,
    },

    /// An emission symbol that is not part of the model's emission alphabet.
    #[error("{operation}: unknown emission symbol {symbol}")]
    InvalidSymbol {
        symbol: String,
        operation: &'static str,
    },

    /// A probability outside `[0, 1]`, or a group of probabilities that does
    /// not add up the way the operation requires.
    #[error("{operation}: invalid probability {value}: {reason}")]
    InvalidProbability {
        value: f64,
        operation: &'static str,
        reason: String,
    },

    /// A negative or non-finite pseudocount.
    #[error("{operation}: invalid pseudocount {value}")]
    InvalidPseudocount { value: f64, operation: &'static str },

    /// An empty alphabet or one containing duplicate symbols.
    #[error("invalid alphabet: {0}")]
    InvalidAlphabet(String),

    #[error("transition {from} -> {to} is already allowed")]
    TransitionAlreadyAllowed { from: String, to: String },

    #[error("transition {from} -> {to} is not allowed")]
    TransitionNotAllowed { from: String, to: String },

    /// A labeled training sequence whose state path length differs from its
    /// emission length.
    #[error("state path has {states} entries but there are {emissions} emissions")]
    SequenceLengthMismatch { emissions: usize, states: usize },

    /// An operation that needs a labeled state path was given an unlabeled
    /// training sequence.
    #[error("training sequence has no state path")]
    MissingStatePath,

    /// A sequence position at or past the end of the sequence.
    #[error("{operation}: position {position} is out of range for length {length}")]
    PositionOutOfRange {
        position: usize,
        length: usize,
        operation: &'static str,
    },

    /// A table or row whose size does not match the model or sequence it is
    /// used with.
    #[error("{operation}: expected size {expected}, found {found}")]
    ShapeMismatch {
        expected: usize,
        found: usize,
        operation: &'static str,
    },

    /// A scaling or normalization step produced a non-positive sum.
    #[error("numerical failure at position {position}: {reason}")]
    Numerical { position: usize, reason: String },
}

impl Error {
    pub(crate) fn invalid_state<S: Debug + ?Sized>(state: &S, operation: &'static str) -> Self {
        Error::InvalidState {
            state: format!("{:?}", state),
            operation,
        }
    }

    pub(crate) fn invalid_symbol<E: Debug + ?Sized>(symbol: &E, operation: &'static str) -> Self {
        Error::InvalidSymbol {
            symbol: format!("{:?}", symbol),
            operation,
        }
    }

    pub(crate) fn invalid_probability(
        value: f64,
        operation: &'static str,
        reason: impl Into<String>,
    ) -> Self {
        Error::InvalidProbability {
            value,
            operation,
            reason: reason.into(),
        }
    }

    pub(crate) fn numerical(position: usize, reason: impl Into<String>) -> Self {
        Error::Numerical {
            position,
            reason: reason.into(),
        }
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_offender() {
        let err = Error::invalid_state("Fake", "allow_transition");
        assert_eq!(err.to_string(), "allow_transition: unknown state \"Fake\"");

        let err = Error::invalid_probability(1.5, "set_emission_score", "outside [0, 1]");
        assert!(err.to_string().contains("1.5"));
        assert!(err.to_string().contains("set_emission_score"));

        let err = Error::SequenceLengthMismatch {
            emissions: 2,
            states: 1,
        };
        assert_eq!(
            err.to_string(),
            "state path has 1 entries but there are 2 emissions"
        );
    }
}
