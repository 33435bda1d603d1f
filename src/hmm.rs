//! Discrete hidden Markov models.
//!
//! This module provides:
//! - [`MarkovModelBuilder`] for staged, validated model construction
//! - [`MarkovModel`], the immutable finalized model
//! - [`Viterbi`] for log-space decoding of the most probable state path
//! - [`ScaledDp`] for underflow-safe forward/backward recursions
//! - training primitives that turn counts back into a new model
//!
//! # Examples
//!
//! ```rust
//! use hidden_markov::hmm::MarkovModelBuilder;
//!
//! let mut builder = MarkovModelBuilder::new(["1", "2"], ['A', 'B']).unwrap();
//! builder.set_initial_probabilities([("1", 1.0)]).unwrap();
//! builder.allow_transition(&"1", &"1", 0.5).unwrap();
//! builder.allow_transition(&"1", &"2", 0.5).unwrap();
//! builder.set_emission_score(&"1", &'A', 0.95).unwrap();
//! builder.set_emission_score(&"1", &'B', 0.05).unwrap();
//! builder.set_emission_score(&"2", &'A', 0.05).unwrap();
//! builder.set_emission_score(&"2", &'B', 0.95).unwrap();
//!
//! let model = builder.build().unwrap();
//! let path = model.viterbi(&['A', 'B']).unwrap();
//! assert_eq!(path.concat(), "12");
//! ```

pub mod alphabet;
pub mod builder;
pub mod model;
pub mod scaled;
pub mod trainer;
pub mod viterbi;


/// Slack allowed when checking that a group of probabilities sums to 1.
pub const PROBABILITY_TOLERANCE: f64 = 1e-9;

pub use alphabet::{Alphabet, Symbol};
pub use builder::MarkovModelBuilder;
pub use model::MarkovModel;
pub use scaled::{ForwardTable, ScaledDp};
pub use trainer::{
    baum_welch_step, count_known_states, estimate_params, known_state_step, log_likelihood,
    ml_estimator, EstimationConfig, ExpectedCounts, TrainingSequence, TrainingStep,
};
pub use viterbi::{Viterbi, ViterbiPath};
