//! Training primitives: labeled/unlabeled training sequences, count tables,
//! the maximum-likelihood estimator and single re-estimation steps.
//!
//! Iteration limits and convergence checks are left to the caller: each
//! step takes a model and returns a new one plus the log-likelihood of the
//! sequence under the model it was given.

use std::collections::HashMap;
use std::hash::Hash;

use log::debug;
use ndarray::{Array1, Array2};

use super::alphabet::Symbol;
use super::builder::MarkovModelBuilder;
use super::model::MarkovModel;
use super::scaled::ScaledDp;
use crate::error::{Error, Result};

/// An emission sequence with an optional state path of the same length.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingSequence<S, E> {
    emissions: Vec<E>,
    states: Vec<S>,
}

impl<S, E> TrainingSequence<S, E> {
    /// Pairs `emissions` with `states`. An empty state path marks the
    /// sequence as unlabeled.
    ///
    /// # Errors
    /// * `SequenceLengthMismatch` if `states` is non-empty and its length
    ///   differs from `emissions`
    pub fn new(emissions: Vec<E>, states: Vec<S>) -> Result<Self> {
        if !states.is_empty() && states.len() != emissions.len() {
            return Err(Error::SequenceLengthMismatch {
                emissions: emissions.len(),
                states: states.len(),
            });
        }
        Ok(Self { emissions, states })
    }

    pub fn unlabeled(emissions: Vec<E>) -> Self {
        Self {
            emissions,
            states: Vec::new(),
        }
    }

    pub fn emissions(&self) -> &[E] {
        &self.emissions
    }

    pub fn states(&self) -> &[S] {
        &self.states
    }

    pub fn is_labeled(&self) -> bool {
        !self.states.is_empty()
    }

    pub fn len(&self) -> usize {
        self.emissions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.emissions.is_empty()
    }
}

/// Count tables indexed by state and symbol codes.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpectedCounts {
    /// Times each state starts a sequence.
    pub initial: Array1<f64>,
    /// `[from, to]` transition counts.
    pub transitions: Array2<f64>,
    /// `[state, symbol]` emission counts.
    pub emissions: Array2<f64>,
    /// Log-likelihood of the counted sequence under the counting model.
    pub log_likelihood: f64,
}

impl ExpectedCounts {
    pub fn zeros(num_states: usize, num_symbols: usize) -> Self {
        Self {
            initial: Array1::zeros(num_states),
            transitions: Array2::zeros((num_states, num_states)),
            emissions: Array2::zeros((num_states, num_symbols)),
            log_likelihood: 0.0,
        }
    }

    /// Adds `other` into `self`, e.g. to pool counts from several sequences.
    ///
    /// # Errors
    /// * `ShapeMismatch` if the tables have different shapes; `self` is left
    ///   unchanged
    pub fn accumulate(&mut self, other: &ExpectedCounts) -> Result<()> {
        const OP: &str = "accumulate";
        if self.initial.len() != other.initial.len() {
            return Err(Error::ShapeMismatch {
                expected: self.initial.len(),
                found: other.initial.len(),
                operation: OP,
            });
        }
        if self.emissions.ncols() != other.emissions.ncols() {
            return Err(Error::ShapeMismatch {
                expected: self.emissions.ncols(),
                found: other.emissions.ncols(),
                operation: OP,
            });
        }
        self.initial += &other.initial;
        self.transitions += &other.transitions;
        self.emissions += &other.emissions;
        self.log_likelihood += other.log_likelihood;
        Ok(())
    }
}

/// Options for turning counts into probabilities.
#[derive(Debug, Clone)]
pub struct EstimationConfig {
    /// Add the model's pseudocounts to the counts before estimating.
    pub use_pseudocounts: bool,
    /// Re-estimate the initial distribution from the initial counts instead
    /// of keeping the model's.
    pub reestimate_initial: bool,
}

impl Default for EstimationConfig {
    fn default() -> Self {
        Self {
            use_pseudocounts: true,
            reestimate_initial: false,
        }
    }
}

/// A re-estimated model and the log-likelihood of the training sequence
/// under the model it was estimated from.
#[derive(Debug, Clone)]
pub struct TrainingStep<S, E> {
    pub model: MarkovModel<S, E>,
    pub log_likelihood: f64,
}

/// Maximum-likelihood conditional estimates from `(from, to)` counts.
///
/// Every count is divided by the total of all counts sharing its `from`
/// key. Entries of a group whose total is 0 are estimated as 0. The two
/// keys may differ in type, so the same estimator turns `(state, symbol)`
/// emission counts into emission probabilities.
///
/// # Examples
/// ```
/// use std::collections::HashMap;
/// use hidden_markov::hmm::ml_estimator;
///
/// let counts = HashMap::from([(("A", "A"), 1.0), (("A", "B"), 3.0)]);
/// let estimates = ml_estimator(&counts);
/// assert_eq!(estimates[&("A", "B")], 0.75);
/// ```
pub fn ml_estimator<F, T>(counts: &HashMap<(F, T), f64>) -> HashMap<(F, T), f64>
where
    F: Eq + Hash + Clone,
    T: Eq + Hash + Clone,
{
    let mut totals: HashMap<&F, f64> = HashMap::new();
    for ((from, _), &count) in counts {
        *totals.entry(from).or_insert(0.0) += count;
    }

    counts
        .iter()
        .map(|((from, to), &count)| {
            let total = totals[from];
            let estimate = if total > 0.0 { count / total } else { 0.0 };
            ((from.clone(), to.clone()), estimate)
        })
        .collect()
}

/// Joint log-likelihood of independent observations with the given
/// probabilities. A probability of 0 yields negative infinity.
pub fn log_likelihood(probabilities: &[f64]) -> f64 {
    probabilities.iter().map(|p| p.ln()).sum()
}

/// Row-wise maximum-likelihood estimate over a dense count table; rows
/// without counts stay 0.
fn ml_estimate_rows(mut counts: Array2<f64>) -> Array2<f64> {
    for mut row in counts.rows_mut() {
        let total = row.sum();
        if total > 0.0 {
            row /= total;
        }
    }
    counts
}

/// Counts transitions and emissions along the known state path of
/// `sequence`.
///
/// The returned log-likelihood is the joint log-probability of the path and
/// its emissions under `model`.
///
/// # Errors
/// * `MissingStatePath` if the sequence is unlabeled
/// * `InvalidState` / `InvalidSymbol` for references outside the model
/// * `TransitionNotAllowed` if the path uses a forbidden transition
pub fn count_known_states<S: Symbol, E: Symbol>(
    model: &MarkovModel<S, E>,
    sequence: &TrainingSequence<S, E>,
) -> Result<ExpectedCounts> {
    const OP: &str = "count_known_states";
    if !sequence.is_labeled() {
        return Err(Error::MissingStatePath);
    }
    let states = model
        .states()
        .encode(sequence.states(), |s| Error::invalid_state(s, OP))?;
    let observations = model
        .emissions()
        .encode(sequence.emissions(), |e| Error::invalid_symbol(e, OP))?;

    let allowed = model.allowed_matrix();
    let initial = model.initial_probabilities();
    let transition = model.transition_matrix();
    let emission = model.emission_matrix();

    let mut counts = ExpectedCounts::zeros(model.states().len(), model.emissions().len());
    let mut probabilities = Vec::with_capacity(2 * states.len());

    counts.initial[states[0]] += 1.0;
    probabilities.push(initial[states[0]]);
    for (position, (&state, &obs)) in states.iter().zip(&observations).enumerate() {
        if position > 0 {
            let previous = states[position - 1];
            if !allowed[[previous, state]] {
                return Err(Error::TransitionNotAllowed {
                    from: format!("{:?}", sequence.states()[position - 1]),
                    to: format!("{:?}", sequence.states()[position]),
                });
            }
            counts.transitions[[previous, state]] += 1.0;
            probabilities.push(transition[[previous, state]]);
        }
        counts.emissions[[state, obs]] += 1.0;
        probabilities.push(emission[[state, obs]]);
    }

    counts.log_likelihood = log_likelihood(&probabilities);
    Ok(counts)
}

/// Re-estimates `model` from `counts`.
///
/// Transition probabilities are estimated per source state over its allowed
/// transitions, emission probabilities per state over the whole emission
/// alphabet. The result goes through a fresh [`MarkovModelBuilder`], so
/// groups left without any counts become uniform.
///
/// # Errors
/// * `InvalidProbability` if the estimated model is not well formed
pub fn estimate_params<S: Symbol, E: Symbol>(
    model: &MarkovModel<S, E>,
    counts: &ExpectedCounts,
    config: &EstimationConfig,
) -> Result<MarkovModel<S, E>> {
    let mut transitions = counts.transitions.clone();
    let mut emissions = counts.emissions.clone();
    if config.use_pseudocounts {
        transitions += &model.transition_pseudo_matrix();
        emissions += &model.emission_pseudo_matrix();
    }
    transitions.zip_mut_with(&model.allowed_matrix(), |count, &allowed| {
        if !allowed {
            *count = 0.0;
        }
    });

    let initial_total = counts.initial.sum();
    let initial = (config.reestimate_initial && initial_total > 0.0)
        .then(|| &counts.initial / initial_total);

    let mut builder = MarkovModelBuilder::from_model(model);
    builder.replace_probabilities(
        initial,
        ml_estimate_rows(transitions),
        ml_estimate_rows(emissions),
    );
    builder.build()
}

/// One Baum-Welch re-estimation from the expected counts of an unlabeled
/// (or labeled, the path is ignored) sequence.
///
/// # Errors
/// * `InvalidSymbol` for emissions outside the model
/// * `Numerical` if the sequence is impossible under `model`
pub fn baum_welch_step<S: Symbol, E: Symbol>(
    model: &MarkovModel<S, E>,
    sequence: &TrainingSequence<S, E>,
    config: &EstimationConfig,
) -> Result<TrainingStep<S, E>> {
    let counts = ScaledDp::new(model, sequence)?.expected_counts()?;
    debug!(
        "Baum-Welch step over {} emissions, log likelihood {}",
        sequence.len(),
        counts.log_likelihood
    );
    Ok(TrainingStep {
        model: estimate_params(model, &counts, config)?,
        log_likelihood: counts.log_likelihood,
    })
}

/// One maximum-likelihood re-estimation from the known state path of a
/// labeled sequence.
///
/// # Errors
/// As [`count_known_states`] and [`estimate_params`].
pub fn known_state_step<S: Symbol, E: Symbol>(
    model: &MarkovModel<S, E>,
    sequence: &TrainingSequence<S, E>,
    config: &EstimationConfig,
) -> Result<TrainingStep<S, E>> {
    let counts = count_known_states(model, sequence)?;
    debug!(
        "known-state step over {} emissions, log likelihood {}",
        sequence.len(),
        counts.log_likelihood
    );
    Ok(TrainingStep {
        model: estimate_params(model, &counts, config)?,
        log_likelihood: counts.log_likelihood,
    })
}
