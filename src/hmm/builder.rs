//! Staged construction of a [`MarkovModel`].
//!
//! A [`MarkovModelBuilder`] owns mutable probability and pseudocount tables
//! over the `state × state` and `state × emission` domains. Setters validate
//! every reference and probability as it comes in; [`MarkovModelBuilder::build`]
//! checks that every distribution is well formed and hands out an immutable
//! model.

use approx::abs_diff_eq;
use log::{debug, warn};
use ndarray::{Array1, Array2};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use super::alphabet::{Alphabet, Symbol};
use super::model::MarkovModel;
use super::PROBABILITY_TOLERANCE;
use crate::error::{Error, Result};

const DEFAULT_PSEUDOCOUNT: f64 = 1.0;

/// Mutable accumulator for transition, emission and initial probabilities.
///
/// States and emission symbols are fixed at construction. Transitions start
/// out forbidden and must be allowed explicitly; emissions are defined over
/// the full `state × emission` cross product with probability 0 and
/// pseudocount 1.
///
/// # Examples
/// ```
/// use hidden_markov::hmm::MarkovModelBuilder;
///
/// let mut builder = MarkovModelBuilder::new(["1", "2"], ['A', 'B']).unwrap();
/// builder.allow_all_transitions();
/// builder.set_equal_probabilities();
/// let model = builder.build().unwrap();
///
/// assert_eq!(model.transition_prob(&"1", &"2"), 0.5);
/// ```
#[derive(Debug, Clone)]
pub struct MarkovModelBuilder<S, E> {
    states: Alphabet<S>,
    emissions: Alphabet<E>,
    allowed: Array2<bool>,
    transition_prob: Array2<f64>,
    transition_pseudo: Array2<f64>,
    emission_prob: Array2<f64>,
    emission_pseudo: Array2<f64>,
    initial_prob: Option<Array1<f64>>,
}

impl<S: Symbol, E: Symbol> MarkovModelBuilder<S, E> {
    /// Creates a builder over the given state and emission alphabets.
    ///
    /// # Errors
    /// * `InvalidAlphabet` if either alphabet is empty or has duplicates
    pub fn new<IS, IE>(states: IS, emissions: IE) -> Result<Self>
    where
        IS: IntoIterator<Item = S>,
        IE: IntoIterator<Item = E>,
    {
        Ok(Self::with_alphabets(
            Alphabet::new(states)?,
            Alphabet::new(emissions)?,
        ))
    }

    /// Creates a builder over alphabets that were already validated.
    pub fn with_alphabets(states: Alphabet<S>, emissions: Alphabet<E>) -> Self {
        let n = states.len();
        let m = emissions.len();
        Self {
            states,
            emissions,
            allowed: Array2::from_elem((n, n), false),
            transition_prob: Array2::zeros((n, n)),
            transition_pseudo: Array2::zeros((n, n)),
            emission_prob: Array2::zeros((n, m)),
            emission_pseudo: Array2::from_elem((n, m), DEFAULT_PSEUDOCOUNT),
            initial_prob: None,
        }
    }

    /// Seeds a builder with every table of an existing model, so the next
    /// training iteration starts from its parameters and pseudocounts.
    pub fn from_model(model: &MarkovModel<S, E>) -> Self {
        Self {
            states: model.states().clone(),
            emissions: model.emissions().clone(),
            allowed: model.allowed_matrix().to_owned(),
            transition_prob: model.transition_matrix().to_owned(),
            transition_pseudo: model.transition_pseudo_matrix().to_owned(),
            emission_prob: model.emission_matrix().to_owned(),
            emission_pseudo: model.emission_pseudo_matrix().to_owned(),
            initial_prob: Some(model.initial_probabilities().to_owned()),
        }
    }

    pub fn states(&self) -> &Alphabet<S> {
        &self.states
    }

    pub fn emissions(&self) -> &Alphabet<E> {
        &self.emissions
    }

    fn state_code(&self, state: &S, operation: &'static str) -> Result<usize> {
        self.states
            .code_of(state)
            .ok_or_else(|| Error::invalid_state(state, operation))
    }

    fn symbol_code(&self, symbol: &E, operation: &'static str) -> Result<usize> {
        self.emissions
            .code_of(symbol)
            .ok_or_else(|| Error::invalid_symbol(symbol, operation))
    }

    fn allowed_pair(&self, from: &S, to: &S, operation: &'static str) -> Result<(usize, usize)> {
        let i = self.state_code(from, operation)?;
        let j = self.state_code(to, operation)?;
        if !self.allowed[[i, j]] {
            return Err(Error::TransitionNotAllowed {
                from: format!("{:?}", from),
                to: format!("{:?}", to),
            });
        }
        Ok((i, j))
    }

    /// Allows the transition `from -> to` with the given probability and the
    /// default pseudocount of 1.
    ///
    /// # Errors
    /// * `InvalidState` if either state is unknown
    /// * `InvalidProbability` if `probability` is outside `[0, 1]`
    /// * `TransitionAlreadyAllowed` if the transition was allowed before
    pub fn allow_transition(&mut self, from: &S, to: &S, probability: f64) -> Result<()> {
        self.allow_transition_with_pseudocount(from, to, probability, DEFAULT_PSEUDOCOUNT)
    }

    /// Allows the transition `from -> to` with an explicit pseudocount.
    ///
    /// # Errors
    /// As [`allow_transition`](Self::allow_transition), plus
    /// `InvalidPseudocount` for a negative or non-finite pseudocount.
    pub fn allow_transition_with_pseudocount(
        &mut self,
        from: &S,
        to: &S,
        probability: f64,
        pseudocount: f64,
    ) -> Result<()> {
        const OP: &str = "allow_transition";
        let i = self.state_code(from, OP)?;
        let j = self.state_code(to, OP)?;
        check_probability(probability, OP)?;
        check_pseudocount(pseudocount, OP)?;

        if self.allowed[[i, j]] {
            return Err(Error::TransitionAlreadyAllowed {
                from: format!("{:?}", from),
                to: format!("{:?}", to),
            });
        }

        self.allowed[[i, j]] = true;
        self.transition_prob[[i, j]] = probability;
        self.transition_pseudo[[i, j]] = pseudocount;
        Ok(())
    }

    /// Allows every transition between any two states, including self
    /// transitions, with probability 0 and pseudocount 1.
    pub fn allow_all_transitions(&mut self) {
        self.allowed.fill(true);
        self.transition_prob.fill(0.0);
        self.transition_pseudo.fill(DEFAULT_PSEUDOCOUNT);
    }

    /// Forbids a previously allowed transition again.
    ///
    /// # Errors
    /// * `InvalidState` if either state is unknown
    /// * `TransitionNotAllowed` if the transition was never allowed
    pub fn destroy_transition(&mut self, from: &S, to: &S) -> Result<()> {
        let (i, j) = self.allowed_pair(from, to, "destroy_transition")?;
        self.allowed[[i, j]] = false;
        self.transition_prob[[i, j]] = 0.0;
        self.transition_pseudo[[i, j]] = 0.0;
        Ok(())
    }

    /// Overwrites the probability of an allowed transition.
    pub fn set_transition_score(&mut self, from: &S, to: &S, probability: f64) -> Result<()> {
        const OP: &str = "set_transition_score";
        let (i, j) = self.allowed_pair(from, to, OP)?;
        check_probability(probability, OP)?;
        self.transition_prob[[i, j]] = probability;
        Ok(())
    }

    /// Overwrites the pseudocount of an allowed transition.
    pub fn set_transition_pseudocount(&mut self, from: &S, to: &S, count: f64) -> Result<()> {
        const OP: &str = "set_transition_pseudocount";
        let (i, j) = self.allowed_pair(from, to, OP)?;
        check_pseudocount(count, OP)?;
        self.transition_pseudo[[i, j]] = count;
        Ok(())
    }

    /// Overwrites the probability of `state` emitting `symbol`.
    ///
    /// # Errors
    /// * `InvalidState` / `InvalidSymbol` for references outside the alphabets
    /// * `InvalidProbability` if `probability` is outside `[0, 1]`
    pub fn set_emission_score(&mut self, state: &S, symbol: &E, probability: f64) -> Result<()> {
        const OP: &str = "set_emission_score";
        let i = self.state_code(state, OP)?;
        let k = self.symbol_code(symbol, OP)?;
        check_probability(probability, OP)?;
        self.emission_prob[[i, k]] = probability;
        Ok(())
    }

    pub fn set_emission_pseudocount(&mut self, state: &S, symbol: &E, count: f64) -> Result<()> {
        const OP: &str = "set_emission_pseudocount";
        let i = self.state_code(state, OP)?;
        let k = self.symbol_code(symbol, OP)?;
        check_pseudocount(count, OP)?;
        self.emission_pseudo[[i, k]] = count;
        Ok(())
    }

    /// Sets the initial state distribution from a partial assignment.
    ///
    /// States that are not mentioned share the remaining mass
    /// `1 - sum(given)` equally.
    ///
    /// # Errors
    /// * `InvalidState` if a key is not in the state alphabet
    /// * `InvalidProbability` if a value is outside `[0, 1]`, if the given
    ///   values already add up to more than 1, or if every state is given and
    ///   the values do not add up to 1
    pub fn set_initial_probabilities<I>(&mut self, probabilities: I) -> Result<()>
    where
        I: IntoIterator<Item = (S, f64)>,
    {
        const OP: &str = "set_initial_probabilities";
        let mut given: Vec<Option<f64>> = vec![None; self.states.len()];
        for (state, probability) in probabilities {
            let i = self.state_code(&state, OP)?;
            check_probability(probability, OP)?;
            given[i] = Some(probability);
        }

        let total: f64 = given.iter().flatten().sum();
        if total > 1.0 + PROBABILITY_TOLERANCE {
            return Err(Error::invalid_probability(
                total,
                OP,
                "initial probabilities add up to more than 1",
            ));
        }

        let missing = given.iter().filter(|p| p.is_none()).count();
        if missing == 0 && !abs_diff_eq!(total, 1.0, epsilon = PROBABILITY_TOLERANCE) {
            return Err(Error::invalid_probability(
                total,
                OP,
                "initial probabilities for every state must add up to 1",
            ));
        }

        let share = if missing > 0 {
            (1.0 - total).max(0.0) / missing as f64
        } else {
            0.0
        };
        self.initial_prob = Some(given.into_iter().map(|p| p.unwrap_or(share)).collect());
        Ok(())
    }

    /// Makes every distribution uniform: the initial distribution over all
    /// states, each state's allowed outgoing transitions, and each state's
    /// emissions. Pseudocounts are left untouched.
    pub fn set_equal_probabilities(&mut self) {
        let n = self.states.len();
        let m = self.emissions.len();

        self.initial_prob = Some(Array1::from_elem(n, 1.0 / n as f64));
        for from in 0..n {
            let targets = self.outgoing(from);
            let share = 1.0 / targets.len().max(1) as f64;
            for to in targets {
                self.transition_prob[[from, to]] = share;
            }
        }
        self.emission_prob.fill(1.0 / m as f64);
    }

    /// Like [`set_equal_probabilities`](Self::set_equal_probabilities), but
    /// every group is drawn from `rng` and then normalized to sum to 1.
    ///
    /// Used to break symmetry before iterative re-estimation.
    pub fn set_random_probabilities<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        let n = self.states.len();
        let m = self.emissions.len();

        self.initial_prob = Some(Array1::from(random_distribution(rng, n)));
        for from in 0..n {
            let targets = self.outgoing(from);
            let draws = random_distribution(rng, targets.len());
            for (to, probability) in targets.into_iter().zip(draws) {
                self.transition_prob[[from, to]] = probability;
            }
            for (k, probability) in random_distribution(rng, m).into_iter().enumerate() {
                self.emission_prob[[from, k]] = probability;
            }
        }
    }

    /// Randomizes all probabilities with a ChaCha generator seeded from `seed`.
    pub fn set_random_probabilities_seeded(&mut self, seed: u64) {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        self.set_random_probabilities(&mut rng);
    }

    fn outgoing(&self, from: usize) -> Vec<usize> {
        self.allowed
            .row(from)
            .iter()
            .enumerate()
            .filter_map(|(to, &allowed)| allowed.then_some(to))
            .collect()
    }

    /// Probability of an allowed transition, `None` if it is not allowed or
    /// either state is unknown.
    pub fn transition_prob(&self, from: &S, to: &S) -> Option<f64> {
        let i = self.states.code_of(from)?;
        let j = self.states.code_of(to)?;
        self.allowed[[i, j]].then(|| self.transition_prob[[i, j]])
    }

    /// Pseudocount of an allowed transition; same domain as
    /// [`transition_prob`](Self::transition_prob).
    pub fn transition_pseudocount(&self, from: &S, to: &S) -> Option<f64> {
        let i = self.states.code_of(from)?;
        let j = self.states.code_of(to)?;
        self.allowed[[i, j]].then(|| self.transition_pseudo[[i, j]])
    }

    pub fn emission_prob(&self, state: &S, symbol: &E) -> Option<f64> {
        let i = self.states.code_of(state)?;
        let k = self.emissions.code_of(symbol)?;
        Some(self.emission_prob[[i, k]])
    }

    pub fn emission_pseudocount(&self, state: &S, symbol: &E) -> Option<f64> {
        let i = self.states.code_of(state)?;
        let k = self.emissions.code_of(symbol)?;
        Some(self.emission_pseudo[[i, k]])
    }

    /// Initial probability of `state`, `None` until the initial distribution
    /// has been set.
    pub fn initial_prob(&self, state: &S) -> Option<f64> {
        let i = self.states.code_of(state)?;
        self.initial_prob.as_ref().map(|p| p[i])
    }

    /// All allowed transitions in `(from, to)` alphabet order.
    pub fn allowed_transitions(&self) -> Vec<(S, S)> {
        self.allowed
            .indexed_iter()
            .filter(|(_, &allowed)| allowed)
            .map(|((i, j), _)| {
                (
                    self.states.symbols()[i].clone(),
                    self.states.symbols()[j].clone(),
                )
            })
            .collect()
    }

    /// Replaces the probability tables wholesale. Entries for forbidden
    /// transitions are dropped.
    pub(crate) fn replace_probabilities(
        &mut self,
        initial: Option<Array1<f64>>,
        transition: Array2<f64>,
        emission: Array2<f64>,
    ) {
        if initial.is_some() {
            self.initial_prob = initial;
        }
        self.transition_prob = transition;
        self.transition_prob
            .zip_mut_with(&self.allowed, |p, &allowed| {
                if !allowed {
                    *p = 0.0;
                }
            });
        self.emission_prob = emission;
    }

    /// Finalizes the builder into an immutable [`MarkovModel`].
    ///
    /// An initial distribution that was never set becomes uniform. A group
    /// whose probabilities are all zero (a state's allowed transitions, or a
    /// state's emissions) is filled uniformly; any other group must already
    /// sum to 1.
    ///
    /// # Errors
    /// * `InvalidProbability` if a distribution does not sum to 1
    pub fn build(self) -> Result<MarkovModel<S, E>> {
        const OP: &str = "build";
        let n = self.states.len();
        let m = self.emissions.len();

        let initial_prob = match self.initial_prob {
            Some(initial) => initial,
            None => Array1::from_elem(n, 1.0 / n as f64),
        };
        let initial_total = initial_prob.sum();
        if !abs_diff_eq!(initial_total, 1.0, epsilon = PROBABILITY_TOLERANCE) {
            return Err(Error::invalid_probability(
                initial_total,
                OP,
                "initial probabilities must add up to 1",
            ));
        }

        let mut transition_prob = self.transition_prob;
        for from in 0..n {
            let targets: Vec<usize> = (0..n).filter(|&to| self.allowed[[from, to]]).collect();
            if targets.is_empty() {
                continue;
            }
            let total: f64 = targets.iter().map(|&to| transition_prob[[from, to]]).sum();
            if total == 0.0 {
                let share = 1.0 / targets.len() as f64;
                for &to in &targets {
                    transition_prob[[from, to]] = share;
                }
            } else if !abs_diff_eq!(total, 1.0, epsilon = PROBABILITY_TOLERANCE) {
                return Err(Error::invalid_probability(
                    total,
                    OP,
                    format!(
                        "transitions out of {:?} must add up to 1",
                        self.states.symbols()[from]
                    ),
                ));
            }
        }

        let mut emission_prob = self.emission_prob;
        for (state, mut row) in emission_prob.rows_mut().into_iter().enumerate() {
            let total = row.sum();
            if total == 0.0 {
                row.fill(1.0 / m as f64);
            } else if !abs_diff_eq!(total, 1.0, epsilon = PROBABILITY_TOLERANCE) {
                return Err(Error::invalid_probability(
                    total,
                    OP,
                    format!(
                        "emissions of {:?} must add up to 1",
                        self.states.symbols()[state]
                    ),
                ));
            }
        }

        debug!(
            "built Markov model with {} states, {} symbols and {} allowed transitions",
            n,
            m,
            self.allowed.iter().filter(|&&a| a).count()
        );

        Ok(MarkovModel::from_parts(
            self.states,
            self.emissions,
            initial_prob,
            transition_prob,
            self.allowed,
            emission_prob,
            self.transition_pseudo,
            self.emission_pseudo,
        ))
    }
}

fn check_probability(value: f64, operation: &'static str) -> Result<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(Error::invalid_probability(
            value,
            operation,
            "probabilities must lie in [0, 1]",
        ))
    }
}

fn check_pseudocount(value: f64, operation: &'static str) -> Result<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(Error::InvalidPseudocount { value, operation })
    }
}

/// `len` uniform draws normalized to sum to 1.
fn random_distribution<R: Rng + ?Sized>(rng: &mut R, len: usize) -> Vec<f64> {
    let draws: Vec<f64> = (0..len).map(|_| rng.gen::<f64>()).collect();
    let total: f64 = draws.iter().sum();
    if total > 0.0 {
        draws.into_iter().map(|d| d / total).collect()
    } else {
        if len > 0 {
            warn!("random draws summed to zero, using a uniform group of {}", len);
        }
        vec![1.0 / len as f64; len]
    }
}
