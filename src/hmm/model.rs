//! The immutable hidden Markov model produced by
//! [`MarkovModelBuilder::build`](super::MarkovModelBuilder::build).

use ndarray::{Array1, Array2, ArrayView1, ArrayView2};

use super::alphabet::{Alphabet, Symbol};
use super::viterbi::{Viterbi, ViterbiPath};
use crate::error::Result;

/// A finalized discrete hidden Markov model.
///
/// Every distribution is well formed: the initial distribution sums to 1,
/// each state with at least one allowed outgoing transition has outgoing
/// probabilities summing to 1, and each state's emission probabilities sum
/// to 1 over the full emission alphabet.
///
/// The model never changes after construction and can be shared freely
/// between threads running independent decodes or training passes.
#[derive(Debug, Clone)]
pub struct MarkovModel<S, E> {
    states: Alphabet<S>,
    emissions: Alphabet<E>,
    initial_prob: Array1<f64>,
    transition_prob: Array2<f64>,
    allowed: Array2<bool>,
    emission_prob: Array2<f64>,
    transition_pseudo: Array2<f64>,
    emission_pseudo: Array2<f64>,
    successors: Vec<Vec<usize>>,
    predecessors: Vec<Vec<usize>>,
}

impl<S: Symbol, E: Symbol> MarkovModel<S, E> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_parts(
        states: Alphabet<S>,
        emissions: Alphabet<E>,
        initial_prob: Array1<f64>,
        transition_prob: Array2<f64>,
        allowed: Array2<bool>,
        emission_prob: Array2<f64>,
        transition_pseudo: Array2<f64>,
        emission_pseudo: Array2<f64>,
    ) -> Self {
        let n = states.len();
        let mut successors = vec![Vec::new(); n];
        let mut predecessors = vec![Vec::new(); n];
        for ((from, to), &is_allowed) in allowed.indexed_iter() {
            if is_allowed {
                successors[from].push(to);
                predecessors[to].push(from);
            }
        }

        Self {
            states,
            emissions,
            initial_prob,
            transition_prob,
            allowed,
            emission_prob,
            transition_pseudo,
            emission_pseudo,
            successors,
            predecessors,
        }
    }

    pub fn states(&self) -> &Alphabet<S> {
        &self.states
    }

    pub fn emissions(&self) -> &Alphabet<E> {
        &self.emissions
    }

    /// States reachable from `state` through one allowed transition, in
    /// alphabet order. Unknown states have no transitions.
    pub fn transitions_from(&self, state: &S) -> Vec<S> {
        match self.states.code_of(state) {
            Some(code) => self.decode_codes(&self.successors[code]),
            None => Vec::new(),
        }
    }

    /// States with an allowed transition into `state`, in alphabet order.
    /// Unknown states have no transitions.
    pub fn transitions_to(&self, state: &S) -> Vec<S> {
        match self.states.code_of(state) {
            Some(code) => self.decode_codes(&self.predecessors[code]),
            None => Vec::new(),
        }
    }

    fn decode_codes(&self, codes: &[usize]) -> Vec<S> {
        codes
            .iter()
            .map(|&code| self.states.symbols()[code].clone())
            .collect()
    }

    /// Probability of starting in `state`; 0 for unknown states.
    pub fn initial_prob(&self, state: &S) -> f64 {
        self.states
            .code_of(state)
            .map_or(0.0, |i| self.initial_prob[i])
    }

    /// Probability of moving from `from` to `to`; 0 for forbidden transitions
    /// and unknown states.
    pub fn transition_prob(&self, from: &S, to: &S) -> f64 {
        match (self.states.code_of(from), self.states.code_of(to)) {
            (Some(i), Some(j)) => self.transition_prob[[i, j]],
            _ => 0.0,
        }
    }

    /// Probability of `state` emitting `symbol`; 0 for unknown references.
    pub fn emission_prob(&self, state: &S, symbol: &E) -> f64 {
        match (self.states.code_of(state), self.emissions.code_of(symbol)) {
            (Some(i), Some(k)) => self.emission_prob[[i, k]],
            _ => 0.0,
        }
    }

    /// Whether `from -> to` is an allowed transition.
    pub fn is_allowed(&self, from: &S, to: &S) -> bool {
        match (self.states.code_of(from), self.states.code_of(to)) {
            (Some(i), Some(j)) => self.allowed[[i, j]],
            _ => false,
        }
    }

    /// Pseudocount of `from -> to`; 0 for forbidden transitions.
    pub fn transition_pseudocount(&self, from: &S, to: &S) -> f64 {
        match (self.states.code_of(from), self.states.code_of(to)) {
            (Some(i), Some(j)) => self.transition_pseudo[[i, j]],
            _ => 0.0,
        }
    }

    pub fn emission_pseudocount(&self, state: &S, symbol: &E) -> f64 {
        match (self.states.code_of(state), self.emissions.code_of(symbol)) {
            (Some(i), Some(k)) => self.emission_pseudo[[i, k]],
            _ => 0.0,
        }
    }

    /// Initial distribution indexed by state code.
    pub fn initial_probabilities(&self) -> ArrayView1<'_, f64> {
        self.initial_prob.view()
    }

    /// Transition matrix indexed by `[from, to]` state codes.
    pub fn transition_matrix(&self) -> ArrayView2<'_, f64> {
        self.transition_prob.view()
    }

    /// Emission matrix indexed by `[state, symbol]` codes.
    pub fn emission_matrix(&self) -> ArrayView2<'_, f64> {
        self.emission_prob.view()
    }

    pub fn allowed_matrix(&self) -> ArrayView2<'_, bool> {
        self.allowed.view()
    }

    pub fn transition_pseudo_matrix(&self) -> ArrayView2<'_, f64> {
        self.transition_pseudo.view()
    }

    pub fn emission_pseudo_matrix(&self) -> ArrayView2<'_, f64> {
        self.emission_pseudo.view()
    }

    pub(crate) fn successor_codes(&self, state: usize) -> &[usize] {
        &self.successors[state]
    }

    pub(crate) fn predecessor_codes(&self, state: usize) -> &[usize] {
        &self.predecessors[state]
    }

    /// Most probable state path for `emissions` over the whole state alphabet.
    ///
    /// Builds a fresh [`Viterbi`] decoder; keep a decoder around instead when
    /// decoding many sequences against the same model.
    pub fn viterbi(&self, emissions: &[E]) -> Result<ViterbiPath<S>> {
        Viterbi::new(self).decode(emissions)
    }
}
