//! Log-space Viterbi decoding.
//!
//! The decoder converts the model's probabilities to natural logarithms once
//! and then runs the usual max-product recursion as a max-sum. A probability
//! of 0 becomes negative infinity, so forbidden transitions and impossible
//! emissions are never selected.

use std::fmt::Display;

use log::trace;
use ndarray::{Array1, Array2};
use rayon::prelude::*;

use super::alphabet::Symbol;
use super::model::MarkovModel;
use crate::error::{Error, Result};

/// The most probable state path and its natural-log joint probability.
#[derive(Debug, Clone, PartialEq)]
pub struct ViterbiPath<S> {
    pub states: Vec<S>,
    pub log_probability: f64,
}

impl<S: Display> ViterbiPath<S> {
    /// The path rendered as one string, e.g. `"1122"`.
    pub fn concat(&self) -> String {
        self.states.iter().map(|s| s.to_string()).collect()
    }
}

/// Viterbi decoder bound to one model.
///
/// Holds log-scale copies of the model's tables so repeated decodes do not
/// recompute them. Each call allocates its own dynamic-programming table.
#[derive(Debug)]
pub struct Viterbi<'a, S, E> {
    model: &'a MarkovModel<S, E>,
    log_initial: Array1<f64>,
    log_transition: Array2<f64>,
    log_emission: Array2<f64>,
}

impl<'a, S: Symbol, E: Symbol> Viterbi<'a, S, E> {
    pub fn new(model: &'a MarkovModel<S, E>) -> Self {
        Self {
            model,
            log_initial: model.initial_probabilities().mapv(f64::ln),
            log_transition: model.transition_matrix().mapv(f64::ln),
            log_emission: model.emission_matrix().mapv(f64::ln),
        }
    }

    /// Decodes `emissions` over every state of the model.
    ///
    /// # Errors
    /// * `InvalidSymbol` if an emission is not in the model's alphabet
    /// * `Numerical` if every state path has probability 0
    pub fn decode(&self, emissions: &[E]) -> Result<ViterbiPath<S>> {
        let search: Vec<usize> = (0..self.model.states().len()).collect();
        self.decode_over_codes(emissions, &search)
    }

    /// Decodes `emissions` considering only the listed states.
    ///
    /// Ties are broken in favour of the state listed first.
    ///
    /// # Errors
    /// As [`decode`](Self::decode), plus `InvalidState` for a state outside
    /// the model and `InvalidAlphabet` for an empty state list.
    pub fn decode_over(&self, emissions: &[E], states: &[S]) -> Result<ViterbiPath<S>> {
        if states.is_empty() {
            return Err(Error::InvalidAlphabet(
                "no states to decode over".to_string(),
            ));
        }
        let search = self
            .model
            .states()
            .encode(states, |s| Error::invalid_state(s, "viterbi"))?;
        self.decode_over_codes(emissions, &search)
    }

    /// Decodes independent sequences in parallel.
    ///
    /// Results come back in input order; a failure in one sequence does not
    /// affect the others.
    pub fn decode_batch<Q>(&self, sequences: &[Q]) -> Vec<Result<ViterbiPath<S>>>
    where
        Q: AsRef<[E]> + Sync,
        S: Send + Sync,
        E: Sync,
    {
        sequences
            .par_iter()
            .map(|sequence| self.decode(sequence.as_ref()))
            .collect()
    }

    fn decode_over_codes(&self, emissions: &[E], search: &[usize]) -> Result<ViterbiPath<S>> {
        let observations = self
            .model
            .emissions()
            .encode(emissions, |e| Error::invalid_symbol(e, "viterbi"))?;

        if observations.is_empty() {
            return Ok(ViterbiPath {
                states: Vec::new(),
                log_probability: 0.0,
            });
        }

        let t = observations.len();
        let n = search.len();

        // delta[[t, c]]: best log-probability of any path ending in search[c] at time t
        // psi[[t, c]]: column of the state at t - 1 on that path
        let mut delta = Array2::from_elem((t, n), f64::NEG_INFINITY);
        let mut psi = Array2::<usize>::zeros((t, n));

        for (col, &s) in search.iter().enumerate() {
            delta[[0, col]] = self.log_initial[s] + self.log_emission[[s, observations[0]]];
        }
        self.ensure_reachable(&delta, 0)?;

        for time in 1..t {
            let obs = observations[time];
            for (col, &s) in search.iter().enumerate() {
                let emit_log = self.log_emission[[s, obs]];

                let mut best_val = f64::NEG_INFINITY;
                let mut best_prev = 0_usize;
                for (prev_col, &p) in search.iter().enumerate() {
                    let candidate = delta[[time - 1, prev_col]] + self.log_transition[[p, s]];
                    if candidate > best_val {
                        best_val = candidate;
                        best_prev = prev_col;
                    }
                }
                delta[[time, col]] = best_val + emit_log;
                psi[[time, col]] = best_prev;
            }
            self.ensure_reachable(&delta, time)?;
        }

        let mut best_final_score = f64::NEG_INFINITY;
        let mut best_final_col = 0_usize;
        for col in 0..n {
            if delta[[t - 1, col]] > best_final_score {
                best_final_score = delta[[t - 1, col]];
                best_final_col = col;
            }
        }

        let mut cols = vec![0_usize; t];
        cols[t - 1] = best_final_col;
        for time in (1..t).rev() {
            cols[time - 1] = psi[[time, cols[time]]];
        }

        trace!(
            "decoded {} emissions over {} states, log probability {}",
            t,
            n,
            best_final_score
        );

        let symbols = self.model.states().symbols();
        Ok(ViterbiPath {
            states: cols.into_iter().map(|c| symbols[search[c]].clone()).collect(),
            log_probability: best_final_score,
        })
    }

    fn ensure_reachable(&self, delta: &Array2<f64>, time: usize) -> Result<()> {
        if delta.row(time).iter().all(|&score| score == f64::NEG_INFINITY) {
            return Err(Error::numerical(
                time,
                "every state path has probability 0",
            ));
        }
        Ok(())
    }
}
