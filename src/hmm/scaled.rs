//! Scaled forward/backward recursions.
//!
//! Forward and backward probabilities are products of many numbers below 1
//! and underflow to 0 after a few hundred positions. Every position `t` is
//! therefore divided by a scale factor `s_t`, the sum of the raw forward
//! values at `t`, so each scaled forward row sums to 1. The backward
//! recursion reuses the same factors, and the sequence log-likelihood is
//! `sum(ln s_t)`.

use log::trace;
use ndarray::{Array1, Array2, ArrayView1};

use super::alphabet::Symbol;
use super::model::MarkovModel;
use super::trainer::{ExpectedCounts, TrainingSequence};
use crate::error::{Error, Result};

/// Scaled forward variables and the per-position scale factors.
#[derive(Debug, Clone)]
pub struct ForwardTable {
    /// `alpha[[t, k]]`, each row sums to 1.
    pub alpha: Array2<f64>,
    /// `s_t` for every position.
    pub scales: Array1<f64>,
}

impl ForwardTable {
    /// Natural log of the probability of the whole emission sequence.
    pub fn log_likelihood(&self) -> f64 {
        self.scales.iter().map(|s| s.ln()).sum()
    }
}

/// Scaled dynamic programming over one emission sequence.
///
/// Only reads the model; all tables belong to the caller.
#[derive(Debug)]
pub struct ScaledDp<'a, S, E> {
    model: &'a MarkovModel<S, E>,
    observations: Vec<usize>,
}

impl<'a, S: Symbol, E: Symbol> ScaledDp<'a, S, E> {
    /// Prepares the recursions for the emissions of `sequence`. A state path,
    /// if present, is ignored.
    ///
    /// # Errors
    /// * `InvalidSymbol` if an emission is not in the model's alphabet
    pub fn new(model: &'a MarkovModel<S, E>, sequence: &TrainingSequence<S, E>) -> Result<Self> {
        Self::from_emissions(model, sequence.emissions())
    }

    pub fn from_emissions(model: &'a MarkovModel<S, E>, emissions: &[E]) -> Result<Self> {
        let observations = model
            .emissions()
            .encode(emissions, |e| Error::invalid_symbol(e, "scaled_dp"))?;
        Ok(Self {
            model,
            observations,
        })
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    /// Unscaled forward values at `position` computed from the scaled
    /// forward row of `position - 1`.
    fn raw_forward(&self, position: usize, previous: ArrayView1<f64>) -> Array1<f64> {
        let n = self.model.states().len();
        let obs = self.observations[position];
        let initial = self.model.initial_probabilities();
        let transition = self.model.transition_matrix();
        let emission = self.model.emission_matrix();

        (0..n)
            .map(|k| {
                let reach = if position == 0 {
                    initial[k]
                } else {
                    self.model
                        .predecessor_codes(k)
                        .iter()
                        .map(|&l| previous[l] * transition[[l, k]])
                        .sum()
                };
                emission[[k, obs]] * reach
            })
            .collect()
    }

    /// Scale factor `s_t` for `position`.
    ///
    /// `previous` is the scaled forward row of `position - 1`, indexed by
    /// state code; it is ignored at position 0, where the initial
    /// distribution takes its place. The result is the sum over states of
    /// the raw forward values, so dividing them by it makes the row sum to 1.
    ///
    /// # Errors
    /// * `PositionOutOfRange` if `position` is past the end of the sequence
    /// * `ShapeMismatch` if `previous` does not have one entry per state
    /// * `Numerical` if the sum is not strictly positive, i.e. the emission
    ///   at `position` is impossible given the previous row
    pub fn calculate_s_value(&self, position: usize, previous: ArrayView1<f64>) -> Result<f64> {
        const OP: &str = "calculate_s_value";
        if position >= self.observations.len() {
            return Err(Error::PositionOutOfRange {
                position,
                length: self.observations.len(),
                operation: OP,
            });
        }
        let n = self.model.states().len();
        if previous.len() != n {
            return Err(Error::ShapeMismatch {
                expected: n,
                found: previous.len(),
                operation: OP,
            });
        }
        let raw = self.raw_forward(position, previous);
        checked_scale(position, raw.sum())
    }

    /// Runs the scaled forward recursion.
    ///
    /// # Errors
    /// * `Numerical` at the first position whose emission is impossible
    pub fn forward(&self) -> Result<ForwardTable> {
        let t = self.observations.len();
        let n = self.model.states().len();
        let mut alpha = Array2::zeros((t, n));
        let mut scales = Array1::zeros(t);

        for position in 0..t {
            let raw = self.raw_forward(position, alpha.row(position.saturating_sub(1)));
            let s = checked_scale(position, raw.sum())?;
            trace!("position {}: s = {}", position, s);
            alpha.row_mut(position).assign(&(raw / s));
            scales[position] = s;
        }

        Ok(ForwardTable { alpha, scales })
    }

    /// Runs the scaled backward recursion with the factors of `forward`.
    ///
    /// `beta[[T-1, k]] = 1` and
    /// `beta[[t, k]] = sum_l a(k, l) e(l, x[t+1]) beta[[t+1, l]] / s[t+1]`.
    ///
    /// # Errors
    /// * `ShapeMismatch` if `forward` was computed for a sequence of a
    ///   different length
    pub fn backward(&self, forward: &ForwardTable) -> Result<Array2<f64>> {
        let t = self.observations.len();
        let n = self.model.states().len();
        if forward.scales.len() != t {
            return Err(Error::ShapeMismatch {
                expected: t,
                found: forward.scales.len(),
                operation: "backward",
            });
        }
        let mut beta = Array2::zeros((t, n));
        if t == 0 {
            return Ok(beta);
        }

        let transition = self.model.transition_matrix();
        let emission = self.model.emission_matrix();
        beta.row_mut(t - 1).fill(1.0);
        for position in (0..t - 1).rev() {
            let next_obs = self.observations[position + 1];
            let next_scale = forward.scales[position + 1];
            for k in 0..n {
                let total: f64 = self
                    .model
                    .successor_codes(k)
                    .iter()
                    .map(|&l| {
                        transition[[k, l]] * emission[[l, next_obs]] * beta[[position + 1, l]]
                    })
                    .sum();
                beta[[position, k]] = total / next_scale;
            }
        }
        Ok(beta)
    }

    /// Posterior state probabilities `gamma[[t, k]]`, each row summing to 1.
    ///
    /// # Errors
    /// * `Numerical` if the sequence is impossible under the model
    pub fn posteriors(&self) -> Result<Array2<f64>> {
        let forward = self.forward()?;
        let backward = self.backward(&forward)?;
        posteriors_from(&forward, &backward)
    }

    /// Expected initial, transition and emission counts for this sequence,
    /// together with its log-likelihood.
    ///
    /// # Errors
    /// * `Numerical` if the sequence is impossible under the model
    pub fn expected_counts(&self) -> Result<ExpectedCounts> {
        let forward = self.forward()?;
        let backward = self.backward(&forward)?;
        let gamma = posteriors_from(&forward, &backward)?;

        let n = self.model.states().len();
        let m = self.model.emissions().len();
        let t = self.observations.len();
        let transition = self.model.transition_matrix();
        let emission = self.model.emission_matrix();

        let mut counts = ExpectedCounts::zeros(n, m);
        if t == 0 {
            return Ok(counts);
        }
        counts.initial.assign(&gamma.row(0));

        for position in 0..t {
            let obs = self.observations[position];
            for k in 0..n {
                counts.emissions[[k, obs]] += gamma[[position, k]];
            }
        }

        for position in 0..t - 1 {
            let next_obs = self.observations[position + 1];
            let next_scale = forward.scales[position + 1];
            for k in 0..n {
                let a = forward.alpha[[position, k]];
                for &l in self.model.successor_codes(k) {
                    counts.transitions[[k, l]] += a
                        * transition[[k, l]]
                        * emission[[l, next_obs]]
                        * backward[[position + 1, l]]
                        / next_scale;
                }
            }
        }

        counts.log_likelihood = forward.log_likelihood();
        Ok(counts)
    }
}

fn checked_scale(position: usize, total: f64) -> Result<f64> {
    if total > 0.0 && total.is_finite() {
        Ok(total)
    } else {
        Err(Error::numerical(
            position,
            format!("scale factor {} is not strictly positive", total),
        ))
    }
}

fn posteriors_from(forward: &ForwardTable, backward: &Array2<f64>) -> Result<Array2<f64>> {
    let mut gamma = &forward.alpha * backward;
    for (position, mut row) in gamma.rows_mut().into_iter().enumerate() {
        let total = row.sum();
        if !(total > 0.0 && total.is_finite()) {
            return Err(Error::numerical(
                position,
                "posterior probabilities do not normalize",
            ));
        }
        row /= total;
    }
    Ok(gamma)
}

#[cfg(test)]
mod tests {
    use super::super::MarkovModelBuilder;
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    fn equal_model() -> MarkovModel<&'static str, char> {
        let mut b = MarkovModelBuilder::new(["1", "2"], ['A', 'B']).unwrap();
        b.allow_all_transitions();
        b.set_equal_probabilities();
        b.build().unwrap()
    }

    fn skewed_model() -> MarkovModel<&'static str, char> {
        let mut b = MarkovModelBuilder::new(["1", "2"], ['A', 'B']).unwrap();
        b.set_initial_probabilities([("1", 0.4), ("2", 0.6)]).unwrap();
        b.allow_transition(&"1", &"1", 0.35).unwrap();
        b.allow_transition(&"1", &"2", 0.65).unwrap();
        b.allow_transition(&"2", &"1", 0.45).unwrap();
        b.allow_transition(&"2", &"2", 0.55).unwrap();
        b.set_emission_score(&"1", &'A', 0.45).unwrap();
        b.set_emission_score(&"1", &'B', 0.55).unwrap();
        b.set_emission_score(&"2", &'A', 0.75).unwrap();
        b.set_emission_score(&"2", &'B', 0.25).unwrap();
        b.build().unwrap()
    }

    /// Joint probability of every state path, keyed by the path's codes.
    fn all_paths(
        model: &MarkovModel<&'static str, char>,
        emissions: &[char],
    ) -> Vec<(Vec<usize>, f64)> {
        let n = model.states().len();
        let t = emissions.len();
        let obs: Vec<usize> = emissions
            .iter()
            .map(|e| model.emissions().code_of(e).unwrap())
            .collect();
        let pi = model.initial_probabilities();
        let a = model.transition_matrix();
        let e = model.emission_matrix();

        (0..n.pow(t as u32))
            .map(|mut index| {
                let mut path = vec![0; t];
                for slot in path.iter_mut().rev() {
                    *slot = index % n;
                    index /= n;
                }
                let mut p = pi[path[0]] * e[[path[0], obs[0]]];
                for i in 1..t {
                    p *= a[[path[i - 1], path[i]]] * e[[path[i], obs[i]]];
                }
                (path, p)
            })
            .collect()
    }

    #[test]
    fn test_calculate_s_value() {
        let model = equal_model();
        let seq = TrainingSequence::unlabeled(vec!['A', 'B', 'B']);
        let dp = ScaledDp::new(&model, &seq).unwrap();

        let previous = array![0.5, 0.7];
        let s = dp.calculate_s_value(1, previous.view()).unwrap();
        // both states: 0.5 * (0.5 * 0.5 + 0.7 * 0.5)
        assert_relative_eq!(s, 0.6, epsilon = 1e-12);

        // position 0 uses the initial distribution instead
        let s0 = dp.calculate_s_value(0, previous.view()).unwrap();
        assert_relative_eq!(s0, 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_calculate_s_value_rejects_impossible_emission() {
        let mut b = MarkovModelBuilder::new(["1", "2"], ['A', 'B']).unwrap();
        b.allow_all_transitions();
        b.set_emission_score(&"1", &'A', 1.0).unwrap();
        b.set_emission_score(&"2", &'A', 1.0).unwrap();
        let model = b.build().unwrap();
        let dp = ScaledDp::from_emissions(&model, &['A', 'B']).unwrap();

        let err = dp.calculate_s_value(1, array![0.5, 0.5].view()).unwrap_err();
        assert!(matches!(err, Error::Numerical { position: 1, .. }));
        assert!(matches!(dp.forward(), Err(Error::Numerical { position: 1, .. })));
        assert!(matches!(
            dp.expected_counts(),
            Err(Error::Numerical { position: 1, .. })
        ));
    }

    #[test]
    fn test_calculate_s_value_rejects_position_past_end() {
        let model = equal_model();
        let dp = ScaledDp::from_emissions(&model, &['A', 'B', 'B']).unwrap();

        let err = dp.calculate_s_value(3, array![0.5, 0.5].view()).unwrap_err();
        assert_eq!(
            err,
            Error::PositionOutOfRange {
                position: 3,
                length: 3,
                operation: "calculate_s_value"
            }
        );
    }

    #[test]
    fn test_calculate_s_value_rejects_short_previous_row() {
        let model = equal_model();
        let dp = ScaledDp::from_emissions(&model, &['A', 'B', 'B']).unwrap();

        let err = dp.calculate_s_value(1, array![0.5].view()).unwrap_err();
        assert_eq!(
            err,
            Error::ShapeMismatch {
                expected: 2,
                found: 1,
                operation: "calculate_s_value"
            }
        );
    }

    #[test]
    fn test_backward_rejects_forward_of_other_sequence() {
        let model = equal_model();
        let short = ScaledDp::from_emissions(&model, &['A', 'B']).unwrap();
        let long = ScaledDp::from_emissions(&model, &['A', 'B', 'A']).unwrap();

        let forward = short.forward().unwrap();
        assert!(matches!(
            long.backward(&forward),
            Err(Error::ShapeMismatch {
                expected: 3,
                found: 2,
                ..
            })
        ));
        assert_eq!(short.backward(&forward).unwrap().dim(), (2, 2));
    }

    #[test]
    fn test_unknown_symbol() {
        let model = equal_model();
        assert!(matches!(
            ScaledDp::from_emissions(&model, &['A', 'C']),
            Err(Error::InvalidSymbol { .. })
        ));
    }

    #[test]
    fn test_forward_matches_brute_force() {
        let model = skewed_model();
        let emissions = ['A', 'B', 'B', 'A'];
        let dp = ScaledDp::from_emissions(&model, &emissions).unwrap();
        let forward = dp.forward().unwrap();

        let total: f64 = all_paths(&model, &emissions).iter().map(|(_, p)| p).sum();
        assert_relative_eq!(forward.log_likelihood(), total.ln(), epsilon = 1e-12);
        for row in forward.alpha.rows() {
            assert_relative_eq!(row.sum(), 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_posteriors_match_brute_force() {
        let model = skewed_model();
        let emissions = ['B', 'A', 'A'];
        let dp = ScaledDp::from_emissions(&model, &emissions).unwrap();
        let gamma = dp.posteriors().unwrap();

        let paths = all_paths(&model, &emissions);
        let total: f64 = paths.iter().map(|(_, p)| p).sum();
        for position in 0..emissions.len() {
            for state in 0..2 {
                let mass: f64 = paths
                    .iter()
                    .filter(|(path, _)| path[position] == state)
                    .map(|(_, p)| p)
                    .sum();
                assert_relative_eq!(gamma[[position, state]], mass / total, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn test_long_sequence_does_not_underflow() {
        let model = equal_model();
        let emissions: Vec<char> = (0..5000).map(|i| if i % 3 == 0 { 'A' } else { 'B' }).collect();
        let dp = ScaledDp::from_emissions(&model, &emissions).unwrap();
        let counts = dp.expected_counts().unwrap();

        assert_relative_eq!(
            counts.log_likelihood,
            5000.0 * 0.5f64.ln(),
            max_relative = 1e-9
        );
        assert_relative_eq!(counts.transitions.sum(), 4999.0, max_relative = 1e-9);
        assert_relative_eq!(counts.emissions.sum(), 5000.0, max_relative = 1e-9);
        assert_relative_eq!(counts.initial.sum(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_expected_transitions_respect_forbidden_pairs() {
        let mut b = MarkovModelBuilder::new(["1", "2"], ['A', 'B']).unwrap();
        b.set_initial_probabilities([("1", 1.0)]).unwrap();
        b.allow_transition(&"1", &"1", 0.5).unwrap();
        b.allow_transition(&"1", &"2", 0.5).unwrap();
        b.allow_transition(&"2", &"2", 1.0).unwrap();
        let model = b.build().unwrap();

        let dp = ScaledDp::from_emissions(&model, &['A', 'B', 'A']).unwrap();
        let counts = dp.expected_counts().unwrap();
        assert_eq!(counts.transitions[[1, 0]], 0.0);
        assert_relative_eq!(counts.initial[0], 1.0, epsilon = 1e-12);
        assert_relative_eq!(counts.transitions.sum(), 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_empty_sequence() {
        let model = equal_model();
        let dp = ScaledDp::from_emissions(&model, &[]).unwrap();
        assert!(dp.is_empty());
        let counts = dp.expected_counts().unwrap();
        assert_eq!(counts.log_likelihood, 0.0);
        assert_eq!(counts.transitions.sum(), 0.0);
        assert_eq!(dp.posteriors().unwrap().nrows(), 0);
    }
}
