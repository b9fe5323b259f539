// Copyright (c) Meta Platforms, Inc. and affiliates.

// This software may be used and distributed according to the terms of the
// GNU General Public License version 2.

//! # Slice scoring circuit
//!
//! Every slice owns one qubit. A circuit evaluation applies `RY(w[i])` to
//! qubit `i`, then a chain of CNOTs `(0, 1), (1, 2), ..., (n - 2, n - 1)`,
//! and reads back the Pauli-Z expectation of each qubit:
//!
//! ```text
//!   q0: ─RY(w0)──●───────────────  <Z0>
//!   q1: ─RY(w1)──X──●────────────  <Z1>
//!   q2: ─RY(w2)─────X──●─────────  <Z2>
//!   ...                ...
//! ```
//!
//! Two backends compute the same values:
//!
//! - [`StateVector`] evolves the full 2^n amplitude vector. RY and CNOT are
//!   both real orthogonal gates, so starting from |0...0> the amplitudes stay
//!   real and a `Vec<f64>` is enough.
//!
//! - [`Analytic`] uses the closed form of the circuit. The CNOT chain maps
//!   each basis state |b0 b1 ... b(n-1)> to the state whose qubit i holds the
//!   parity b0 ^ ... ^ bi, so <Z_i> = cos(w0) * cos(w1) * ... * cos(wi).
//!
//! Either way the result is smooth in the weights, which the optimizer needs
//! for its gradient.

use clap::ValueEnum;
use serde::Deserialize;
use serde::Serialize;
use tracing::debug;

/// Above this many qubits the state vector is not materialized.
pub const MAX_STATEVECTOR_QUBITS: usize = 20;

/// Evaluates the slice circuit for a weight vector, one weight per qubit.
pub trait Simulator: Send {
    /// Returns one Pauli-Z expectation value in [-1, 1] per weight.
    fn expectations(&self, weights: &[f64]) -> Vec<f64>;
}

/// Exact state-vector evolution. Qubit `i` is bit `i` of the basis index.
#[derive(Clone, Copy, Debug, Default)]
pub struct StateVector;

impl StateVector {
    fn apply_ry(amps: &mut [f64], qubit: usize, theta: f64) {
        let (s, c) = (theta / 2.0).sin_cos();
        let bit = 1usize << qubit;
        for i in 0..amps.len() {
            if i & bit != 0 {
                continue;
            }
            let (a0, a1) = (amps[i], amps[i | bit]);
            amps[i] = c * a0 - s * a1;
            amps[i | bit] = s * a0 + c * a1;
        }
    }

    fn apply_cnot(amps: &mut [f64], control: usize, target: usize) {
        let cbit = 1usize << control;
        let tbit = 1usize << target;
        for i in 0..amps.len() {
            if i & cbit != 0 && i & tbit == 0 {
                amps.swap(i, i | tbit);
            }
        }
    }

    fn expval_z(amps: &[f64], qubit: usize) -> f64 {
        let bit = 1usize << qubit;
        amps.iter()
            .enumerate()
            .map(|(i, a)| if i & bit == 0 { a * a } else { -(a * a) })
            .sum()
    }
}

impl Simulator for StateVector {
    fn expectations(&self, weights: &[f64]) -> Vec<f64> {
        let nr_qubits = weights.len();
        if nr_qubits == 0 {
            return vec![];
        }
        if nr_qubits > MAX_STATEVECTOR_QUBITS {
            debug!(
                "{} qubits exceeds state vector limit ({}), using closed form",
                nr_qubits, MAX_STATEVECTOR_QUBITS
            );
            return Analytic.expectations(weights);
        }

        let mut amps = vec![0.0; 1 << nr_qubits];
        amps[0] = 1.0;

        for (qubit, theta) in weights.iter().enumerate() {
            Self::apply_ry(&mut amps, qubit, *theta);
        }
        for qubit in 0..nr_qubits - 1 {
            Self::apply_cnot(&mut amps, qubit, qubit + 1);
        }

        (0..nr_qubits)
            .map(|qubit| Self::expval_z(&amps, qubit).clamp(-1.0, 1.0))
            .collect()
    }
}

/// Closed-form evaluation of the RY + CNOT chain circuit.
#[derive(Clone, Copy, Debug, Default)]
pub struct Analytic;

impl Simulator for Analytic {
    fn expectations(&self, weights: &[f64]) -> Vec<f64> {
        weights
            .iter()
            .scan(1.0f64, |parity, w| {
                *parity *= w.cos();
                Some(parity.clamp(-1.0, 1.0))
            })
            .collect()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    /// Exact state-vector evolution. Falls back to the closed form above
    /// MAX_STATEVECTOR_QUBITS slices.
    #[default]
    Statevector,
    /// Closed-form product of cosines along the entangling chain.
    Analytic,
}

impl Backend {
    pub fn simulator(self) -> Box<dyn Simulator> {
        match self {
            Backend::Statevector => Box::new(StateVector),
            Backend::Analytic => Box::new(Analytic),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::Rng;
    use rand::SeedableRng;
    use std::f64::consts::PI;

    const EPS: f64 = 1e-9;

    fn assert_close(a: &[f64], b: &[f64]) {
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(b.iter()) {
            assert!((x - y).abs() < EPS, "{:?} != {:?}", a, b);
        }
    }

    #[test]
    fn test_ground_state_is_plus_one() {
        let exp = StateVector.expectations(&[0.0, 0.0, 0.0]);
        assert_close(&exp, &[1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_single_qubit_is_cosine() {
        for theta in [0.0, 0.3, PI / 2.0, 2.0, PI] {
            let exp = StateVector.expectations(&[theta]);
            assert_close(&exp, &[theta.cos()]);
        }
    }

    #[test]
    fn test_flipped_control_flips_chain() {
        // RY(pi) on q0 gives |1>, every CNOT then propagates the flip.
        let exp = StateVector.expectations(&[PI, 0.0, 0.0, 0.0]);
        assert_close(&exp, &[-1.0, -1.0, -1.0, -1.0]);
    }

    #[test]
    fn test_statevector_matches_closed_form() {
        let mut rng = StdRng::seed_from_u64(7);
        for nr_qubits in 1..=8 {
            for _ in 0..10 {
                let weights: Vec<f64> = (0..nr_qubits).map(|_| rng.gen_range(-PI..=2.0 * PI)).collect();
                assert_close(
                    &StateVector.expectations(&weights),
                    &Analytic.expectations(&weights),
                );
            }
        }
    }

    #[test]
    fn test_expectations_in_range() {
        let mut rng = StdRng::seed_from_u64(11);
        for nr_qubits in 1..=10 {
            let weights: Vec<f64> = (0..nr_qubits).map(|_| rng.gen_range(0.0..=PI)).collect();
            for backend in [Backend::Statevector, Backend::Analytic] {
                let exp = backend.simulator().expectations(&weights);
                assert_eq!(exp.len(), nr_qubits);
                assert!(exp.iter().all(|v| (-1.0..=1.0).contains(v)), "{:?}", exp);
            }
        }
    }

    #[test]
    fn test_large_statevector_falls_back() {
        let weights = vec![0.1; MAX_STATEVECTOR_QUBITS + 4];
        assert_close(
            &StateVector.expectations(&weights),
            &Analytic.expectations(&weights),
        );
    }

    #[test]
    fn test_empty_weights() {
        assert!(StateVector.expectations(&[]).is_empty());
        assert!(Analytic.expectations(&[]).is_empty());
    }
}
