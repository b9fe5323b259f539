// Copyright (c) Meta Platforms, Inc. and affiliates.

// This software may be used and distributed according to the terms of the
// GNU General Public License version 2.

//! # PRB allocation optimizer
//!
//! An allocation run for `n` slices works as follows:
//!
//! 1. Draw `n` weights uniformly from [0, pi].
//!
//! 2. Run a fixed number of gradient descent steps on the cost
//!    `-sum(<Z_i>)`, i.e. push every slice's expectation towards +1 as far
//!    as the entangling chain allows. The gradient comes from the
//!    parameter-shift rule, which is exact for RY rotations and only needs
//!    forward evaluations of the circuit.
//!
//! 3. Evaluate the circuit once more at the final weights, remap each
//!    expectation from [-1, 1] to a score in [0, 1] and split the PRB
//!    budget proportionally to the scores.
//!
//! 4. Quantize the shares with the configured [`DriftPolicy`].
//!
//! There is no convergence check. A run always takes exactly `steps`
//! iterations.

use std::f64::consts::FRAC_PI_2;
use std::f64::consts::PI;

use anyhow::bail;
use anyhow::Result;
use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;
use tracing::debug;
use tracing::trace;

use crate::circuit::Backend;
use crate::circuit::Simulator;
use crate::quantize::quantize;
use crate::quantize::DriftPolicy;

pub const DYNAMIC_STEPS: usize = 30;
pub const FIXED_STEPS: usize = 50;
pub const DEFAULT_LEARNING_RATE: f64 = 0.1;

#[derive(Clone, Debug)]
pub struct OptimizerConfig {
    pub steps: usize,
    pub learning_rate: f64,
    pub drift_policy: DriftPolicy,
    pub backend: Backend,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            steps: DYNAMIC_STEPS,
            learning_rate: DEFAULT_LEARNING_RATE,
            drift_policy: DriftPolicy::CorrectFirst,
            backend: Backend::Statevector,
        }
    }
}

/// Result of one allocation run.
#[derive(Clone, Debug, PartialEq)]
pub struct Allocation {
    /// PRBs per slice, in slice order.
    pub prbs: Vec<u32>,
    /// Final expectation value per slice.
    pub expectations: Vec<f64>,
    /// Every expectation ended at exactly -1 and `prbs` is all zeros.
    pub degenerate: bool,
}

/// The cost minimized by the optimizer.
pub fn cost(sim: &dyn Simulator, weights: &[f64]) -> f64 {
    -sim.expectations(weights).iter().sum::<f64>()
}

/// Gradient of [`cost`] by the parameter-shift rule.
pub fn gradient(sim: &dyn Simulator, weights: &[f64]) -> Vec<f64> {
    let mut shifted = weights.to_vec();
    (0..weights.len())
        .map(|k| {
            shifted[k] = weights[k] + FRAC_PI_2;
            let plus = cost(sim, &shifted);
            shifted[k] = weights[k] - FRAC_PI_2;
            let minus = cost(sim, &shifted);
            shifted[k] = weights[k];
            (plus - minus) / 2.0
        })
        .collect()
}

/// Remap expectations from [-1, 1] to scores in [0, 1].
pub fn normalized_scores(expectations: &[f64]) -> Vec<f64> {
    expectations.iter().map(|v| (v + 1.0) / 2.0).collect()
}

/// Split `total_prbs` proportionally to `scores`. Returns `None` if the
/// scores sum to zero.
pub fn proportional_shares(scores: &[f64], total_prbs: u32) -> Option<Vec<f64>> {
    let sum: f64 = scores.iter().sum();
    if sum <= 0.0 {
        return None;
    }
    Some(
        scores
            .iter()
            .map(|s| total_prbs as f64 * s / sum)
            .collect(),
    )
}

pub struct Optimizer {
    cfg: OptimizerConfig,
    simulator: Box<dyn Simulator>,
    rng: StdRng,
}

impl Optimizer {
    pub fn new(cfg: OptimizerConfig, seed: Option<u64>) -> Self {
        let simulator = cfg.backend.simulator();
        Self::with_simulator(cfg, simulator, seed)
    }

    pub fn with_simulator(
        cfg: OptimizerConfig,
        simulator: Box<dyn Simulator>,
        seed: Option<u64>,
    ) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            cfg,
            simulator,
            rng,
        }
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.cfg
    }

    fn initial_weights(&mut self, nr_slices: usize) -> Vec<f64> {
        (0..nr_slices)
            .map(|_| self.rng.gen_range(0.0..=PI))
            .collect()
    }

    /// Run the descent from fresh random weights and return the final weights.
    pub fn optimize(&mut self, nr_slices: usize) -> Vec<f64> {
        let mut weights = self.initial_weights(nr_slices);
        let sim = self.simulator.as_ref();

        for step in 0..self.cfg.steps {
            let grad = gradient(sim, &weights);
            for (w, g) in weights.iter_mut().zip(grad.iter()) {
                *w -= self.cfg.learning_rate * g;
            }
            trace!("step {:3} cost={:.6}", step, cost(sim, &weights));
        }

        weights
    }

    /// Compute the PRB split for `nr_slices` slices. `nr_slices` must be
    /// non-zero.
    pub fn allocate(&mut self, nr_slices: usize, total_prbs: u32) -> Result<Allocation> {
        if nr_slices == 0 {
            bail!("Cannot allocate PRBs across zero slices");
        }

        let weights = self.optimize(nr_slices);
        let expectations = self.simulator.expectations(&weights);
        if expectations.len() != nr_slices {
            bail!(
                "Simulator returned {} expectations for {} slices",
                expectations.len(),
                nr_slices
            );
        }
        trace!("weights={:?} expectations={:?}", weights, expectations);
        debug!(
            "Optimized {} slices in {} steps, final cost {:.6}",
            nr_slices,
            self.cfg.steps,
            -expectations.iter().sum::<f64>()
        );

        let scores = normalized_scores(&expectations);
        let (prbs, degenerate) = match proportional_shares(&scores, total_prbs) {
            Some(shares) => (quantize(&shares, total_prbs, self.cfg.drift_policy), false),
            None => (vec![0; nr_slices], true),
        };

        Ok(Allocation {
            prbs,
            expectations,
            degenerate,
        })
    }
}
