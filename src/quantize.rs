// Copyright (c) Meta Platforms, Inc. and affiliates.

// This software may be used and distributed according to the terms of the
// GNU General Public License version 2.

//! Conversion of fractional PRB shares into whole PRB counts.
//!
//! Shares are rounded to the nearest integer (ties to even) and the rounding
//! residual `total - sum(rounded)` is absorbed by slice 0, so the result
//! always sums to the PRB budget. When the residual is negative and larger
//! than slice 0's count, the remainder is taken from the following slices in
//! order so no count goes below zero.

use clap::ValueEnum;
use serde::Deserialize;
use serde::Serialize;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum DriftPolicy {
    /// Round every share in place and add the residual to slice 0.
    #[default]
    CorrectFirst,
    /// Round every share, reorder the counts in descending order so slice 0
    /// holds the largest one, then add the residual to slice 0.
    ForceMaxFirst,
}

impl std::fmt::Display for DriftPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DriftPolicy::CorrectFirst => write!(f, "correct-first"),
            DriftPolicy::ForceMaxFirst => write!(f, "force-max-first"),
        }
    }
}

fn round_share(share: f64) -> i64 {
    if share.is_finite() && share > 0.0 {
        share.round_ties_even() as i64
    } else {
        0
    }
}

/// Quantize `shares` into PRB counts summing exactly to `total_prbs`.
pub fn quantize(shares: &[f64], total_prbs: u32, policy: DriftPolicy) -> Vec<u32> {
    if shares.is_empty() {
        return vec![];
    }

    let mut counts: Vec<i64> = shares.iter().map(|s| round_share(*s)).collect();
    if policy == DriftPolicy::ForceMaxFirst {
        counts.sort_by(|a, b| b.cmp(a));
    }

    let mut residual = total_prbs as i64 - counts.iter().sum::<i64>();
    if residual >= 0 {
        counts[0] += residual;
    } else {
        for count in counts.iter_mut() {
            let take = (-residual).min(*count);
            *count -= take;
            residual += take;
            if residual == 0 {
                break;
            }
        }
    }

    let counts: Vec<u32> = counts.into_iter().map(|c| c as u32).collect();
    assert_eq!(
        counts.iter().map(|c| *c as u64).sum::<u64>(),
        total_prbs as u64,
        "quantized counts {:?} do not sum to {}",
        counts,
        total_prbs
    );
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::Rng;
    use rand::SeedableRng;

    const POLICIES: [DriftPolicy; 2] = [DriftPolicy::CorrectFirst, DriftPolicy::ForceMaxFirst];

    #[test]
    fn test_exact_shares_unchanged() {
        let counts = quantize(&[50.0, 30.0, 26.0], 106, DriftPolicy::CorrectFirst);
        assert_eq!(counts, vec![50, 30, 26]);
    }

    #[test]
    fn test_residual_goes_to_slice0() {
        // 35.33 x 3 rounds to 35 x 3 = 105, one left over.
        let share = 106.0 / 3.0;
        let counts = quantize(&[share, share, share], 106, DriftPolicy::CorrectFirst);
        assert_eq!(counts, vec![36, 35, 35]);
    }

    #[test]
    fn test_force_max_first_reorders() {
        let counts = quantize(&[10.2, 30.4, 65.4], 106, DriftPolicy::ForceMaxFirst);
        assert_eq!(counts, vec![66, 30, 10]);

        let counts = quantize(&[10.2, 30.4, 65.4], 106, DriftPolicy::CorrectFirst);
        assert_eq!(counts, vec![11, 30, 65]);
    }

    #[test]
    fn test_ties_round_to_even() {
        let counts = quantize(&[2.5, 3.5], 6, DriftPolicy::CorrectFirst);
        assert_eq!(counts, vec![2, 4]);
    }

    #[test]
    fn test_negative_residual_spills_past_slice0() {
        // Each share rounds up to 1 for a sum of 10, but only 5 PRBs exist.
        let shares = vec![0.5000001; 10];
        let total = 5u32;
        for policy in POLICIES {
            let counts = quantize(&shares, total, policy);
            assert_eq!(counts.iter().sum::<u32>(), total);
            assert_eq!(counts, vec![0, 0, 0, 0, 0, 1, 1, 1, 1, 1]);
        }
    }

    #[test]
    fn test_zero_budget() {
        for policy in POLICIES {
            assert_eq!(quantize(&[0.0, 0.0, 0.0], 0, policy), vec![0, 0, 0]);
        }
    }

    #[test]
    fn test_all_zero_shares_give_budget_to_slice0() {
        assert_eq!(
            quantize(&[0.0, 0.0], 106, DriftPolicy::CorrectFirst),
            vec![106, 0]
        );
    }

    #[test]
    fn test_sum_is_exact() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..2000 {
            let nr_slices = rng.gen_range(1..=16);
            let total = rng.gen_range(0..=300u32);
            let scores: Vec<f64> = (0..nr_slices).map(|_| rng.gen_range(0.0..=1.0)).collect();
            let sum: f64 = scores.iter().sum();
            let shares: Vec<f64> = scores
                .iter()
                .map(|s| if sum > 0.0 { total as f64 * s / sum } else { 0.0 })
                .collect();
            for policy in POLICIES {
                let counts = quantize(&shares, total, policy);
                assert_eq!(counts.len(), nr_slices);
                assert_eq!(counts.iter().sum::<u32>(), total, "{:?} {:?}", shares, counts);
            }
        }
    }

    #[test]
    fn test_quantize_is_deterministic() {
        let shares = [12.5, 40.49, 40.51, 12.5];
        for policy in POLICIES {
            assert_eq!(quantize(&shares, 106, policy), quantize(&shares, 106, policy));
        }
    }

    #[test]
    fn test_empty_shares() {
        assert!(quantize(&[], 106, DriftPolicy::CorrectFirst).is_empty());
    }
}
