// Copyright (c) Meta Platforms, Inc. and affiliates.

// This software may be used and distributed according to the terms of the
// GNU General Public License version 2.

//! qslice: PRB split across the active network slices.
//!
//! A background controller periodically scores every registered device's
//! slice with a small gradient-optimized qubit circuit, turns the scores into
//! whole PRB counts that add up to the PRB budget, and republishes them to
//! the RRM policy file read by the radio control agent.
pub mod circuit;
pub mod console;
pub mod controller;
pub mod optimizer;
pub mod policy;
pub mod quantize;
pub mod registry;
pub mod stats;

pub use controller::ControlHandle;
pub use controller::Controller;
pub use controller::ControllerConfig;
pub use optimizer::Optimizer;
pub use optimizer::OptimizerConfig;
pub use registry::DeviceRegistry;
