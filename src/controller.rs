// Copyright (c) Meta Platforms, Inc. and affiliates.

// This software may be used and distributed according to the terms of the
// GNU General Public License version 2.

//! # Slice controller loop
//!
//! Once per interval the controller looks at the device registry:
//!
//! - IDLE: the registry is empty. Nothing is optimized and the policy file
//!   is left untouched.
//!
//! - ALLOCATING: the registry is snapshotted, the optimizer runs for the
//!   snapshot size, and the resulting policy replaces the policy file.
//!
//! Shutdown is cooperative. The flag is checked before every cycle and while
//! waiting for the next one, never in the middle of an optimizer run, so a
//! stop request may still see one more allocation and file write.

use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use std::time::Instant;

use anyhow::Context;
use anyhow::Result;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::optimizer::Optimizer;
use crate::policy::PolicyWriter;
use crate::policy::SlicePolicy;
use crate::policy::DEFAULT_POLICY_FILE;
use crate::registry::DeviceRegistry;
use crate::stats::Metrics;

pub const DEFAULT_TOTAL_PRBS: u32 = 106;
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(10);

/// Longest stretch the wait between cycles sleeps before re-checking the
/// shutdown flag.
const SHUTDOWN_POLL: Duration = Duration::from_millis(100);

#[derive(Clone, Debug)]
pub struct ControllerConfig {
    pub total_prbs: u32,
    pub interval: Duration,
    pub policy_path: PathBuf,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            total_prbs: DEFAULT_TOTAL_PRBS,
            interval: DEFAULT_INTERVAL,
            policy_path: PathBuf::from(DEFAULT_POLICY_FILE),
        }
    }
}

/// State shared by the controller thread and the command source. Built once
/// at startup and cloned into each of them.
#[derive(Clone, Debug, Default)]
pub struct ControlHandle {
    pub registry: Arc<DeviceRegistry>,
    pub shutdown: Arc<AtomicBool>,
}

impl ControlHandle {
    pub fn new(registry: DeviceRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }

    pub fn is_stopped(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum CycleOutcome {
    /// No devices were registered.
    Idle,
    /// The policy was computed and written.
    Published(SlicePolicy),
    /// All scores collapsed, the previous policy was kept.
    Degenerate,
    /// The policy was computed but could not be written.
    WriteFailed,
}

pub struct Controller {
    registry: Arc<DeviceRegistry>,
    optimizer: Optimizer,
    writer: PolicyWriter,
    total_prbs: u32,
    interval: Duration,
    metrics: Metrics,
}

/// Compact description of a published policy, e.g.
/// "[1(ue1): 60] [2(ue2): 46]".
pub fn format_slice_config(devices: &[String], policy: &SlicePolicy) -> String {
    policy
        .slices
        .iter()
        .zip(devices.iter())
        .map(|(slice, dev)| format!("[{}({}): {}]", slice.id, dev, slice.prbs))
        .collect::<Vec<_>>()
        .join(" ")
}

impl Controller {
    pub fn new(cfg: &ControllerConfig, registry: Arc<DeviceRegistry>, optimizer: Optimizer) -> Self {
        Self {
            registry,
            optimizer,
            writer: PolicyWriter::new(&cfg.policy_path),
            total_prbs: cfg.total_prbs,
            interval: cfg.interval,
            metrics: Metrics::default(),
        }
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn writer(&self) -> &PolicyWriter {
        &self.writer
    }

    /// Run a single controller cycle.
    pub fn step(&mut self) -> Result<CycleOutcome> {
        self.metrics.nr_cycles += 1;

        let devices = self.registry.snapshot();
        if devices.is_empty() {
            self.metrics.nr_idle_cycles += 1;
            warn!("No devices connected, waiting");
            return Ok(CycleOutcome::Idle);
        }

        let started_at = Instant::now();
        let alloc = self
            .optimizer
            .allocate(devices.len(), self.total_prbs)
            .context("Allocation failed")?;
        self.metrics.last_cycle_us = started_at.elapsed().as_micros() as u64;

        if alloc.degenerate {
            self.metrics.nr_degenerate += 1;
            warn!(
                "All {} slice scores collapsed to zero, keeping previous policy",
                devices.len()
            );
            return Ok(CycleOutcome::Degenerate);
        }

        // Invariant: one entry per snapshotted device, summing to the budget.
        assert_eq!(alloc.prbs.len(), devices.len());
        let policy = SlicePolicy::from_prbs(&alloc.prbs);
        assert_eq!(policy.total_prbs(), self.total_prbs as u64);

        self.metrics.last_nr_slices = devices.len() as u32;
        self.metrics.last_allocation = alloc.prbs.clone();

        if let Err(e) = self.writer.write(&policy) {
            self.metrics.nr_write_errors += 1;
            warn!("Failed to publish policy, retrying next cycle: {:#}", e);
            return Ok(CycleOutcome::WriteFailed);
        }
        self.metrics.nr_published += 1;

        info!(
            "PRB allocation: {} -> {}",
            format_slice_config(&devices, &policy),
            self.writer.path().display()
        );
        if let Ok(json) = self.metrics.to_json() {
            debug!("metrics={}", json);
        }

        Ok(CycleOutcome::Published(policy))
    }

    fn wait_until(&self, deadline: Instant, shutdown: &AtomicBool) {
        loop {
            let now = Instant::now();
            if now >= deadline || shutdown.load(Ordering::Relaxed) {
                return;
            }
            std::thread::sleep((deadline - now).min(SHUTDOWN_POLL));
        }
    }

    /// Run cycles until `shutdown` is set and return the final metrics.
    pub fn run(&mut self, shutdown: Arc<AtomicBool>) -> Result<Metrics> {
        info!(
            "Slice controller started: {} PRBs every {:?}, {} steps, lr={}, {} drift policy",
            self.total_prbs,
            self.interval,
            self.optimizer.config().steps,
            self.optimizer.config().learning_rate,
            self.optimizer.config().drift_policy,
        );

        while !shutdown.load(Ordering::Relaxed) {
            let started_at = Instant::now();
            self.step()?;
            self.wait_until(started_at + self.interval, &shutdown);
        }

        info!("Slice controller stopped after {} cycles", self.metrics.nr_cycles);
        Ok(self.metrics.clone())
    }

    /// Move the controller onto its own thread.
    pub fn spawn(mut self, shutdown: Arc<AtomicBool>) -> Result<JoinHandle<Result<Metrics>>> {
        std::thread::Builder::new()
            .name("slice-ctrl".into())
            .spawn(move || self.run(shutdown))
            .context("Failed to spawn controller thread")
    }
}
