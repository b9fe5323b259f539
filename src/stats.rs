// Copyright (c) Meta Platforms, Inc. and affiliates.

// This software may be used and distributed according to the terms of the
// GNU General Public License version 2.
use std::io::Write;

use anyhow::Result;
use serde::Deserialize;
use serde::Serialize;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    /// Controller cycles run, idle ones included.
    pub nr_cycles: u64,
    /// Cycles skipped because no device was registered.
    pub nr_idle_cycles: u64,
    /// Policy files written.
    pub nr_published: u64,
    /// Cycles whose scores all collapsed to zero.
    pub nr_degenerate: u64,
    /// Failed policy file writes.
    pub nr_write_errors: u64,
    /// Number of slices in the last allocation.
    pub last_nr_slices: u32,
    /// PRBs per slice of the last allocation.
    pub last_allocation: Vec<u32>,
    /// Duration of the last allocating cycle in microseconds.
    pub last_cycle_us: u64,
}

impl Metrics {
    pub fn format<W: Write>(&self, w: &mut W) -> Result<()> {
        writeln!(w, "{}", serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
