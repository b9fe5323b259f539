// Copyright (c) Meta Platforms, Inc. and affiliates.

// This software may be used and distributed according to the terms of the
// GNU General Public License version 2.

//! RRM policy file consumed by the radio control agent:
//!
//! ```text
//! { "slices": [ { "id": 1, "PRBs": 60 }, { "id": 2, "PRBs": 46 } ] }
//! ```
//!
//! The file is replaced as a whole on every write. Content goes to a
//! sibling temporary file first, which is then renamed over the policy, so
//! readers only ever see a complete document.

use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;

use anyhow::Context;
use anyhow::Result;
use serde::Deserialize;
use serde::Serialize;
use tracing::info;

pub const DEFAULT_POLICY_FILE: &str = "rrmPolicy.json";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SliceEntry {
    /// 1-based slice ID.
    pub id: u32,
    #[serde(rename = "PRBs")]
    pub prbs: u32,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlicePolicy {
    pub slices: Vec<SliceEntry>,
}

impl SlicePolicy {
    /// Slice `i` (0-based) gets ID `i + 1` and `prbs[i]` PRBs.
    pub fn from_prbs(prbs: &[u32]) -> Self {
        Self {
            slices: prbs
                .iter()
                .enumerate()
                .map(|(i, prbs)| SliceEntry {
                    id: i as u32 + 1,
                    prbs: *prbs,
                })
                .collect(),
        }
    }

    pub fn total_prbs(&self) -> u64 {
        self.slices.iter().map(|s| s.prbs as u64).sum()
    }

    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read policy file {}", path.display()))?;
        serde_json::from_str(&data)
            .with_context(|| format!("Failed to parse policy file {}", path.display()))
    }
}

#[derive(Clone, Debug)]
pub struct PolicyWriter {
    path: PathBuf,
}

impl PolicyWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| DEFAULT_POLICY_FILE.into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    /// Atomically replace the policy file with `policy`.
    pub fn write(&self, policy: &SlicePolicy) -> Result<()> {
        let json = serde_json::to_string_pretty(policy).context("Failed to serialize policy")?;

        let tmp_path = self.tmp_path();
        let res = (|| -> Result<()> {
            let mut f = File::create(&tmp_path)
                .with_context(|| format!("Failed to create {}", tmp_path.display()))?;
            f.write_all(json.as_bytes())
                .with_context(|| format!("Failed to write {}", tmp_path.display()))?;
            f.sync_all()
                .with_context(|| format!("Failed to sync {}", tmp_path.display()))?;
            drop(f);
            std::fs::rename(&tmp_path, &self.path).with_context(|| {
                format!(
                    "Failed to rename {} to {}",
                    tmp_path.display(),
                    self.path.display()
                )
            })
        })();

        if res.is_err() {
            let _ = std::fs::remove_file(&tmp_path);
        }
        res
    }

    /// Create the policy file holding an empty slice list if it is missing.
    /// Returns whether a file was created.
    pub fn ensure_exists(&self) -> Result<bool> {
        if self.path.exists() {
            return Ok(false);
        }
        self.write(&SlicePolicy::default())?;
        info!("Created empty policy file {}", self.path.display());
        Ok(true)
    }
}
