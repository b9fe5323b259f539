// Copyright (c) Meta Platforms, Inc. and affiliates.

// This software may be used and distributed according to the terms of the
// GNU General Public License version 2.

//! Registry of the active devices. The insertion order of a device is its
//! slice index when an allocation is computed.

use std::fmt;
use std::sync::Mutex;
use std::sync::MutexGuard;

use tracing::info;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RegistryError {
    EmptyId,
    Duplicate(String),
    Unknown(String),
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::EmptyId => write!(f, "Device ID must not be empty"),
            RegistryError::Duplicate(id) => write!(f, "Device {} already exists", id),
            RegistryError::Unknown(id) => write!(f, "Device {} not found", id),
        }
    }
}

impl std::error::Error for RegistryError {}

/// Ordered set of device IDs shared between the controller loop and the
/// command source. Every operation holds the same lock for its full
/// duration.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: Mutex<Vec<String>>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_devices<I, S>(ids: I) -> Result<Self, RegistryError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let registry = Self::new();
        for id in ids {
            registry.add(id)?;
        }
        Ok(registry)
    }

    // The guarded Vec is consistent between any two statements, so a
    // poisoned lock is still safe to use.
    fn lock(&self) -> MutexGuard<'_, Vec<String>> {
        self.devices.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Append `id`. Fails without changing anything if `id` is empty or
    /// already registered.
    pub fn add(&self, id: impl Into<String>) -> Result<(), RegistryError> {
        let id = id.into();
        if id.is_empty() {
            return Err(RegistryError::EmptyId);
        }

        let mut devices = self.lock();
        if devices.iter().any(|d| *d == id) {
            return Err(RegistryError::Duplicate(id));
        }
        info!("Added device {} (slice {})", id, devices.len() + 1);
        devices.push(id);
        Ok(())
    }

    /// Remove `id`, keeping the order of the remaining devices.
    pub fn remove(&self, id: &str) -> Result<(), RegistryError> {
        let mut devices = self.lock();
        match devices.iter().position(|d| d == id) {
            Some(pos) => {
                devices.remove(pos);
                info!("Removed device {}", id);
                Ok(())
            }
            None => Err(RegistryError::Unknown(id.to_string())),
        }
    }

    /// Ordered copy of the current devices.
    pub fn snapshot(&self) -> Vec<String> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.lock().iter().any(|d| d == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_preserves_order() {
        let reg = DeviceRegistry::new();
        reg.add("ue2").unwrap();
        reg.add("ue1").unwrap();
        reg.add("ue3").unwrap();
        assert_eq!(reg.snapshot(), vec!["ue2", "ue1", "ue3"]);
        assert_eq!(reg.len(), 3);
    }

    #[test]
    fn test_duplicate_add_is_noop() {
        let reg = DeviceRegistry::new();
        reg.add("ue1").unwrap();
        assert_eq!(reg.add("ue1"), Err(RegistryError::Duplicate("ue1".into())));
        assert_eq!(reg.snapshot(), vec!["ue1"]);
    }

    #[test]
    fn test_remove_keeps_remaining_order() {
        let reg = DeviceRegistry::with_devices(["a", "b", "c", "d"]).unwrap();
        reg.remove("b").unwrap();
        assert_eq!(reg.snapshot(), vec!["a", "c", "d"]);
        assert!(!reg.contains("b"));
    }

    #[test]
    fn test_remove_unknown() {
        let reg = DeviceRegistry::with_devices(["a"]).unwrap();
        assert_eq!(reg.remove("z"), Err(RegistryError::Unknown("z".into())));
        assert_eq!(reg.snapshot(), vec!["a"]);
    }

    #[test]
    fn test_empty_id_rejected() {
        let reg = DeviceRegistry::new();
        assert_eq!(reg.add(""), Err(RegistryError::EmptyId));
        assert!(reg.is_empty());
    }

    #[test]
    fn test_ids_match_exactly() {
        let reg = DeviceRegistry::new();
        reg.add("ue1").unwrap();
        reg.add("UE1").unwrap();
        reg.add("ue1 ").unwrap();
        assert_eq!(reg.len(), 3);
    }

    #[test]
    fn test_snapshot_is_detached() {
        let reg = DeviceRegistry::with_devices(["a", "b"]).unwrap();
        let snap = reg.snapshot();
        reg.remove("a").unwrap();
        reg.add("c").unwrap();
        assert_eq!(snap, vec!["a", "b"]);
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(
            RegistryError::Duplicate("ue1".into()).to_string(),
            "Device ue1 already exists"
        );
        assert_eq!(
            RegistryError::Unknown("ue9".into()).to_string(),
            "Device ue9 not found"
        );
    }
}
