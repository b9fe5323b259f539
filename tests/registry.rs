// Copyright (c) Meta Platforms, Inc. and affiliates.

// This software may be used and distributed according to the terms of the
// GNU General Public License version 2.

// Concurrent registry mutation observed through snapshots.

use std::collections::HashSet;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use qslice::DeviceRegistry;
use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;

const NR_WRITERS: usize = 4;
const OPS_PER_WRITER: usize = 250;
const NR_IDS: usize = 12;

fn id_pool() -> Vec<String> {
    (0..NR_IDS).map(|i| format!("device-{:02}-{}", i, "x".repeat(i * 3))).collect()
}

#[test]
fn snapshots_never_torn_or_duplicated() {
    let registry = Arc::new(DeviceRegistry::new());
    let pool = Arc::new(id_pool());
    let done = Arc::new(AtomicBool::new(false));

    let reader = {
        let registry = registry.clone();
        let pool = pool.clone();
        let done = done.clone();
        std::thread::spawn(move || {
            let valid: HashSet<&String> = pool.iter().collect();
            let mut nr_snapshots = 0u64;
            while !done.load(Ordering::Relaxed) {
                let snap = registry.snapshot();
                let unique: HashSet<&String> = snap.iter().collect();
                assert_eq!(unique.len(), snap.len(), "duplicate in {:?}", snap);
                assert!(snap.iter().all(|id| valid.contains(id)), "torn entry in {:?}", snap);
                nr_snapshots += 1;
            }
            nr_snapshots
        })
    };

    let writers: Vec<_> = (0..NR_WRITERS)
        .map(|w| {
            let registry = registry.clone();
            let pool = pool.clone();
            std::thread::spawn(move || {
                let mut rng = StdRng::seed_from_u64(w as u64);
                for _ in 0..OPS_PER_WRITER {
                    let id = &pool[rng.gen_range(0..pool.len())];
                    if rng.gen_bool(0.5) {
                        let _ = registry.add(id.as_str());
                    } else {
                        let _ = registry.remove(id);
                    }
                }
            })
        })
        .collect();

    for w in writers {
        w.join().unwrap();
    }
    done.store(true, Ordering::Relaxed);
    let nr_snapshots = reader.join().unwrap();
    assert!(nr_snapshots > 0);

    let last = registry.snapshot();
    let unique: HashSet<&String> = last.iter().collect();
    assert_eq!(unique.len(), last.len());
    assert_eq!(registry.len(), last.len());
}

#[test]
fn double_add_then_remove() {
    let registry = DeviceRegistry::new();
    registry.add("ue1").unwrap();
    assert!(registry.add("ue1").is_err());
    assert_eq!(registry.snapshot().iter().filter(|d| *d == "ue1").count(), 1);

    registry.remove("ue1").unwrap();
    assert!(!registry.snapshot().iter().any(|d| d == "ue1"));
}
