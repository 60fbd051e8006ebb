/// End-to-end registry tests under real thread contention.
///
/// Many threads add and remove devices at once; the dedupe check and the
/// insert share one critical section, so no interleaving may produce a
/// duplicate or lose an entry.
use drivewatch_core::model::{DriveItem, DriveType, RootHandle};
use drivewatch_core::registry::{DriveMatch, DriveRegistry};
use std::collections::HashSet;
use std::sync::{Arc, Barrier};
use std::thread;

// ── Helpers ──────────────────────────────────────────────────────────────────

fn device(n: usize) -> DriveItem {
    let path = format!("\\\\?\\Volume{{{n:08}}}\\");
    DriveItem::from_device(
        &format!("vol-{n}"),
        DriveType::Removable,
        RootHandle::new(path, format!("USB {n}")),
    )
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[test]
fn concurrent_adds_of_same_devices_never_duplicate() {
    let registry = Arc::new(DriveRegistry::new());
    let threads = 8;
    let barrier = Arc::new(Barrier::new(threads));

    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let registry = Arc::clone(&registry);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                let mut inserted = 0;
                for n in 0..50 {
                    if registry.add(device(n)).is_inserted() {
                        inserted += 1;
                    }
                }
                inserted
            })
        })
        .collect();

    let inserted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
    assert_eq!(inserted, 50, "every device must be inserted exactly once");
    assert_eq!(registry.len(), 50);

    let ids: HashSet<String> = registry
        .snapshot()
        .iter()
        .filter_map(|e| e.device_id())
        .collect();
    assert_eq!(ids.len(), 50);
}

#[test]
fn concurrent_add_and_remove_conserve_counts() {
    let registry = Arc::new(DriveRegistry::new());
    // 0..100 are present up front; 100..200 get added while 0..50 go away.
    for n in 0..100 {
        registry.add(device(n));
    }

    let barrier = Arc::new(Barrier::new(2));
    let adder = {
        let registry = Arc::clone(&registry);
        let barrier = Arc::clone(&barrier);
        thread::spawn(move || {
            barrier.wait();
            (100..200).filter(|&n| registry.add(device(n)).is_inserted()).count()
        })
    };
    let remover = {
        let registry = Arc::clone(&registry);
        let barrier = Arc::clone(&barrier);
        thread::spawn(move || {
            barrier.wait();
            (0..50)
                .map(|n| registry.remove_device(&format!("vol-{n}")))
                .sum::<usize>()
        })
    };

    let added = adder.join().unwrap();
    let removed = remover.join().unwrap();
    assert_eq!(added, 100);
    assert_eq!(removed, 50);
    assert_eq!(registry.len(), 100 + added - removed);
}

#[test]
fn handles_survive_concurrent_updates() {
    let registry = Arc::new(DriveRegistry::new());
    let entry = registry.add(device(7)).entry().clone();

    let writers: Vec<_> = (0..4)
        .map(|t| {
            let registry = Arc::clone(&registry);
            thread::spawn(move || {
                for i in 0..100 {
                    registry.update_match(&DriveMatch::by_device_id("vol-7"), |item| {
                        item.display_text = format!("writer {t} pass {i}");
                    });
                }
            })
        })
        .collect();
    for w in writers {
        w.join().unwrap();
    }

    assert_eq!(registry.len(), 1);
    assert!(Arc::ptr_eq(&entry, &registry.snapshot()[0]));
    assert!(entry.display_text().ends_with("pass 99"));
}

#[test]
fn add_remove_is_inverse() {
    let registry = DriveRegistry::new();
    registry.add(DriveItem::physical("C:\\", DriveType::Fixed, None));
    let before = registry.items();

    registry.add(device(1));
    registry.remove_device("vol-1");

    assert_eq!(registry.items(), before);
}
