use std::collections::HashSet;
use std::sync::Arc;
use std::thread;

use super::GuidGenerator;

#[test]
fn test_dynamic_guids_unique_and_monotonic() {
    let gen = GuidGenerator::new();
    let mut last = gen.next_guid();
    for _ in 0..1000 {
        let next = gen.next_guid();
        assert!(next > last);
        last = next;
    }
}

#[test]
fn test_dynamic_guids_unique_across_threads() {
    let gen = Arc::new(GuidGenerator::new());
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let gen = Arc::clone(&gen);
            thread::spawn(move || (0..1000).map(|_| gen.next_guid()).collect::<Vec<_>>())
        })
        .collect();

    let mut seen = HashSet::new();
    for h in handles {
        for guid in h.join().unwrap() {
            assert!(seen.insert(guid), "dynamic guid {guid} issued twice");
        }
    }
}

#[test]
fn test_static_guids_deterministic() {
    let a = GuidGenerator::new();
    let b = GuidGenerator::new();
    assert_eq!(a.static_guid("name"), b.static_guid("name"));
    assert_ne!(a.static_guid("name"), a.static_guid("type"));
}

#[test]
fn test_static_and_dynamic_spaces_disjoint() {
    let gen = GuidGenerator::new();
    assert!(gen.static_guid("connection").is_static());
    for _ in 0..100 {
        assert!(!gen.next_guid().is_static());
    }
}

#[test]
fn test_reset_restarts_sequence() {
    let gen = GuidGenerator::new();
    let first = gen.next_guid();
    gen.next_guid();
    gen.reset();
    assert_eq!(gen.next_guid(), first);
}
