use super::{CounterDescriptor, CounterDirectory};
use crate::backend::BackendId;
use crate::error::Error;

fn descriptor(name: &str) -> CounterDescriptor {
    CounterDescriptor {
        name: name.to_string(),
        description: format!("{name} description"),
        ..Default::default()
    }
}

fn core() -> BackendId {
    BackendId::from("core")
}

#[test]
fn test_register_category() {
    let dir = CounterDirectory::new();
    let category = dir.register_category("inference").unwrap();
    assert_eq!(category.name, "inference");
    assert!(category.counter_uids.is_empty());
    assert!(dir.is_category_registered("inference"));
    assert_eq!(dir.category_count(), 1);

    match dir.register_category("inference").unwrap_err() {
        Error::AlreadyRegistered(_) => {}
        other => panic!("unexpected error: {other}"),
    }
    match dir.register_category("").unwrap_err() {
        Error::InvalidArgument(_) => {}
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_register_device_and_counter_set() {
    let dir = CounterDirectory::new();
    dir.register_category("inference").unwrap();

    let device = dir.register_device("npu", 4, Some("inference")).unwrap();
    assert_eq!(device.cores, 4);
    let set = dir.register_counter_set("totals", 2, Some("inference")).unwrap();
    assert_ne!(device.uid, set.uid);
    assert_eq!(dir.device_by_name("npu").unwrap().uid, device.uid);
    assert_eq!(dir.counter_set_by_name("totals").unwrap().uid, set.uid);
    assert_eq!(dir.device(device.uid).unwrap().name, "npu");
    assert_eq!(dir.counter_set(set.uid).unwrap().count, 2);

    // Parent category snapshots reflect the links.
    let category = dir.category("inference").unwrap();
    assert_eq!(category.device_uid, Some(device.uid));
    assert_eq!(category.counter_set_uid, Some(set.uid));

    // Missing parent fails, nothing is registered.
    assert!(dir.register_device("gpu", 2, Some("nope")).is_err());
    assert_eq!(dir.device_count(), 1);
}

#[test]
fn test_register_counter() {
    let dir = CounterDirectory::new();
    dir.register_category("inference").unwrap();

    let counter = dir
        .register_counter(&core(), 0, "inference", descriptor("jobs run"))
        .unwrap();
    assert_eq!(counter.uid, counter.max_uid);
    assert!(dir.is_counter_registered(counter.uid));
    assert_eq!(dir.counter_count(), 1);
    assert_eq!(dir.counter(counter.uid).unwrap().name, "jobs run");
    assert_eq!(dir.counter_by_name("jobs run").unwrap().uid, counter.uid);

    let category = dir.category("inference").unwrap();
    assert_eq!(category.counter_uids, vec![counter.uid]);
}

#[test]
fn test_register_counter_validation() {
    let dir = CounterDirectory::new();
    dir.register_category("inference").unwrap();

    assert!(dir
        .register_counter(&core(), 0, "inference", descriptor(""))
        .is_err());

    let mut bad_multiplier = descriptor("m");
    bad_multiplier.multiplier = 0.0;
    assert!(dir
        .register_counter(&core(), 0, "inference", bad_multiplier)
        .is_err());

    let mut zero_cores = descriptor("z");
    zero_cores.cores = Some(0);
    assert!(dir
        .register_counter(&core(), 0, "inference", zero_cores)
        .is_err());

    // Unknown parent and dangling references.
    assert!(dir
        .register_counter(&core(), 0, "nope", descriptor("a"))
        .is_err());
    let mut dangling = descriptor("d");
    dangling.device_uid = Some(42);
    assert!(dir
        .register_counter(&core(), 0, "inference", dangling)
        .is_err());

    // Name collision.
    dir.register_counter(&core(), 0, "inference", descriptor("taken"))
        .unwrap();
    assert!(dir
        .register_counter(&core(), 0, "inference", descriptor("taken"))
        .is_err());
}

#[test]
fn test_multi_core_counter_reserves_uid_range() {
    let dir = CounterDirectory::new();
    dir.register_category("inference").unwrap();

    let mut multi = descriptor("per-core cycles");
    multi.cores = Some(4);
    let counter = dir.register_counter(&core(), 0, "inference", multi).unwrap();
    assert_eq!(counter.max_uid, counter.uid + 3);
    assert_eq!(counter.cores(), 4);

    // Addressable through every reserved UID.
    for uid in counter.uid..=counter.max_uid {
        assert_eq!(dir.counter(uid).unwrap().name, "per-core cycles");
    }
    assert!(!dir.is_counter_registered(counter.max_uid + 1));

    // The next registration starts past the reserved range.
    let next = dir
        .register_counter(&core(), 0, "inference", descriptor("next"))
        .unwrap();
    assert_eq!(next.uid, counter.max_uid + 1);

    let category = dir.category("inference").unwrap();
    assert_eq!(category.counter_uids.len(), 5);
}

#[test]
fn test_uids_are_monotonic_and_not_reused() {
    let dir = CounterDirectory::new();
    dir.register_category("inference").unwrap();

    // A placement hint below the high-water mark is bumped up.
    let a = dir
        .register_counter(&core(), 10, "inference", descriptor("a"))
        .unwrap();
    assert_eq!(a.uid, 10);
    let b = dir
        .register_counter(&core(), 0, "inference", descriptor("b"))
        .unwrap();
    assert_eq!(b.uid, 11);

    // Devices and counter sets draw from the same pool.
    let device = dir.register_device("npu", 1, None).unwrap();
    assert_eq!(device.uid, 12);
}

#[test]
fn test_uid_space_cap() {
    let dir = CounterDirectory::new();
    dir.register_category("inference").unwrap();

    let mut near_cap = descriptor("near cap");
    near_cap.cores = Some(2);
    assert!(dir
        .register_counter(&core(), u16::MAX, "inference", near_cap)
        .is_err());
}

#[test]
fn test_clear() {
    let dir = CounterDirectory::new();
    dir.register_category("inference").unwrap();
    dir.register_counter(&core(), 0, "inference", descriptor("a"))
        .unwrap();

    dir.clear();
    assert_eq!(dir.category_count(), 0);
    assert_eq!(dir.counter_count(), 0);

    // The UID pool restarts.
    dir.register_category("inference").unwrap();
    let counter = dir
        .register_counter(&core(), 0, "inference", descriptor("a"))
        .unwrap();
    assert_eq!(counter.uid, 0);
}
