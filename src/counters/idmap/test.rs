use super::CounterIdMap;
use crate::backend::BackendId;

#[test]
fn test_round_trip() {
    let map = CounterIdMap::new();
    let npu = BackendId::from("npu");

    map.register(&npu, 0, 5);
    map.register(&npu, 1, 6);

    assert_eq!(map.global_id(&npu, 0).unwrap(), 5);
    assert_eq!(map.global_id(&npu, 1).unwrap(), 6);
    assert_eq!(map.backend_id(5).unwrap(), (npu.clone(), 0));
    assert_eq!(map.backend_id(6).unwrap(), (npu, 1));
}

#[test]
fn test_unmapped() {
    let map = CounterIdMap::new();
    assert!(map.global_id(&BackendId::from("npu"), 0).is_err());
    assert!(map.backend_id(5).is_none());
}

#[test]
fn test_reset() {
    let map = CounterIdMap::new();
    let npu = BackendId::from("npu");
    map.register(&npu, 0, 5);
    map.reset();
    assert!(map.backend_id(5).is_none());
}
