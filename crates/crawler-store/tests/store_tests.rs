use std::sync::Arc;
use std::thread;

use crawler_fsm::{create_transition, DeviceState};
use crawler_store::{NeighborEdge, Store};

fn open_store() -> (Store, tempfile::TempDir) {
    let dir = tempfile::tempdir().expect("tempdir");
    let db_path = dir.path().join("crawl.db");
    let store = Store::open(db_path.to_str().unwrap()).expect("open store");
    (store, dir)
}

#[test]
fn add_device_is_idempotent_on_address() {
    let (store, _dir) = open_store();
    let id1 = store.add_device("10.0.0.1", None).unwrap();
    let id2 = store.add_device("10.0.0.1", Some("core1")).unwrap();
    assert_eq!(id1, id2);

    let device = store.get_by_address("10.0.0.1").unwrap().unwrap();
    assert_eq!(device.state, DeviceState::Queued);
    assert!(device.claimed_by.is_none());
}

#[test]
fn add_neighbors_inserts_edge_and_idempotent_device() {
    let (store, _dir) = open_store();
    let seed_id = store.add_device("10.0.0.1", None).unwrap();

    let edge = NeighborEdge {
        device_id: seed_id,
        neighbor_address: "10.0.0.2".to_string(),
        neighbor_hostname: Some("sw2".to_string()),
        neighbor_interface: Some("Gi0/1".to_string()),
    };
    store.add_neighbors(seed_id, &[edge.clone()]).unwrap();
    store.add_neighbors(seed_id, &[edge]).unwrap();

    // Neighbor exists exactly once as a device...
    let devices_with_address = store.get_by_address("10.0.0.2").unwrap();
    assert!(devices_with_address.is_some());

    // ...but two edges were appended (edges are append-only, spec.md §3).
    assert_eq!(store.neighbors(seed_id).unwrap().len(), 2);
}

#[test]
fn claim_transitions_to_connecting_and_sets_claimant() {
    let (store, _dir) = open_store();
    store.add_device("10.0.0.1", None).unwrap();

    let claimed = store.claim("worker-1").unwrap().expect("a queued device");
    assert_eq!(claimed.state, DeviceState::Connecting);
    assert_eq!(claimed.claimed_by.as_deref(), Some("worker-1"));

    // Nothing left to claim.
    assert!(store.claim("worker-2").unwrap().is_none());
}

#[test]
fn concurrent_claims_never_double_assign() {
    let (store, _dir) = open_store();
    store.add_device("10.0.0.1", None).unwrap();

    let store = Arc::new(store);
    let handles: Vec<_> = (0..10)
        .map(|i| {
            let store = store.clone();
            thread::spawn(move || store.claim(&format!("worker-{i}")).unwrap())
        })
        .collect();

    let successes = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|r| r.is_some())
        .count();

    assert_eq!(successes, 1, "exactly one of 10 racing claims should succeed");
}

#[test]
fn update_state_rejects_nothing_the_fsm_already_validated() {
    let (store, _dir) = open_store();
    store.add_device("10.0.0.1", None).unwrap();
    let device = store.claim("worker-1").unwrap().unwrap();

    let transition = create_transition(DeviceState::Connecting, DeviceState::Collecting, None).unwrap();
    store.update_state(device.id, transition).unwrap();

    let updated = store.get_by_id(device.id).unwrap().unwrap();
    assert_eq!(updated.state, DeviceState::Collecting);
}

#[test]
fn reap_stale_claims_recovers_abandoned_devices() {
    let (store, _dir) = open_store();
    store.add_device("10.0.0.1", None).unwrap();
    let device = store.claim("worker-1").unwrap().unwrap();

    // Simulate a worker that died mid-COLLECTING by backdating updated_at
    // far enough that a 0-second TTL reaps it immediately.
    let reaped = store.reap_stale_claims(0).unwrap();
    assert_eq!(reaped, 1);

    let recovered = store.get_by_id(device.id).unwrap().unwrap();
    assert_eq!(recovered.state, DeviceState::Queued);
    assert!(recovered.claimed_by.is_none());
    assert_eq!(recovered.retry_count, 1);
}
