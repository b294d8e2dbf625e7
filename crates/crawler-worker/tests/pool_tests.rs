use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::Mutex;

use crawler_core::{DeviceType, NetsshError};
use crawler_fsm::DeviceState;
use crawler_store::Store;
use crawler_worker::session::{DeviceDriver, ParsedRecord, SessionFactory};
use crawler_worker::{run_once, WorkerError};
use indexmap::IndexMap;
use mockall::mock;
use serde_json::Value;
use tempfile::NamedTempFile;

mock! {
    pub Driver {}

    impl DeviceDriver for Driver {
        fn detect_os(&mut self) -> Result<DeviceType, NetsshError>;
        fn run(&mut self, command: &str) -> Result<String, NetsshError>;
        fn run_and_parse(
            &mut self,
            command: &str,
        ) -> Result<(String, Option<Vec<ParsedRecord>>), NetsshError>;
        fn disconnect(&mut self);
    }
}

/// Hands out a pre-scripted `MockDriver` per address. Each address may
/// only be opened once, matching how `drive_device` opens exactly one
/// session per claimed device.
struct ScriptedFactory {
    builders: Mutex<HashMap<String, Box<dyn Fn() -> MockDriver + Send>>>,
}

impl ScriptedFactory {
    fn new() -> Self {
        Self {
            builders: Mutex::new(HashMap::new()),
        }
    }

    fn script(&self, address: &str, builder: impl Fn() -> MockDriver + Send + 'static) {
        self.builders
            .lock()
            .unwrap()
            .insert(address.to_string(), Box::new(builder));
    }
}

impl SessionFactory for ScriptedFactory {
    fn open(&self, address: &str) -> Box<dyn DeviceDriver> {
        let builders = self.builders.lock().unwrap();
        let builder = builders
            .get(address)
            .unwrap_or_else(|| panic!("no scripted driver for {address}"));
        Box::new(builder())
    }
}

fn record(fields: &[(&str, &str)]) -> ParsedRecord {
    let mut map: IndexMap<String, Value> = IndexMap::new();
    for (k, v) in fields {
        map.insert(k.to_string(), Value::String(v.to_string()));
    }
    map
}

/// A driver for an IOS device with `hostname`/`serial`, zero neighbors on
/// both CDP and LLDP.
fn ios_no_neighbors(hostname: &'static str, serial: &'static str) -> MockDriver {
    let mut driver = MockDriver::new();
    driver.expect_detect_os().returning(|| Ok(DeviceType::CiscoIos));
    driver.expect_run_and_parse().returning(move |cmd| match cmd {
        "show version" => Ok((
            "raw".to_string(),
            Some(vec![record(&[("HOSTNAME", hostname), ("SERIAL", serial)])]),
        )),
        "show cdp neighbors detail" => Ok(("raw".to_string(), Some(vec![]))),
        "show lldp neighbors detail" => Ok(("raw".to_string(), None)),
        other => panic!("unexpected command: {other}"),
    });
    driver.expect_disconnect().returning(|| ());
    driver
}

/// A driver for an NX-OS device that reports exactly one CDP neighbor.
fn nxos_with_neighbor(
    hostname: &'static str,
    serial: &'static str,
    neighbor_address: &'static str,
    neighbor_hostname: &'static str,
) -> MockDriver {
    let mut driver = MockDriver::new();
    driver.expect_detect_os().returning(|| Ok(DeviceType::CiscoNxos));
    driver.expect_run_and_parse().returning(move |cmd| match cmd {
        "show version" => Ok((
            "raw".to_string(),
            Some(vec![record(&[("HOSTNAME", hostname), ("SERIAL", serial)])]),
        )),
        "show cdp neighbors detail" => Ok((
            "raw".to_string(),
            Some(vec![record(&[
                ("NEIGHBOR_NAME", neighbor_hostname),
                ("MGMT_ADDRESS", neighbor_address),
                ("LOCAL_INTERFACE", "mgmt0"),
            ])]),
        )),
        other => panic!("unexpected command: {other}"),
    });
    driver.expect_disconnect().returning(|| ());
    driver
}

fn auth_failure_driver() -> MockDriver {
    let mut driver = MockDriver::new();
    driver
        .expect_detect_os()
        .returning(|| Err(NetsshError::AuthenticationError("bad password".to_string())));
    driver.expect_disconnect().returning(|| ());
    driver
}

fn unknown_platform_no_parse() -> MockDriver {
    let mut driver = MockDriver::new();
    driver.expect_detect_os().returning(|| Ok(DeviceType::Unknown));
    driver.expect_run_and_parse().returning(|cmd| match cmd {
        "show version" => Ok(("raw".to_string(), None)),
        "show cdp neighbors detail" => Ok(("raw".to_string(), None)),
        "show lldp neighbors detail" => Ok(("raw".to_string(), None)),
        other => panic!("unexpected command: {other}"),
    });
    driver.expect_disconnect().returning(|| ());
    driver
}

fn temp_store() -> (NamedTempFile, Store) {
    let file = NamedTempFile::new().expect("create temp db file");
    let store = Store::open(file.path().to_str().unwrap()).expect("open store");
    (file, store)
}

/// Scenario 1: a seed-only IOS device with zero CDP/LLDP neighbors reaches
/// DONE in one worker pass.
#[test]
fn seed_only_device_with_no_neighbors_reaches_done() {
    let (_file, store) = temp_store();
    let factory = ScriptedFactory::new();
    factory.script("10.0.0.1", || ios_no_neighbors("sw1", "FOC111"));

    store.add_device("10.0.0.1", None).unwrap();
    let seed_claimed = AtomicBool::new(false);

    let claimed = run_once("w1", &store, &factory, 3, Some("10.0.0.1"), &seed_claimed);
    assert!(claimed);

    let device = store.get_by_address("10.0.0.1").unwrap().unwrap();
    assert_eq!(device.state, DeviceState::Done);
    assert_eq!(device.hostname.as_deref(), Some("sw1"));
    assert_eq!(device.serial.as_deref(), Some("FOC111"));
    assert!(device.enriched);
    assert!(device.claimed_by.is_none());

    assert!(!run_once("w1", &store, &factory, 3, Some("10.0.0.1"), &seed_claimed));
}

/// Scenario 2: a two-node NX-OS chain fully drains the queue without
/// looping forever — the neighbor discovered from node A is itself
/// finished by a second claim, and a third claim finds nothing left.
#[test]
fn two_node_chain_drains_without_looping() {
    let (_file, store) = temp_store();
    let factory = ScriptedFactory::new();
    factory.script("10.0.0.1", || {
        nxos_with_neighbor("core1", "FDO111", "10.0.0.2", "core2")
    });
    factory.script("10.0.0.2", || nxos_with_neighbor("core2", "FDO222", "10.0.0.1", "core1"));

    store.add_device("10.0.0.1", None).unwrap();
    let seed_claimed = AtomicBool::new(false);

    assert!(run_once("w1", &store, &factory, 3, Some("10.0.0.1"), &seed_claimed));
    assert!(run_once("w1", &store, &factory, 3, None, &seed_claimed));
    assert!(!run_once("w1", &store, &factory, 3, None, &seed_claimed));

    let a = store.get_by_address("10.0.0.1").unwrap().unwrap();
    let b = store.get_by_address("10.0.0.2").unwrap().unwrap();
    assert_eq!(a.state, DeviceState::Done);
    assert_eq!(b.state, DeviceState::Done);

    let a_edges = store.neighbors(a.id).unwrap();
    assert_eq!(a_edges.len(), 1);
    assert_eq!(a_edges[0].neighbor_address, "10.0.0.2");
}

/// Scenario 3: an authentication failure on the seed lands in ERROR
/// without incrementing the retry counter (auth failures never retry).
#[test]
fn auth_failure_lands_in_error_without_retry() {
    let (_file, store) = temp_store();
    let factory = ScriptedFactory::new();
    factory.script("10.0.0.1", auth_failure_driver);

    store.add_device("10.0.0.1", None).unwrap();
    let seed_claimed = AtomicBool::new(false);

    assert!(run_once("w1", &store, &factory, 3, Some("10.0.0.1"), &seed_claimed));

    let device = store.get_by_address("10.0.0.1").unwrap().unwrap();
    assert_eq!(device.state, DeviceState::Error);
    assert_eq!(device.retry_count, 0);
    assert!(device.last_error.as_deref().unwrap().contains("bad password"));
}

/// Scenario 5: a device of an unrecognized platform, whose output never
/// parses into structured records, still reaches DONE using only the raw
/// text fallback.
#[test]
fn unknown_platform_still_reaches_done() {
    let (_file, store) = temp_store();
    let factory = ScriptedFactory::new();
    factory.script("10.0.0.9", unknown_platform_no_parse);

    store.add_device("10.0.0.9", None).unwrap();
    let seed_claimed = AtomicBool::new(false);

    assert!(run_once("w1", &store, &factory, 3, Some("10.0.0.9"), &seed_claimed));

    let device = store.get_by_address("10.0.0.9").unwrap().unwrap();
    assert_eq!(device.state, DeviceState::Done);
    assert_eq!(device.platform.as_deref(), Some("unknown"));
    assert!(device.hostname.is_none());
}

/// `WorkerError::is_auth_failure` must recognize every authentication
/// variant `crawler-core` can raise, since that's what the retry
/// short-circuit depends on.
#[test]
fn is_auth_failure_covers_all_auth_variants() {
    assert!(WorkerError::Session(NetsshError::AuthenticationError("x".into())).is_auth_failure());
    assert!(WorkerError::Session(NetsshError::AuthError("x".into())).is_auth_failure());
    assert!(!WorkerError::Session(NetsshError::ConnectionError("x".into())).is_auth_failure());
}
