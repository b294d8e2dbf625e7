use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crawler_fsm::{create_transition, DeviceState};
use crawler_store::Store;
use tracing::{debug, error, info, instrument, warn};

use crate::error::{Result, WorkerError};
use crate::session::{DeviceDriver, SessionFactory};

const IDLE_SLEEP: Duration = Duration::from_secs(1);
const CDP_COMMAND: &str = "show cdp neighbors detail";
const LLDP_COMMAND: &str = "show lldp neighbors detail";

/// One running worker thread. Dropping the handle does not stop the
/// worker — flip the shared stop flag and `join()` instead (`spec.md`
/// §4.4 "Shutdown").
pub struct Worker {
    pub id: String,
    handle: JoinHandle<()>,
}

impl Worker {
    pub fn join(self) {
        if let Err(e) = self.handle.join() {
            error!(worker_id = %self.id, ?e, "worker thread panicked");
        }
    }
}

/// Spawns one worker thread that repeatedly claims a device, drives it
/// through the FSM to a release point, and loops until `stop` is set.
///
/// `seed` and `seed_claimed` implement spec.md §4.4's best-effort seed
/// priority: every worker prefers the seed address until any worker has
/// claimed it once.
pub fn spawn_worker(
    id: String,
    store: Arc<Store>,
    session_factory: Arc<dyn SessionFactory>,
    stop: Arc<AtomicBool>,
    max_retries: i64,
    seed: Option<Arc<str>>,
    seed_claimed: Arc<AtomicBool>,
) -> Worker {
    let worker_id = id.clone();
    let handle = thread::spawn(move || {
        worker_loop(
            worker_id,
            store,
            session_factory,
            stop,
            max_retries,
            seed,
            seed_claimed,
        )
    });
    Worker { id, handle }
}

fn worker_loop(
    worker_id: String,
    store: Arc<Store>,
    session_factory: Arc<dyn SessionFactory>,
    stop: Arc<AtomicBool>,
    max_retries: i64,
    seed: Option<Arc<str>>,
    seed_claimed: Arc<AtomicBool>,
) {
    info!(worker_id, "worker started");
    while !stop.load(Ordering::Relaxed) {
        if !run_once(
            &worker_id,
            &store,
            &*session_factory,
            max_retries,
            seed.as_deref(),
            &seed_claimed,
        ) {
            thread::sleep(IDLE_SLEEP);
        }
    }
    info!(worker_id, "worker stopped");
}

/// Claims, drives, and releases at most one device. Returns `true` if a
/// device was actually claimed (whether or not driving it succeeded), so
/// the caller can skip its idle sleep. Split out from `worker_loop` so
/// tests can drive one claim deterministically instead of racing a
/// background thread.
pub fn run_once(
    worker_id: &str,
    store: &Store,
    session_factory: &dyn SessionFactory,
    max_retries: i64,
    seed: Option<&str>,
    seed_claimed: &AtomicBool,
) -> bool {
    let claimed = claim_next(worker_id, store, seed, seed_claimed);

    let device = match claimed {
        Ok(Some(device)) => device,
        Ok(None) => return false,
        Err(e) => {
            error!(worker_id, error = %e, "claim failed");
            return false;
        }
    };

    if let Some(seed_addr) = seed {
        if device.address == seed_addr {
            seed_claimed.store(true, Ordering::Relaxed);
        }
    }

    let id = device.id;
    if let Err(e) = drive_device(worker_id, store, session_factory, device, max_retries) {
        error!(worker_id, device_id = id, error = %e, "drive_device failed unexpectedly");
    }
    if let Err(e) = store.release(id) {
        error!(worker_id, device_id = id, error = %e, "failed to release claim");
    }
    true
}

fn claim_next(
    worker_id: &str,
    store: &Store,
    seed: Option<&str>,
    seed_claimed: &AtomicBool,
) -> crawler_store::Result<Option<crawler_store::Device>> {
    match seed {
        Some(addr) if !seed_claimed.load(Ordering::Relaxed) => {
            store.claim_preferring(worker_id, addr)
        }
        _ => store.claim(worker_id),
    }
}

/// Drives one claimed device through the FSM until it reaches a release
/// point (`DONE`, a non-retryable `ERROR`, or a requeue to `QUEUED`).
///
/// The device is claimed exactly once for this whole run: `store::claim`
/// only ever pulls `QUEUED` rows (spec.md §4.3), so a device that needs to
/// keep moving through `CONNECTING` → `COLLECTING` → `DISCOVERED` can't be
/// re-claimed mid-pipeline — this function keeps driving it internally
/// instead, matching spec.md §4.4's per-state dispatch table without
/// requiring a second `claim()` between steps. See DESIGN.md for the
/// reasoning behind this reading of the spec.
#[instrument(skip(store, session_factory), fields(device_id = device.id, address = %device.address))]
fn drive_device(
    worker_id: &str,
    store: &Store,
    session_factory: &dyn SessionFactory,
    mut device: crawler_store::Device,
    max_retries: i64,
) -> Result<()> {
    let mut session: Option<Box<dyn DeviceDriver>> = None;

    loop {
        let outcome = match device.state {
            DeviceState::Connecting => step_connecting(session_factory, &mut session, &device),
            DeviceState::Collecting => step_collecting(store, &mut session, &device),
            DeviceState::Discovered => step_discovered(store, &mut session, &device),
            DeviceState::Enriched => step_enriched(store, &device),
            DeviceState::Done => break,
            DeviceState::Queued | DeviceState::Error => {
                warn!(worker_id, device_id = device.id, state = %device.state, "drive_device entered with an unexpected state");
                break;
            }
        };

        match outcome {
            Ok(Step::Advance(next, error)) => {
                apply_transition(store, &mut device, next, error)?;
            }
            Err(e) => {
                let auth_failure = e.is_auth_failure();
                apply_transition(store, &mut device, DeviceState::Error, Some(e.to_string()))?;
                if auth_failure {
                    warn!(worker_id, device_id = device.id, "authentication failed, not retrying");
                    break;
                }
            }
        }

        if device.state == DeviceState::Error {
            if device.retry_count < max_retries {
                store.increment_retry(device.id)?;
                device.retry_count += 1;
                apply_transition(store, &mut device, DeviceState::Queued, None)?;
            } else {
                warn!(worker_id, device_id = device.id, retry_count = device.retry_count, "device exhausted retries, leaving in ERROR");
            }
            break;
        }

        if device.state == DeviceState::Queued || device.state == DeviceState::Done {
            break;
        }
    }

    if let Some(mut s) = session.take() {
        s.disconnect();
    }

    Ok(())
}

enum Step {
    Advance(DeviceState, Option<String>),
}

fn apply_transition(
    store: &Store,
    device: &mut crawler_store::Device,
    to: DeviceState,
    error: Option<String>,
) -> Result<()> {
    let transition = create_transition(device.state, to, error)?;
    store.update_state(device.id, transition)?;
    device.state = to;
    Ok(())
}

fn ensure_session<'a>(
    session_factory: &dyn SessionFactory,
    session: &'a mut Option<Box<dyn DeviceDriver>>,
    address: &str,
) -> &'a mut Box<dyn DeviceDriver> {
    session.get_or_insert_with(|| session_factory.open(address))
}

fn step_connecting(
    session_factory: &dyn SessionFactory,
    session: &mut Option<Box<dyn DeviceDriver>>,
    device: &crawler_store::Device,
) -> Result<Step> {
    let driver = ensure_session(session_factory, session, &device.address);
    let os = driver.detect_os()?;
    debug!(device_id = device.id, ?os, "detected device os");
    Ok(Step::Advance(DeviceState::Collecting, None))
}

fn step_collecting(
    store: &Store,
    session: &mut Option<Box<dyn DeviceDriver>>,
    device: &crawler_store::Device,
) -> Result<Step> {
    let driver = session
        .as_mut()
        .expect("COLLECTING is only reached after CONNECTING opened a session");

    let (_raw, parsed) = driver.run_and_parse("show version")?;
    let mut update = crawler_store::DeviceInfoUpdate::default();
    update.last_seen = Some(chrono::Utc::now());

    if let Some(records) = parsed.as_ref().and_then(|r| r.first()) {
        update.hostname = records
            .get("HOSTNAME")
            .or_else(|| records.get("HOSTNAME_OUT"))
            .and_then(|v| v.as_str())
            .map(|s| s.to_string());
        update.serial = records
            .get("SERIAL")
            .or_else(|| records.get("SERIAL_NUMBER"))
            .and_then(|v| v.as_str())
            .map(|s| s.to_string());
    }
    update.platform = Some(driver.detect_os().map_err(WorkerError::from)?.to_string());

    store.update_info(device.id, update)?;
    Ok(Step::Advance(DeviceState::Discovered, None))
}

fn step_discovered(
    store: &Store,
    session: &mut Option<Box<dyn DeviceDriver>>,
    device: &crawler_store::Device,
) -> Result<Step> {
    let driver = session
        .as_mut()
        .expect("DISCOVERED is only reached after CONNECTING opened a session");

    let (_raw, cdp) = driver.run_and_parse(CDP_COMMAND)?;
    let records = match cdp {
        Some(records) if !records.is_empty() => records,
        _ => {
            let (_raw, lldp) = driver.run_and_parse(LLDP_COMMAND)?;
            lldp.unwrap_or_default()
        }
    };

    let edges: Vec<crawler_store::NeighborEdge> = records
        .iter()
        .filter_map(|record| {
            let address = record
                .get("MGMT_ADDRESS")
                .or_else(|| record.get("NEIGHBOR_ADDRESS"))
                .or_else(|| record.get("MANAGEMENT_IP"))
                .and_then(|v| v.as_str())?
                .to_string();
            if address.is_empty() {
                return None;
            }
            Some(crawler_store::NeighborEdge {
                device_id: device.id,
                neighbor_address: address,
                neighbor_hostname: record
                    .get("NEIGHBOR_NAME")
                    .or_else(|| record.get("NEIGHBOR"))
                    .and_then(|v| v.as_str())
                    .map(|s| s.to_string()),
                neighbor_interface: record
                    .get("LOCAL_INTERFACE")
                    .and_then(|v| v.as_str())
                    .map(|s| s.to_string()),
            })
        })
        .collect();

    if !edges.is_empty() {
        store.add_neighbors(device.id, &edges)?;
    }

    let next = if device.enriched {
        DeviceState::Done
    } else {
        DeviceState::Enriched
    };
    Ok(Step::Advance(next, None))
}

/// Reserved follow-on collection step (spec.md §4.2 — currently a
/// pass-through; see DESIGN.md for the Open Question decision). Marks the
/// device enriched so a future re-crawl's DISCOVERED step can skip
/// straight to DONE.
fn step_enriched(store: &Store, device: &crawler_store::Device) -> Result<Step> {
    store.mark_enriched(device.id)?;
    Ok(Step::Advance(DeviceState::Done, None))
}
