use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crawler_store::Store;
use tracing::{info, warn};

use crate::error::Result;
use crate::pool::{spawn_worker, Worker};
use crate::session::{SessionFactory, SshSessionFactory};

const DEFAULT_REAP_TTL_SECONDS: i64 = 300;
const REAPER_TICK: Duration = Duration::from_secs(60);

/// SSH credentials shared, read-only, by every worker for the life of the
/// crawl (spec.md §5).
pub struct Credentials {
    pub username: String,
    pub password: Option<String>,
}

/// Coordinator configuration, one-to-one with spec.md §4.5 / §6's CLI
/// flags.
pub struct CrawlConfig {
    pub seed: String,
    pub username: String,
    pub password: Option<String>,
    pub workers: usize,
    pub db_path: String,
    pub max_retries: i64,
    pub debug: bool,
}

impl CrawlConfig {
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.seed.trim().is_empty() {
            return Err("seed address must not be empty".to_string());
        }
        if self.username.trim().is_empty() {
            return Err("username must not be empty".to_string());
        }
        if self.workers < 1 {
            return Err("workers must be >= 1".to_string());
        }
        Ok(())
    }
}

/// Owns the store, the worker pool, and the reaper thread for one crawl
/// run. `start()` is non-blocking; `stop()` blocks until every thread has
/// exited (spec.md §5).
pub struct CrawlCoordinator {
    store: Arc<Store>,
    workers: Vec<Worker>,
    reaper: Option<JoinHandle<()>>,
    stop: Arc<AtomicBool>,
    seed_address: String,
}

impl CrawlCoordinator {
    /// Opens the store and ensures the seed device is enqueued. Does not
    /// yet spawn workers — call `start()` for that.
    pub fn new(config: &CrawlConfig) -> Result<Self> {
        let store = Arc::new(Store::open(&config.db_path)?);
        store.add_device(&config.seed, None)?;
        Ok(Self {
            store,
            workers: Vec::new(),
            reaper: None,
            stop: Arc::new(AtomicBool::new(false)),
            seed_address: config.seed.clone(),
        })
    }

    /// Spawns the reaper and `config.workers` worker threads. Returns once
    /// every thread is up and running; it does not wait for the crawl to
    /// finish.
    pub fn start(&mut self, config: &CrawlConfig) {
        info!(
            seed = %config.seed,
            workers = config.workers,
            max_retries = config.max_retries,
            "starting crawl"
        );

        self.reaper = Some(spawn_reaper(self.store.clone(), self.stop.clone()));

        let session_factory: Arc<dyn SessionFactory> = Arc::new(SshSessionFactory {
            username: config.username.clone(),
            password: config.password.clone(),
        });
        let seed: Arc<str> = Arc::from(config.seed.as_str());
        let seed_claimed = Arc::new(AtomicBool::new(false));

        for n in 0..config.workers {
            let worker = spawn_worker(
                format!("worker-{n}"),
                self.store.clone(),
                session_factory.clone(),
                self.stop.clone(),
                config.max_retries,
                Some(seed.clone()),
                seed_claimed.clone(),
            );
            self.workers.push(worker);
        }
    }

    /// Signals shutdown and blocks until every worker and the reaper have
    /// exited (spec.md §4.4 "Shutdown"). Workers finish their current
    /// device before observing the stop flag.
    pub fn stop(mut self) {
        info!(seed = %self.seed_address, "stopping crawl");
        self.stop.store(true, Ordering::Relaxed);
        for worker in self.workers.drain(..) {
            worker.join();
        }
        if let Some(reaper) = self.reaper.take() {
            if let Err(e) = reaper.join() {
                warn!(?e, "reaper thread panicked");
            }
        }
        info!("crawl stopped");
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }
}

fn spawn_reaper(store: Arc<Store>, stop: Arc<AtomicBool>) -> JoinHandle<()> {
    thread::spawn(move || {
        while !stop.load(Ordering::Relaxed) {
            thread::sleep(REAPER_TICK);
            if stop.load(Ordering::Relaxed) {
                break;
            }
            match store.reap_stale_claims(DEFAULT_REAP_TTL_SECONDS) {
                Ok(0) => {}
                Ok(n) => info!(reaped = n, "reaper reclaimed stale device claims"),
                Err(e) => warn!(error = %e, "reaper tick failed"),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_seed() {
        let config = CrawlConfig {
            seed: "".to_string(),
            username: "admin".to_string(),
            password: None,
            workers: 4,
            db_path: ":memory:".to_string(),
            max_retries: 3,
            debug: false,
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_zero_workers() {
        let config = CrawlConfig {
            seed: "10.0.0.1".to_string(),
            username: "admin".to_string(),
            password: None,
            workers: 0,
            db_path: ":memory:".to_string(),
            max_retries: 3,
            debug: false,
        };
        assert!(config.validate().is_err());
    }
}
