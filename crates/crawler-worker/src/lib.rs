//! # Worker Pool
//!
//! Drives devices through the discovery state machine: claims a queued
//! device from the store, opens an SSH session, issues `show version` and
//! a neighbor-discovery command, and records the result back to the store.
//!
//! Workers are plain OS threads, not async tasks (`crawler-store`'s
//! sqlx usage is hidden behind a blocking facade for exactly this reason).

pub mod coordinator;
pub mod error;
pub mod pool;
pub mod session;

pub use coordinator::{CrawlConfig, CrawlCoordinator, Credentials};
pub use error::{Result, WorkerError};
pub use pool::{run_once, spawn_worker, Worker};
pub use session::{DeviceDriver, ParsedRecord, SessionFactory, SshSessionFactory};
