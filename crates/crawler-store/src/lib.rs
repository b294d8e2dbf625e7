//! Durable, transactional work queue for the crawl.
//!
//! `Store` is the sole interface the rest of the crawler uses to read or
//! mutate device state — see `spec.md` §4.3. It is backed by SQLite via
//! `sqlx`, but presents a synchronous API (see `store::Store` for why).

mod error;
mod model;
mod store;

pub use error::{Result, StoreError};
pub use model::{Device, DeviceInfoUpdate, NeighborEdge};
pub use store::Store;
