use chrono::{DateTime, Utc};
use crawler_fsm::DeviceState;

/// A row of the `devices` table.
#[derive(Debug, Clone)]
pub struct Device {
    pub id: i64,
    pub address: String,
    pub hostname: Option<String>,
    pub serial: Option<String>,
    pub platform: Option<String>,
    pub state: DeviceState,
    pub last_seen: Option<DateTime<Utc>>,
    pub enriched: bool,
    pub last_error: Option<String>,
    pub claimed_by: Option<String>,
    pub retry_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A directly observed neighbor adjacency, as returned by CDP or LLDP.
#[derive(Debug, Clone)]
pub struct NeighborEdge {
    pub device_id: i64,
    pub neighbor_address: String,
    pub neighbor_hostname: Option<String>,
    pub neighbor_interface: Option<String>,
}

/// Partial update for `Store::update_info`. Only `Some` fields are written.
#[derive(Debug, Clone, Default)]
pub struct DeviceInfoUpdate {
    pub hostname: Option<String>,
    pub platform: Option<String>,
    pub serial: Option<String>,
    pub last_seen: Option<DateTime<Utc>>,
}
