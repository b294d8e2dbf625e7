use std::path::Path;
use std::str::FromStr;
use std::sync::Mutex;

use chrono::Utc;
use crawler_fsm::{DeviceState, StateTransition};
use sqlx::{sqlite::SqliteConnectOptions, Row, SqlitePool};
use tracing::{error, info, warn};

use crate::error::{Result, StoreError};
use crate::model::{Device, DeviceInfoUpdate, NeighborEdge};

/// Durable, transactional backing for devices, neighbor edges and the
/// transition audit log.
///
/// The crawler's worker pool is deliberately blocking (`spec.md` §9: "Keep
/// the blocking model"), but this repository's database engine of choice is
/// `sqlx`, which is async-only. `Store` reconciles the two by owning a
/// private, current-thread `tokio::runtime::Runtime` and exposing a fully
/// synchronous public API — every method below blocks the calling worker
/// thread for the duration of its query, exactly as a blocking DB driver
/// would, with no `.await` visible to callers.
pub struct Store {
    pool: SqlitePool,
    runtime: tokio::runtime::Runtime,
    // Serializes the claim critical section across worker threads, per
    // spec.md §4.3's "process-level mutex around a short-lived database
    // connection per transaction" requirement.
    claim_guard: Mutex<()>,
}

impl Store {
    /// Open (creating if missing) the SQLite database at `db_path` and
    /// ensure its schema exists.
    pub fn open(db_path: &str) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| StoreError::Migration(format!("failed to start store runtime: {e}")))?;

        if let Some(parent) = Path::new(db_path).parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let pool = runtime.block_on(async {
            let options = SqliteConnectOptions::from_str(&format!("sqlite://{db_path}"))
                .map_err(|e| StoreError::Migration(format!("invalid db path {db_path}: {e}")))?
                .create_if_missing(true);

            info!(db_path, "opening crawl store");
            let pool = SqlitePool::connect_with(options).await?;
            create_schema(&pool).await?;
            Ok::<_, StoreError>(pool)
        })?;

        Ok(Self {
            pool,
            runtime,
            claim_guard: Mutex::new(()),
        })
    }

    /// Idempotent on `address`. Returns the device's id whether it already
    /// existed or was just created.
    pub fn add_device(&self, address: &str, hostname: Option<&str>) -> Result<i64> {
        self.runtime.block_on(async {
            if let Some(existing) = fetch_by_address(&self.pool, address).await? {
                return Ok(existing.id);
            }
            let now = Utc::now();
            let result = sqlx::query(
                r#"INSERT INTO devices (address, hostname, state, enriched, retry_count, created_at, updated_at)
                   VALUES (?, ?, 'queued', 0, 0, ?, ?)
                   ON CONFLICT(address) DO NOTHING"#,
            )
            .bind(address)
            .bind(hostname)
            .bind(now.to_rfc3339())
            .bind(now.to_rfc3339())
            .execute(&self.pool)
            .await?;

            if result.rows_affected() == 1 {
                return Ok(result.last_insert_rowid());
            }
            // Lost a race with another inserter between the lookup and the
            // insert; the row now exists under the unique address index.
            let row = fetch_by_address(&self.pool, address)
                .await?
                .ok_or_else(|| StoreError::Migration("insert raced but row vanished".into()))?;
            Ok(row.id)
        })
    }

    /// Atomically claim one `QUEUED` device, oldest first, or `None` if none
    /// is available. No two concurrent callers can observe the same row.
    pub fn claim(&self, worker_id: &str) -> Result<Option<Device>> {
        let _guard = self.claim_guard.lock().unwrap();
        self.runtime.block_on(async {
            let mut tx = self.pool.begin().await?;
            let now = Utc::now();
            let row = sqlx::query(
                r#"UPDATE devices
                   SET claimed_by = ?, state = 'connecting', updated_at = ?
                   WHERE id = (
                       SELECT id FROM devices WHERE state = 'queued'
                       ORDER BY created_at ASC LIMIT 1
                   )
                   RETURNING *"#,
            )
            .bind(worker_id)
            .bind(now.to_rfc3339())
            .fetch_optional(&mut *tx)
            .await?;

            let device = row.map(|r| row_to_device(&r)).transpose()?;
            tx.commit().await?;
            Ok(device)
        })
    }

    /// Preferentially claim a specific address if it is still `QUEUED`;
    /// otherwise behaves like `claim`. Best-effort seed priority
    /// (`spec.md` §4.4) — correctness never depends on this succeeding.
    pub fn claim_preferring(&self, worker_id: &str, preferred_address: &str) -> Result<Option<Device>> {
        let _guard = self.claim_guard.lock().unwrap();
        self.runtime.block_on(async {
            let mut tx = self.pool.begin().await?;
            let now = Utc::now();
            let row = sqlx::query(
                r#"UPDATE devices
                   SET claimed_by = ?, state = 'connecting', updated_at = ?
                   WHERE id = (
                       SELECT id FROM devices WHERE state = 'queued' AND address = ? LIMIT 1
                   )
                   RETURNING *"#,
            )
            .bind(worker_id)
            .bind(now.to_rfc3339())
            .bind(preferred_address)
            .fetch_optional(&mut *tx)
            .await?;

            // Fall back to FIFO claim of any queued device within the same
            // transaction, so the mutex guard is held for one critical
            // section regardless of which branch is taken.
            let row = match row {
                Some(r) => Some(r),
                None => {
                    sqlx::query(
                        r#"UPDATE devices
                           SET claimed_by = ?, state = 'connecting', updated_at = ?
                           WHERE id = (
                               SELECT id FROM devices WHERE state = 'queued'
                               ORDER BY created_at ASC LIMIT 1
                           )
                           RETURNING *"#,
                    )
                    .bind(worker_id)
                    .bind(now.to_rfc3339())
                    .fetch_optional(&mut *tx)
                    .await?
                }
            };

            let device = row.map(|r| row_to_device(&r)).transpose()?;
            tx.commit().await?;
            Ok(device)
        })
    }

    pub fn get_by_address(&self, address: &str) -> Result<Option<Device>> {
        self.runtime.block_on(fetch_by_address(&self.pool, address))
    }

    /// All neighbor edges recorded for `device_id`, in insertion order.
    /// Edges are append-only (`spec.md` §3), so a neighbor re-seen on a
    /// later crawl shows up as a second row here.
    pub fn neighbors(&self, device_id: i64) -> Result<Vec<NeighborEdge>> {
        self.runtime.block_on(async {
            let rows = sqlx::query(
                "SELECT * FROM device_neighbors WHERE device_id = ? ORDER BY id ASC",
            )
            .bind(device_id)
            .fetch_all(&self.pool)
            .await?;

            rows.iter()
                .map(|r| {
                    Ok(NeighborEdge {
                        device_id: r.try_get("device_id")?,
                        neighbor_address: r.try_get("neighbor_address")?,
                        neighbor_hostname: r.try_get("neighbor_hostname")?,
                        neighbor_interface: r.try_get("neighbor_interface")?,
                    })
                })
                .collect::<Result<Vec<_>>>()
        })
    }

    pub fn get_by_id(&self, id: i64) -> Result<Option<Device>> {
        self.runtime.block_on(async {
            let row = sqlx::query("SELECT * FROM devices WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
            row.map(|r| row_to_device(&r)).transpose()
        })
    }

    /// Apply a validated `StateTransition`: update `state`/`updated_at`/
    /// `last_error`, and append the audit row. `transition.device_id` is
    /// overwritten with `id` so callers don't need to thread it through
    /// `create_transition`.
    pub fn update_state(&self, id: i64, mut transition: StateTransition) -> Result<()> {
        transition.device_id = id;
        self.runtime.block_on(async {
            let mut tx = self.pool.begin().await?;
            sqlx::query(
                r#"UPDATE devices SET state = ?, last_error = ?, updated_at = ? WHERE id = ?"#,
            )
            .bind(transition.to.as_db_str())
            .bind(&transition.error)
            .bind(transition.at.to_rfc3339())
            .bind(id)
            .execute(&mut *tx)
            .await?;

            sqlx::query(
                r#"INSERT INTO state_transitions (device_id, from_state, to_state, at, error)
                   VALUES (?, ?, ?, ?, ?)"#,
            )
            .bind(id)
            .bind(transition.from.as_db_str())
            .bind(transition.to.as_db_str())
            .bind(transition.at.to_rfc3339())
            .bind(&transition.error)
            .execute(&mut *tx)
            .await?;

            tx.commit().await?;
            Ok(())
        })
    }

    /// Partial update of identity/inventory fields. Only `Some` fields in
    /// `update` are written.
    pub fn update_info(&self, id: i64, update: DeviceInfoUpdate) -> Result<()> {
        self.runtime.block_on(async {
            let now = Utc::now();
            sqlx::query(
                r#"UPDATE devices SET
                       hostname = COALESCE(?, hostname),
                       platform = COALESCE(?, platform),
                       serial = COALESCE(?, serial),
                       last_seen = COALESCE(?, last_seen),
                       updated_at = ?
                   WHERE id = ?"#,
            )
            .bind(&update.hostname)
            .bind(&update.platform)
            .bind(&update.serial)
            .bind(update.last_seen.map(|t| t.to_rfc3339()))
            .bind(now.to_rfc3339())
            .bind(id)
            .execute(&self.pool)
            .await?;
            Ok(())
        })
    }

    /// Marks a device as having completed the `ENRICHED` step at least
    /// once. spec.md §4.2 uses this flag to let a future re-crawl skip
    /// straight from `DISCOVERED` to `DONE`.
    pub fn mark_enriched(&self, id: i64) -> Result<()> {
        self.runtime.block_on(async {
            sqlx::query("UPDATE devices SET enriched = 1, updated_at = ? WHERE id = ?")
                .bind(Utc::now().to_rfc3339())
                .bind(id)
                .execute(&self.pool)
                .await?;
            Ok(())
        })
    }

    /// Append each edge and idempotently ensure the neighbor exists as a
    /// device row (`spec.md` §4.3, §9 — this is how cycles are broken).
    pub fn add_neighbors(&self, id: i64, neighbors: &[NeighborEdge]) -> Result<()> {
        for n in neighbors {
            self.runtime.block_on(async {
                sqlx::query(
                    r#"INSERT INTO device_neighbors (device_id, neighbor_address, neighbor_hostname, neighbor_interface)
                       VALUES (?, ?, ?, ?)"#,
                )
                .bind(id)
                .bind(&n.neighbor_address)
                .bind(&n.neighbor_hostname)
                .bind(&n.neighbor_interface)
                .execute(&self.pool)
                .await
            })?;
            self.add_device(&n.neighbor_address, n.neighbor_hostname.as_deref())?;
        }
        Ok(())
    }

    /// Clear the claim without touching `state`.
    pub fn release(&self, id: i64) -> Result<()> {
        self.runtime.block_on(async {
            sqlx::query("UPDATE devices SET claimed_by = NULL WHERE id = ?")
                .bind(id)
                .execute(&self.pool)
                .await?;
            Ok(())
        })
    }

    pub fn increment_retry(&self, id: i64) -> Result<()> {
        self.runtime.block_on(async {
            sqlx::query("UPDATE devices SET retry_count = retry_count + 1 WHERE id = ?")
                .bind(id)
                .execute(&self.pool)
                .await?;
            Ok(())
        })
    }

    /// Reclaim devices whose claim holder has gone silent for longer than
    /// `ttl_seconds`. Default TTL is 300s per `spec.md` §4.3.
    pub fn reap_stale_claims(&self, ttl_seconds: i64) -> Result<u64> {
        self.runtime.block_on(async {
            let cutoff = Utc::now() - chrono::Duration::seconds(ttl_seconds);
            let result = sqlx::query(
                r#"UPDATE devices
                   SET claimed_by = NULL, state = 'queued', retry_count = retry_count + 1
                   WHERE claimed_by IS NOT NULL AND updated_at < ?"#,
            )
            .bind(cutoff.to_rfc3339())
            .execute(&self.pool)
            .await?;
            let reaped = result.rows_affected();
            if reaped > 0 {
                warn!(reaped, ttl_seconds, "reaped stale device claims");
            }
            Ok(reaped)
        })
    }
}

async fn fetch_by_address(pool: &SqlitePool, address: &str) -> Result<Option<Device>> {
    let row = sqlx::query("SELECT * FROM devices WHERE address = ?")
        .bind(address)
        .fetch_optional(pool)
        .await?;
    row.map(|r| row_to_device(&r)).transpose()
}

fn row_to_device(row: &sqlx::sqlite::SqliteRow) -> Result<Device> {
    let state_str: String = row.try_get("state")?;
    let state = DeviceState::from_db_str(&state_str)
        .ok_or_else(|| StoreError::Migration(format!("unknown state in db: {state_str}")))?;

    let parse_ts = |s: Option<String>| -> Option<chrono::DateTime<Utc>> {
        s.and_then(|s| chrono::DateTime::parse_from_rfc3339(&s).ok())
            .map(|t| t.with_timezone(&Utc))
    };

    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;

    Ok(Device {
        id: row.try_get("id")?,
        address: row.try_get("address")?,
        hostname: row.try_get("hostname")?,
        serial: row.try_get("serial")?,
        platform: row.try_get("platform")?,
        state,
        last_seen: parse_ts(row.try_get("last_seen")?),
        enriched: row.try_get::<i64, _>("enriched")? != 0,
        last_error: row.try_get("last_error")?,
        claimed_by: row.try_get("claimed_by")?,
        retry_count: row.try_get("retry_count")?,
        created_at: parse_ts(Some(created_at)).unwrap_or_else(Utc::now),
        updated_at: parse_ts(Some(updated_at)).unwrap_or_else(Utc::now),
    })
}

async fn create_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS devices (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            address TEXT NOT NULL UNIQUE,
            hostname TEXT,
            serial TEXT,
            platform TEXT,
            state TEXT NOT NULL CHECK(state IN ('queued','connecting','collecting','discovered','enriched','done','error')),
            last_seen TEXT,
            enriched INTEGER NOT NULL DEFAULT 0,
            last_error TEXT,
            claimed_by TEXT,
            retry_count INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| {
        error!(error = %e, "failed to create devices table");
        e
    })?;

    sqlx::query("CREATE UNIQUE INDEX IF NOT EXISTS idx_devices_address ON devices(address)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_devices_state ON devices(state)")
        .execute(pool)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS device_neighbors (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            device_id INTEGER NOT NULL REFERENCES devices(id),
            neighbor_address TEXT NOT NULL,
            neighbor_hostname TEXT,
            neighbor_interface TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_device_neighbors_device_id ON device_neighbors(device_id)")
        .execute(pool)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS state_transitions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            device_id INTEGER NOT NULL REFERENCES devices(id),
            from_state TEXT NOT NULL,
            to_state TEXT NOT NULL,
            at TEXT NOT NULL,
            error TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_state_transitions_device_id ON state_transitions(device_id)")
        .execute(pool)
        .await?;

    info!("crawl store schema ready");
    Ok(())
}
