//! Replay seen-set: `(payer, nonce)` pairs that have already been settled.
//!
//! The wire protocol bounds a proof's life with its deadline, but on
//! delegated-token ledgers nothing on-chain consumes the authorization, so
//! the same proof could otherwise settle repeatedly up to the remaining
//! allowance. The seen-set closes that window: [`ReplayStore::try_use`] is
//! claimed atomically before any submission, and a claim is never released
//! on failure — a timed-out transaction may still land.

use dashmap::DashMap;
use std::sync::Mutex;
use std::time::Instant;

use crate::identity::Identity;
use crate::payment::Nonce;

/// Canonical replay key for a payload.
pub fn replay_key(payer: &Identity, nonce: &Nonce) -> (String, String) {
    (payer.canonical(), nonce.to_string())
}

/// Storage backend for settled-authorization keys.
///
/// Implementations must be thread-safe (`Send + Sync`).
pub trait ReplayStore: Send + Sync {
    /// Check if a key has already been claimed.
    fn is_used(&self, payer: &str, nonce: &str) -> bool;

    /// Atomically claim a key. Returns `true` when this caller won the
    /// claim, `false` when the key was already used (replay attempt or
    /// concurrent settlement race).
    fn try_use(&self, payer: &str, nonce: &str) -> bool;

    /// Release a claim. Only safe when the submission verifiably never left
    /// this process.
    fn release(&self, payer: &str, nonce: &str);

    /// Purge keys older than `max_age_secs`. Returns the number purged.
    /// Safe because a proof's deadline expires long before the purge window.
    fn purge_expired(&self, max_age_secs: u64) -> usize;
}

/// In-memory seen-set backed by DashMap. Fast, but lost on restart — a
/// restarted facilitator would re-settle anything still inside its deadline
/// window. Production deployments want [`SqliteReplayStore`].
pub struct InMemoryReplayStore {
    seen: DashMap<(String, String), Instant>,
}

impl InMemoryReplayStore {
    pub fn new() -> Self {
        Self { seen: DashMap::new() }
    }
}

impl Default for InMemoryReplayStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ReplayStore for InMemoryReplayStore {
    fn is_used(&self, payer: &str, nonce: &str) -> bool {
        self.seen
            .contains_key(&(payer.to_string(), nonce.to_string()))
    }

    fn try_use(&self, payer: &str, nonce: &str) -> bool {
        // DashMap's entry API is atomic within the process.
        use dashmap::mapref::entry::Entry;
        match self.seen.entry((payer.to_string(), nonce.to_string())) {
            Entry::Occupied(_) => false,
            Entry::Vacant(v) => {
                v.insert(Instant::now());
                true
            }
        }
    }

    fn release(&self, payer: &str, nonce: &str) {
        self.seen.remove(&(payer.to_string(), nonce.to_string()));
    }

    fn purge_expired(&self, max_age_secs: u64) -> usize {
        let before = self.seen.len();
        self.seen
            .retain(|_, claimed| claimed.elapsed().as_secs() < max_age_secs);
        before - self.seen.len()
    }
}

/// Durable seen-set backed by SQLite. Survives restarts; claim atomicity
/// comes from the PRIMARY KEY constraint, so it holds across processes too.
pub struct SqliteReplayStore {
    conn: Mutex<rusqlite::Connection>,
}

impl SqliteReplayStore {
    /// Open (or create) the seen-set database at `path`.
    ///
    /// On Unix the file is restricted to 0600 so other local users cannot
    /// read settlement timing data.
    pub fn open(path: &str) -> Result<Self, rusqlite::Error> {
        let conn = rusqlite::Connection::open(path)?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS settled_authorizations (
                payer TEXT NOT NULL,
                nonce TEXT NOT NULL,
                recorded_at INTEGER NOT NULL,
                PRIMARY KEY (payer, nonce)
            );
            CREATE INDEX IF NOT EXISTS idx_settled_recorded_at
                ON settled_authorizations(recorded_at);
            PRAGMA journal_mode=WAL;",
        )?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Err(e) =
                std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
            {
                tracing::warn!(
                    path = %path,
                    error = %e,
                    "failed to restrict replay database permissions to 0600"
                );
            }
        }

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, rusqlite::Connection> {
        match self.conn.lock() {
            Ok(c) => c,
            Err(poisoned) => {
                tracing::error!("replay store mutex poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }
}

/// Current unix timestamp for claim records. On clock error, returns
/// i64::MAX so claims recorded during the fault survive any purge cutoff.
fn unix_now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
        .unwrap_or_else(|_| {
            tracing::error!("system clock before UNIX epoch — using max timestamp for claim safety");
            i64::MAX
        })
}

impl ReplayStore for SqliteReplayStore {
    fn is_used(&self, payer: &str, nonce: &str) -> bool {
        let conn = self.lock();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM settled_authorizations WHERE payer = ?1 AND nonce = ?2",
                rusqlite::params![payer, nonce],
                |row| row.get(0),
            )
            // Fail-secure: a database error reads as "already used".
            .unwrap_or(1);
        count > 0
    }

    fn try_use(&self, payer: &str, nonce: &str) -> bool {
        let conn = self.lock();
        // INSERT fails on the PRIMARY KEY when the pair exists; atomic at
        // the database level, safe across processes.
        conn.execute(
            "INSERT INTO settled_authorizations (payer, nonce, recorded_at) VALUES (?1, ?2, ?3)",
            rusqlite::params![payer, nonce, unix_now()],
        )
        .is_ok()
    }

    fn release(&self, payer: &str, nonce: &str) {
        let conn = self.lock();
        if let Err(e) = conn.execute(
            "DELETE FROM settled_authorizations WHERE payer = ?1 AND nonce = ?2",
            rusqlite::params![payer, nonce],
        ) {
            tracing::error!(error = %e, "failed to release replay claim — it will remain consumed");
        }
    }

    fn purge_expired(&self, max_age_secs: u64) -> usize {
        let conn = self.lock();
        let now = unix_now();

        // Guard against backward clock jumps: purging with a rewound clock
        // would drop claims that are still live.
        let min_recorded: i64 = conn
            .query_row(
                "SELECT COALESCE(MIN(recorded_at), 0) FROM settled_authorizations",
                [],
                |row| row.get(0),
            )
            .unwrap_or(0);
        if min_recorded > 0 && now < min_recorded {
            tracing::warn!(
                now,
                min_recorded,
                "clock appears to have jumped backward — skipping replay purge"
            );
            return 0;
        }

        let cutoff = now.saturating_sub(max_age_secs as i64);
        conn.execute(
            "DELETE FROM settled_authorizations WHERE recorded_at < ?1",
            rusqlite::params![cutoff],
        )
        .unwrap_or(0)
    }
}
