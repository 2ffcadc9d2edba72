use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use sqlx::{
    postgres::{PgPool, PgPoolOptions},
    Connection,
};
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::error::StoreError;

/// Idle connections above the `max_idle` floor are reaped after this long.
const IDLE_REAP_AFTER: Duration = Duration::from_secs(60);

/// Pool limits applied on every connect and reconnect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolSettings {
    pub max_connections: u32,
    pub max_idle: u32,
    pub max_lifetime: Duration,
    /// Bounds connect, reconnect and each liveness probe.
    pub connect_timeout: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_connections: 25,
            max_idle: 10,
            max_lifetime: Duration::from_secs(5 * 60),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl PoolSettings {
    fn options(&self) -> PgPoolOptions {
        PgPoolOptions::new()
            .max_connections(self.max_connections)
            .min_connections(self.max_idle.min(self.max_connections))
            .idle_timeout(IDLE_REAP_AFTER)
            .max_lifetime(self.max_lifetime)
            .acquire_timeout(self.connect_timeout)
    }
}

/// Owns the Postgres pool. The handle can be swapped by [`RecordStore::reconnect`]
/// while other tasks are using it; callers always get either the old or the new
/// pool, never nothing.
pub struct RecordStore {
    dsn: String,
    settings: PoolSettings,
    pool: RwLock<PgPool>,
    generation: AtomicU64,
}

impl std::fmt::Debug for RecordStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordStore")
            .field("settings", &self.settings)
            .field("generation", &self.generation())
            .finish()
    }
}

impl RecordStore {
    /// Opens the pool and probes it. Nothing is kept if the probe fails.
    pub async fn connect(dsn: &str, settings: PoolSettings) -> Result<Self, StoreError> {
        let pool = open_pool("connect", dsn, &settings).await?;
        info!(
            max_connections = settings.max_connections,
            max_idle = settings.max_idle,
            "database connected"
        );
        Ok(Self::from_pool(dsn, settings, pool))
    }

    /// Builds the store without touching the network.
    #[cfg(test)]
    pub fn connect_lazy(dsn: &str, settings: PoolSettings) -> Result<Self, StoreError> {
        let pool = settings
            .options()
            .connect_lazy(dsn)
            .map_err(|e| StoreError::connection("connect_lazy", e))?;
        Ok(Self::from_pool(dsn, settings, pool))
    }

    fn from_pool(dsn: &str, settings: PoolSettings, pool: PgPool) -> Self {
        Self {
            dsn: dsn.to_string(),
            settings,
            pool: RwLock::new(pool),
            generation: AtomicU64::new(0),
        }
    }

    /// Current pool handle. Cloning a pool only bumps a reference count.
    pub async fn pool(&self) -> PgPool {
        self.pool.read().await.clone()
    }

    /// Number of successful reconnects since the store was created.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub async fn ping(&self) -> Result<(), StoreError> {
        let pool = self.pool().await;
        probe("ping", &pool, self.settings.connect_timeout).await
    }

    /// Builds and probes a fresh pool, then swaps it in. On failure the current
    /// handle is left exactly as it was.
    pub async fn reconnect(&self) -> Result<(), StoreError> {
        let fresh = open_pool("reconnect", &self.dsn, &self.settings).await?;

        let (stale, generation) = {
            let mut current = self.pool.write().await;
            let stale = std::mem::replace(&mut *current, fresh);
            (stale, self.generation.fetch_add(1, Ordering::AcqRel) + 1)
        };
        info!(generation, "database pool replaced");

        // In-flight queries keep their connections until they finish.
        tokio::spawn(async move { stale.close().await });
        Ok(())
    }

    pub async fn close(&self) {
        let pool = self.pool().await;
        pool.close().await;
        info!("database pool closed");
    }
}

async fn open_pool(
    op: &'static str,
    dsn: &str,
    settings: &PoolSettings,
) -> Result<PgPool, StoreError> {
    let attempt = async {
        let pool = settings
            .options()
            .connect(dsn)
            .await
            .map_err(|e| StoreError::connection(op, e))?;

        if let Err(e) = probe(op, &pool, settings.connect_timeout).await {
            pool.close().await;
            return Err(e);
        }
        Ok::<_, StoreError>(pool)
    };

    tokio::time::timeout(settings.connect_timeout, attempt)
        .await
        .map_err(|_| StoreError::ConnectTimeout {
            op,
            after: settings.connect_timeout,
        })?
}

async fn probe(op: &'static str, pool: &PgPool, limit: Duration) -> Result<(), StoreError> {
    let round_trip = async {
        let mut conn = pool
            .acquire()
            .await
            .map_err(|e| StoreError::connection(op, e))?;
        conn.ping().await.map_err(|e| StoreError::connection(op, e))
    };

    let result = tokio::time::timeout(limit, round_trip)
        .await
        .unwrap_or(Err(StoreError::ConnectTimeout { op, after: limit }));
    if let Err(e) = &result {
        warn!(error = %e, "database probe failed");
    }
    result
}
