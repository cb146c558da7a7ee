use std::str::FromStr;
use std::time::Duration;

use deadpool::managed::{Hook, HookError, Metrics as PoolMetrics, PoolConfig, Timeouts};
use deadpool_postgres::{Manager as CopyManager, ManagerConfig as CopyManagerConfig, RecyclingMethod};
use diesel::sql_query;
use diesel_async::pooled_connection::deadpool::{Object, Pool};
use diesel_async::pooled_connection::AsyncDieselConnectionManager;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use pgwatch3_common::Metrics;
use pgwatch3_db_common::{manager_config_with_logging, retry::retry_constant, GetPoolState, PoolState};
use pgwatch3_metricstore_common::WriterError;
use pgwatch3_settings::Settings;
use tokio_postgres::NoTls;

use crate::error;

/// A single checked-out `diesel-async` connection.
pub(crate) type Conn = Object<AsyncPgConnection>;

/// Rejects a connection at recycle time once it has sat idle past
/// `max_idle` or lived past `max_lifetime`. `deadpool` has no
/// built-in idle/lifetime knob on `PoolConfig`, so this is wired up as a
/// `pre_recycle` hook instead, inspecting the connection's own
/// `deadpool::managed::Metrics` rather than a separate timer.
fn idle_lifetime_guard<M>(max_idle: Duration, max_lifetime: Duration) -> Hook<M>
where
    M: deadpool::managed::Manager,
{
    Hook::sync_fn(move |_obj, metrics: &PoolMetrics| {
        let idle = metrics
            .recycled
            .map(|r| r.elapsed())
            .unwrap_or_else(|| metrics.created.elapsed());
        if idle > max_idle {
            return Err(HookError::Message(std::borrow::Cow::Borrowed(
                "connection idle beyond configured max_idle",
            )));
        }
        if metrics.created.elapsed() > max_lifetime {
            return Err(HookError::Message(std::borrow::Cow::Borrowed(
                "connection exceeded configured max_lifetime",
            )));
        }
        Ok(())
    })
}

/// Bounded connection pool to one metric-store instance.
///
/// Carries two independent pools against the same connection string: a
/// `diesel-async` pool for every ORM-shaped query (bootstrap checks,
/// partition-ensure RPCs, retention, distinct-tenant catalog maintenance)
/// and a `tokio-postgres` pool used only for `COPY FROM STDIN` streaming,
/// which `diesel`/`diesel-async` don't expose.
#[derive(Clone)]
pub struct PgPool {
    pool: Pool<AsyncPgConnection>,
    copy_pool: deadpool_postgres::Pool,
    #[allow(dead_code)]
    metrics: Metrics,
}

impl PgPool {
    /// Builds both pools and bootstraps the connection with a bounded
    /// retry (3 attempts, 1 s constant backoff).
    pub async fn open(
        database_url: &str,
        settings: &Settings,
        metrics: &Metrics,
    ) -> Result<Self, WriterError> {
        let wait = Duration::from_secs(settings.database_pool_connection_timeout_secs as u64);
        let timeouts = Timeouts {
            wait: Some(wait),
            ..Default::default()
        };
        let pool_config = PoolConfig {
            max_size: settings.database_pool_max_size as usize,
            timeouts,
            ..Default::default()
        };

        let max_idle = Duration::from_secs(settings.database_pool_connection_max_idle_secs as u64);
        let max_lifetime = Duration::from_secs(settings.database_pool_connection_lifespan_secs as u64);

        let manager = AsyncDieselConnectionManager::<AsyncPgConnection>::new_with_config(
            database_url,
            manager_config_with_logging(),
        );
        let pool = Pool::builder(manager)
            .config(pool_config)
            .pre_recycle(idle_lifetime_guard(max_idle, max_lifetime))
            .runtime(deadpool::Runtime::Tokio1)
            .build()
            .map_err(|e| WriterError::internal(format!("couldn't build metric-store pool: {e}")))?;

        let pg_config = tokio_postgres::Config::from_str(database_url)
            .map_err(|e| WriterError::invalid_url(e.to_string()))?;
        let copy_manager = CopyManager::from_config(
            pg_config,
            NoTls,
            CopyManagerConfig {
                recycling_method: RecyclingMethod::Fast,
            },
        );
        let copy_pool = deadpool_postgres::Pool::builder(copy_manager)
            .config(pool_config)
            .pre_recycle(idle_lifetime_guard(max_idle, max_lifetime))
            .runtime(deadpool::Runtime::Tokio1)
            .build()
            .map_err(|e| WriterError::internal(format!("couldn't build copy pool: {e}")))?;

        let this = Self {
            pool,
            copy_pool,
            metrics: metrics.clone(),
        };

        retry_constant(
            settings.database_pool_bootstrap_retries,
            Duration::from_millis(settings.database_pool_bootstrap_retry_delay_ms),
            || this.check(),
        )
        .await?;

        Ok(this)
    }

    async fn check(&self) -> Result<(), WriterError> {
        let mut conn = self.conn().await?;
        sql_query("SELECT 1")
            .execute(&mut conn)
            .await
            .map_err(error::internal)?;
        Ok(())
    }

    pub(crate) async fn conn(&self) -> Result<Conn, WriterError> {
        self.pool
            .get()
            .await
            .map_err(|e| WriterError::bootstrap(format!("metric-store unreachable: {e}")))
    }

    pub(crate) async fn copy_client(&self) -> Result<deadpool_postgres::Client, WriterError> {
        self.copy_pool
            .get()
            .await
            .map_err(|e| WriterError::bootstrap(format!("metric-store unreachable: {e}")))
    }
}

impl GetPoolState for PgPool {
    fn state(&self) -> PoolState {
        self.pool.status().into()
    }
}

impl std::fmt::Debug for PgPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgPool").finish_non_exhaustive()
    }
}
