#[macro_use]
extern crate slog_scope;

pub mod retry;

use std::fmt::Debug;

use diesel::ConnectionResult;
use diesel_async::pooled_connection::ManagerConfig;
use diesel_async::{AsyncConnection, AsyncPgConnection};
use futures::future::BoxFuture;
use futures::FutureExt;

pub type DbFuture<'a, T, E> = BoxFuture<'a, Result<T, E>>;

/// `AsyncDieselConnectionManager` config that attaches a query tracer at
/// debug level to every established connection.
pub fn manager_config_with_logging() -> ManagerConfig<AsyncPgConnection> {
    let mut config = ManagerConfig::default();
    config.custom_setup = Box::new(establish_with_instrumentation);
    config
}

fn establish_with_instrumentation(
    database_url: &str,
) -> BoxFuture<'_, ConnectionResult<AsyncPgConnection>> {
    async move {
        let mut conn = AsyncPgConnection::establish(database_url).await?;
        conn.set_instrumentation(|event: diesel::connection::InstrumentationEvent<'_>| {
            debug!("pg query"; "event" => format!("{:?}", event));
        });
        Ok(conn)
    }
    .boxed()
}

/// Implemented by pool data structures so callers (the periodic pool-state
/// reporter, health checks) can read the current pool occupancy without
/// depending on the concrete pool type.
pub trait GetPoolState: Debug {
    fn state(&self) -> PoolState;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct PoolState {
    pub connections: u32,
    pub idle_connections: u32,
}

impl From<deadpool::Status> for PoolState {
    fn from(status: deadpool::Status) -> PoolState {
        PoolState {
            connections: status.size as u32,
            idle_connections: status.available.max(0) as u32,
        }
    }
}
