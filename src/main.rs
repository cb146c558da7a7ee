#[macro_use]
extern crate slog_scope;

use std::sync::Arc;

use pgwatch3_collector::{logging, MultiWriter};
use pgwatch3_common::{metrics_from_opts, Metrics};
use pgwatch3_metricstore_postgres::{ensure_config_store_schema, PgMetricWriter};
use pgwatch3_settings::Settings;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() {
    let settings = Settings::load().unwrap_or_else(|e| {
        eprintln!("failed to load settings, using defaults: {e}");
        Settings::default()
    });

    logging::init_logging(settings.log_json);
    let _guard = scopeguard(logging::reset_logging);

    let statsd_client = match metrics_from_opts(
        &settings.statsd_label,
        settings.statsd_host.as_deref(),
        settings.statsd_port,
    ) {
        Ok(client) => client,
        Err(e) => {
            error!("failed to build statsd client, metrics disabled"; "error" => e.to_string());
            Arc::new(Metrics::sink())
        }
    };
    let metrics = Metrics::from(&statsd_client);

    let cancel = CancellationToken::new();
    let writers = Arc::new(MultiWriter::new());

    if let Some(config_url) = settings.config_store_database_url.as_ref() {
        match ensure_config_store_schema(config_url, &settings, &metrics).await {
            Ok(()) => info!("config-store schema ensured"; "database_url" => redact(config_url)),
            Err(e) => error!("config-store schema bootstrap failed"; "database_url" => redact(config_url), "error" => e.to_string()),
        }
    }

    for database_url in &settings.metric_store_database_urls {
        match PgMetricWriter::start(database_url, &settings, metrics.clone(), cancel.clone()).await
        {
            Ok(writer) => {
                info!("metric-store sink started"; "database_url" => redact(database_url));
                writers.register(Box::new(writer));
            }
            Err(e) => {
                error!("metric-store sink failed to start, skipping"; "database_url" => redact(database_url), "error" => e.to_string());
            }
        }
    }

    info!("pgwatch3-collector ready"; "sinks" => settings.metric_store_database_urls.len());

    if tokio::signal::ctrl_c().await.is_err() {
        error!("failed to install ctrl-c handler, shutting down immediately");
    } else {
        info!("shutdown signal received");
    }
    cancel.cancel();
    // Give background tasks a moment to observe cancellation before exit.
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
}

/// Strips credentials from a connection string before it's logged.
fn redact(database_url: &str) -> String {
    match url::Url::parse(database_url) {
        Ok(mut url) if url.password().is_some() || !url.username().is_empty() => {
            let _ = url.set_password(None);
            let _ = url.set_username("");
            url.to_string()
        }
        Ok(url) => url.to_string(),
        Err(_) => "<unparsable>".to_owned(),
    }
}

/// Small RAII helper so `reset_logging` runs even if `main` returns early.
fn scopeguard(f: impl FnOnce()) -> impl Drop {
    struct Guard<F: FnOnce()>(Option<F>);
    impl<F: FnOnce()> Drop for Guard<F> {
        fn drop(&mut self) {
            if let Some(f) = self.0.take() {
                f();
            }
        }
    }
    Guard(Some(f))
}
