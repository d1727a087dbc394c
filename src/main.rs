//! Steadfast retry-until-success router.
//!
//! Reads newline-delimited JSON events from stdin and routes each one to the
//! configured HTTP endpoint, retrying until it succeeds or its retries run
//! out. With an object store configured, accepted events survive restarts.

use std::{collections::BTreeMap, sync::Arc};

use anyhow::{Context, Result};
use serde::Deserialize;
use steadfast_core::{Event, SqliteObjectStore};
use steadfast_router::{Ack, Config, HttpDestination, LogFormat, Router, RouterBuilder};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load().context("failed to load configuration")?;
    init_tracing(&config);

    info!(
        name = %config.name,
        asynchronous = config.is_asynchronous(),
        max_retries = config.max_retries,
        "starting steadfast router"
    );

    let router = build_router(&config).await?;
    router.start().await.context("failed to start router")?;
    info!(name = %config.name, "router is ready, reading events from stdin");

    tokio::select! {
        result = pump_stdin(&router) => {
            if let Err(e) = result {
                error!(error = %e, "reading events failed");
            }
            info!("input exhausted");
        },
        () = shutdown_signal() => {
            info!("shutdown signal received, starting graceful shutdown");
        },
    }

    router.stop().await.context("router did not stop cleanly")?;
    info!("steadfast shutdown complete");
    Ok(())
}

/// Initializes tracing. `RUST_LOG` wins over the configured filter.
fn init_tracing(config: &Config) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.rust_log))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(filter);
    match config.log_format {
        LogFormat::Json => {
            registry.with(fmt::layer().json().with_writer(std::io::stderr)).init();
        },
        LogFormat::Pretty => {
            registry
                .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
                .init();
        },
    }
}

async fn build_router(config: &Config) -> Result<Router> {
    let route_url = config.route_url.as_deref().context("route_url must be configured")?;
    let route = HttpDestination::new(route_url, config.to_client_config())?;
    info!(url = %route.url(), "routing to HTTP endpoint");

    let mut builder = RouterBuilder::new(config.name.clone())
        .settings(config.retry_settings())
        .route(Arc::new(route))
        .worker_count(config.worker_count)
        .shutdown_timeout(config.shutdown_timeout());

    if let Some(url) = &config.dead_letter_url {
        builder = builder.dead_letter(Arc::new(HttpDestination::new(url, config.to_client_config())?));
    } else {
        warn!("no dead_letter_url configured, exhausted events will be dropped");
    }

    if let Some(path) = &config.object_store_path {
        let store = SqliteObjectStore::open(path)
            .await
            .with_context(|| format!("failed to open object store at {}", path.display()))?;
        info!(path = %path.display(), "object store opened");
        builder = builder.object_store(Arc::new(store));
    }

    Ok(builder.build()?)
}

/// One line of input.
#[derive(Debug, Deserialize)]
struct Submission {
    payload: serde_json::Value,
    #[serde(default)]
    correlation_id: Option<String>,
    #[serde(default)]
    attributes: BTreeMap<String, String>,
}

impl Submission {
    fn into_event(self) -> Result<Event> {
        let payload = match self.payload {
            serde_json::Value::String(text) => text.into_bytes(),
            other => serde_json::to_vec(&other)?,
        };
        let mut event = Event::new(payload);
        if let Some(correlation_id) = self.correlation_id {
            event = event.with_correlation_id(correlation_id);
        }
        Ok(self
            .attributes
            .into_iter()
            .fold(event, |event, (name, value)| event.with_attribute(name, value)))
    }
}

/// Submits every stdin line until EOF. Bad lines are logged and skipped.
async fn pump_stdin(router: &Router) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let parsed = serde_json::from_str::<Submission>(&line).map_err(anyhow::Error::from);
        let event = match parsed.and_then(Submission::into_event) {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, "skipping malformed input line");
                continue;
            },
        };
        let correlation_id = event.correlation_id().clone();

        match router.process(event).await {
            Ok(Ack::Value(value)) => println!("{value}"),
            Ok(Ack::NoContent) => {},
            Err(e) => error!(correlation_id = %correlation_id, error = %e, "event rejected"),
        }
    }

    Ok(())
}

/// Waits for shutdown signal (CTRL+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("received CTRL+C signal");
        },
        () = terminate => {
            info!("received SIGTERM signal");
        },
    }
}
