//! Composition root for the per-twin update pipeline: wires the twin
//! update task, the enforcement flow, and the search-index bulk writer
//! over a shared MongoDB client, ingests change notifications, and
//! coordinates graceful shutdown.

mod adapters;
mod ask;
mod config;
mod ingest;
mod notification;

use std::sync::Arc;
use std::time::Duration;

use mongodb::bson::Document;
use mongodb::Collection;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use enforcement_flow::EnforcementConfig;
use enrichment::EnrichmentFacade;
use infra_mongo::{MongoClientFactory, MongoConfig};
use policy_enforcer::{Policy, PolicyEnforcerCache};
use search_index::{BulkWriter, BulkWriterConfig};
use twin_kernel::domain::twin::Twin;
use twin_updater::{Dispatcher, MongoRecoveryStore, TwinUpdateConfig};

use crate::adapters::MongoAdapters;
use crate::config::Config;
use crate::ingest::{NotificationSource, StdinNotificationSource};

const CONFIG_ERROR: i32 = 1;
const PERSISTENCE_UNAVAILABLE: i32 = 2;

#[tokio::main]
async fn main() {
    let exit_code = run().await;
    std::process::exit(exit_code);
}

async fn run() -> i32 {
    let config = Config::from_env();
    if let Err(err) = config.validate() {
        eprintln!("configuration error: {err}");
        return CONFIG_ERROR;
    }

    if let Err(err) = initialize_logging(&config) {
        eprintln!("failed to initialize logging: {err}");
        return CONFIG_ERROR;
    }

    let mongo_config = match MongoConfig::from_env() {
        Ok(cfg) => cfg,
        Err(err) => {
            error!(error = %err, "invalid mongo configuration");
            return CONFIG_ERROR;
        }
    };

    info!("starting twin update pipeline");

    let factory = MongoClientFactory::new(mongo_config);
    if let Err(err) = factory.ping().await {
        error!(error = %err, "mongo unreachable at startup");
        return PERSISTENCE_UNAVAILABLE;
    }

    let database = match factory.database().await {
        Ok(db) => db,
        Err(err) => {
            error!(error = %err, "failed to obtain mongo database handle");
            return PERSISTENCE_UNAVAILABLE;
        }
    };

    let twins: Collection<Twin> = database.inner().collection("twins");
    let policies: Collection<Policy> = database.inner().collection("policies");
    let search_index: Collection<Document> = database.inner().collection("search_index");

    let mongo_adapters = MongoAdapters::new(twins, policies, config.ask);

    let facade = Arc::new(EnrichmentFacade::new(
        mongo_adapters.thing_fetcher.clone(),
        config.cache.thing.capacity,
        config.cache.thing.ttl,
    ));
    info!(dispatcher = %config.cache.thing.dispatcher, "thing cache ready");

    let policy_cache = Arc::new(PolicyEnforcerCache::new(
        mongo_adapters.policy_loader.clone(),
        config.cache.policy.capacity,
        config.cache.policy.ttl,
        config.cache.policy.retry_delay,
    ));
    info!(dispatcher = %config.cache.policy.dispatcher, "policy cache ready");

    let writer = Arc::new(BulkWriter::new(search_index.clone(), BulkWriterConfig { max_retries: config.updater.max_retries }));
    let recovery = Arc::new(MongoRecoveryStore::new(search_index));

    let enforcement = EnforcementConfig {
        max_array_size: config.search.max_array_size,
        parallelism: config.search.parallelism,
        partitions: config.search.max_bulk_size,
    };

    let update_config = TwinUpdateConfig {
        idle_timeout: config.updater.idle_timeout,
        drain_timeout: config.shutdown.drain_timeout,
        max_retries: config.updater.max_retries,
        patch_size_threshold: config.search.patch_size_threshold,
        max_stash_events: config.updater.max_stash_events,
        enforcement,
    };

    let dispatcher = Arc::new(Dispatcher::new(facade, policy_cache, writer, recovery, update_config));

    let mut source = StdinNotificationSource::new();
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            notification = source.recv() => {
                match notification {
                    Some(notification) => {
                        let twin_id = notification.twin_id.clone();
                        for message in notification.into_messages() {
                            dispatcher.dispatch(twin_id.clone(), message).await;
                        }
                    }
                    None => {
                        info!("notification source exhausted, shutting down");
                        break;
                    }
                }
            }
            _ = &mut shutdown => {
                warn!("shutdown signal received");
                break;
            }
        }
    }

    dispatcher.shutdown_all().await;
    info!(drain_timeout = ?config.shutdown.drain_timeout, "draining in-flight twin update tasks");
    tokio::time::sleep(grace_period(&config)).await;

    info!("twin update pipeline shut down cleanly");
    0
}

/// A short grace period beyond `shutdown.drain_timeout` to let reaped
/// dispatcher entries settle before the process exits.
fn grace_period(config: &Config) -> Duration {
    config.shutdown.drain_timeout + Duration::from_millis(100)
}

fn initialize_logging(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let level = &config.logging.level;
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "twin_updater={level},enforcement_flow={level},search_index={level},enrichment={level},policy_enforcer={level},entity_cache={level},twin_kernel={level}"
        ))
    });

    match config.logging.format.as_str() {
        "json" => {
            tracing_subscriber::registry().with(env_filter).with(fmt::layer().json()).init();
        }
        "compact" => {
            tracing_subscriber::registry().with(env_filter).with(fmt::layer().compact()).init();
        }
        _ => {
            tracing_subscriber::registry().with(env_filter).with(fmt::layer().pretty()).init();
        }
    }
    Ok(())
}

/// Resolves once SIGTERM (or Ctrl+C) is received.
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install sigterm handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(Config::default().validate().is_ok());
    }
}
