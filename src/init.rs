use crate::backend::{make_store, BackendBuildError};
use crate::config::{ConfigError, LoggerConfig};
use crate::layer::ShippingLayer;
use crate::local::LocalSinkError;
use crate::logger::Logger;
use crate::record::LogLevel;
use crate::store::StoreError;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::subscriber::SetGlobalDefaultError;
use tracing::Level;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::Registry;

/// Settings of the global `tracing` subscriber.
///
/// **Fields**
/// - `enable_stdout`: print diagnostics through a `fmt` layer on stderr.
/// - `ship_events`: also forward application `tracing` events to the
///   logger's shipper through a [`ShippingLayer`].
/// - `channel_buffer`: capacity of the forwarding channel.
/// - `ship_level`: most verbose level that gets forwarded.
#[derive(Clone, Debug)]
pub struct LayerConfig {
    pub enable_stdout: bool,
    pub ship_events: bool,
    pub channel_buffer: usize,
    pub ship_level: Level,
}

impl Default for LayerConfig {
    fn default() -> Self {
        Self {
            enable_stdout: true,
            ship_events: false,
            channel_buffer: 1024,
            ship_level: Level::INFO,
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum InitError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Backend(#[from] BackendBuildError),

    #[error(transparent)]
    LocalSink(#[from] LocalSinkError),

    #[error("document store unavailable: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    Subscriber(#[from] SetGlobalDefaultError),
}

fn level_filter(level: &LogLevel) -> LevelFilter {
    match level {
        LogLevel::Error => LevelFilter::ERROR,
        LogLevel::Warn => LevelFilter::WARN,
        LogLevel::Info => LevelFilter::INFO,
        LogLevel::Debug => LevelFilter::DEBUG,
        LogLevel::Other(_) => LevelFilter::TRACE,
    }
}

/// Install the global `tracing` subscriber.
///
/// The `fmt` layer is filtered at `config.min_level`. When
/// `layer_config.ship_events` is set, a [`ShippingLayer`] feeding
/// `logger`'s shipper is added and the handle of its forwarding task is
/// returned. Must be called from within a Tokio runtime in that case.
pub fn init_tracing_with_config(
    config: &LoggerConfig,
    logger: &Logger,
    layer_config: LayerConfig,
) -> Result<Option<JoinHandle<()>>, SetGlobalDefaultError> {
    let (shipping, handle) = if layer_config.ship_events {
        let (layer, handle) = ShippingLayer::new(
            Arc::clone(logger.shipper()),
            logger.builder().clone(),
            layer_config.channel_buffer,
            layer_config.ship_level,
        );
        (Some(layer), Some(handle))
    } else {
        (None, None)
    };

    let fmt = layer_config.enable_stdout.then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_filter(level_filter(&config.min_level))
    });

    let subscriber = Registry::default().with(shipping).with(fmt);
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(handle)
}

/// Diagnostics only: `fmt` layer on stderr, nothing forwarded.
pub fn init_tracing(config: &LoggerConfig) -> Result<(), SetGlobalDefaultError> {
    let fmt = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(level_filter(&config.min_level));
    tracing::subscriber::set_global_default(Registry::default().with(fmt))
}

/// Build the store client and logger for `config` and run
/// [`Logger::initialize`].
///
/// This is the recommended entrypoint for a service's composition root;
/// pair it with [`Logger::cleanup`] before exit.
pub async fn init_logger(config: &LoggerConfig) -> Result<Arc<Logger>, InitError> {
    let store = make_store(&config.store)?;
    let logger = Arc::new(Logger::new(config, store)?);
    logger.initialize().await?;
    Ok(logger)
}
