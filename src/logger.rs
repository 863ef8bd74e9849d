use crate::builder::{self, EntryBuilder, Message, RequestContext};
use crate::config::LoggerConfig;
use crate::local::{LocalSink, LocalSinkError};
use crate::query::{self, LogFilter};
use crate::record::{Fields, LogDocument, LogLevel};
use crate::scheduler::FlushTimer;
use crate::shipper::{FlushReport, Shipper};
use crate::store::{default_mapping, ClusterHealth, DocumentStore, SearchResult, StoreError};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::{Arc, Mutex};
use tokio::time::Duration;
use tracing::{info, warn};

/// Dual-sink logger: every call is written to the [`LocalSink`]
/// immediately and buffered for bulk shipment to the [`DocumentStore`].
///
/// Constructed once by the application and shared by `Arc`. The two
/// sinks are independent: a local write failure is reported through
/// `tracing` and dropped, a remote failure is returned to the caller after
/// the local write already happened.
///
/// Lifecycle: [`Logger::initialize`] → log calls → [`Logger::cleanup`].
pub struct Logger {
    builder: EntryBuilder,
    local: Option<LocalSink>,
    shipper: Arc<Shipper>,
    flush_interval: Duration,
    timer: Mutex<Option<FlushTimer>>,
}

impl Logger {
    /// Build a logger from configuration. Opens the local log files but
    /// does not touch the store; call [`Logger::initialize`] for that.
    pub fn new(config: &LoggerConfig, store: Arc<dyn DocumentStore>) -> Result<Self, LocalSinkError> {
        let min_level = config.min_level.clone();
        let local = match (&config.log_dir, config.console) {
            (Some(dir), console) => Some(LocalSink::with_files(dir, console, min_level)?),
            (None, true) => Some(LocalSink::console(min_level)),
            (None, false) => None,
        };

        Ok(Self::from_parts(
            EntryBuilder::new(config.service.clone(), config.environment.clone()),
            local,
            Shipper::new(store, config.index_name.clone(), config.batch_size),
            config.flush_interval,
        ))
    }

    pub fn from_parts(
        builder: EntryBuilder,
        local: Option<LocalSink>,
        shipper: Shipper,
        flush_interval: Duration,
    ) -> Self {
        Logger {
            builder,
            local,
            shipper: Arc::new(shipper),
            flush_interval,
            timer: Mutex::new(None),
        }
    }

    /// `"<component>#<version>"` scope label.
    pub fn scope_name(component: &str, version: &str) -> String {
        builder::scope_name(component, version)
    }

    pub fn builder(&self) -> &EntryBuilder {
        &self.builder
    }

    pub fn shipper(&self) -> &Arc<Shipper> {
        &self.shipper
    }

    /// Connect to the store, make sure the default index exists and start
    /// the periodic flush.
    ///
    /// Errors are returned before the timer starts so that dependent
    /// startup can stop. Calling it again restarts the timer without
    /// leaking the previous one and never recreates an existing index.
    pub async fn initialize(&self) -> Result<(), StoreError> {
        let store = self.shipper.store();
        let cluster = store.connect().await?;
        info!(cluster = %cluster.cluster_name, version = %cluster.version, "document store connected");

        self.ensure_index(self.shipper.index()).await?;

        let previous = {
            let mut timer = self.lock_timer();
            timer.replace(FlushTimer::start(Arc::clone(&self.shipper), self.flush_interval))
        };
        if let Some(mut previous) = previous {
            previous.stop().await;
        }

        info!(index = self.shipper.index(), "log shipping initialized");
        Ok(())
    }

    /// Create `index` with the default mapping unless it already exists.
    pub async fn ensure_index(&self, index: &str) -> Result<(), StoreError> {
        let store = self.shipper.store();
        if store.index_exists(index).await? {
            info!(index, "index already exists");
            return Ok(());
        }
        store.create_index(index, &default_mapping()).await
    }

    /// Flush what is buffered, then stop the periodic flush.
    ///
    /// The timer is stopped even when the final flush fails; the failure is
    /// still returned. Safe to call repeatedly and without a prior
    /// successful [`Logger::initialize`].
    pub async fn cleanup(&self) -> Result<FlushReport, StoreError> {
        let flushed = self.shipper.flush().await;

        let timer = self.lock_timer().take();
        if let Some(mut timer) = timer {
            timer.stop().await;
        }

        match &flushed {
            Ok(report) => info!(shipped = report.shipped, "log shipping stopped"),
            Err(e) => warn!(error = %e, "final flush failed during cleanup"),
        }
        flushed
    }

    pub fn is_running(&self) -> bool {
        self.lock_timer().as_ref().map_or(false, FlushTimer::is_running)
    }

    pub async fn flush(&self) -> Result<FlushReport, StoreError> {
        self.shipper.flush().await
    }

    fn lock_timer(&self) -> std::sync::MutexGuard<'_, Option<FlushTimer>> {
        self.timer.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Write an assembled document to both sinks.
    ///
    /// `index` overrides the default target index for this document only.
    pub async fn dispatch(&self, document: LogDocument, index: Option<&str>) -> Result<LogDocument, StoreError> {
        if let Some(local) = &self.local {
            if let Err(e) = local.write(&document) {
                warn!(error = %e, "local log write failed, entry dropped locally");
            }
        }
        self.shipper.enqueue(index, document.to_value()).await?;
        Ok(document)
    }

    /// General entry point behind the level helpers.
    #[allow(clippy::too_many_arguments)]
    pub async fn record(
        &self,
        level: LogLevel,
        scope: &str,
        method_name: &str,
        message: impl Into<Message>,
        metadata: Fields,
        options: Fields,
        index: Option<&str>,
    ) -> Result<LogDocument, StoreError> {
        let document = self.builder.build(level, scope, method_name, message, metadata, options);
        self.dispatch(document, index).await
    }

    pub async fn info(
        &self,
        scope: &str,
        method_name: &str,
        message: impl Into<Message>,
        metadata: Fields,
        options: Fields,
    ) -> Result<LogDocument, StoreError> {
        self.record(LogLevel::Info, scope, method_name, message, metadata, options, None)
            .await
    }

    /// Alias of [`Logger::info`].
    pub async fn log(
        &self,
        scope: &str,
        method_name: &str,
        message: impl Into<Message>,
        metadata: Fields,
        options: Fields,
    ) -> Result<LogDocument, StoreError> {
        self.info(scope, method_name, message, metadata, options).await
    }

    pub async fn warn(
        &self,
        scope: &str,
        method_name: &str,
        message: impl Into<Message>,
        metadata: Fields,
        options: Fields,
    ) -> Result<LogDocument, StoreError> {
        self.record(LogLevel::Warn, scope, method_name, message, metadata, options, None)
            .await
    }

    /// Pass [`Message::from_error`] to attach a structured `error` block.
    pub async fn error(
        &self,
        scope: &str,
        method_name: &str,
        message: impl Into<Message>,
        metadata: Fields,
        options: Fields,
    ) -> Result<LogDocument, StoreError> {
        self.record(LogLevel::Error, scope, method_name, message, metadata, options, None)
            .await
    }

    pub async fn debug(
        &self,
        scope: &str,
        method_name: &str,
        message: impl Into<Message>,
        metadata: Fields,
        options: Fields,
    ) -> Result<LogDocument, StoreError> {
        self.record(LogLevel::Debug, scope, method_name, message, metadata, options, None)
            .await
    }

    pub async fn event(&self, event_type: &str, values: Fields, options: Fields) -> Result<LogDocument, StoreError> {
        let document = self.builder.event(event_type, values, options);
        self.dispatch(document, None).await
    }

    pub async fn log_action(
        &self,
        action: &str,
        resource: &str,
        resource_id: Option<&str>,
        metadata: Fields,
    ) -> Result<LogDocument, StoreError> {
        let document = self.builder.action(action, resource, resource_id, metadata);
        self.dispatch(document, None).await
    }

    /// Handle that stamps `ctx` on every document it logs.
    pub fn with_request(&self, ctx: RequestContext) -> RequestLogger<'_> {
        RequestLogger { logger: self, ctx }
    }

    /// Search the default index: `clause` as query, newest first, at most
    /// `size` hits.
    pub async fn search_logs(&self, clause: Value, size: usize) -> Result<SearchResult, StoreError> {
        self.shipper
            .store()
            .search(self.shipper.index(), &query::search_body(clause, size))
            .await
    }

    pub async fn logs_by_level(&self, level: &str, size: usize) -> Result<SearchResult, StoreError> {
        self.search_logs(query::by_level(level), size).await
    }

    pub async fn logs_by_action(&self, action: &str, size: usize) -> Result<SearchResult, StoreError> {
        self.search_logs(query::by_action(action), size).await
    }

    pub async fn logs_by_resource(&self, resource: &str, size: usize) -> Result<SearchResult, StoreError> {
        self.search_logs(query::by_resource(resource), size).await
    }

    pub async fn logs_by_time_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        size: usize,
    ) -> Result<SearchResult, StoreError> {
        self.search_logs(query::by_time_range(start, end), size).await
    }

    pub async fn logs_by_user(&self, user_id: &str, size: usize) -> Result<SearchResult, StoreError> {
        self.search_logs(query::by_user(user_id), size).await
    }

    pub async fn logs_matching(&self, filter: &LogFilter, size: usize) -> Result<SearchResult, StoreError> {
        self.search_logs(filter.to_clause(), size).await
    }

    pub async fn health(&self) -> Result<ClusterHealth, StoreError> {
        self.shipper.store().cluster_health().await
    }
}

/// [`Logger`] view bound to one request's correlation identifiers.
///
/// Caller-supplied options still override `requestId`/`userId`.
pub struct RequestLogger<'a> {
    logger: &'a Logger,
    ctx: RequestContext,
}

impl RequestLogger<'_> {
    pub fn context(&self) -> &RequestContext {
        &self.ctx
    }

    pub async fn record(
        &self,
        level: LogLevel,
        scope: &str,
        method_name: &str,
        message: impl Into<Message>,
        metadata: Fields,
        options: Fields,
    ) -> Result<LogDocument, StoreError> {
        let document = self.logger.builder.build_in_context(
            level,
            scope,
            method_name,
            message,
            metadata,
            options,
            Some(&self.ctx),
        );
        self.logger.dispatch(document, None).await
    }

    pub async fn info(
        &self,
        scope: &str,
        method_name: &str,
        message: impl Into<Message>,
        metadata: Fields,
    ) -> Result<LogDocument, StoreError> {
        self.record(LogLevel::Info, scope, method_name, message, metadata, Fields::new())
            .await
    }

    pub async fn warn(
        &self,
        scope: &str,
        method_name: &str,
        message: impl Into<Message>,
        metadata: Fields,
    ) -> Result<LogDocument, StoreError> {
        self.record(LogLevel::Warn, scope, method_name, message, metadata, Fields::new())
            .await
    }

    pub async fn error(
        &self,
        scope: &str,
        method_name: &str,
        message: impl Into<Message>,
        metadata: Fields,
    ) -> Result<LogDocument, StoreError> {
        self.record(LogLevel::Error, scope, method_name, message, metadata, Fields::new())
            .await
    }
}
