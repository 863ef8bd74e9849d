use crate::builder::EntryBuilder;
use crate::record::{Fields, LogDocument, LogLevel};
use crate::shipper::Shipper;
use serde_json::Value;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::field::{Field, Visit};
use tracing::{warn, Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;

/// Events from this crate are never shipped, otherwise flush diagnostics
/// would feed back into the buffer they describe.
const OWN_TARGET: &str = env!("CARGO_CRATE_NAME");

/// `tracing_subscriber` layer that turns `tracing` events into
/// [`LogDocument`]s and hands them to a [`Shipper`] through a bounded
/// channel and a forwarding task.
///
/// Fields named `scope` and `method` become the document's scope and
/// method name (falling back to the event target and module path); other
/// fields go to `args`. Emitting threads never wait: when the channel is
/// full the event is counted in `dropped_events` and discarded.
pub struct ShippingLayer {
    sender: mpsc::Sender<LogDocument>,
    builder: EntryBuilder,
    max_level: Level,
    /// Total events seen by the layer (before filtering by level).
    pub total_events: Arc<AtomicU64>,
    /// Successfully enqueued into channel.
    pub enqueued_events: Arc<AtomicU64>,
    /// Dropped because the channel was full.
    pub dropped_events: Arc<AtomicU64>,
}

impl ShippingLayer {
    /// Create the layer and spawn the task that moves documents from the
    /// channel into `shipper`.
    ///
    /// `buffer` is clamped to at least 16. Events more verbose than
    /// `max_level` are ignored.
    pub fn new(
        shipper: Arc<Shipper>,
        builder: EntryBuilder,
        buffer: usize,
        max_level: Level,
    ) -> (Self, JoinHandle<()>) {
        let buffer = buffer.max(16);
        let (tx, mut rx) = mpsc::channel::<LogDocument>(buffer);

        let handle = tokio::spawn(async move {
            while let Some(document) = rx.recv().await {
                if let Err(e) = shipper.enqueue(None, document.to_value()).await {
                    warn!(error = %e, "flush triggered by forwarded event failed");
                }
            }
        });

        (
            ShippingLayer {
                sender: tx,
                builder,
                max_level,
                total_events: Arc::new(AtomicU64::new(0)),
                enqueued_events: Arc::new(AtomicU64::new(0)),
                dropped_events: Arc::new(AtomicU64::new(0)),
            },
            handle,
        )
    }
}

fn is_own_target(target: &str) -> bool {
    target
        .strip_prefix(OWN_TARGET)
        .map_or(false, |rest| rest.is_empty() || rest.starts_with("::"))
}

fn level_of(level: &Level) -> LogLevel {
    match *level {
        Level::ERROR => LogLevel::Error,
        Level::WARN => LogLevel::Warn,
        Level::INFO => LogLevel::Info,
        Level::DEBUG => LogLevel::Debug,
        _ => LogLevel::Other("trace".to_string()),
    }
}

impl<S> Layer<S> for ShippingLayer
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        self.total_events.fetch_add(1, Ordering::Relaxed);

        let meta = event.metadata();
        if *meta.level() > self.max_level || is_own_target(meta.target()) {
            return;
        }

        let mut fields = Fields::new();
        let mut visitor = FieldVisitor {
            fields: &mut fields,
            message: None,
            scope: None,
            method: None,
        };
        event.record(&mut visitor);
        let FieldVisitor {
            message,
            scope,
            method,
            ..
        } = visitor;

        let scope = scope.unwrap_or_else(|| meta.target().to_string());
        let method = method
            .or_else(|| meta.module_path().map(str::to_string))
            .unwrap_or_default();

        let document = self.builder.build(
            level_of(meta.level()),
            &scope,
            &method,
            message.unwrap_or_default(),
            fields,
            Fields::new(),
        );

        match self.sender.try_send(document) {
            Ok(()) => {
                self.enqueued_events.fetch_add(1, Ordering::Relaxed);
            }
            Err(_) => {
                self.dropped_events.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

pub struct FieldVisitor<'a> {
    pub fields: &'a mut Fields,
    pub message: Option<String>,
    pub scope: Option<String>,
    pub method: Option<String>,
}

impl FieldVisitor<'_> {
    fn insert(&mut self, field: &Field, value: Value) {
        self.fields.insert(field.name().to_string(), value);
    }
}

impl Visit for FieldVisitor<'_> {
    fn record_str(&mut self, field: &Field, value: &str) {
        match field.name() {
            "message" => self.message = Some(value.to_string()),
            "scope" => self.scope = Some(value.to_string()),
            "method" => self.method = Some(value.to_string()),
            _ => self.insert(field, Value::String(value.to_string())),
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.insert(field, Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.insert(field, Value::from(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.insert(field, Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.insert(field, Value::from(value));
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.insert(field, Value::String(value.to_string()));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        let rendered = format!("{:?}", value);
        match field.name() {
            "message" => self.message = Some(rendered),
            "scope" => self.scope = Some(rendered),
            "method" => self.method = Some(rendered),
            _ => self.insert(field, Value::String(rendered)),
        }
    }
}
