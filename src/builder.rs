use crate::record::{ErrorDetail, Fields, LogDocument, LogLevel};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Source of timestamps for new documents.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Message part of a log call: plain text or a captured error.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Text(String),
    Error(ErrorDetail),
}

impl Message {
    pub fn from_error<E>(err: &E) -> Self
    where
        E: std::error::Error + ?Sized + 'static,
    {
        Message::Error(ErrorDetail::from_error(err))
    }

    pub fn text(&self) -> &str {
        match self {
            Message::Text(text) => text,
            Message::Error(detail) => &detail.message,
        }
    }
}

impl From<&str> for Message {
    fn from(text: &str) -> Self {
        Message::Text(text.to_string())
    }
}

impl From<String> for Message {
    fn from(text: String) -> Self {
        Message::Text(text)
    }
}

impl From<&String> for Message {
    fn from(text: &String) -> Self {
        Message::Text(text.clone())
    }
}

impl From<ErrorDetail> for Message {
    fn from(detail: ErrorDetail) -> Self {
        Message::Error(detail)
    }
}

/// Strings are used as-is, anything else is stringified.
impl From<Value> for Message {
    fn from(value: Value) -> Self {
        match value {
            Value::String(text) => Message::Text(text),
            other => Message::Text(other.to_string()),
        }
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.text())
    }
}

/// Correlation identifiers stamped on every document of one request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    pub request_id: String,
    pub user_id: Option<String>,
}

impl RequestContext {
    pub fn new(request_id: impl Into<String>) -> Self {
        RequestContext {
            request_id: request_id.into(),
            user_id: None,
        }
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }
}

/// Pure assembler of [`LogDocument`]s.
///
/// Holds the process-wide constants (`service`, `environment`) and the
/// clock; no I/O happens here.
#[derive(Clone)]
pub struct EntryBuilder {
    service: String,
    environment: String,
    clock: Clock,
}

impl fmt::Debug for EntryBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntryBuilder")
            .field("service", &self.service)
            .field("environment", &self.environment)
            .finish_non_exhaustive()
    }
}

impl EntryBuilder {
    pub fn new(service: impl Into<String>, environment: impl Into<String>) -> Self {
        EntryBuilder {
            service: service.into(),
            environment: environment.into(),
            clock: Arc::new(Utc::now),
        }
    }

    /// Replace the timestamp source, mostly for deterministic tests.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// Assemble a document.
    ///
    /// **Parameters**
    /// - `metadata`: stored under `args`.
    /// - `options`: extra top-level fields merged over the computed ones;
    ///   on key collision `options` wins.
    ///
    /// When `message` is an error, its text becomes `message` and the
    /// structured detail is attached under `error`.
    pub fn build(
        &self,
        level: LogLevel,
        scope: &str,
        method_name: &str,
        message: impl Into<Message>,
        metadata: Fields,
        options: Fields,
    ) -> LogDocument {
        self.build_in_context(level, scope, method_name, message, metadata, options, None)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn build_in_context(
        &self,
        level: LogLevel,
        scope: &str,
        method_name: &str,
        message: impl Into<Message>,
        metadata: Fields,
        options: Fields,
        context: Option<&RequestContext>,
    ) -> LogDocument {
        let (message, error) = match message.into() {
            Message::Text(text) => (text, None),
            Message::Error(detail) => (detail.message.clone(), Some(detail)),
        };

        LogDocument {
            timestamp: (self.clock)(),
            level,
            scope: scope.to_string(),
            method_name: method_name.to_string(),
            message,
            service: self.service.clone(),
            environment: self.environment.clone(),
            args: metadata,
            error,
            request_id: context.map(|ctx| ctx.request_id.clone()),
            user_id: context.and_then(|ctx| ctx.user_id.clone()),
            overrides: options,
        }
    }

    /// `level=info`, `scope="Event"`, `methodName=<event_type>`, with
    /// `eventType` merged under the caller options.
    pub fn event(&self, event_type: &str, values: Fields, options: Fields) -> LogDocument {
        let mut merged = Fields::new();
        merged.insert("eventType".into(), Value::String(event_type.to_string()));
        merged.extend(options);
        self.build(
            LogLevel::Info,
            "Event",
            event_type,
            format!("Event: {}", event_type),
            values,
            merged,
        )
    }

    /// Normalized resource/action record: `scope="Action#<action>"`,
    /// `methodName="<resource>_action"`.
    pub fn action(
        &self,
        action: &str,
        resource: &str,
        resource_id: Option<&str>,
        metadata: Fields,
    ) -> LogDocument {
        let mut options = Fields::new();
        options.insert("action".into(), Value::String(action.to_string()));
        options.insert("resource".into(), Value::String(resource.to_string()));
        options.insert(
            "resourceId".into(),
            resource_id.map_or(Value::Null, |id| Value::String(id.to_string())),
        );
        options.extend(metadata);
        self.build(
            LogLevel::Info,
            &format!("Action#{}", action),
            &format!("{}_action", resource),
            format!("Action: {} on resource: {}", action, resource),
            Fields::new(),
            options,
        )
    }
}

/// `"<component>#<version>"`, the scope label convention used by callers.
pub fn scope_name(component: &str, version: &str) -> String {
    format!("{}#{}", component, version)
}
