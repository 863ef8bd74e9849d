use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;

/// Open key-value map used for metadata and caller overrides.
pub type Fields = Map<String, Value>;

/// Turn a JSON value into [`Fields`].
///
/// Objects are taken as-is, `null` becomes an empty map and any other
/// value is stored under the `value` key.
pub fn fields(value: Value) -> Fields {
    match value {
        Value::Object(map) => map,
        Value::Null => Fields::new(),
        other => {
            let mut map = Fields::new();
            map.insert("value".to_string(), other);
            map
        }
    }
}

/// Severity of a [`LogDocument`].
///
/// Unknown level names are kept verbatim in [`LogLevel::Other`] instead of
/// being coerced onto one of the four known levels.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Other(String),
}

impl LogLevel {
    pub fn parse(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "error" => LogLevel::Error,
            "warn" | "warning" => LogLevel::Warn,
            "info" => LogLevel::Info,
            "debug" => LogLevel::Debug,
            _ => LogLevel::Other(name.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Other(name) => name,
        }
    }

    /// Numeric severity, lower is more severe. `None` for unknown levels.
    pub fn severity(&self) -> Option<u8> {
        match self {
            LogLevel::Error => Some(0),
            LogLevel::Warn => Some(1),
            LogLevel::Info => Some(2),
            LogLevel::Debug => Some(3),
            LogLevel::Other(_) => None,
        }
    }

    /// Whether a record at `self` passes a `min` threshold.
    ///
    /// Unknown levels always pass.
    pub fn enabled_at(&self, min: &LogLevel) -> bool {
        match (self.severity(), min.severity()) {
            (Some(level), Some(min)) => level <= min,
            _ => true,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `app::SaveError<app::Student>` -> `SaveError`,
/// `dyn core::error::Error + Send + Sync` -> `Error`.
fn short_type_name(full: &str) -> &str {
    let base = full.trim_start_matches("dyn ");
    let base = base.split(|c| c == '<' || c == ' ').next().unwrap_or(base);
    base.rsplit("::").next().unwrap_or(base)
}

impl Serialize for LogLevel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Structured description of an error attached to a log document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorDetail {
    pub message: String,
    pub stack: Option<String>,
    pub name: String,
}

impl ErrorDetail {
    /// Capture an error value. The `source()` chain becomes the stack text
    /// and the short type name becomes `name`.
    ///
    /// Accepts trait objects too (`&*boxed`, `&dyn Error`); their kind name
    /// is then the trait's, `Error`.
    pub fn from_error<E>(err: &E) -> Self
    where
        E: std::error::Error + ?Sized + 'static,
    {
        let name = short_type_name(std::any::type_name::<E>()).to_string();

        let mut chain = Vec::new();
        let mut source = err.source();
        while let Some(cause) = source {
            chain.push(format!("caused by: {}", cause));
            source = cause.source();
        }

        ErrorDetail {
            message: err.to_string(),
            stack: if chain.is_empty() { None } else { Some(chain.join("\n")) },
            name,
        }
    }
}

/// The unit shipped to the remote store and written to the local sink.
///
/// Built once by [`crate::builder::EntryBuilder`] and not mutated
/// afterwards. Serialization goes through [`LogDocument::to_value`] so that
/// `overrides` are merged last and win on key collisions.
#[derive(Debug, Clone, PartialEq)]
pub struct LogDocument {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub scope: String,
    pub method_name: String,
    pub message: String,
    pub service: String,
    pub environment: String,
    pub args: Fields,
    pub error: Option<ErrorDetail>,
    pub request_id: Option<String>,
    pub user_id: Option<String>,
    pub overrides: Fields,
}

impl LogDocument {
    /// ISO-8601 timestamp with millisecond precision, `Z` suffix.
    pub fn timestamp_string(&self) -> String {
        self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    pub fn to_value(&self) -> Value {
        let mut map = Fields::new();
        map.insert("timestamp".into(), Value::String(self.timestamp_string()));
        map.insert("level".into(), Value::String(self.level.as_str().to_string()));
        map.insert("scope".into(), Value::String(self.scope.clone()));
        map.insert("methodName".into(), Value::String(self.method_name.clone()));
        map.insert("message".into(), Value::String(self.message.clone()));
        map.insert("service".into(), Value::String(self.service.clone()));
        map.insert("environment".into(), Value::String(self.environment.clone()));
        map.insert("args".into(), Value::Object(self.args.clone()));
        if let Some(error) = &self.error {
            map.insert(
                "error".into(),
                serde_json::to_value(error).unwrap_or(Value::Null),
            );
        }
        if let Some(request_id) = &self.request_id {
            map.insert("requestId".into(), Value::String(request_id.clone()));
        }
        if let Some(user_id) = &self.user_id {
            map.insert("userId".into(), Value::String(user_id.clone()));
        }
        for (key, value) in &self.overrides {
            map.insert(key.clone(), value.clone());
        }
        Value::Object(map)
    }

    /// Look up a top-level field of the serialized document.
    pub fn field(&self, key: &str) -> Option<Value> {
        match self.to_value() {
            Value::Object(mut map) => map.remove(key),
            _ => None,
        }
    }
}

impl Serialize for LogDocument {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}
