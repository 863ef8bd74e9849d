pub mod record;
pub mod builder;
pub mod local;
pub mod store;
pub mod shipper;
pub mod scheduler;
pub mod query;
pub mod logger;
pub mod layer;

#[cfg(feature = "opensearch")]
pub mod opensearch;

pub mod backend;
pub mod config;
pub mod env;
pub mod init;

pub use builder::{EntryBuilder, Message, RequestContext};
pub use config::LoggerConfig;
pub use logger::Logger;
pub use record::{fields, Fields, LogDocument, LogLevel};
pub use store::DocumentStore;
