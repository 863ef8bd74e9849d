use school_log_shipper::builder::{scope_name, Message, RequestContext};
use school_log_shipper::config::LoggerConfig;
use school_log_shipper::init::{init_logger, init_tracing_with_config, InitError, LayerConfig};
use school_log_shipper::{fields, Fields, LogLevel};
use serde_json::json;

#[tokio::main]
async fn main() -> Result<(), InitError> {
    // Example: LOG_STORE_DSN=opensearch://localhost:9200/school-application-logs
    let config = LoggerConfig::from_env()?;
    let logger = init_logger(&config).await?;
    init_tracing_with_config(
        &config,
        &logger,
        LayerConfig {
            ship_events: true,
            ..LayerConfig::default()
        },
    )?;

    let scope = scope_name("SchoolApplication", env!("CARGO_PKG_VERSION"));
    logger
        .info(&scope, "main", "Application started", fields(json!({ "port": 3000 })), Fields::new())
        .await?;

    logger
        .with_request(RequestContext::new("req-1").with_user("staff-7"))
        .warn(&scope, "main", "slow request", fields(json!({ "duration_ms": 1250 })))
        .await?;

    let err = std::io::Error::new(std::io::ErrorKind::NotFound, "student s-404 not found");
    logger
        .error(&scope, "main", Message::from_error(&err), Fields::new(), Fields::new())
        .await?;

    logger
        .log_action("enroll", "student", Some("s-1"), fields(json!({ "class": "7B" })))
        .await?;

    // Notification events go to their own index.
    logger
        .record(
            LogLevel::Info,
            "NotificationService#1.0.0",
            "consume",
            "student.created notification received",
            Fields::new(),
            Fields::new(),
            Some("notification-logs"),
        )
        .await?;

    tracing::warn!(scope = "SchoolApplication", method = "main", "forwarded through the tracing layer");

    logger.flush().await?;
    let errors = logger.logs_by_level("error", 10).await?;
    println!("{} error entries in {}", errors.total, config.index_name);

    let health = logger.health().await?;
    println!("cluster status: {} ({} nodes)", health.status, health.number_of_nodes);

    logger.cleanup().await?;
    Ok(())
}
