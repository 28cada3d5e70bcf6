use std::fs;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Guard that keeps the non-blocking file writer flushing until drop.
pub struct LogGuard {
    _file: tracing_appender::non_blocking::WorkerGuard,
}

/// Console + daily-rotated JSON file logging. The file layer records the
/// full request/reconciliation trail; the console stays human-readable.
pub fn init_logging() -> LogGuard {
    let _ = fs::create_dir_all("logs");

    let file_appender = tracing_appender::rolling::daily("logs", "reserva.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("reserva_engine=info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().with_writer(file_writer))
        .with(fmt::layer().with_target(false).with_writer(std::io::stdout))
        .init();

    LogGuard { _file: guard }
}
