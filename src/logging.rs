use std::path::Path;

use anyhow::Context;
use once_cell::sync::OnceCell;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::{self, time::UtcTime};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

pub const LOG_ENV: &str = "SITECATALOG_LOG";
pub const LOG_FILE_NAME: &str = "sitecatalog.log";
const DEFAULT_DIRECTIVES: &str = "sitecatalog=info";

static FILE_GUARD: OnceCell<WorkerGuard> = OnceCell::new();

/// Filter from `SITECATALOG_LOG`, then `RUST_LOG`, then `sitecatalog=info`.
pub fn env_filter() -> EnvFilter {
    let directives = std::env::var(LOG_ENV)
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| DEFAULT_DIRECTIVES.into());
    EnvFilter::try_new(&directives).unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES))
}

/// JSON logs on stderr. Safe to call more than once.
pub fn init() {
    let _ = tracing_log::LogTracer::init();
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .json()
        .with_target(true)
        .with_timer(UtcTime::rfc_3339())
        .with_writer(std::io::stderr)
        .try_init();
}

/// Like [`init`], plus a daily rolling file under `dir`.
///
/// The background writer lives for the rest of the process; later calls are no-ops.
pub fn init_with_dir(dir: &Path) -> anyhow::Result<()> {
    if FILE_GUARD.get().is_some() {
        return Ok(());
    }
    std::fs::create_dir_all(dir)
        .with_context(|| format!("create log directory {}", dir.display()))?;

    let appender = tracing_appender::rolling::daily(dir, LOG_FILE_NAME);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    if FILE_GUARD.set(guard).is_err() {
        return Ok(());
    }

    let _ = tracing_log::LogTracer::init();
    let stderr_layer = fmt::layer()
        .json()
        .with_target(true)
        .with_timer(UtcTime::rfc_3339())
        .with_writer(std::io::stderr);
    let file_layer = fmt::layer()
        .json()
        .with_target(true)
        .with_timer(UtcTime::rfc_3339())
        .with_writer(writer);
    let _ = tracing_subscriber::registry()
        .with(env_filter())
        .with(stderr_layer)
        .with(file_layer)
        .try_init();
    Ok(())
}
