use anyhow::Result;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const FILE_FILTER: &str = "info,chatbot_tui=debug";
const STDERR_FILTER: &str = "warn";

fn env_filter(default: &str) -> EnvFilter {
    EnvFilter::new(std::env::var("RUST_LOG").unwrap_or_else(|_| default.into()))
}

/// Log to a daily file while the terminal belongs to the UI.
///
/// The returned guard flushes pending lines on drop; keep it alive for the
/// lifetime of the program.
pub fn init_file(log_dir: &Path) -> Result<WorkerGuard> {
    std::fs::create_dir_all(log_dir)?;
    let appender = tracing_appender::rolling::daily(log_dir, "chatbot.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::registry()
        .with(env_filter(FILE_FILTER))
        .with(tracing_subscriber::fmt::layer().with_writer(writer).with_ansi(false))
        .try_init()?;

    Ok(guard)
}

/// Log to stderr for one-shot commands
pub fn init_stderr() -> Result<()> {
    tracing_subscriber::registry()
        .with(env_filter(STDERR_FILTER))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init()?;
    Ok(())
}
