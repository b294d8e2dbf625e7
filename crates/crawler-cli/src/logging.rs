use std::path::Path;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initializes the process-wide tracing subscriber. `debug` raises the
/// default filter level; `log_file_path` additionally tees output to a
/// daily-rolling file. Returns the worker guard for the file appender,
/// which must be held for the life of the process or buffered lines are
/// dropped on exit.
pub fn init_logging(
    debug: bool,
    log_file_path: Option<&str>,
) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>, Box<dyn std::error::Error>> {
    let default_level = if debug { "debug" } else { "info" };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "{default_level},ssh2=debug,libssh2_sys=warn,sqlx=warn"
        ))
    });

    match log_file_path {
        Some(path) => {
            let path = Path::new(path);
            let directory = path.parent().unwrap_or_else(|| Path::new("."));
            let filename = path
                .file_name()
                .unwrap_or_else(|| std::ffi::OsStr::new("crawler.log"));

            let file_appender = rolling::daily(directory, filename);
            let (file_writer, guard) = non_blocking(file_appender);

            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().with_writer(file_writer))
                .with(fmt::layer())
                .init();

            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer())
                .init();

            Ok(None)
        }
    }
}
