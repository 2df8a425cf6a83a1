use std::fs;
use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DEFAULT_DIRECTIVE: &str = "soymap=info,warn";

/// Initializes console logging on stderr and, when `log_dir` is given, a JSON
/// file log with daily rotation.
///
/// The returned guard flushes the file writer on drop; hold it until exit.
pub fn init_logging(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    // Respect RUST_LOG if set
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE));

    let console_layer = fmt::layer().with_target(true).with_writer(std::io::stderr);

    let (file_layer, guard) = match log_dir {
        Some(dir) => match fs::create_dir_all(dir) {
            Ok(()) => {
                let file_appender = tracing_appender::rolling::daily(dir, "soymap.log");
                let (writer, guard) = tracing_appender::non_blocking(file_appender);
                (Some(fmt::layer().json().with_writer(writer)), Some(guard))
            }
            Err(e) => {
                eprintln!("warning: cannot create log directory {}: {e}", dir.display());
                (None, None)
            }
        },
        None => (None, None),
    };

    // A subscriber may already be installed (tests)
    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init();

    guard
}
