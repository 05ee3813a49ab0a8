//! Tracing subscriber setup.

use std::path::Path;

use sirberus_shared::errors::{SirberusError, SirberusResult};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

const LOG_FILE_PREFIX: &str = "sirberus.log";

/// Install the global subscriber.
///
/// `RUST_LOG` wins over `level`. With `log_dir` set, events are also written
/// to a daily rolling file; keep the returned guard alive until exit so the
/// file writer flushes.
pub fn init_logging(level: &str, log_dir: Option<&Path>) -> SirberusResult<Option<WorkerGuard>> {
    let filter = build_filter(level)?;
    let stderr_layer = fmt::layer().with_target(true).with_writer(std::io::stderr);

    match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr_layer)
                .with(fmt::layer().with_ansi(false).with_writer(writer))
                .try_init()
                .map_err(|e| SirberusError::Config(format!("failed to install logger: {}", e)))?;
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr_layer)
                .try_init()
                .map_err(|e| SirberusError::Config(format!("failed to install logger: {}", e)))?;
            Ok(None)
        }
    }
}

fn build_filter(level: &str) -> SirberusResult<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(level)
            .map_err(|e| SirberusError::Config(format!("invalid log level {}: {}", level, e))),
    }
}
