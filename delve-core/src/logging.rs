//! Tracing subscriber setup.
//!
//! A human-readable stderr layer is always installed. When a JSON directory is
//! configured, a second layer writes structured logs through a daily rolling,
//! non-blocking appender.

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::config::LoggingConfig;

/// Install the global subscriber.
///
/// `RUST_LOG` takes precedence over `config.level`. The returned guard must be
/// held for as long as the JSON file layer should keep flushing. Calling this
/// more than once leaves the first subscriber in place.
pub fn init_logging(config: &LoggingConfig) -> Option<WorkerGuard> {
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| config.level.clone());

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::new(&filter));

    let (json_layer, guard) = match config.json_dir {
        Some(ref dir) => {
            let _ = std::fs::create_dir_all(dir);
            let file_appender = tracing_appender::rolling::daily(dir, "delve.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            let layer = tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_filter(EnvFilter::new("debug"));
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let installed = tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .try_init()
        .is_ok();

    if installed {
        tracing::debug!(level = %filter, "Logging initialized");
    }
    guard
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_logging_twice_is_harmless() {
        let dir = tempfile::tempdir().unwrap();
        let config = LoggingConfig {
            level: "debug".into(),
            json_dir: Some(dir.path().to_path_buf()),
        };
        let _first = init_logging(&config);
        let _second = init_logging(&LoggingConfig::default());
        tracing::info!("still logging");
        assert!(dir.path().exists());
    }
}
