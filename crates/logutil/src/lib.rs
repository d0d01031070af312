//! Utilities for logging.
use tracing::Level;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::SubscriberBuilder;

/// Output format for logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoggingMode {
    #[default]
    Pretty,
    Json,
    Compact,
}

/// Map a `-v` count to a max log level.
pub fn level_for_verbosity(verbosity: u8) -> Level {
    match verbosity {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// Initialize a global trace subscriber.
///
/// `RUST_LOG` takes precedence over the level derived from `verbosity`.
/// Calling this more than once is a no-op.
pub fn init(verbosity: u8, mode: LoggingMode) {
    let level = level_for_verbosity(verbosity);
    let env_filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    let builder = SubscriberBuilder::default()
        .with_env_filter(env_filter)
        .with_target(true);

    let result = match mode {
        LoggingMode::Pretty => builder.pretty().try_init(),
        LoggingMode::Json => builder.json().try_init(),
        LoggingMode::Compact => builder.compact().try_init(),
    };

    if let Err(e) = result {
        eprintln!("logger already initialized: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_levels() {
        assert_eq!(Level::INFO, level_for_verbosity(0));
        assert_eq!(Level::DEBUG, level_for_verbosity(1));
        assert_eq!(Level::TRACE, level_for_verbosity(2));
        assert_eq!(Level::TRACE, level_for_verbosity(9));
    }

    #[test]
    fn init_twice_is_fine() {
        init(0, LoggingMode::Compact);
        init(2, LoggingMode::Json);
    }
}
