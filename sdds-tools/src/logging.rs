use std::io::IsTerminal;

use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::util::SubscriberInitExt;

/// Send log records, including those of the `log` facade, to standard error.
pub fn setup_logger(filter: EnvFilter) -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_level(true)
        .with_target(false)
        .with_env_filter(filter)
        .with_ansi(std::io::stderr().is_terminal())
        .finish()
        .try_init()?;
    Ok(())
}

/// `RUST_LOG` when set, otherwise warnings, or debug output when `verbose`.
pub fn default_env_filter(verbose: bool) -> EnvFilter {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => {
            let default_level = if verbose {
                LevelFilter::DEBUG
            } else {
                LevelFilter::WARN
            };
            EnvFilter::builder()
                .with_default_directive(default_level.into())
                .parse_lossy("")
        }
    }
}
