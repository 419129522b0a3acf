//! Log setup: timestamped leveled lines on stdout plus an append-only
//! `cloud_hands.log` in the working directory. `RUST_LOG` overrides the
//! default filter; `--verbose` forces debug.

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub const LOG_FILE: &str = "cloud_hands.log";

/// Install the global subscriber. The returned guard must stay alive for the
/// duration of the process so buffered file writes are flushed.
pub fn init(verbose: bool) -> WorkerGuard {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let file_appender = tracing_appender::rolling::never(".", LOG_FILE);
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stdout))
        .with(fmt::layer().with_writer(file_writer).with_ansi(false))
        .init();

    guard
}
