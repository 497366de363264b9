//! # Structured Logging
//!
//! The vault crates only emit `tracing` events. Whatever process embeds a
//! vault decides where they go; [`init_logging`] is the stock choice: an
//! `EnvFilter` honoring `RUST_LOG`, and either human-readable or JSON-lines
//! output on stderr.

use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable, with file and line of the emitting call site.
    Pretty,
    /// One JSON object per event, for log shippers.
    Json,
}

impl LogFormat {
    /// `"json"` in any case selects [`LogFormat::Json`]; anything else is
    /// [`LogFormat::Pretty`].
    pub fn from_str_lossy(s: &str) -> Self {
        if s.eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Pretty
        }
    }
}

/// Installs the global subscriber.
///
/// `default_level` applies when `RUST_LOG` is unset, e.g.
/// `"meridian_contracts=debug,meridian_protocol=info"`. Fails with
/// [`TryInitError`] if a global subscriber is already installed.
pub fn init_logging(default_level: &str, format: LogFormat) -> Result<(), TryInitError> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let json = format == LogFormat::Json;
    let pretty_layer = (!json).then(|| {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_file(true)
            .with_line_number(true)
    });
    let json_layer = json.then(|| fmt::layer().json().with_writer(std::io::stderr));

    tracing_subscriber::registry()
        .with(filter)
        .with(pretty_layer)
        .with(json_layer)
        .try_init()?;

    tracing::debug!(?format, "logging initialized");
    Ok(())
}
