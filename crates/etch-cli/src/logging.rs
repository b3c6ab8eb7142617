use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber once for the process.
///
/// Logs go to stderr so listings and results on stdout stay clean.
/// `RUST_LOG` wins when set; otherwise the level is `info`, or `debug`
/// with `--debug`.
pub fn init(debug: bool) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let fmt_layer = fmt::layer()
        .with_target(debug)
        .with_level(true)
        .with_writer(std::io::stderr)
        .compact();

    let default = if debug { "debug" } else { "info" };
    let filter_layer = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(default))?;

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .try_init()?;

    Ok(())
}
