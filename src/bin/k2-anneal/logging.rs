use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Installs the stderr subscriber.
///
/// `RUST_LOG` is honored when no verbosity flag is given; `-v` flags and
/// `--quiet` override it.
pub fn setup_logging(verbosity: u8, quiet: bool) -> anyhow::Result<()> {
    let filter = if quiet {
        EnvFilter::new("off")
    } else {
        match verbosity {
            0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
            1 => EnvFilter::new("info"),
            2 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact();

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .try_init()?;
    Ok(())
}
