use tracing_subscriber::EnvFilter;

use super::args::{Args, LogFormat};

/// Initialises the global `tracing` subscriber from the CLI's level/format
/// flags. Respects `RUST_LOG` if set, with `args.log_level` as the default
/// directive when it isn't.
pub fn init_logging(args: &Args) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(args.log_level.to_string()));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(!args.no_color);

    match args.log_format {
        LogFormat::Json => subscriber.json().init(),
        LogFormat::Pretty => subscriber.pretty().init(),
        LogFormat::Text => subscriber.init(),
    }

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "logcentral starting up");
}
