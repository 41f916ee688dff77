use crate::config::{set_config, Config};

use super::args::Args;

/// Loads the configuration file named by `args`, installs it as the
/// process-wide default, and returns the loaded value for callers that test
/// and exit (`--test-config`).
///
/// `Config::load` never fails outright — a missing or malformed file falls
/// back to defaults with a warning — so there is no error path here beyond
/// what the acceptor's own bind failure handles.
pub fn init_config(args: &Args) -> Config {
    let config = Config::load(&args.config_file);
    set_config(config.clone());
    config
}
