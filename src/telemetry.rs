//! Tracing setup for the daemon binary.

use tracing_subscriber::EnvFilter;

/// Initialize the global subscriber.
///
/// Filter precedence: `REWARMD_LOG` env var, then the `-v` count
/// (0 = info, 1 = debug, 2+ = trace).
pub fn init(verbosity: u8) {
    let default = match verbosity {
        0 => "rewarmd=info",
        1 => "rewarmd=debug",
        _ => "rewarmd=trace",
    };
    let filter = EnvFilter::try_from_env("REWARMD_LOG")
        .unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
