pub mod rng;
pub mod tasks;

/// Initializes `env_logger` at the given filter level, falling back to
/// `RUST_LOG` for per-module overrides. Mirrors the way every fledger
/// binary brings up logging: a bare `Builder`, one default level, then
/// `parse_env`.
pub fn start_logging_filter_level(level: log::LevelFilter) {
    let mut logger = env_logger::Builder::new();
    logger.filter_level(level);
    logger.parse_env("RUST_LOG");
    if logger.try_init().is_err() {
        log::trace!("Logger probably already initialized");
    }
}
