use tracing_subscriber::EnvFilter;

use crate::config::LogConfig;

pub const LOG_ENV: &str = "TUBE_REMOTE_LOG";

/// Installs the global fmt subscriber. Later calls are no-ops.
pub fn init(cfg: &LogConfig) {
    let filter = filter_for(std::env::var(LOG_ENV).ok().as_deref(), &cfg.level);
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn filter_for(from_env: Option<&str>, level: &str) -> EnvFilter {
    from_env
        .filter(|value| !value.trim().is_empty())
        .and_then(|value| EnvFilter::try_new(value).ok())
        .or_else(|| EnvFilter::try_new(level).ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_directive_wins_over_config_level() {
        let filter = filter_for(Some("tube_remote=debug"), "warn");
        assert_eq!(filter.to_string(), "tube_remote=debug");
    }

    #[test]
    fn blank_env_falls_back_to_config_level() {
        assert_eq!(filter_for(Some("  "), "warn").to_string(), "warn");
        assert_eq!(filter_for(None, "debug").to_string(), "debug");
    }
}
