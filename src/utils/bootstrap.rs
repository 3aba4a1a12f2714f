//! Bootstrap utilities for koth binaries.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LOG_ENV_VAR;

/// Initialize tracing with the KOTH_LOG environment variable.
///
/// Defaults to "info" level if KOTH_LOG is not set.
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_env(LOG_ENV_VAR)
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Value of a `--config <path>` or `--config=<path>` argument.
pub fn parse_config_path<I>(args: I) -> Option<String>
where
    I: IntoIterator<Item = String>,
{
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        if arg == "--config" || arg == "-c" {
            return args.next();
        }
        if let Some(path) = arg.strip_prefix("--config=") {
            return Some(path.to_string());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_config_path() {
        assert_eq!(
            parse_config_path(args(&["poller", "--config", "a.yaml"])),
            Some("a.yaml".to_string())
        );
        assert_eq!(
            parse_config_path(args(&["poller", "--config=b.yaml"])),
            Some("b.yaml".to_string())
        );
        assert_eq!(parse_config_path(args(&["poller"])), None);
        assert_eq!(parse_config_path(args(&["poller", "--config"])), None);
    }
}
