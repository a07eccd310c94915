//! Logging setup utilities for the Rakugaki binaries.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber with the specified default log level.
///
/// The filter covers the server library crate, this crate and the binary.
/// It can be overridden using the `RUST_LOG` environment variable.
///
/// # Arguments
///
/// * `binary_name` - The name of the binary (e.g., "rakugaki-server")
/// * `default_log_level` - The default log level (e.g., "debug", "info", "warn", "error")
///
/// # Examples
///
/// ```no_run
/// use rakugaki_shared::logger::setup_logger;
///
/// setup_logger("rakugaki-server", "info");
/// ```
pub fn setup_logger(binary_name: &str, default_log_level: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_directives(binary_name, default_log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn default_directives(binary_name: &str, default_log_level: &str) -> String {
    format!(
        "rakugaki_server={level},{shared}={level},{bin}={level},tower_http={level}",
        level = default_log_level,
        shared = env!("CARGO_PKG_NAME").replace('-', "_"),
        bin = binary_name.replace('-', "_"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directives_cover_server_and_binary() {
        // テスト項目: デフォルトのフィルタがサーバークレートとバイナリを含む
        // given (前提条件):
        let binary_name = "rakugaki-server";

        // when (操作):
        let directives = default_directives(binary_name, "debug");

        // then (期待する結果):
        assert!(directives.contains("rakugaki_server=debug"));
        assert!(directives.contains("rakugaki_shared=debug"));
        assert!(!directives.contains("rakugaki-server"));
    }
}
