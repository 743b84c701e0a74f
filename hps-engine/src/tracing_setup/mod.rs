//! Tracing setup: one global subscriber, filtered by `RUST_LOG` or the
//! configured level.

pub mod spans;

use tracing_subscriber::EnvFilter;

use hps_core::config::ObservabilityConfig;

/// Install the global subscriber.
///
/// `RUST_LOG` takes precedence over `config.log_level`. Returns `false` when
/// a subscriber was already installed, so repeated calls are harmless.
pub fn init_tracing(config: &ObservabilityConfig) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true);

    let installed = if config.json_logs {
        builder.json().try_init().is_ok()
    } else {
        builder.try_init().is_ok()
    };
    if installed {
        tracing::debug!(level = %config.log_level, json = config.json_logs, "tracing initialized");
    }
    installed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_install_is_a_no_op() {
        let config = ObservabilityConfig::default();
        let _ = init_tracing(&config);
        assert!(!init_tracing(&config));
    }
}
