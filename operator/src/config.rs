//! C0: process bootstrap configuration. The only configuration surface is
//! the environment — the operator takes no CLI flags (spec.md §6).

use std::env;
use std::time::Duration;

/// Operator-wide configuration, read once at startup.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct Config {
    /// `KUBERNETES_NAMESPACE` — namespace the operator watches.
    pub namespace: String,
    /// `LOGGING_LEVEL` — passed through to the `tracing` `EnvFilter`.
    pub logging_level: String,
    /// `KUBERNETES_SERVICE_DEBUG` — enables verbose tracing of the
    /// Kubernetes gateway's HTTP layer.
    pub kubernetes_service_debug: bool,
    /// How often the periodic worker runs a full sweep.
    pub sweep_interval: Duration,
    /// Bounded read timeout for the cluster-resource watch stream.
    pub watch_timeout: Duration,
}

const TRUTHY: [&str; 4] = ["True", "true", "yes", "1"];

impl Config {
    /// Reads configuration from the process environment, applying the
    /// defaults in spec.md §6.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            namespace: env::var("KUBERNETES_NAMESPACE").unwrap_or_else(|_| "default".to_owned()),
            logging_level: env::var("LOGGING_LEVEL").unwrap_or_else(|_| "DEBUG".to_owned()),
            kubernetes_service_debug: env::var("KUBERNETES_SERVICE_DEBUG")
                .is_ok_and(|v| TRUTHY.contains(&v.as_str())),
            sweep_interval: Duration::from_secs(60),
            watch_timeout: Duration::from_secs(5),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_sentinel_is_case_sensitive_to_the_documented_set() {
        for value in ["True", "true", "yes", "1"] {
            env::set_var("KUBERNETES_SERVICE_DEBUG", value);
            assert!(Config::from_env().kubernetes_service_debug, "{value} should be truthy");
        }
        for value in ["YES", "TRUE", "on", "0", ""] {
            env::set_var("KUBERNETES_SERVICE_DEBUG", value);
            assert!(!Config::from_env().kubernetes_service_debug, "{value} should not be truthy");
        }
        env::remove_var("KUBERNETES_SERVICE_DEBUG");
    }

    #[test]
    fn defaults_apply_when_unset() {
        env::remove_var("KUBERNETES_NAMESPACE");
        env::remove_var("LOGGING_LEVEL");
        let config = Config::from_env();
        assert_eq!(config.namespace, "default");
        assert_eq!(config.logging_level, "DEBUG");
    }
}
