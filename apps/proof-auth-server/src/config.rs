//! Server configuration: YAML file overlaid with `PROOF_AUTH__` environment
//! variables (`__` separates nesting levels).

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::Path;

use anyhow::Context;
use figment::Figment;
use figment::providers::{Env, Format, Yaml};
use proof_auth::{PluginConfig, ProofAuthConfig};
use serde::Deserialize;
use serde_json::json;

pub const ENV_PREFIX: &str = "PROOF_AUTH__";

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8087))
}

fn default_log_level() -> String {
    "info".to_owned()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    pub auth: ProofAuthConfig,

    /// Per-plugin blocks; merged over `auth.plugins`.
    #[serde(default)]
    pub plugins: BTreeMap<String, PluginConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    /// `EnvFilter` directives; `RUST_LOG` takes precedence.
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::Text,
        }
    }
}

impl AppConfig {
    /// Load `path` (if it exists) and overlay the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the sources cannot be parsed or the result does
    /// not describe a valid configuration.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let mut figment = Figment::new();
        if path.exists() {
            figment = figment.merge(Yaml::file(path));
        }
        figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .with_context(|| format!("failed to load configuration from {}", path.display()))
    }

    /// Module configuration with the top-level plugin blocks folded in.
    #[must_use]
    pub fn module_config(&self) -> ProofAuthConfig {
        let mut auth = self.auth.clone();
        auth.plugins
            .extend(self.plugins.iter().map(|(k, v)| (k.clone(), v.clone())));
        auth
    }

    /// Effective configuration with the signing secret masked.
    #[must_use]
    pub fn redacted(&self) -> serde_json::Value {
        let auth = self.module_config();
        json!({
            "server": { "bind_addr": self.server.bind_addr.to_string() },
            "logging": {
                "level": self.logging.level,
                "format": match self.logging.format {
                    LogFormat::Text => "text",
                    LogFormat::Json => "json",
                },
            },
            "auth": {
                "jwt_secret": "***",
                "access_token_ttl_secs": auth.access_token_ttl_secs,
                "refresh_token_ttl_secs": auth.refresh_token_ttl_secs,
                "login_policy": auth.login_policy,
                "required_plugins": auth.required_plugins,
                "revalidation_interval_secs": auth.revalidation_interval_secs,
                "body_limit_bytes": auth.body_limit_bytes,
            },
            "plugins": auth.plugins,
        })
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use std::io::Write;

    const YAML: &str = r#"
server:
  bind_addr: "0.0.0.0:9000"
auth:
  jwt_secret: "0123456789abcdef0123456789abcdef"
  login_policy: allow_partial
plugins:
  hash-role:
    config:
      roles: []
"#;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn loads_yaml_file() {
        let file = write_config(YAML);
        temp_env::with_vars_unset(["PROOF_AUTH__AUTH__JWT_SECRET"], || {
            let cfg = AppConfig::load(file.path()).unwrap();
            assert_eq!(cfg.server.bind_addr, "0.0.0.0:9000".parse().unwrap());
            assert_eq!(cfg.logging.format, LogFormat::Text);
            assert_eq!(cfg.auth.login_policy, proof_auth::LoginPolicy::AllowPartial);
            assert!(cfg.module_config().plugins.contains_key("hash-role"));
        });
    }

    #[test]
    fn environment_overrides_file() {
        let file = write_config(YAML);
        temp_env::with_vars(
            [
                ("PROOF_AUTH__AUTH__JWT_SECRET", Some("from-env-from-env-from-env-from-env")),
                ("PROOF_AUTH__LOGGING__FORMAT", Some("json")),
            ],
            || {
                let cfg = AppConfig::load(file.path()).unwrap();
                assert_eq!(
                    cfg.auth.jwt_secret.expose_secret(),
                    "from-env-from-env-from-env-from-env"
                );
                assert_eq!(cfg.logging.format, LogFormat::Json);
            },
        );
    }

    #[test]
    fn missing_secret_is_an_error() {
        let file = write_config("server:\n  bind_addr: \"127.0.0.1:1\"\n");
        temp_env::with_vars_unset(["PROOF_AUTH__AUTH__JWT_SECRET"], || {
            assert!(AppConfig::load(file.path()).is_err());
        });
    }

    #[test]
    fn redacted_hides_secret() {
        let file = write_config(YAML);
        temp_env::with_vars_unset(["PROOF_AUTH__AUTH__JWT_SECRET"], || {
            let cfg = AppConfig::load(file.path()).unwrap();
            let value = cfg.redacted();
            assert_eq!(value["auth"]["jwt_secret"], "***");
            assert_eq!(value["auth"]["login_policy"], "allow_partial");
            assert!(!value.to_string().contains("0123456789abcdef"));
        });
    }
}
