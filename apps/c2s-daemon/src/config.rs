use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use c2s_core::KeyLayout;
use c2s_registry::ConsulConfig;
use c2s_runtime::DockerRuntimeConfig;
use c2s_sync::SyncConfig;

#[derive(Debug, Deserialize, Clone)]
pub struct DaemonConfig {
    pub consul_host: String,
    pub consul_port: u16,
    pub consul_token: Option<String>,
    pub consul_datacenter: Option<String>,
    #[serde(with = "humantime_serde")]
    pub consul_request_timeout: Duration,
    pub docker_socket_path: String,
    #[serde(with = "humantime_serde")]
    pub docker_connect_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub docker_reconnect_delay: Duration,
    pub bridge_network: String,
    pub default_gateway: String,
    pub bookkeeping_prefix: String,
    pub services_prefix: String,
    pub resync_on_reconnect: bool,
    pub event_queue_capacity: usize,
}

impl DaemonConfig {
    pub fn new(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder()
            .set_default("consul_host", "localhost")?
            .set_default("consul_port", 8500)?
            .set_default("consul_token", None::<String>)?
            .set_default("consul_datacenter", None::<String>)?
            .set_default("consul_request_timeout", "10s")?
            .set_default("docker_socket_path", "/var/run/docker.sock")?
            .set_default("docker_connect_timeout", "5s")?
            .set_default("docker_reconnect_delay", "1s")?
            .set_default("bridge_network", "bridge")?
            .set_default("default_gateway", "172.17.0.1")?
            .set_default("bookkeeping_prefix", "docker")?
            .set_default("services_prefix", "services")?
            .set_default("resync_on_reconnect", true)?
            .set_default("event_queue_capacity", 256)?;

        if let Some(path) = config_path {
            if path.extension().and_then(|ext| ext.to_str()) == Some("env") {
                // .env files feed the C2S_ environment source below.
                match dotenvy::from_path(&path) {
                    Ok(_) => tracing::info!("loaded environment from {}", path.display()),
                    Err(err) => {
                        tracing::warn!("failed to load .env from {}: {}", path.display(), err)
                    }
                }
            } else {
                builder = builder.add_source(File::from(path));
            }
        }

        builder = builder.add_source(Environment::with_prefix("C2S").try_parsing(true));

        builder.build()?.try_deserialize()
    }

    pub fn consul(&self) -> ConsulConfig {
        ConsulConfig {
            host: self.consul_host.clone(),
            port: self.consul_port,
            token: non_empty(&self.consul_token),
            datacenter: non_empty(&self.consul_datacenter),
            request_timeout: self.consul_request_timeout,
        }
    }

    pub fn docker(&self) -> DockerRuntimeConfig {
        DockerRuntimeConfig::new(self.docker_socket_path.clone())
    }

    pub fn sync(&self) -> SyncConfig {
        SyncConfig {
            layout: KeyLayout::new(
                self.bookkeeping_prefix.clone(),
                self.services_prefix.clone(),
            ),
            connect_timeout: self.docker_connect_timeout,
            reconnect_delay: self.docker_reconnect_delay,
            bridge_network: self.bridge_network.clone(),
            default_gateway: self.default_gateway.clone(),
            resync_on_reconnect: self.resync_on_reconnect,
            event_queue_capacity: self.event_queue_capacity,
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::path::PathBuf;
    use std::sync::Mutex;
    use std::time::Duration;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn with_env<F>(vars: &[(&str, &str)], test: F)
    where
        F: FnOnce(),
    {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut old = Vec::new();
        for (k, v) in vars {
            old.push((k.to_string(), env::var(k).ok()));
            env::set_var(k, v);
        }

        test();

        for (k, maybe_old) in old {
            match maybe_old {
                Some(val) => env::set_var(k, val),
                None => env::remove_var(k),
            }
        }
    }

    #[test]
    fn defaults_are_applied() {
        with_env(&[], || {
            let cfg = DaemonConfig::new(None).expect("failed to build config");

            assert_eq!(cfg.consul_host, "localhost");
            assert_eq!(cfg.consul_port, 8500);
            assert!(cfg.consul_token.is_none());
            assert!(cfg.consul_datacenter.is_none());
            assert_eq!(cfg.consul_request_timeout, Duration::from_secs(10));
            assert_eq!(cfg.docker_socket_path, "/var/run/docker.sock");
            assert_eq!(cfg.docker_connect_timeout, Duration::from_secs(5));
            assert_eq!(cfg.docker_reconnect_delay, Duration::from_secs(1));
            assert_eq!(cfg.bridge_network, "bridge");
            assert_eq!(cfg.default_gateway, "172.17.0.1");
            assert!(cfg.resync_on_reconnect);
            assert_eq!(cfg.event_queue_capacity, 256);

            let sync = cfg.sync();
            assert_eq!(sync.layout.bookkeeping_root(), "docker/service-ids/");
            assert_eq!(sync.layout.service_namespace("web"), "services/web/");
        });
    }

    #[test]
    fn env_vars_override_defaults() {
        with_env(
            &[
                ("C2S_CONSUL_HOST", "consul.internal"),
                ("C2S_CONSUL_PORT", "8501"),
                ("C2S_CONSUL_TOKEN", "acl-token"),
                ("C2S_RESYNC_ON_RECONNECT", "false"),
                ("C2S_DOCKER_CONNECT_TIMEOUT", "250ms"),
            ],
            || {
                let cfg = DaemonConfig::new(None).expect("failed to build config");
                assert_eq!(cfg.consul_host, "consul.internal");
                assert_eq!(cfg.consul_port, 8501);
                assert!(!cfg.resync_on_reconnect);
                assert_eq!(cfg.docker_connect_timeout, Duration::from_millis(250));

                let consul = cfg.consul();
                assert_eq!(consul.token.as_deref(), Some("acl-token"));
                assert!(consul.datacenter.is_none());
            },
        );
    }

    #[test]
    fn blank_token_is_treated_as_unset() {
        with_env(&[("C2S_CONSUL_TOKEN", "  ")], || {
            let cfg = DaemonConfig::new(None).expect("failed to build config");
            assert!(cfg.consul().token.is_none());
        });
    }

    #[test]
    fn file_overrides_take_precedence_over_defaults_but_not_env() {
        use std::io::Write;

        let mut tmp = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .expect("temp file");
        writeln!(
            tmp,
            r#"
consul_datacenter = "dc2"
consul_port = 9500
docker_reconnect_delay = "3s"
bookkeeping_prefix = "registrator"
"#
        )
        .expect("write to temp file");

        with_env(&[("C2S_CONSUL_PORT", "9999")], || {
            let cfg = DaemonConfig::new(Some(PathBuf::from(tmp.path()))).expect("load config");
            assert_eq!(cfg.consul_datacenter.as_deref(), Some("dc2"));
            assert_eq!(cfg.consul_port, 9999);
            assert_eq!(cfg.docker_reconnect_delay, Duration::from_secs(3));
            assert_eq!(
                cfg.sync().layout.bookkeeping_root(),
                "registrator/service-ids/"
            );
        });
    }
}
