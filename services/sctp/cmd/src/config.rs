//! Configuration handling for the SCTP service.
//!
//! Reads the `services.sctp` section of the shared reDB config file and the
//! `SCTP_*` environment variables, producing the endpoint configuration plus
//! the optional listen/connect issued at start-up.

use anyhow::{anyhow, Context, Result};
use sctp_session::{ConnectRequest, EndpointConfig, ListenRequest};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use tracing::{info, warn};

/// Prefix accepted in front of endpoint parameter names
const KEY_PREFIX: &str = "services.sctp.";

/// Environment variables and the endpoint parameters they override
const ENV_OVERRIDES: &[(&str, &str)] = &[
    ("SCTP_PEER_ADDRESS", "peer_IP_address"),
    ("SCTP_PEER_PORT", "peer_port"),
    ("SCTP_LOCAL_ADDRESS", "local_IP_address"),
    ("SCTP_LOCAL_PORT", "local_port"),
    ("SCTP_DEBUG", "debug"),
];

/// SCTP service configuration
#[derive(Debug, Clone, Default)]
pub struct SctpServiceConfig {
    /// Endpoint parameters
    pub endpoint: EndpointConfig,
    /// Listener opened after map
    pub listen: Option<ListenRequest>,
    /// Connect issued after map
    pub connect: Option<ConnectRequest>,
}

/// Root configuration structure (matches the YAML structure)
#[derive(Debug, Deserialize)]
struct RootConfig {
    services: Option<ServicesConfig>,
}

#[derive(Debug, Deserialize)]
struct ServicesConfig {
    sctp: Option<ServiceConfig>,
}

#[derive(Debug, Deserialize)]
struct ServiceConfig {
    args: Option<Vec<String>>,
    config: Option<HashMap<String, serde_yaml::Value>>,
}

impl SctpServiceConfig {
    /// Load configuration from file and environment variables.
    ///
    /// A missing or unparsable file leaves the defaults in place; an invalid
    /// parameter value is an error.
    pub fn load_from_file<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        let mut config = Self::default();

        match std::fs::read_to_string(&config_path) {
            Ok(content) => match serde_yaml::from_str::<RootConfig>(&content) {
                Ok(root) => {
                    config.apply_root_config(root)?;
                    info!("Loaded configuration from {:?}", config_path.as_ref());
                }
                Err(e) => warn!(
                    "Failed to parse config file {:?}, using defaults: {}",
                    config_path.as_ref(),
                    e
                ),
            },
            Err(_) => warn!(
                "Config file {:?} not found, using defaults",
                config_path.as_ref()
            ),
        }

        config.apply_environment_overrides(|name| std::env::var(name).ok());

        info!(
            "Final sctp configuration: simple_mode={}, server_mode={}, reconnect={}, local={}:{:?}, peer={:?}:{:?}",
            config.endpoint.simple_mode,
            config.endpoint.server_mode,
            config.endpoint.reconnect,
            config.endpoint.local_address,
            config.endpoint.local_port,
            config.endpoint.peer_address,
            config.endpoint.peer_port
        );
        Ok(config)
    }

    fn apply_root_config(&mut self, root: RootConfig) -> Result<()> {
        if let Some(service) = root.services.and_then(|services| services.sctp) {
            self.apply_service_config(service)?;
        }
        Ok(())
    }

    fn apply_service_config(&mut self, service: ServiceConfig) -> Result<()> {
        for (key, value) in service.config.unwrap_or_default() {
            let name = key.strip_prefix(KEY_PREFIX).unwrap_or(key.as_str());
            let Some(text) = scalar_text(&value) else {
                warn!("Ignoring non-scalar value for {}", key);
                continue;
            };
            self.endpoint
                .set_parameter(name, &text)
                .with_context(|| format!("invalid value {:?} for {}", text, key))?;
        }

        for arg in service.args.unwrap_or_default() {
            if let Some(target) = arg.strip_prefix("--listen=") {
                let (host, port) = split_host_port(target)?;
                self.listen = Some(ListenRequest {
                    local_address: host,
                    local_port: port,
                });
            } else if let Some(target) = arg.strip_prefix("--connect=") {
                let (host, port) = split_host_port(target)?;
                self.connect = Some(ConnectRequest {
                    peer_address: host,
                    peer_port: Some(port),
                });
            } else {
                warn!("Ignoring unknown argument {}", arg);
            }
        }
        Ok(())
    }

    /// Apply `SCTP_*` overrides; values that fail to parse are ignored
    fn apply_environment_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        for (variable, parameter) in ENV_OVERRIDES {
            let Some(value) = lookup(variable) else {
                continue;
            };
            match self.endpoint.set_parameter(parameter, &value) {
                Ok(()) => info!("{} overridden by environment: {}", parameter, value),
                Err(e) => warn!("Ignoring {}={}: {}", variable, value, e),
            }
        }
    }
}

fn scalar_text(value: &serde_yaml::Value) -> Option<String> {
    match value {
        serde_yaml::Value::String(s) => Some(s.clone()),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        serde_yaml::Value::Bool(true) => Some("yes".to_string()),
        serde_yaml::Value::Bool(false) => Some("no".to_string()),
        _ => None,
    }
}

/// `host:port`, `[v6]:port` or `:port`; an empty host means the configured one
fn split_host_port(target: &str) -> Result<(Option<String>, u16)> {
    let (host, port) = target
        .rsplit_once(':')
        .ok_or_else(|| anyhow!("expected host:port, got {:?}", target))?;
    let port = port
        .parse::<u16>()
        .with_context(|| format!("invalid port in {:?}", target))?;
    let host = host.trim_start_matches('[').trim_end_matches(']');
    let host = (!host.is_empty()).then(|| host.to_string());
    Ok((host, port))
}
