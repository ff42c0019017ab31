//! Endpoint configuration.
//!
//! Values arrive as string key/value pairs (the `services.sctp.config` map of
//! the service configuration file) and are parsed into typed settings by
//! [`EndpointConfig::set_parameter`].

use crate::error::{Result, SessionError};
use crate::settings::ProtocolSettings;
use sctp_wire::EventSubscription;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

/// Typed endpoint configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// One association (client or server) instead of the multiplexed mode
    pub simple_mode: bool,
    /// Reconnect automatically after the association is lost
    pub reconnect: bool,
    /// Attempts made by one reconnect run
    pub reconnect_max_attempts: u32,
    /// Time unit of the reconnect backoff
    pub reconnect_backoff_unit: Duration,
    /// Accept instead of connect (single mode)
    pub server_mode: bool,
    /// Listen backlog
    pub server_backlog: i32,
    /// Default local address
    pub local_address: String,
    /// Default local port
    pub local_port: Option<u16>,
    /// Default peer address
    pub peer_address: Option<String>,
    /// Default peer port
    pub peer_port: Option<u16>,
    /// Init parameters and notification subscriptions
    pub protocol: ProtocolSettings,
    /// Emit a connect result for every successful listen
    pub report_listen_result: bool,
    /// Verbose logging
    pub debug: bool,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            simple_mode: false,
            reconnect: false,
            reconnect_max_attempts: 6,
            reconnect_backoff_unit: Duration::from_secs(1),
            server_mode: false,
            server_backlog: 1,
            local_address: "0.0.0.0".to_string(),
            local_port: None,
            peer_address: None,
            peer_port: None,
            protocol: ProtocolSettings::default(),
            report_listen_result: false,
            debug: false,
        }
    }
}

impl EndpointConfig {
    /// Apply one named parameter.
    ///
    /// Unknown names are logged and ignored.
    pub fn set_parameter(&mut self, name: &str, value: &str) -> Result<()> {
        match name {
            "simple_mode" => self.simple_mode = parse_yes_no(name, value)?,
            "reconnect" => self.reconnect = parse_yes_no(name, value)?,
            "server_mode" => self.server_mode = parse_yes_no(name, value)?,
            "debug" => self.debug = parse_yes_no(name, value)?,
            "report_listen_result" => self.report_listen_result = parse_yes_no(name, value)?,
            "reconnect_max_attempts" => {
                self.reconnect_max_attempts = parse_non_negative(name, value)?
            }
            "server_backlog" => self.server_backlog = parse_non_negative(name, value)?,
            "reconnect_backoff_unit" => {
                self.reconnect_backoff_unit = humantime::parse_duration(value).map_err(|e| {
                    SessionError::Config(format!(
                        "invalid value {} for parameter {}: {}",
                        value, name, e
                    ))
                })?
            }
            "local_IP_address" => self.local_address = value.to_string(),
            "local_port" => self.local_port = Some(parse_non_negative(name, value)?),
            "peer_IP_address" => self.peer_address = Some(value.to_string()),
            "peer_port" => self.peer_port = Some(parse_non_negative(name, value)?),
            "sinit_num_ostreams" => {
                self.protocol.init.num_ostreams = parse_non_negative(name, value)?
            }
            "sinit_max_instreams" => {
                self.protocol.init.max_instreams = parse_non_negative(name, value)?
            }
            "sinit_max_attempts" => {
                self.protocol.init.max_attempts = parse_non_negative(name, value)?
            }
            "sinit_max_init_timeo" => {
                self.protocol.init.max_init_timeout = parse_non_negative(name, value)?
            }
            _ => match event_parameter(name) {
                Some(category) => {
                    let enabled = parse_enabled(name, value)?;
                    self.protocol.events.set(category, enabled);
                }
                None => warn!("unknown & unhandled parameter: {}", name),
            },
        }
        Ok(())
    }

    /// Check mode combinations
    pub fn validate(&self) -> Result<()> {
        if self.simple_mode && self.server_mode {
            if self.reconnect {
                return Err(SessionError::config(
                    "server mode and reconnect mode are mutually exclusive",
                ));
            }
            if self.local_port.is_none() {
                return Err(SessionError::config(
                    "in server mode local_port must be defined",
                ));
            }
        }
        Ok(())
    }
}

fn event_parameter(name: &str) -> Option<EventSubscription> {
    let category = match name {
        "sctp_association_event" => EventSubscription::ASSOCIATION,
        "sctp_address_event" => EventSubscription::ADDRESS,
        "sctp_send_failure_event" => EventSubscription::SEND_FAILURE,
        "sctp_peer_error_event" => EventSubscription::PEER_ERROR,
        "sctp_shutdown_event" => EventSubscription::SHUTDOWN,
        "sctp_partial_delivery_event" => EventSubscription::PARTIAL_DELIVERY,
        "sctp_adaption_layer_event" => EventSubscription::ADAPTATION_LAYER,
        _ => return None,
    };
    Some(category)
}

fn parse_yes_no(name: &str, value: &str) -> Result<bool> {
    if value.eq_ignore_ascii_case("yes") {
        Ok(true)
    } else if value.eq_ignore_ascii_case("no") {
        Ok(false)
    } else {
        Err(SessionError::Config(format!(
            "invalid value {} for parameter {}: only yes and no can be used",
            value, name
        )))
    }
}

fn parse_enabled(name: &str, value: &str) -> Result<bool> {
    if value.eq_ignore_ascii_case("enabled") {
        Ok(true)
    } else if value.eq_ignore_ascii_case("disabled") {
        Ok(false)
    } else {
        Err(SessionError::Config(format!(
            "invalid value {} for parameter {}: it should be enabled or disabled",
            value, name
        )))
    }
}

fn parse_non_negative<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value.trim().parse::<T>().map_err(|_| {
        SessionError::Config(format!(
            "invalid value {} for parameter {}: it should be a non-negative integer",
            value, name
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EndpointConfig::default();
        assert!(!config.simple_mode);
        assert_eq!(config.reconnect_max_attempts, 6);
        assert_eq!(config.server_backlog, 1);
        assert_eq!(config.local_address, "0.0.0.0");
        assert_eq!(config.protocol.init.num_ostreams, 64);
        assert_eq!(config.protocol.events, EventSubscription::all());
    }

    #[test]
    fn test_set_parameters() {
        let mut config = EndpointConfig::default();
        config.set_parameter("simple_mode", "YES").unwrap();
        config.set_parameter("local_port", "3868").unwrap();
        config.set_parameter("peer_IP_address", "10.0.0.2").unwrap();
        config.set_parameter("sinit_num_ostreams", "10").unwrap();
        config
            .set_parameter("sctp_shutdown_event", "Disabled")
            .unwrap();

        assert!(config.simple_mode);
        assert_eq!(config.local_port, Some(3868));
        assert_eq!(config.peer_address.as_deref(), Some("10.0.0.2"));
        assert_eq!(config.protocol.init.num_ostreams, 10);
        assert!(!config.protocol.subscribed(EventSubscription::SHUTDOWN));
        assert!(config.protocol.subscribed(EventSubscription::ASSOCIATION));
    }

    #[test]
    fn test_backoff_unit() {
        let mut config = EndpointConfig::default();
        config
            .set_parameter("reconnect_backoff_unit", "250ms")
            .unwrap();
        assert_eq!(config.reconnect_backoff_unit, Duration::from_millis(250));
        assert!(config
            .set_parameter("reconnect_backoff_unit", "soon")
            .is_err());
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = EndpointConfig::default();
        assert!(config.set_parameter("reconnect", "maybe").is_err());
        assert!(config.set_parameter("server_backlog", "-1").is_err());
        assert!(config.set_parameter("peer_port", "70000").is_err());
        assert!(config.set_parameter("sinit_max_attempts", "x").is_err());
        assert!(config
            .set_parameter("sctp_address_event", "on")
            .is_err());
        // unknown names only warn
        assert!(config.set_parameter("no_such_parameter", "1").is_ok());
    }

    #[test]
    fn test_validate_mode_combinations() {
        let mut config = EndpointConfig {
            simple_mode: true,
            server_mode: true,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        config.local_port = Some(9000);
        assert!(config.validate().is_ok());

        config.reconnect = true;
        assert!(config.validate().is_err());

        config.simple_mode = false;
        assert!(config.validate().is_ok());
    }
}
