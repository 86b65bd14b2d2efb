//! CAS handler configuration.
//!
//! Read from the `cas` table of the Rocket figment (`Rocket.toml` or
//! `ROCKET_CAS_*` environment variables) and normalized once at ignition.
//! Immutable afterwards.
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::validator::TicketValidator;

pub const DEFAULT_CALLBACK_PATH: &str = "/signin-cas";
pub const DEFAULT_TICKET_NAMESPACE: &str = "http://www.yale.edu/tp/cas";
pub const DEFAULT_ATTRIBUTES_PARENT: &str = "attributes";
pub const DEFAULT_SCHEME: &str = "CAS";
/// Upper bound for `state_lifetime_seconds`: one day.
pub const MAX_STATE_LIFETIME_SECONDS: u64 = 24 * 60 * 60;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing configuration: {0}")]
    Missing(&'static str),
    #[error("invalid configuration: {0}")]
    Invalid(&'static str),
}

#[derive(Clone, Deserialize)]
pub struct CasOptions {
    /// Base URL of the CAS server, e.g. `https://cas.example.com/cas`.
    #[serde(default)]
    pub cas_server_url_base: String,
    /// Full validation endpoint URL when tickets are validated elsewhere.
    #[serde(default)]
    pub cas_validation_url: Option<String>,
    #[serde(default = "default_callback_path")]
    pub callback_path: String,
    /// CAS 2 attribute used as the name identifier instead of the username.
    #[serde(default)]
    pub name_identifier_attribute: Option<String>,
    #[serde(default = "default_ticket_namespace")]
    pub ticket_namespace: String,
    #[serde(default = "default_attributes_parent")]
    pub attributes_parent: String,
    #[serde(default = "default_backchannel_timeout_seconds")]
    pub backchannel_timeout_seconds: u64,
    #[serde(default)]
    pub renew: bool,
    #[serde(default)]
    pub gateway: bool,
    /// Public host used in the `service` URL instead of the request host.
    #[serde(default)]
    pub service_host: Option<String>,
    #[serde(default)]
    pub service_force_https: bool,
    #[serde(default = "default_true")]
    pub escape_service_string: bool,
    #[serde(default)]
    pub protocol: TicketValidator,
    #[serde(default = "default_scheme")]
    pub scheme: String,
    #[serde(default)]
    pub state_secret: String,
    #[serde(default = "default_state_lifetime_seconds")]
    pub state_lifetime_seconds: u64,
}

impl std::fmt::Debug for CasOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // state_secret is omitted
        f.debug_struct("CasOptions")
            .field("cas_server_url_base", &self.cas_server_url_base)
            .field("cas_validation_url", &self.cas_validation_url)
            .field("callback_path", &self.callback_path)
            .field("name_identifier_attribute", &self.name_identifier_attribute)
            .field("ticket_namespace", &self.ticket_namespace)
            .field("attributes_parent", &self.attributes_parent)
            .field("backchannel_timeout_seconds", &self.backchannel_timeout_seconds)
            .field("renew", &self.renew)
            .field("gateway", &self.gateway)
            .field("service_host", &self.service_host)
            .field("service_force_https", &self.service_force_https)
            .field("escape_service_string", &self.escape_service_string)
            .field("protocol", &self.protocol)
            .field("scheme", &self.scheme)
            .field("state_lifetime_seconds", &self.state_lifetime_seconds)
            .finish()
    }
}

impl CasOptions {
    /// Options with every default applied. `state_secret` still has to be set.
    pub fn new(cas_server_url_base: impl Into<String>) -> Self {
        Self {
            cas_server_url_base: cas_server_url_base.into(),
            cas_validation_url: None,
            callback_path: default_callback_path(),
            name_identifier_attribute: None,
            ticket_namespace: default_ticket_namespace(),
            attributes_parent: default_attributes_parent(),
            backchannel_timeout_seconds: default_backchannel_timeout_seconds(),
            renew: false,
            gateway: false,
            service_host: None,
            service_force_https: false,
            escape_service_string: true,
            protocol: TicketValidator::default(),
            scheme: default_scheme(),
            state_secret: String::new(),
            state_lifetime_seconds: default_state_lifetime_seconds(),
        }
    }

    /// Checks required settings and strips trailing slashes. Errors are fatal.
    pub fn validate(mut self) -> Result<Self, ConfigError> {
        let base = self.cas_server_url_base.trim().trim_end_matches('/');
        if base.is_empty() {
            return Err(ConfigError::Missing("cas_server_url_base"));
        }
        Url::parse(base).map_err(|_| ConfigError::Invalid("cas_server_url_base"))?;
        self.cas_server_url_base = base.to_string();

        if let Some(url) = self.cas_validation_url.take() {
            let url = url.trim().to_string();
            if !url.is_empty() {
                Url::parse(&url).map_err(|_| ConfigError::Invalid("cas_validation_url"))?;
                self.cas_validation_url = Some(url);
            }
        }

        if self.callback_path.is_empty() {
            return Err(ConfigError::Missing("callback_path"));
        }
        if !self.callback_path.starts_with('/') || self.callback_path.contains('?') {
            return Err(ConfigError::Invalid("callback_path"));
        }

        if self.ticket_namespace.trim().is_empty() {
            return Err(ConfigError::Invalid("ticket_namespace"));
        }
        if self.attributes_parent.trim().is_empty() {
            return Err(ConfigError::Invalid("attributes_parent"));
        }

        self.name_identifier_attribute = self
            .name_identifier_attribute
            .take()
            .filter(|name| !name.trim().is_empty());

        self.service_host = self
            .service_host
            .take()
            .map(|host| host.trim().trim_end_matches('/').to_string())
            .filter(|host| !host.is_empty());

        if self.scheme.trim().is_empty() {
            return Err(ConfigError::Invalid("scheme"));
        }
        if self.state_secret.is_empty() {
            return Err(ConfigError::Missing("state_secret"));
        }
        if self.backchannel_timeout_seconds == 0 {
            return Err(ConfigError::Invalid("backchannel_timeout_seconds"));
        }
        if self.state_lifetime_seconds == 0
            || self.state_lifetime_seconds > MAX_STATE_LIFETIME_SECONDS
        {
            return Err(ConfigError::Invalid("state_lifetime_seconds"));
        }

        Ok(self)
    }

    pub fn backchannel_timeout(&self) -> Duration {
        Duration::from_secs(self.backchannel_timeout_seconds)
    }

    pub fn state_lifetime(&self) -> chrono::Duration {
        let seconds = self.state_lifetime_seconds.min(MAX_STATE_LIFETIME_SECONDS);
        chrono::Duration::seconds(seconds as i64)
    }
}

fn default_callback_path() -> String {
    DEFAULT_CALLBACK_PATH.to_string()
}

fn default_ticket_namespace() -> String {
    DEFAULT_TICKET_NAMESPACE.to_string()
}

fn default_attributes_parent() -> String {
    DEFAULT_ATTRIBUTES_PARENT.to_string()
}

fn default_scheme() -> String {
    DEFAULT_SCHEME.to_string()
}

fn default_backchannel_timeout_seconds() -> u64 {
    60
}

fn default_state_lifetime_seconds() -> u64 {
    15 * 60
}

fn default_true() -> bool {
    true
}
