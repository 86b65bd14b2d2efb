//! Service ticket validation against the CAS server.
//!
//! Two wire protocols exist: CAS 1.0 (`/validate`, plaintext) and CAS 2.0
//! (`/serviceValidate`, XML). Both produce the same [`Identity`].
use serde::Deserialize;
use std::borrow::Cow;
use thiserror::Error;
use tracing::{debug, warn};

use crate::backchannel::{Backchannel, BackchannelError};
use crate::config::CasOptions;
use crate::error::FailureKind;
use crate::identity::Identity;

pub mod cas1;
pub mod cas2;

pub use cas2::Cas2Dialect;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("ticket rejected by server")]
    Rejected,
    #[error("could not find username in response")]
    UsernameNotFound,
    #[error("unparsable validation response: {0}")]
    Malformed(String),
    #[error("identity attribute [{attribute}] not found for user: {username}")]
    IdentityAttributeNotFound { attribute: String, username: String },
    #[error("validation endpoint returned status {0}")]
    Status(u16),
    #[error(transparent)]
    Transport(#[from] BackchannelError),
}

impl ValidationError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Rejected | Self::UsernameNotFound => FailureKind::RemoteRejection,
            Self::Malformed(_) => FailureKind::ProtocolViolation,
            Self::IdentityAttributeNotFound { .. } => FailureKind::Configuration,
            Self::Status(_) | Self::Transport(_) => FailureKind::TransportFailure,
        }
    }
}

/// Everything that determines the outbound validation call.
#[derive(Clone)]
pub struct ValidationRequest {
    pub validation_endpoint: String,
    pub service_url: String,
    pub ticket: String,
}

impl std::fmt::Debug for ValidationRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print the ticket
        f.debug_struct("ValidationRequest")
            .field("validation_endpoint", &self.validation_endpoint)
            .field("service_url", &self.service_url)
            .finish_non_exhaustive()
    }
}

impl ValidationRequest {
    /// Uses `cas_validation_url` when configured, otherwise the protocol's
    /// endpoint under `cas_server_url_base`.
    pub fn new(
        options: &CasOptions,
        service_url: impl Into<String>,
        ticket: impl Into<String>,
    ) -> Self {
        let validation_endpoint = match &options.cas_validation_url {
            Some(url) => url.clone(),
            None => format!(
                "{}/{}",
                options.cas_server_url_base,
                options.protocol.endpoint_path()
            ),
        };

        Self {
            validation_endpoint,
            service_url: service_url.into(),
            ticket: ticket.into(),
        }
    }

    /// `GET` target: `{endpoint}?service=...&ticket=...`.
    pub fn url(&self, escape_service: bool) -> String {
        let service = if escape_service {
            urlencoding::encode(&self.service_url)
        } else {
            Cow::Borrowed(self.service_url.as_str())
        };
        let sep = if self.validation_endpoint.contains('?') { "&" } else { "?" };
        let ticket = urlencoding::encode(&self.ticket);

        format!("{}{sep}service={service}&ticket={ticket}", self.validation_endpoint)
    }
}

/// The CAS protocol used to validate tickets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TicketValidator {
    Cas1,
    #[default]
    Cas2,
}

impl TicketValidator {
    pub fn endpoint_path(self) -> &'static str {
        match self {
            Self::Cas1 => "validate",
            Self::Cas2 => "serviceValidate",
        }
    }

    /// Calls the validation endpoint and parses the answer.
    ///
    /// Dialect settings are read from `options` on every call.
    pub async fn validate(
        self,
        backchannel: &dyn Backchannel,
        request: &ValidationRequest,
        options: &CasOptions,
    ) -> Result<Identity, ValidationError> {
        debug!(
            protocol = ?self,
            endpoint = %request.validation_endpoint,
            "validating service ticket"
        );

        let response = backchannel
            .get(&request.url(options.escape_service_string))
            .await
            .map_err(|e| {
                warn!(error = %e, "validation request failed");
                ValidationError::from(e)
            })?;

        if !response.is_success() {
            warn!(status = response.status, "validation endpoint returned an error status");
            return Err(ValidationError::Status(response.status));
        }

        match self {
            Self::Cas1 => cas1::parse_response(&response.body),
            Self::Cas2 => cas2::parse_response(&response.body, &Cas2Dialect::from_options(options)),
        }
    }
}
