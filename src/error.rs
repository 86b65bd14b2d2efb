//! Failure taxonomy surfaced by the handshake.
//!
//! Every way a callback can fail collapses into one [`FailureReason`]; callers
//! only need to know that it failed and why. [`FailureKind`] keeps the coarse
//! class for diagnostics and HTTP mapping.
use thiserror::Error;

use crate::validator::ValidationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Misconfiguration detected at runtime; fatal.
    Configuration,
    /// Bad or forged callback, or an unparsable server answer.
    ProtocolViolation,
    /// The CAS server refused the ticket.
    RemoteRejection,
    /// Network error, timeout or non-2xx from the validation endpoint.
    TransportFailure,
}

#[derive(Debug, Error)]
pub enum FailureReason {
    #[error("missing or invalid state")]
    InvalidState,
    #[error("correlation failed")]
    CorrelationFailed,
    #[error("missing ticket")]
    MissingTicket,
    #[error("remote validation failed: {0}")]
    RemoteValidation(#[source] ValidationError),
    #[error("ticket creation vetoed")]
    TicketCreationVetoed,
}

impl FailureReason {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::InvalidState
            | Self::CorrelationFailed
            | Self::MissingTicket
            | Self::TicketCreationVetoed => FailureKind::ProtocolViolation,
            Self::RemoteValidation(e) => e.kind(),
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.kind() == FailureKind::Configuration
    }
}

impl From<ValidationError> for FailureReason {
    fn from(e: ValidationError) -> Self {
        Self::RemoteValidation(e)
    }
}
