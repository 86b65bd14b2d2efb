//! Client side of the CAS single-sign-on handshake.
//!
//! A [`CasHandler`] redirects to the CAS server's `/login`, receives the service
//! ticket on callback, validates it over the backchannel (CAS 1.0 or 2.0) and
//! yields an [`Identity`].

pub mod backchannel;
pub mod config;
pub mod correlation;
pub mod error;
pub mod events;
pub mod handler;
pub mod identity;
pub mod properties;
pub mod state;
pub mod validator;
pub mod web;

pub use backchannel::{Backchannel, BackchannelError, BackchannelResponse, IsahcBackchannel};
pub use config::{CasOptions, ConfigError};
pub use error::{FailureKind, FailureReason};
pub use events::{CasEvents, CreatingTicketContext, RedirectContext};
pub use handler::{
    CallbackParams, CasHandler, Challenge, HandshakeOutcome, OwnedCallbackParams, RequestInfo,
};
pub use identity::Identity;
pub use properties::AuthProperties;
pub use validator::{TicketValidator, ValidationError, ValidationRequest};
