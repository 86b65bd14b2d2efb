//! The CAS handshake: challenge → CAS login → callback → ticket validation.
//!
//! Nothing here holds per-flow state between the two calls; everything a
//! callback needs travels in the protected `state` and the correlation cookie.
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::backchannel::Backchannel;
use crate::config::{CasOptions, ConfigError};
use crate::correlation::CorrelationGuard;
use crate::error::{FailureKind, FailureReason};
use crate::events::{CasEvents, CreatingTicketContext, RedirectContext};
use crate::identity::Identity;
use crate::properties::AuthProperties;
use crate::state::{StateCodec, StateError};
use crate::validator::ValidationRequest;

/// Public view of the inbound request: what the service URL is built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestInfo {
    pub scheme: String,
    pub host: String,
    /// Mount prefix of the application, empty or starting with `/`.
    pub path_base: String,
    /// Path and query of the current request, relative to `path_base`.
    pub path_and_query: String,
}

impl RequestInfo {
    pub fn new(scheme: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            scheme: scheme.into(),
            host: host.into(),
            path_base: String::new(),
            path_and_query: "/".to_string(),
        }
    }

    pub fn with_path_and_query(mut self, path_and_query: impl Into<String>) -> Self {
        self.path_and_query = path_and_query.into();
        self
    }

    pub fn with_path_base(mut self, path_base: impl Into<String>) -> Self {
        self.path_base = path_base.into();
        self
    }

    pub fn current_uri(&self) -> String {
        format!("{}{}", self.path_base, self.path_and_query)
    }
}

/// The `state` and `ticket` query parameters of a callback.
#[derive(Debug, Clone, Copy, Default)]
pub struct CallbackParams<'a> {
    pub state: Option<&'a str>,
    pub ticket: Option<&'a str>,
}

#[derive(Debug, Clone, Default)]
pub struct OwnedCallbackParams {
    pub state: Option<String>,
    pub ticket: Option<String>,
}

impl OwnedCallbackParams {
    /// Parses a raw query string (without the leading `?`).
    pub fn parse(query: &str) -> Self {
        let mut params = Self::default();
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            match key.as_ref() {
                "state" if params.state.is_none() => params.state = Some(value.into_owned()),
                "ticket" if params.ticket.is_none() => params.ticket = Some(value.into_owned()),
                _ => {}
            }
        }
        params
    }

    pub fn as_params(&self) -> CallbackParams<'_> {
        CallbackParams {
            state: self.state.as_deref(),
            ticket: self.ticket.as_deref(),
        }
    }
}

/// Side-channel copy of the correlation token, to be set as a cookie.
#[derive(Clone, PartialEq, Eq)]
pub struct CorrelationCookie {
    pub name: String,
    pub value: String,
    pub path: String,
    pub secure: bool,
    pub max_age_seconds: i64,
}

impl std::fmt::Debug for CorrelationCookie {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CorrelationCookie")
            .field("name", &self.name)
            .field("path", &self.path)
            .field("secure", &self.secure)
            .field("max_age_seconds", &self.max_age_seconds)
            .finish_non_exhaustive()
    }
}

/// Result of a challenge: where to send the browser and what to remember.
#[derive(Debug, Clone)]
pub struct Challenge {
    pub redirect_uri: String,
    pub correlation_cookie: CorrelationCookie,
}

#[derive(Debug)]
pub enum HandshakeOutcome {
    Success {
        identity: Identity,
        properties: AuthProperties,
    },
    Failure {
        reason: FailureReason,
    },
}

impl HandshakeOutcome {
    fn failure(reason: FailureReason) -> Self {
        Self::Failure { reason }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

#[derive(Clone)]
pub struct CasHandler {
    options: Arc<CasOptions>,
    codec: StateCodec,
    backchannel: Arc<dyn Backchannel>,
    events: CasEvents,
}

impl std::fmt::Debug for CasHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CasHandler")
            .field("options", &self.options)
            .field("codec", &self.codec)
            .field("events", &self.events)
            .finish_non_exhaustive()
    }
}

impl CasHandler {
    /// Validates `options`; configuration errors are returned here, at setup.
    pub fn new(options: CasOptions, backchannel: Arc<dyn Backchannel>) -> Result<Self, ConfigError> {
        let options = options.validate()?;
        let codec = StateCodec::new(&options.state_secret, &options.scheme, options.state_lifetime());

        Ok(Self {
            options: Arc::new(options),
            codec,
            backchannel,
            events: CasEvents::default(),
        })
    }

    pub fn with_events(mut self, events: CasEvents) -> Self {
        self.events = events;
        self
    }

    pub fn options(&self) -> &CasOptions {
        &self.options
    }

    pub fn correlation_cookie_name(&self) -> String {
        CorrelationGuard::cookie_name(&self.options.scheme)
    }

    /// Builds the redirect to `{cas}/login`. The redirect target defaults to the
    /// current request URI.
    pub fn challenge(
        &self,
        request: &RequestInfo,
        mut properties: AuthProperties,
    ) -> Result<Challenge, StateError> {
        if properties.redirect_uri().is_none() {
            properties.redirect_uri = Some(request.current_uri());
        }

        let token = CorrelationGuard::generate(&mut properties, &self.options.scheme);
        let state = self.codec.protect(&properties)?;
        let service = self.service_url(request, &state);

        let mut context = RedirectContext {
            properties: &properties,
            redirect_uri: self.login_url(&service),
        };
        self.events.redirect_to_authorization_endpoint(&mut context);
        let redirect_uri = context.redirect_uri;

        info!(
            redirect_target = properties.redirect_uri().unwrap_or_default(),
            renew = self.options.renew,
            gateway = self.options.gateway,
            "redirecting to CAS login"
        );

        Ok(Challenge {
            redirect_uri,
            correlation_cookie: CorrelationCookie {
                name: self.correlation_cookie_name(),
                value: token,
                path: format!("{}{}", request.path_base, self.options.callback_path),
                secure: self.service_scheme(request) == "https",
                max_age_seconds: self.codec.lifetime().num_seconds(),
            },
        })
    }

    /// Resolves a CAS callback. `correlation` is the side-channel token; the
    /// caller must delete it whatever the outcome.
    ///
    /// The only suspension point is the validation call; dropping the future
    /// cancels it.
    pub async fn complete_callback(
        &self,
        request: &RequestInfo,
        params: CallbackParams<'_>,
        correlation: Option<&str>,
    ) -> HandshakeOutcome {
        let Some(state) = params.state.filter(|state| !state.is_empty()) else {
            debug!("callback without state");
            return HandshakeOutcome::failure(FailureReason::InvalidState);
        };
        let Some(mut properties) = self.codec.unprotect(state) else {
            return HandshakeOutcome::failure(FailureReason::InvalidState);
        };

        // Before the ticket is even looked at: no outbound call for a forged callback.
        if !CorrelationGuard::validate(&mut properties, &self.options.scheme, correlation) {
            warn!("CAS callback failed correlation");
            return HandshakeOutcome::failure(FailureReason::CorrelationFailed);
        }

        let Some(ticket) = params.ticket.filter(|ticket| !ticket.is_empty()) else {
            debug!("callback without ticket");
            return HandshakeOutcome::failure(FailureReason::MissingTicket);
        };

        let validation = ValidationRequest::new(&self.options, self.service_url(request, state), ticket);

        let identity = match self
            .options
            .protocol
            .validate(self.backchannel.as_ref(), &validation, &self.options)
            .await
        {
            Ok(identity) => identity,
            Err(e) => {
                if e.kind() == FailureKind::Configuration {
                    error!(error = %e, "CAS ticket validation hit a configuration error");
                } else {
                    warn!(error = %e, "CAS ticket validation failed");
                }
                return HandshakeOutcome::failure(e.into());
            }
        };

        let mut context = CreatingTicketContext::new(identity, properties);
        self.events.creating_ticket(&mut context);

        if context.is_rejected() || !context.identity.is_complete() {
            info!(user = %context.username, "CAS sign-in vetoed");
            return HandshakeOutcome::failure(FailureReason::TicketCreationVetoed);
        }

        info!(
            user = %context.identity.name,
            attributes = context.identity.attributes.len(),
            "CAS sign-in succeeded"
        );

        HandshakeOutcome::Success {
            identity: context.identity,
            properties: context.properties,
        }
    }

    /// `{scheme}://{host}{path_base}{callback_path}?state={state}`.
    ///
    /// Must be identical at challenge and callback: CAS binds the ticket to it.
    pub fn service_url(&self, request: &RequestInfo, state: &str) -> String {
        let scheme = self.service_scheme(request);
        let host = self.options.service_host.as_deref().unwrap_or(&request.host);

        format!(
            "{scheme}://{host}{}{}?state={}",
            request.path_base,
            self.options.callback_path,
            urlencoding::encode(state)
        )
    }

    fn service_scheme<'a>(&self, request: &'a RequestInfo) -> &'a str {
        if self.options.service_force_https {
            "https"
        } else {
            &request.scheme
        }
    }

    fn login_url(&self, service: &str) -> String {
        let mut url = format!(
            "{}/login?service={}",
            self.options.cas_server_url_base,
            urlencoding::encode(service)
        );
        // renew and gateway are passed through as configured, even together.
        if self.options.renew {
            url.push_str("&renew=true");
        }
        if self.options.gateway {
            url.push_str("&gateway=true");
        }
        url
    }
}
