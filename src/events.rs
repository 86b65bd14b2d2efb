//! Host-supplied hooks around the handshake.
use std::sync::Arc;

use crate::identity::Identity;
use crate::properties::AuthProperties;

/// Passed to the redirect hook just before the user is sent to the CAS server.
#[derive(Debug)]
pub struct RedirectContext<'a> {
    pub properties: &'a AuthProperties,
    /// `{cas}/login?service=...`; the hook may replace it.
    pub redirect_uri: String,
}

/// Passed to the ticket hook after the CAS server vouched for the user.
#[derive(Debug)]
pub struct CreatingTicketContext {
    /// Username exactly as returned by the CAS server.
    pub username: String,
    pub identity: Identity,
    pub properties: AuthProperties,
    rejected: bool,
}

impl CreatingTicketContext {
    pub(crate) fn new(identity: Identity, properties: AuthProperties) -> Self {
        Self {
            username: identity.name.clone(),
            identity,
            properties,
            rejected: false,
        }
    }

    /// Veto the sign-in.
    pub fn reject(&mut self) {
        self.rejected = true;
    }

    pub fn is_rejected(&self) -> bool {
        self.rejected
    }
}

type RedirectHook = Arc<dyn Fn(&mut RedirectContext<'_>) + Send + Sync>;
type CreatingTicketHook = Arc<dyn Fn(&mut CreatingTicketContext) + Send + Sync>;

#[derive(Clone, Default)]
pub struct CasEvents {
    redirect: Option<RedirectHook>,
    creating_ticket: Option<CreatingTicketHook>,
}

impl std::fmt::Debug for CasEvents {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CasEvents")
            .field("redirect", &self.redirect.is_some())
            .field("creating_ticket", &self.creating_ticket.is_some())
            .finish()
    }
}

impl CasEvents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_redirect_to_authorization_endpoint<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut RedirectContext<'_>) + Send + Sync + 'static,
    {
        self.redirect = Some(Arc::new(hook));
        self
    }

    pub fn on_creating_ticket<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut CreatingTicketContext) + Send + Sync + 'static,
    {
        self.creating_ticket = Some(Arc::new(hook));
        self
    }

    pub(crate) fn redirect_to_authorization_endpoint(&self, context: &mut RedirectContext<'_>) {
        if let Some(hook) = &self.redirect {
            hook(context);
        }
    }

    pub(crate) fn creating_ticket(&self, context: &mut CreatingTicketContext) {
        if let Some(hook) = &self.creating_ticket {
            hook(context);
        }
    }
}
