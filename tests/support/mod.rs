#![allow(dead_code)]

use async_trait::async_trait;
use cas_auth::{Backchannel, BackchannelError, BackchannelResponse, CasHandler, CasOptions, Challenge};
use std::sync::{Arc, Mutex};
use url::Url;

pub const CAS_BASE: &str = "https://cas.example.com/cas";

#[derive(Clone)]
pub enum Reply {
    Body(u16, String),
    Timeout,
}

/// Records every URL it is asked for and answers with a canned reply.
///
/// When `bound_service` is set it behaves like a CAS server: the ticket only
/// validates if the `service` parameter matches it exactly.
pub struct FakeBackchannel {
    reply: Reply,
    bound_service: Mutex<Option<String>>,
    calls: Mutex<Vec<String>>,
}

impl FakeBackchannel {
    pub fn new(reply: Reply) -> Arc<Self> {
        Arc::new(Self {
            reply,
            bound_service: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn bind_service(&self, service: &str) {
        *self.bound_service.lock().unwrap() = Some(service.to_string());
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl Backchannel for FakeBackchannel {
    async fn get(&self, url: &str) -> Result<BackchannelResponse, BackchannelError> {
        self.calls.lock().unwrap().push(url.to_string());

        if let Some(bound) = self.bound_service.lock().unwrap().as_deref() {
            if query_param(url, "service").as_deref() != Some(bound) {
                return Ok(BackchannelResponse {
                    status: 200,
                    body: cas2_failure("INVALID_SERVICE"),
                });
            }
        }

        match &self.reply {
            Reply::Body(status, body) => Ok(BackchannelResponse {
                status: *status,
                body: body.clone(),
            }),
            Reply::Timeout => Err(BackchannelError::Timeout),
        }
    }
}

pub fn options() -> CasOptions {
    let mut options = CasOptions::new(CAS_BASE);
    options.state_secret = "integration-secret".into();
    options
}

pub fn handler_with(options: CasOptions, reply: Reply) -> (CasHandler, Arc<FakeBackchannel>) {
    let backchannel = FakeBackchannel::new(reply);
    let handler = CasHandler::new(options, backchannel.clone()).unwrap();
    (handler, backchannel)
}

pub fn cas2_success(user: &str, attributes: &str) -> String {
    format!(
        r#"<cas:serviceResponse xmlns:cas="http://www.yale.edu/tp/cas">
    <cas:authenticationSuccess>
        <cas:user>{user}</cas:user>
        <cas:attributes>{attributes}</cas:attributes>
    </cas:authenticationSuccess>
</cas:serviceResponse>"#
    )
}

pub fn cas2_failure(code: &str) -> String {
    format!(
        r#"<cas:serviceResponse xmlns:cas="http://www.yale.edu/tp/cas">
    <cas:authenticationFailure code="{code}">denied</cas:authenticationFailure>
</cas:serviceResponse>"#
    )
}

pub fn query_param(url: &str, name: &str) -> Option<String> {
    let url = Url::parse(url).ok()?;
    url.query_pairs()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
}

/// Decoded `service` parameter of the login redirect.
pub fn service_of(challenge: &Challenge) -> String {
    query_param(&challenge.redirect_uri, "service").expect("redirect carries a service")
}

/// Decoded `state` parameter of the service URL.
pub fn state_of(challenge: &Challenge) -> String {
    query_param(&service_of(challenge), "state").expect("service carries a state")
}
