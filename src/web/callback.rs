//! The CAS server sends the browser back here with `state` and `ticket`.
use rocket::http::{Cookie, CookieJar, Header, Status};
use rocket::response::{Responder, Response};
use rocket::{get, State};
use serde::Serialize;
use std::io::Cursor;

use crate::error::{FailureKind, FailureReason};
use crate::handler::{CasHandler, HandshakeOutcome, OwnedCallbackParams, RequestInfo};
use crate::identity::Identity;

pub enum CallbackResponse {
    SignedIn {
        identity: Identity,
        redirect_uri: Option<String>,
    },
    Failed(FailureReason),
}

#[derive(Serialize)]
struct SignedInBody<'a> {
    identity: &'a Identity,
    redirect_uri: Option<&'a str>,
}

impl<'r, 'o: 'r> Responder<'r, 'o> for CallbackResponse {
    fn respond_to(self, _: &'r rocket::Request<'_>) -> rocket::response::Result<'o> {
        let (status, content_type, body) = match self {
            CallbackResponse::SignedIn {
                identity,
                redirect_uri,
            } => {
                let body = serde_json::to_string(&SignedInBody {
                    identity: &identity,
                    redirect_uri: redirect_uri.as_deref(),
                })
                .map_err(|_| Status::InternalServerError)?;
                (Status::Ok, "application/json", body)
            }
            CallbackResponse::Failed(reason) => {
                let status = match reason.kind() {
                    FailureKind::ProtocolViolation | FailureKind::RemoteRejection => Status::Forbidden,
                    FailureKind::TransportFailure => Status::BadGateway,
                    FailureKind::Configuration => Status::InternalServerError,
                };
                (status, "text/plain", format!("CAS authentication failed: {reason}"))
            }
        };

        Ok(Response::build()
            .status(status)
            .header(Header::new("Content-Type", content_type))
            .header(Header::new("Cache-Control", "no-store"))
            .sized_body(body.len(), Cursor::new(body))
            .finalize())
    }
}

#[get("/")]
pub async fn callback(
    handler: &State<CasHandler>,
    request: RequestInfo,
    params: OwnedCallbackParams,
    cookies: &CookieJar<'_>,
) -> CallbackResponse {
    let name = handler.correlation_cookie_name();
    let correlation = cookies.get(&name).map(|c| c.value().to_string());

    // Single use: the cookie goes away whatever happens next.
    cookies.remove(Cookie::build((name, "")).path(handler.options().callback_path.clone()));

    match handler
        .complete_callback(&request, params.as_params(), correlation.as_deref())
        .await
    {
        HandshakeOutcome::Success {
            identity,
            properties,
        } => CallbackResponse::SignedIn {
            identity,
            redirect_uri: properties.redirect_uri,
        },
        HandshakeOutcome::Failure { reason } => CallbackResponse::Failed(reason),
    }
}
