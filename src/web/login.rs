//! Applications redirect here (or link here) to start a CAS sign-in.
use rocket::http::{Header, Status};
use rocket::response::{Responder, Response};
use rocket::{get, State};
use std::io::Cursor;
use tracing::error;

use crate::handler::{CasHandler, Challenge, RequestInfo};
use crate::properties::AuthProperties;

pub enum LoginResponse {
    Redirect(Challenge),
    Unavailable,
}

impl<'r, 'o: 'r> Responder<'r, 'o> for LoginResponse {
    fn respond_to(self, _: &'r rocket::Request<'_>) -> rocket::response::Result<'o> {
        match self {
            LoginResponse::Redirect(challenge) => {
                let cookie = challenge.correlation_cookie;
                let secure = if cookie.secure { "; Secure" } else { "" };
                let value = format!(
                    "{}={}; Path={}; HttpOnly; SameSite=Lax; Max-Age={}{secure}",
                    cookie.name, cookie.value, cookie.path, cookie.max_age_seconds
                );

                let mut response = Response::build();
                let response = response
                    .status(Status::SeeOther)
                    .header(Header::new("Location", challenge.redirect_uri))
                    .header(Header::new("Set-Cookie", value))
                    .header(Header::new("Cache-Control", "no-store"));
                Ok(response.finalize())
            }
            LoginResponse::Unavailable => {
                let body = String::from("CAS sign-in unavailable");
                Ok(Response::build()
                    .status(Status::InternalServerError)
                    .header(Header::new("Content-Type", "text/plain"))
                    .sized_body(body.len(), Cursor::new(body))
                    .finalize())
            }
        }
    }
}

/// Only same-site paths are accepted as `next`.
fn local_target(next: Option<String>) -> String {
    next.filter(|next| next.starts_with('/') && !next.starts_with("//") && !next.starts_with("/\\"))
        .unwrap_or_else(|| String::from("/"))
}

#[get("/login?<next>")]
pub fn login(handler: &State<CasHandler>, request: RequestInfo, next: Option<String>) -> LoginResponse {
    let properties = AuthProperties::with_redirect_uri(local_target(next));

    match handler.challenge(&request, properties) {
        Ok(challenge) => LoginResponse::Redirect(challenge),
        Err(e) => {
            error!(error = %e, "could not protect CAS state");
            LoginResponse::Unavailable
        }
    }
}
