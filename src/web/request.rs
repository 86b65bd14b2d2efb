use rocket::request::{FromRequest, Outcome, Request};
use std::convert::Infallible;

use crate::handler::{OwnedCallbackParams, RequestInfo};

#[rocket::async_trait]
impl<'r> FromRequest<'r> for RequestInfo {
    type Error = Infallible;

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let headers = req.headers();

        // Prefer proxy headers when present.
        let scheme = headers
            .get_one("X-Forwarded-Proto")
            .and_then(|v| v.split(',').next())
            .map(|v| v.trim().to_ascii_lowercase())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| {
                if req.rocket().config().tls_enabled() {
                    "https".to_string()
                } else {
                    "http".to_string()
                }
            });

        let host = headers
            .get_one("X-Forwarded-Host")
            .or_else(|| headers.get_one("Host"))
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .unwrap_or("localhost");

        Outcome::Success(RequestInfo::new(scheme, host).with_path_and_query(req.uri().to_string()))
    }
}

/// `state` and `ticket` from the raw query; the first occurrence of each wins.
#[rocket::async_trait]
impl<'r> FromRequest<'r> for OwnedCallbackParams {
    type Error = Infallible;

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let params = req
            .uri()
            .query()
            .map(|query| OwnedCallbackParams::parse(query.as_str()))
            .unwrap_or_default();

        Outcome::Success(params)
    }
}
