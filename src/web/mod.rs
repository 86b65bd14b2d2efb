//! Rocket binding for the handshake.
//!
//! `GET /login?<next>` issues the challenge, `GET {callback_path}?state=..&ticket=..`
//! completes it.
use rocket::config::LogLevel;
use rocket::fairing::AdHoc;
use rocket::figment::providers::Serialized;
use rocket::{routes, Build, Rocket};
use std::sync::Arc;
use tracing::{error, info};

use crate::backchannel::IsahcBackchannel;
use crate::config::CasOptions;
use crate::handler::CasHandler;

mod callback;
mod login;
mod request;

pub use callback::CallbackResponse;
pub use login::LoginResponse;

/// Reads `CasOptions` from the `cas` table of the figment, builds the handler
/// and mounts the routes. Ignition fails on any configuration error.
pub fn stage() -> AdHoc {
    AdHoc::try_on_ignite("CAS authentication", |rocket| async move {
        let options: CasOptions = match rocket.figment().extract_inner("cas") {
            Ok(options) => options,
            Err(e) => {
                error!(error = %e, "could not read CAS configuration");
                return Err(rocket);
            }
        };

        let backchannel = match IsahcBackchannel::new(options.backchannel_timeout()) {
            Ok(backchannel) => backchannel,
            Err(e) => {
                error!(error = %e, "could not build CAS backchannel");
                return Err(rocket);
            }
        };

        let handler = match CasHandler::new(options, Arc::new(backchannel)) {
            Ok(handler) => handler,
            Err(e) => {
                error!(error = %e, "invalid CAS configuration");
                return Err(rocket);
            }
        };

        info!(options = ?handler.options(), "CAS authentication configured");
        Ok(mount(rocket, handler))
    })
}

/// Manages `handler` and mounts the login and callback routes.
///
/// Rocket's own log is capped at `critical`: at `normal` and above it prints
/// every request line, and the callback's carries the ticket and the state.
pub fn mount(rocket: Rocket<Build>, handler: CasHandler) -> Rocket<Build> {
    let callback_path = handler.options().callback_path.clone();

    quiet_request_log(rocket)
        .manage(handler)
        .mount("/", routes![login::login])
        .mount(callback_path, routes![callback::callback])
}

fn quiet_request_log(rocket: Rocket<Build>) -> Rocket<Build> {
    let level = rocket
        .figment()
        .extract_inner::<LogLevel>("log_level")
        .unwrap_or(LogLevel::Normal);

    match level {
        LogLevel::Off | LogLevel::Critical => rocket,
        LogLevel::Normal | LogLevel::Debug => {
            let figment = rocket
                .figment()
                .clone()
                .merge(Serialized::global("log_level", LogLevel::Critical));
            rocket.configure(figment)
        }
    }
}
