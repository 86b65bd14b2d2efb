use rocket::launch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn init_tracing() {
    // RUST_LOG=info,cas_auth=debug cargo run
    let mut filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    // Rocket's request lines reach us through `log` and carry the callback ticket.
    if let Ok(directive) = "rocket::server=warn".parse() {
        filter = filter.add_directive(directive);
    }

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[launch]
fn rocket() -> _ {
    init_tracing();
    rocket::build().attach(cas_auth::web::stage())
}
