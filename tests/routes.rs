mod support;

use cas_auth::web;
use rocket::config::LogLevel;
use rocket::http::{Cookie, Header, Status};
use rocket::local::asynchronous::{Client, LocalResponse};
use support::*;
use url::Url;

const HOST: &str = "app.example.com";
const COOKIE_NAME: &str = ".cas.correlation.CAS";

async fn client(reply: Reply) -> (Client, std::sync::Arc<FakeBackchannel>) {
    let (handler, backchannel) = handler_with(options(), reply);
    let rocket = web::mount(rocket::build(), handler);
    let client = Client::untracked(rocket).await.expect("valid rocket instance");
    (client, backchannel)
}

/// Name, value and raw text of the first `Set-Cookie` header.
fn set_cookie(response: &LocalResponse<'_>) -> (String, String, String) {
    let header = response
        .headers()
        .get_one("Set-Cookie")
        .expect("response sets a cookie")
        .to_string();
    let pair = header.split(';').next().unwrap_or_default();
    let (name, value) = pair.split_once('=').expect("cookie has a value");
    (name.trim().to_string(), value.to_string(), header)
}

/// Path and query of the service URL CAS would send the browser back to.
fn callback_uri(location: &str, ticket: &str) -> String {
    let login = Url::parse(location).unwrap();
    let service = login
        .query_pairs()
        .find(|(key, _)| key == "service")
        .map(|(_, value)| value.into_owned())
        .unwrap();
    let service = Url::parse(&service).unwrap();

    format!("{}?{}&ticket={ticket}", service.path(), service.query().unwrap())
}

async fn start_login(client: &Client) -> (String, String) {
    let response = client
        .get("/login?next=/dashboard")
        .header(Header::new("Host", HOST))
        .dispatch()
        .await;

    assert_eq!(response.status(), Status::SeeOther);
    assert_eq!(response.headers().get_one("Cache-Control"), Some("no-store"));

    let location = response.headers().get_one("Location").unwrap().to_string();
    assert!(location.starts_with(
        "https://cas.example.com/cas/login?service=http%3A%2F%2Fapp.example.com%2Fsignin-cas%3Fstate%3D"
    ));

    let (name, value, header) = set_cookie(&response);
    assert_eq!(name, COOKIE_NAME);
    assert!(header.contains("Path=/signin-cas"));
    assert!(header.contains("HttpOnly"));
    assert!(header.contains("Max-Age=900"));
    assert!(!header.contains("Secure"));

    (location, value)
}

#[rocket::async_test]
async fn login_then_callback_signs_in() {
    let (client, backchannel) = client(Reply::Body(
        200,
        cas2_success("alice", "<cas:email>alice@example.com</cas:email>"),
    ))
    .await;

    let (location, token) = start_login(&client).await;
    backchannel.bind_service(&query_param(&location, "service").unwrap());

    let response = client
        .get(callback_uri(&location, "ST-1"))
        .header(Header::new("Host", HOST))
        .cookie(Cookie::new(COOKIE_NAME, token))
        .dispatch()
        .await;

    assert_eq!(response.status(), Status::Ok);

    // Correlation cookie is cleared on the way out.
    let (name, value, header) = set_cookie(&response);
    assert_eq!(name, COOKIE_NAME);
    assert!(value.is_empty());
    assert!(header.contains("Max-Age=0"));

    let body: serde_json::Value = serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
    assert_eq!(body["identity"]["name"], "alice");
    assert_eq!(body["redirect_uri"], "/dashboard");
    assert_eq!(backchannel.call_count(), 1);
}

#[rocket::async_test]
async fn callback_without_cookie_is_forbidden() {
    let (client, backchannel) = client(Reply::Body(200, cas2_success("alice", ""))).await;

    let (location, _) = start_login(&client).await;

    let response = client
        .get(callback_uri(&location, "ST-1"))
        .header(Header::new("Host", HOST))
        .dispatch()
        .await;

    assert_eq!(response.status(), Status::Forbidden);
    assert_eq!(
        response.into_string().await.unwrap(),
        "CAS authentication failed: correlation failed"
    );
    assert_eq!(backchannel.call_count(), 0);
}

#[rocket::async_test]
async fn callback_without_state_is_forbidden() {
    let (client, backchannel) = client(Reply::Body(200, cas2_success("alice", ""))).await;

    let response = client
        .get("/signin-cas?ticket=ST-1")
        .header(Header::new("Host", HOST))
        .dispatch()
        .await;

    assert_eq!(response.status(), Status::Forbidden);
    assert_eq!(
        response.into_string().await.unwrap(),
        "CAS authentication failed: missing or invalid state"
    );
    assert_eq!(backchannel.call_count(), 0);
}

#[rocket::async_test]
async fn unreachable_cas_server_is_bad_gateway() {
    let (client, _) = client(Reply::Timeout).await;

    let (location, token) = start_login(&client).await;

    let response = client
        .get(callback_uri(&location, "ST-1"))
        .header(Header::new("Host", HOST))
        .cookie(Cookie::new(COOKIE_NAME, token))
        .dispatch()
        .await;

    assert_eq!(response.status(), Status::BadGateway);
}

#[rocket::async_test]
async fn login_rejects_offsite_next() {
    let (client, _) = client(Reply::Body(200, cas2_success("alice", ""))).await;

    let response = client
        .get("/login?next=https%3A%2F%2Fevil.example.com%2F")
        .header(Header::new("Host", HOST))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::SeeOther);

    let location = response.headers().get_one("Location").unwrap().to_string();
    let (_, token, _) = set_cookie(&response);

    let response = client
        .get(callback_uri(&location, "ST-1"))
        .header(Header::new("Host", HOST))
        .cookie(Cookie::new(COOKIE_NAME, token))
        .dispatch()
        .await;

    let body: serde_json::Value = serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
    assert_eq!(body["redirect_uri"], "/");
}

#[rocket::async_test]
async fn request_lines_stay_out_of_rocket_log() {
    for level in ["normal", "debug"] {
        let (handler, _) = handler_with(options(), Reply::Timeout);
        let figment = rocket::Config::figment().merge(("log_level", level));
        let rocket = web::mount(rocket::custom(figment), handler);
        let client = Client::untracked(rocket).await.expect("valid rocket instance");

        assert_eq!(client.rocket().config().log_level, LogLevel::Critical, "from {level}");
    }

    let (handler, _) = handler_with(options(), Reply::Timeout);
    let figment = rocket::Config::figment().merge(("log_level", "off"));
    let client = Client::untracked(web::mount(rocket::custom(figment), handler))
        .await
        .expect("valid rocket instance");
    assert_eq!(client.rocket().config().log_level, LogLevel::Off);
}

#[rocket::async_test]
async fn first_ticket_parameter_wins() {
    let (client, backchannel) = client(Reply::Body(200, cas2_success("alice", ""))).await;

    let (location, token) = start_login(&client).await;
    let uri = format!("{}&ticket=ST-2&utm_source=mail", callback_uri(&location, "ST-1"));

    let response = client
        .get(uri)
        .header(Header::new("Host", HOST))
        .cookie(Cookie::new(COOKIE_NAME, token))
        .dispatch()
        .await;

    assert_eq!(response.status(), Status::Ok);
    let calls = backchannel.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(query_param(&calls[0], "ticket").as_deref(), Some("ST-1"));
}
