mod common;

use std::sync::Arc;

use blog_client::models::{LoginRequest, ProfileForm, SignupRequest};
use blog_client::session::{MemorySessionStore, SignOutReason, SESSION_TTL_MS};
use blog_client::{BlogClient, BlogClientError, ClientConfig, GuardOutcome, Session, SessionStore, OFFLINE_MESSAGE};
use chrono::Utc;
use common::{MockServer, EMAIL, PASSWORD, TOKEN};

fn stored_session(store: &MemorySessionStore) -> Session {
    let record = store.load().unwrap().expect("session record");
    serde_json::from_str(&record).unwrap()
}

#[tokio::test]
async fn login_persists_session_for_a_day() {
    let server = MockServer::start().await;
    let (client, outcome, store) = server.client();
    assert_eq!(outcome, GuardOutcome::SignedOut(SignOutReason::Absent));

    let before = Utc::now().timestamp_millis();
    let session = client
        .auth()
        .login(LoginRequest {
            email: EMAIL.into(),
            password: PASSWORD.into(),
        })
        .await
        .unwrap();
    let after = Utc::now().timestamp_millis();

    assert_eq!(session.token, TOKEN);
    assert_eq!(session.user.first_name, "Ada");
    assert!(session.expiry >= before + SESSION_TTL_MS);
    assert!(session.expiry <= after + SESSION_TTL_MS);
    assert_eq!(stored_session(&store), session);
    assert!(client.session().is_signed_in());

    // a fresh start on the same store restores it
    let (reloaded, outcome) =
        BlogClient::new(ClientConfig::new(server.base_url.clone()), store.clone()).unwrap();
    assert!(outcome.is_signed_in());
    assert_eq!(reloaded.session().token().as_deref(), Some(TOKEN));
}

#[tokio::test]
async fn expired_record_is_cleared_on_start() {
    let server = MockServer::start().await;
    let record = serde_json::json!({
        "user": {"id": 1, "first_name": "Ada", "last_name": "Lovelace", "email": EMAIL},
        "token": "old",
        "expiry": Utc::now().timestamp_millis() - 1,
    });
    let store = Arc::new(MemorySessionStore::with_record(record.to_string()));

    let (client, outcome) =
        BlogClient::new(ClientConfig::new(server.base_url.clone()), store.clone()).unwrap();

    assert_eq!(outcome, GuardOutcome::SignedOut(SignOutReason::Expired));
    assert!(!client.session().is_signed_in());
    assert_eq!(store.load().unwrap(), None);
}

#[tokio::test]
async fn login_errors_are_user_facing() {
    let server = MockServer::start().await;
    let (client, _, store) = server.client();

    let wrong_password = client
        .auth()
        .login(LoginRequest {
            email: EMAIL.into(),
            password: "Wrong1!x".into(),
        })
        .await
        .unwrap_err();
    assert_eq!(wrong_password.user_message("Login failed"), "Invalid email or password");

    let unknown = client
        .auth()
        .login(LoginRequest {
            email: "nobody@example.com".into(),
            password: PASSWORD.into(),
        })
        .await
        .unwrap_err();
    assert_eq!(unknown.user_message("Login failed"), "Email is not registered");

    assert_eq!(store.load().unwrap(), None);
    assert!(!client.session().is_signed_in());
}

#[tokio::test]
async fn invalid_login_form_never_reaches_the_server() {
    let server = MockServer::start().await;
    let (client, _, _) = server.client();

    let err = client
        .auth()
        .login(LoginRequest {
            email: "not-an-email".into(),
            password: "123".into(),
        })
        .await
        .unwrap_err();

    let BlogClientError::Validation(errors) = err else {
        panic!("expected validation errors");
    };
    assert!(errors.message_for("email").is_some());
    assert!(errors.message_for("password").is_some());
    assert_eq!(server.with(|db| db.count("POST /auth/login")), 0);
}

#[tokio::test]
async fn signup_signs_in_with_returned_user() {
    let server = MockServer::start().await;
    let (client, _, store) = server.client();

    let session = client
        .auth()
        .signup(
            SignupRequest {
                first_name: "Grace".into(),
                last_name: "Hopper".into(),
                email: "grace@example.com".into(),
                password: "Cobol1959!".into(),
            },
            "Cobol1959!",
        )
        .await
        .unwrap();

    assert_eq!(session.token, "t-signup");
    assert_eq!(session.user.email, "grace@example.com");
    assert_eq!(stored_session(&store).token, "t-signup");
}

#[tokio::test]
async fn requests_carry_the_bearer_token() {
    let server = MockServer::start().await;
    let client = server.signed_in_client().await;

    let user = client.auth().refresh_user().await.unwrap();
    assert_eq!(user.email, EMAIL);

    let headers = server.with(|db| db.auth_headers.clone());
    // the login itself went out anonymously
    assert_eq!(headers.first(), Some(&None));
    assert_eq!(headers.last(), Some(&Some(format!("Bearer {TOKEN}"))));
}

#[tokio::test]
async fn profile_update_keeps_token_and_busts_unchanged_image() {
    let server = MockServer::start().await;
    let client = server.signed_in_client().await;
    let before = client.session().current().unwrap();

    let user = client
        .auth()
        .update_profile(ProfileForm {
            first_name: "Augusta".into(),
            last_name: "King".into(),
            image: None,
        })
        .await
        .unwrap();

    assert_eq!(user.first_name, "Augusta");
    let img = user.img_url.unwrap();
    assert!(img.starts_with("https://cdn.example.com/ada.png?t="), "{img}");

    let after = client.session().current().unwrap();
    assert_eq!(after.token, before.token);
    assert_eq!(after.expiry, before.expiry);
}

#[tokio::test]
async fn logout_clears_store_and_headers() {
    let server = MockServer::start().await;
    let store = Arc::new(MemorySessionStore::new());
    let (client, _) =
        BlogClient::new(ClientConfig::new(server.base_url.clone()), store.clone()).unwrap();
    client
        .auth()
        .login(LoginRequest {
            email: EMAIL.into(),
            password: PASSWORD.into(),
        })
        .await
        .unwrap();

    client.auth().logout().unwrap();
    assert_eq!(store.load().unwrap(), None);

    let err = client.auth().refresh_user().await.unwrap_err();
    assert!(err.is_unauthorized());
}

#[tokio::test]
async fn offline_flag_short_circuits_requests() {
    let server = MockServer::start().await;
    let client = server.signed_in_client().await;
    let sent = server.with(|db| db.requests.len());

    client.http().set_online(false);
    let err = client.http().fetch_user().await.unwrap_err();

    assert!(err.is_offline());
    assert_eq!(err.to_string(), OFFLINE_MESSAGE);
    assert_eq!(server.with(|db| db.requests.len()), sent);
    assert!(client.session().is_signed_in());

    client.http().set_online(true);
    assert!(client.http().fetch_user().await.is_ok());
}

#[tokio::test]
async fn unreachable_server_reads_as_offline() {
    // nothing listens on a port we just released
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let (client, _) = BlogClient::new(
        ClientConfig::new(format!("http://{addr}")),
        Arc::new(MemorySessionStore::new()),
    )
    .unwrap();

    let err = client.http().list_todos().await.unwrap_err();
    assert_eq!(err.user_message("Failed to fetch todos"), OFFLINE_MESSAGE);
}
