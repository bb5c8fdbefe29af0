mod common;

use axum::http::StatusCode;
use common::{get_request, json_request, FakeIdentity, TestApp, CONFIRM_TOKEN};
use serde_json::json;
use skills_service::services::assistants::ScriptedAssistant;

fn app_with_identity(identity: FakeIdentity) -> TestApp {
    TestApp::build(ScriptedAssistant::new(), ScriptedAssistant::new(), identity)
}

fn registration() -> serde_json::Value {
    json!({
        "email": "ana@example.com",
        "password": "secret123",
        "nome": "Ana",
        "telefone": "+55 91 99999-0000",
        "instagram": "@ana"
    })
}

#[tokio::test]
async fn register_pending_confirmation_creates_profile() {
    let app = TestApp::new();

    let (status, body) = app
        .send(json_request("POST", "/register", None, registration()))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["requireEmailConfirmation"], true);
    assert!(body.get("token").is_none());

    let profile = app.profiles.get("user-1").unwrap();
    assert_eq!(profile.name.as_deref(), Some("Ana"));
    assert_eq!(profile.phone.as_deref(), Some("+55 91 99999-0000"));
    assert_eq!(profile.instagram.as_deref(), Some("@ana"));
}

#[tokio::test]
async fn register_with_confirmed_email_returns_session() {
    let app = app_with_identity(FakeIdentity::auto_confirming());

    let (status, body) = app
        .send(json_request("POST", "/register", None, registration()))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user_id"], "user-1");
    assert_eq!(body["expires_in"], 24 * 3600);

    let token = body["token"].as_str().unwrap();
    let claims = app.state.jwt.validate(token).unwrap();
    assert_eq!(claims.sub, "user-1");
    assert_eq!(claims.email, "ana@example.com");
}

#[tokio::test]
async fn register_duplicate_email_is_rejected() {
    let app = TestApp::new();
    app.send(json_request("POST", "/register", None, registration()))
        .await;

    let (status, body) = app
        .send(json_request("POST", "/register", None, registration()))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "User already registered");
}

#[tokio::test]
async fn register_validates_fields() {
    let app = TestApp::new();

    let (status, body) = app
        .send(json_request(
            "POST",
            "/register",
            None,
            json!({"email": "not-an-email", "password": "123", "nome": ""}),
        ))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert!(app.profiles.get("user-1").is_none());
}

#[tokio::test]
async fn login_returns_a_working_session_token() {
    let app = TestApp::new();
    app.identity
        .add_account("ana@example.com", "secret123", "user-9");

    let (status, body) = app
        .send(json_request(
            "POST",
            "/login",
            None,
            json!({"email": "ana@example.com", "password": "secret123"}),
        ))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user_id"], "user-9");
    let token = body["token"].as_str().unwrap().to_string();

    let (status, body) = app
        .send(get_request("/api/check-auth", Some(&token)))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["authenticated"], true);
}

#[tokio::test]
async fn login_with_wrong_password_is_unauthorized() {
    let app = TestApp::new();
    app.identity
        .add_account("ana@example.com", "secret123", "user-9");

    let (status, body) = app
        .send(json_request(
            "POST",
            "/login",
            None,
            json!({"email": "ana@example.com", "password": "wrong-pass"}),
        ))
        .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Invalid credentials");
}

#[tokio::test]
async fn unconfirmed_account_cannot_log_in_until_confirmed() {
    let app = TestApp::new();
    app.send(json_request("POST", "/register", None, registration()))
        .await;
    let login = json!({"email": "ana@example.com", "password": "secret123"});

    let (status, _) = app
        .send(json_request("POST", "/login", None, login.clone()))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = app
        .send(get_request(
            &format!("/auth/confirm?token={}&type=email_confirmation", CONFIRM_TOKEN),
            None,
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Email confirmed");
    assert!(app.identity.is_confirmed("ana@example.com"));

    let (status, _) = app
        .send(json_request("POST", "/login", None, login))
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn confirm_rejects_missing_token_and_wrong_type() {
    let app = TestApp::new();

    let (status, body) = app
        .send(get_request("/auth/confirm?type=email_confirmation", None))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Missing confirmation token");

    let (status, body) = app
        .send(get_request(
            &format!("/auth/confirm?token={}&type=recovery", CONFIRM_TOKEN),
            None,
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Unsupported confirmation type");
}

#[tokio::test]
async fn confirm_with_stale_token_is_rejected() {
    let app = TestApp::new();

    let (status, _) = app
        .send(get_request(
            "/auth/confirm?token=stale&type=email_confirmation",
            None,
        ))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn check_auth_without_valid_token_is_false() {
    let app = TestApp::new();

    let (status, body) = app.send(get_request("/api/check-auth", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["authenticated"], false);

    let (_, body) = app
        .send(get_request("/api/check-auth", Some("garbage")))
        .await;
    assert_eq!(body["authenticated"], false);
}

#[tokio::test]
async fn user_endpoint_returns_profile_and_email() {
    let app = TestApp::new();
    let token = app.signed_in_user("user-7");

    let (status, body) = app.send(get_request("/api/user", Some(&token))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["id"], "user-7");
    assert_eq!(body["email"], "user-7@example.com");
}

#[tokio::test]
async fn user_endpoint_without_profile_is_not_found() {
    let app = TestApp::new();
    let token = app.token_for("ghost");

    let (status, body) = app.send(get_request("/api/user", Some(&token))).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "User profile not found");
}
