//! End-to-end dispatch tests: full axum app, one request in, one terminal
//! response out.

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use tower::ServiceExt;

use crate::{
    AppState, build_app,
    config::RouterConfig,
    services::{Services, SyncJob, UserSyncService},
};

fn test_config() -> RouterConfig {
    let mut config = RouterConfig::for_tests("https://example.com");
    config.server.home_url = "https://example.com".into();
    config.sso.oidc.redirect_url = "https://example.com/sso-callback".into();
    config
}

fn app(config: RouterConfig) -> Router {
    build_app(AppState::new(config))
}

fn app_with_services(config: RouterConfig, services: Services) -> Router {
    build_app(AppState::with_services(config, services))
}

/// An unsigned JWT good enough for the audience pre-check and claim parsing.
fn make_id_token(audience: &str) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(
        serde_json::json!({
            "aud": audience,
            "sub": "user-1",
            "preferred_username": "user@example.com",
        })
        .to_string()
        .as_bytes(),
    );
    let signature = URL_SAFE_NO_PAD.encode(b"unverified");
    format!("{header}.{payload}.{signature}")
}

fn form_post(path: &str, body: String) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(path)
        .header("host", "example.com")
        .header("content-type", "application/x-www-form-urlencoded")
        .body(Body::from(body))
        .unwrap()
}

fn get(path: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(path)
        .header("host", "example.com")
        .body(Body::empty())
        .unwrap()
}

fn location(response: &axum::response::Response) -> &str {
    response
        .headers()
        .get(http::header::LOCATION)
        .expect("expected a redirect")
        .to_str()
        .unwrap()
}

#[tokio::test]
async fn test_healthz() {
    let response = app(test_config()).oneshot(get("/healthz")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_unmatched_request_is_not_found() {
    let response = app(test_config())
        .oneshot(get("/some/ordinary/page"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_initiate_redirects_to_idp() {
    let response = app(test_config())
        .oneshot(get("/login?action=openidredirect&redirect_to=/dash"))
        .await
        .unwrap();

    assert!(response.status().is_redirection());
    let target = location(&response);
    assert!(target.starts_with("https://login.microsoftonline.com/common/oauth2/v2.0/authorize"));
    assert!(target.contains("client_id=test-client"));
    assert!(target.contains("state=https%3A%2F%2Fexample.com%2Fdash"));
}

#[tokio::test]
async fn test_id_token_response_round_trip() {
    // Token posted to the registered callback with a state carrying an
    // internal mode-free redirect target: the token handler runs and the
    // user lands on the cleaned target.
    let token = make_id_token("test-client");
    let body = format!(
        "id_token={}&code=abc&state={}",
        token,
        urlencoding::encode("https://example.com/landing?foo=1")
    );

    let response = app(test_config())
        .oneshot(form_post("/sso-callback", body))
        .await
        .unwrap();

    assert!(response.status().is_redirection());
    assert_eq!(location(&response), "https://example.com/landing?foo=1");
}

#[tokio::test]
async fn test_audience_mismatch_is_silent() {
    let token = make_id_token("some-other-client");
    let body = format!("id_token={token}");

    let response = app(test_config())
        .oneshot(form_post("/sso-callback", body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_idp_error_redirects_to_error_page() {
    let response = app(test_config())
        .oneshot(form_post(
            "/sso-callback",
            "error=access_denied&error_description=user+declined&code=x".into(),
        ))
        .await
        .unwrap();

    assert!(response.status().is_redirection());
    assert_eq!(
        location(&response),
        "https://example.com/login-error?login_error=check_log"
    );
}

#[tokio::test]
async fn test_strict_mode_skips_response_on_wrong_path() {
    let token = make_id_token("test-client");
    let body = format!("id_token={token}");

    let response = app(test_config())
        .oneshot(form_post("/not/the/callback", body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_strict_mode_disabled_processes_anywhere() {
    let mut config = test_config();
    config.sso.redirect_url_strict = false;
    let token = make_id_token("test-client");
    let body = format!("id_token={token}");

    let response = app(config)
        .oneshot(form_post("/not/the/callback", body))
        .await
        .unwrap();

    assert!(response.status().is_redirection());
}

#[tokio::test]
async fn test_malformed_state_aborts_to_error_page() {
    let token = make_id_token("test-client");
    let body = format!("id_token={token}&state=javascript%3Aalert(1)");

    let response = app(test_config())
        .oneshot(form_post("/sso-callback", body))
        .await
        .unwrap();

    assert!(response.status().is_redirection());
    assert_eq!(
        location(&response),
        "https://example.com/login-error?login_error=check_log"
    );
}

#[tokio::test]
async fn test_unsupported_code_flow_terminates_generically() {
    // Implicit flow configured, bare code arrives.
    let response = app(test_config())
        .oneshot(form_post("/sso-callback", "code=abc".into()))
        .await
        .unwrap();

    assert!(response.status().is_redirection());
    assert_eq!(
        location(&response),
        "https://example.com/login-error?login_error=check_log"
    );
}

struct RecordingSync {
    ran: tokio::sync::mpsc::UnboundedSender<String>,
}

#[async_trait]
impl UserSyncService for RecordingSync {
    async fn get_job(&self, job_id: &str) -> Option<SyncJob> {
        (job_id == "42").then(|| SyncJob {
            id: "42".into(),
            name: "nightly".into(),
        })
    }

    async fn run(&self, job_id: &str) {
        let _ = self.ran.send(job_id.to_string());
    }
}

#[tokio::test]
async fn test_sync_trigger_halts_with_no_content() {
    let config = test_config();
    let mut services = Services::from_config(&config, reqwest::Client::new());
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    services.sync_queue = Some(Arc::new(RecordingSync { ran: tx }));

    let response = app_with_services(config, services)
        .oneshot(get("/?sync_run=start&job_id=42"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    let ran = tokio::time::timeout(std::time::Duration::from_secs(1), rx.recv())
        .await
        .expect("sync job should have started");
    assert_eq!(ran.as_deref(), Some("42"));
}

#[tokio::test]
async fn test_sync_trigger_unknown_job_still_halts() {
    let config = test_config();
    let mut services = Services::from_config(&config, reqwest::Client::new());
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    services.sync_queue = Some(Arc::new(RecordingSync { ran: tx }));

    let response = app_with_services(config, services)
        .oneshot(get("/?sync_run=start&job_id=999"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_self_test_round_trip() {
    let token = make_id_token("test-client");
    let body = format!(
        "id_token={}&state={}",
        token,
        urlencoding::encode("https://example.com/results?mode=selfTest&tab=1")
    );

    let response = app(test_config())
        .oneshot(form_post("/sso-callback", body))
        .await
        .unwrap();

    assert!(response.status().is_redirection());
    assert_eq!(location(&response), "https://example.com/results?tab=1");
}

#[tokio::test]
async fn test_saml_response_without_validator_fails_closed() {
    let mut config = test_config();
    config.sso.saml.sp_acs_url = "https://example.com/saml/acs".into();

    let response = app(config)
        .oneshot(form_post(
            "/saml/acs",
            format!(
                "SAMLResponse=b64&RelayState={}",
                urlencoding::encode("https://example.com/after")
            ),
        ))
        .await
        .unwrap();

    assert!(response.status().is_redirection());
    assert_eq!(
        location(&response),
        "https://example.com/login-error?login_error=saml2_error"
    );
}
