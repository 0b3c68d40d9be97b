//! API Integration Tests
//!
//! Drive the router over the in-memory backends and check the full
//! request/response cycle: status codes, JSON shapes, cookies and headers.

use axum::{
    body::Body,
    http::{header, HeaderMap, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tonotes_api::{create_test_router, AppState};
use tonotes_auth::config::{AuthConfig, PasswordConfig, TotpConfig};
use tonotes_auth::{AuthService, Backends, NoopGeoLocator, TotpService};
use tonotes_db::mock::MockDatabase;
use tower::ServiceExt;

const PASSWORD: &str = "Ab12!!";
const UA: &str = "Mozilla/5.0 (X11; Linux x86_64) Firefox/121.0";

fn create_router() -> Router {
    let mut config = AuthConfig::default();
    config.jwt.secret = "api-test-secret-api-test-secret-0001".into();
    config.password = PasswordConfig {
        memory_cost: 1024,
        time_cost: 1,
        parallelism: 1,
        ..PasswordConfig::default()
    };

    let db = MockDatabase::new();
    let auth = AuthService::new(config, Backends::from(&db), Arc::new(NoopGeoLocator));
    create_test_router(Arc::new(AppState::in_memory(Arc::new(auth))))
}

/// Credentials returned by register/login
struct Client {
    token: String,
    refresh: String,
    session_id: String,
}

impl Client {
    fn auth_headers(&self) -> Vec<(&'static str, String)> {
        vec![
            ("authorization", format!("Bearer {}", self.token)),
            ("x-session-id", self.session_id.clone()),
        ]
    }
}

/// Make a request and get the status, headers and JSON body
async fn json_request(
    router: &Router,
    method: &str,
    uri: &str,
    headers: &[(&str, String)],
    body: Option<Value>,
) -> (StatusCode, HeaderMap, Value) {
    let mut request = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::USER_AGENT, UA)
        .header("x-forwarded-for", "203.0.113.7");
    for (name, value) in headers {
        request = request.header(*name, value.as_str());
    }

    let body = match body {
        Some(json_body) => {
            request = request.header(header::CONTENT_TYPE, "application/json");
            Body::from(serde_json::to_vec(&json_body).unwrap())
        }
        None => Body::empty(),
    };

    let response = router
        .clone()
        .oneshot(request.body(body).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let headers = response.headers().clone();
    let body_bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: Value = serde_json::from_slice(&body_bytes).unwrap_or(json!(null));

    (status, headers, json)
}

async fn register(router: &Router, username: &str) -> Client {
    let (status, _, body) = json_request(
        router,
        "POST",
        "/api/v1/auth/register",
        &[],
        Some(json!({
            "username": username,
            "email": format!("{username}@example.com"),
            "password": PASSWORD,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");

    Client {
        token: body["token"].as_str().unwrap().to_string(),
        refresh: body["refresh"].as_str().unwrap().to_string(),
        session_id: body["session_id"].as_str().unwrap().to_string(),
    }
}

async fn login(router: &Router, username: &str, totp_code: Option<&str>) -> (StatusCode, Value) {
    let mut body = json!({ "username": username, "password": PASSWORD });
    if let Some(code) = totp_code {
        body["totp_code"] = json!(code);
    }
    let (status, _, body) =
        json_request(router, "POST", "/api/v1/auth/login", &[], Some(body)).await;
    (status, body)
}

fn client_from(body: &Value) -> Client {
    Client {
        token: body["token"].as_str().unwrap().to_string(),
        refresh: body["refresh"].as_str().unwrap().to_string(),
        session_id: body["session_id"].as_str().unwrap().to_string(),
    }
}

/// Enroll in 2FA, returning the secret and recovery codes
async fn enable_two_factor(router: &Router, client: &Client) -> (String, Vec<String>) {
    let (status, _, setup) =
        json_request(router, "GET", "/api/v1/2fa/setup", &client.auth_headers(), None).await;
    assert_eq!(status, StatusCode::OK);
    let secret = setup["secret"].as_str().unwrap().to_string();

    let code = TotpService::new(TotpConfig::default())
        .current_code(&secret)
        .unwrap();
    let (status, _, body) = json_request(
        router,
        "POST",
        "/api/v1/2fa/enable",
        &client.auth_headers(),
        Some(json!({ "secret": secret, "code": code })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");

    let codes = body["recovery_codes"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c.as_str().unwrap().to_string())
        .collect();
    (secret, codes)
}

// =============================================================================
// Public Endpoints
// =============================================================================

mod public_endpoints {
    use super::*;

    #[tokio::test]
    async fn test_health_check() {
        let router = create_router();
        let (status, _, json) = json_request(&router, "GET", "/health", &[], None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "healthy");
    }

    #[tokio::test]
    async fn test_ready_without_stores() {
        let router = create_router();
        let (status, _, json) = json_request(&router, "GET", "/ready", &[], None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "ready");
    }

    #[tokio::test]
    async fn test_register_sets_session_cookie_and_header() {
        let router = create_router();
        let (status, headers, body) = json_request(
            &router,
            "POST",
            "/api/v1/auth/register",
            &[],
            Some(json!({
                "username": "alice",
                "email": "alice@example.com",
                "password": PASSWORD,
            })),
        )
        .await;

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["profile"]["username"], "alice");
        assert_eq!(body["profile"]["two_factor_enabled"], false);
        let session_id = body["session_id"].as_str().unwrap();

        let cookie = headers
            .get(header::SET_COOKIE)
            .and_then(|v| v.to_str().ok())
            .unwrap();
        assert!(cookie.starts_with(&format!("session_id={session_id}")));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("Secure"));
        assert_eq!(headers.get("x-session-id").unwrap(), session_id);
    }

    #[tokio::test]
    async fn test_register_duplicate_username() {
        let router = create_router();
        register(&router, "alice").await;

        let (status, _, body) = json_request(
            &router,
            "POST",
            "/api/v1/auth/register",
            &[],
            Some(json!({
                "username": "alice",
                "email": "other@example.com",
                "password": PASSWORD,
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["code"], "USERNAME_TAKEN");
    }

    #[tokio::test]
    async fn test_register_rejects_bad_input() {
        let router = create_router();

        let (status, _, body) = json_request(
            &router,
            "POST",
            "/api/v1/auth/register",
            &[],
            Some(json!({ "username": "bob", "email": "bob@example.com", "password": "password" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "WEAK_PASSWORD");

        let (status, _, body) = json_request(
            &router,
            "POST",
            "/api/v1/auth/register",
            &[],
            Some(json!({ "username": "bob", "email": "not-an-email", "password": PASSWORD })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "INVALID_INPUT");

        let (status, _, _) = json_request(
            &router,
            "POST",
            "/api/v1/auth/register",
            &[],
            Some(json!({ "username": "bob smith", "email": "bob@example.com", "password": PASSWORD })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _, _) = json_request(
            &router,
            "POST",
            "/api/v1/auth/register",
            &[],
            Some(json!({ "username": "bob" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_login_wrong_password() {
        let router = create_router();
        register(&router, "alice").await;

        let (status, _, body) = json_request(
            &router,
            "POST",
            "/api/v1/auth/login",
            &[],
            Some(json!({ "username": "alice", "password": "Wr0ng!!pass1" })),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], "INVALID_CREDENTIALS");
    }

    #[tokio::test]
    async fn test_login_unknown_user_matches_wrong_password() {
        let router = create_router();
        let (status, body) = login(&router, "nobody", None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], "INVALID_CREDENTIALS");
    }
}

// =============================================================================
// Protected Endpoints
// =============================================================================

mod protected_endpoints {
    use super::*;

    #[tokio::test]
    async fn test_missing_bearer_is_unauthorized() {
        let router = create_router();
        let (status, headers, body) =
            json_request(&router, "GET", "/api/v1/session", &[], None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], "UNAUTHENTICATED");
        assert!(headers.contains_key(header::WWW_AUTHENTICATE));
    }

    #[tokio::test]
    async fn test_missing_session_id() {
        let router = create_router();
        let alice = register(&router, "alice").await;

        let (status, _, body) = json_request(
            &router,
            "GET",
            "/api/v1/session",
            &[("authorization", format!("Bearer {}", alice.token))],
            None,
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], "SESSION_REQUIRED");
    }

    #[tokio::test]
    async fn test_session_id_from_cookie() {
        let router = create_router();
        let alice = register(&router, "alice").await;

        let (status, _, body) = json_request(
            &router,
            "GET",
            "/api/v1/user",
            &[
                ("authorization", format!("Bearer {}", alice.token)),
                ("cookie", format!("theme=dark; session_id={}", alice.session_id)),
            ],
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["username"], "alice");
    }

    #[tokio::test]
    async fn test_refresh_token_rejected_as_access() {
        let router = create_router();
        let alice = register(&router, "alice").await;

        let (status, _, _) = json_request(
            &router,
            "GET",
            "/api/v1/user",
            &[
                ("authorization", format!("Bearer {}", alice.refresh)),
                ("x-session-id", alice.session_id.clone()),
            ],
            None,
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_list_sessions_marks_current() {
        let router = create_router();
        let alice = register(&router, "alice").await;
        let (_, body) = login(&router, "alice", None).await;
        let second = client_from(&body);

        let (status, _, body) =
            json_request(&router, "GET", "/api/v1/session", &second.auth_headers(), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 2);

        let sessions = body["sessions"].as_array().unwrap();
        let current: Vec<&Value> = sessions.iter().filter(|s| s["current"] == true).collect();
        assert_eq!(current.len(), 1);
        assert_eq!(current[0]["id"], second.session_id);
        assert_eq!(current[0]["ip"], "203.0.113.7");
        assert!(sessions.iter().any(|s| s["id"] == alice.session_id));
    }

    #[tokio::test]
    async fn test_other_users_session_is_forbidden() {
        let router = create_router();
        let alice = register(&router, "alice").await;
        let bob = register(&router, "bob").await;

        let uri = format!("/api/v1/session/{}", alice.session_id);
        let (status, _, body) = json_request(&router, "GET", &uri, &bob.auth_headers(), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["code"], "FORBIDDEN");

        let (status, _, _) = json_request(&router, "DELETE", &uri, &bob.auth_headers(), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _, _) = json_request(&router, "GET", &uri, &alice.auth_headers(), None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_delete_other_session() {
        let router = create_router();
        let first = register(&router, "alice").await;
        let (_, body) = login(&router, "alice", None).await;
        let second = client_from(&body);

        let uri = format!("/api/v1/session/{}", first.session_id);
        let (status, headers, _) =
            json_request(&router, "DELETE", &uri, &second.auth_headers(), None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(!headers.contains_key(header::SET_COOKIE));

        let (status, _, body) =
            json_request(&router, "GET", "/api/v1/user", &first.auth_headers(), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], "SESSION_INVALIDATED");

        let (status, _, _) =
            json_request(&router, "GET", "/api/v1/user", &second.auth_headers(), None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_delete_current_session_clears_cookie() {
        let router = create_router();
        let alice = register(&router, "alice").await;

        let uri = format!("/api/v1/session/{}", alice.session_id);
        let (status, headers, _) =
            json_request(&router, "DELETE", &uri, &alice.auth_headers(), None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(headers.contains_key(header::SET_COOKIE));
    }

    #[tokio::test]
    async fn test_logout_all() {
        let router = create_router();
        let alice = register(&router, "alice").await;
        login(&router, "alice", None).await;

        let (status, _, body) = json_request(
            &router,
            "POST",
            "/api/v1/session/logout-all",
            &alice.auth_headers(),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["sessions_ended"], 2);

        let (status, _, _) =
            json_request(&router, "GET", "/api/v1/session", &alice.auth_headers(), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}

// =============================================================================
// Token Lifecycle
// =============================================================================

mod token_lifecycle {
    use super::*;

    #[tokio::test]
    async fn test_refresh() {
        let router = create_router();
        let alice = register(&router, "alice").await;

        let (status, _, body) = json_request(
            &router,
            "POST",
            "/api/v1/auth/token/refresh",
            &[("authorization", format!("Bearer {}", alice.refresh))],
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["access_token"].as_str().is_some());
        assert!(body["new_refresh_token"].as_str().is_some());
        assert_eq!(body["token_type"], "Bearer");

        let renewed = Client {
            token: body["access_token"].as_str().unwrap().to_string(),
            refresh: body["new_refresh_token"].as_str().unwrap().to_string(),
            session_id: alice.session_id.clone(),
        };
        let (status, _, _) =
            json_request(&router, "GET", "/api/v1/user", &renewed.auth_headers(), None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_refresh_with_access_token_fails() {
        let router = create_router();
        let alice = register(&router, "alice").await;

        let (status, _, _) = json_request(
            &router,
            "POST",
            "/api/v1/auth/token/refresh",
            &[("authorization", format!("Bearer {}", alice.token))],
            None,
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _, body) =
            json_request(&router, "POST", "/api/v1/auth/token/refresh", &[], None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], "UNAUTHENTICATED");
    }

    #[tokio::test]
    async fn test_logout_revokes_both_tokens() {
        let router = create_router();
        let alice = register(&router, "alice").await;

        let mut headers = alice.auth_headers();
        headers.push(("refresh-token", alice.refresh.clone()));
        let (status, resp_headers, _) =
            json_request(&router, "POST", "/api/v1/auth/logout", &headers, None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(resp_headers.contains_key(header::SET_COOKIE));

        let (status, _, body) =
            json_request(&router, "GET", "/api/v1/user", &alice.auth_headers(), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], "TOKEN_REVOKED");

        let (status, _, _) = json_request(
            &router,
            "POST",
            "/api/v1/auth/token/refresh",
            &[("authorization", format!("Bearer {}", alice.refresh))],
            None,
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_logout_requires_refresh_header() {
        let router = create_router();
        let alice = register(&router, "alice").await;

        let (status, _, body) =
            json_request(&router, "POST", "/api/v1/auth/logout", &alice.auth_headers(), None)
                .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "INVALID_INPUT");
    }

    #[tokio::test]
    async fn test_login_evicts_oldest_beyond_cap() {
        let router = create_router();
        let first = register(&router, "alice").await;
        for _ in 0..4 {
            let (status, body) = login(&router, "alice", None).await;
            assert_eq!(status, StatusCode::OK);
            assert!(body.get("notice").is_none());
        }

        let (status, body) = login(&router, "alice", None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["notice"].as_str().is_some());

        let (status, _, _) =
            json_request(&router, "GET", "/api/v1/user", &first.auth_headers(), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let latest = client_from(&body);
        let (_, _, sessions) =
            json_request(&router, "GET", "/api/v1/session", &latest.auth_headers(), None).await;
        assert_eq!(sessions["count"], 5);
    }
}

// =============================================================================
// Two-Factor
// =============================================================================

mod two_factor {
    use super::*;

    #[tokio::test]
    async fn test_enable_returns_recovery_codes() {
        let router = create_router();
        let alice = register(&router, "alice").await;
        let (_, codes) = enable_two_factor(&router, &alice).await;

        assert_eq!(codes.len(), 10);
        for code in &codes {
            assert_eq!(code.len(), 9);
            assert_eq!(&code[4..5], "-");
        }

        let (status, _, body) =
            json_request(&router, "GET", "/api/v1/2fa/setup", &alice.auth_headers(), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "2FA_ALREADY_ENABLED");
    }

    #[tokio::test]
    async fn test_setup_returns_qr_code() {
        let router = create_router();
        let alice = register(&router, "alice").await;

        let (status, _, body) =
            json_request(&router, "GET", "/api/v1/2fa/setup", &alice.auth_headers(), None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["qr_code"]
            .as_str()
            .unwrap()
            .starts_with("data:image/svg+xml;base64,"));
        assert!(body["otpauth_url"].as_str().unwrap().starts_with("otpauth://totp/"));
    }

    #[tokio::test]
    async fn test_login_with_two_factor() {
        let router = create_router();
        let alice = register(&router, "alice").await;
        let (secret, _) = enable_two_factor(&router, &alice).await;

        let (status, body) = login(&router, "alice", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["requires_2fa"], true);
        assert!(body.get("token").is_none());

        let (status, body) = login(&router, "alice", Some("000000")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], "INVALID_2FA_CODE");

        let code = TotpService::new(TotpConfig::default())
            .current_code(&secret)
            .unwrap();
        let (status, body) = login(&router, "alice", Some(&code)).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["token"].as_str().is_some());
    }

    #[tokio::test]
    async fn test_recovery_code_is_single_use() {
        let router = create_router();
        let alice = register(&router, "alice").await;
        let (_, codes) = enable_two_factor(&router, &alice).await;

        let request = json!({
            "username": "alice",
            "password": PASSWORD,
            "recovery_code": codes[0].to_lowercase(),
        });
        let (status, headers, body) =
            json_request(&router, "POST", "/api/v1/2fa/recovery", &[], Some(request.clone()))
                .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["remaining_codes"], 9);
        assert!(body["token"].as_str().is_some());
        assert!(headers.contains_key(header::SET_COOKIE));

        let (status, _, body) =
            json_request(&router, "POST", "/api/v1/2fa/recovery", &[], Some(request)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], "INVALID_CODE");
    }

    #[tokio::test]
    async fn test_verify_and_disable() {
        let router = create_router();
        let alice = register(&router, "alice").await;
        let (secret, _) = enable_two_factor(&router, &alice).await;
        let totp = TotpService::new(TotpConfig::default());

        let (status, _, body) = json_request(
            &router,
            "POST",
            "/api/v1/2fa/verify",
            &alice.auth_headers(),
            Some(json!({ "code": "000000" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["valid"], false);

        let code = totp.current_code(&secret).unwrap();
        let (status, _, body) = json_request(
            &router,
            "POST",
            "/api/v1/2fa/verify",
            &alice.auth_headers(),
            Some(json!({ "code": code })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["valid"], true);

        let (status, _, _) = json_request(
            &router,
            "POST",
            "/api/v1/2fa/disable",
            &alice.auth_headers(),
            Some(json!({ "code": code })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = login(&router, "alice", None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["token"].as_str().is_some());
    }
}

// =============================================================================
// Account
// =============================================================================

mod account {
    use super::*;

    #[tokio::test]
    async fn test_change_password_ends_other_sessions() {
        let router = create_router();
        let first = register(&router, "alice").await;
        let (_, body) = login(&router, "alice", None).await;
        let second = client_from(&body);

        let (status, _, body) = json_request(
            &router,
            "PUT",
            "/api/v1/user/password",
            &second.auth_headers(),
            Some(json!({ "current_password": PASSWORD, "new_password": "Cd34##new" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{body}");

        let (status, _, _) =
            json_request(&router, "GET", "/api/v1/user", &second.auth_headers(), None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _, _) =
            json_request(&router, "GET", "/api/v1/user", &first.auth_headers(), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, body) = login(&router, "alice", None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], "INVALID_CREDENTIALS");

        // Second change inside the cooldown
        let (status, headers, body) = json_request(
            &router,
            "PUT",
            "/api/v1/user/password",
            &second.auth_headers(),
            Some(json!({ "current_password": "Cd34##new", "new_password": "Ef56$$new" })),
        )
        .await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body["code"], "RATE_LIMITED");
        assert!(body["next_allowed_at"].as_str().is_some());
        assert!(headers.contains_key(header::RETRY_AFTER));
    }

    #[tokio::test]
    async fn test_change_email_conflict() {
        let router = create_router();
        let alice = register(&router, "alice").await;
        register(&router, "bob").await;

        let (status, _, body) = json_request(
            &router,
            "PUT",
            "/api/v1/user/email",
            &alice.auth_headers(),
            Some(json!({ "email": "bob@example.com" })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["code"], "EMAIL_TAKEN");

        let (status, _, _) = json_request(
            &router,
            "PUT",
            "/api/v1/user/email",
            &alice.auth_headers(),
            Some(json!({ "email": "alice@new.example.com" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (_, _, profile) =
            json_request(&router, "GET", "/api/v1/user", &alice.auth_headers(), None).await;
        assert_eq!(profile["email"], "alice@new.example.com");
    }

    #[tokio::test]
    async fn test_delete_account() {
        let router = create_router();
        let alice = register(&router, "alice").await;

        let (status, headers, _) =
            json_request(&router, "DELETE", "/api/v1/user", &alice.auth_headers(), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert!(headers.contains_key(header::SET_COOKIE));

        let (status, _, _) =
            json_request(&router, "GET", "/api/v1/user", &alice.auth_headers(), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, body) = login(&router, "alice", None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], "INVALID_CREDENTIALS");

        // Username is free again
        register(&router, "alice").await;
    }
}
