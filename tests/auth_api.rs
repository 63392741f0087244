use actix_web::dev::ServiceResponse;
use actix_web::{test, web, App};
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use ledger_server::auth::SessionStore;
use ledger_server::error::SessionError;
use ledger_server::{configure_routes, AppState, MemoryStore, PasswordHasher, Settings};
use mockall::mock;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

fn test_state() -> AppState {
    let config = Settings::new_for_test().expect("Failed to load test config");
    AppState::in_memory(config, PasswordHasher::with_cost(4)).unwrap()
}

async fn error_message(resp: ServiceResponse) -> String {
    let body: Value = test::read_body_json(resp).await;
    body["error"]["message"].as_str().unwrap_or_default().to_string()
}

#[actix_web::test]
async fn test_register_login_and_access() {
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(test_state()))
            .configure(configure_routes),
    )
    .await;

    // Test registration
    let register_response = test::TestRequest::post()
        .uri("/v1/auth/create")
        .set_json(json!({ "username": "alice", "password": "secret1" }))
        .send_request(&app)
        .await;

    assert_eq!(register_response.status(), 201);
    let register_body: Value = test::read_body_json(register_response).await;
    let user_id = register_body["user_id"].as_str().unwrap().to_string();
    assert!(Uuid::parse_str(&user_id).is_ok());

    // Test login
    let login_response = test::TestRequest::post()
        .uri("/v1/auth/login")
        .set_json(json!({ "username": "alice", "password": "secret1" }))
        .send_request(&app)
        .await;

    assert_eq!(login_response.status(), 200);
    let tokens: Value = test::read_body_json(login_response).await;
    let access = tokens["access_token"].as_str().unwrap();
    assert!(tokens["refresh_token"].as_str().is_some());
    assert_eq!(tokens["token_type"], "Bearer");

    let me_response = test::TestRequest::get()
        .uri("/v1/api/me")
        .insert_header(("Authorization", format!("Bearer {}", access)))
        .send_request(&app)
        .await;

    assert_eq!(me_response.status(), 200);
    let me: Value = test::read_body_json(me_response).await;
    assert_eq!(me["user_id"], user_id.as_str());
}

#[actix_web::test]
async fn test_registration_rejections() {
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(test_state()))
            .configure(configure_routes),
    )
    .await;

    let first = test::TestRequest::post()
        .uri("/v1/auth/create")
        .set_json(json!({ "username": "alice", "password": "secret1" }))
        .send_request(&app)
        .await;
    assert_eq!(first.status(), 201);

    let duplicate = test::TestRequest::post()
        .uri("/v1/auth/create")
        .set_json(json!({ "username": "alice", "password": "another1" }))
        .send_request(&app)
        .await;
    assert_eq!(duplicate.status(), 409);

    for (username, password) in [("al", "secret1"), ("bob", "short"), ("bob", "bad!pass")] {
        let resp = test::TestRequest::post()
            .uri("/v1/auth/create")
            .set_json(json!({ "username": username, "password": password }))
            .send_request(&app)
            .await;
        assert_eq!(resp.status(), 400, "accepted {}/{}", username, password);
    }
}

#[actix_web::test]
async fn test_invalid_login() {
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(test_state()))
            .configure(configure_routes),
    )
    .await;

    test::TestRequest::post()
        .uri("/v1/auth/create")
        .set_json(json!({ "username": "alice", "password": "secret1" }))
        .send_request(&app)
        .await;

    let wrong_password = test::TestRequest::post()
        .uri("/v1/auth/login")
        .set_json(json!({ "username": "alice", "password": "secret2" }))
        .send_request(&app)
        .await;
    assert_eq!(wrong_password.status(), 401);
    let wrong_password_message = error_message(wrong_password).await;

    let unknown_user = test::TestRequest::post()
        .uri("/v1/auth/login")
        .set_json(json!({ "username": "nobody", "password": "secret1" }))
        .send_request(&app)
        .await;
    assert_eq!(unknown_user.status(), 401);

    // Both failures read the same.
    assert_eq!(wrong_password_message, error_message(unknown_user).await);
}

#[actix_web::test]
async fn test_protected_route_rejections() {
    let state = test_state();
    let user = state.auth_service.register("alice", "secret1").await.unwrap();
    let pair = state.auth_service.login("alice", "secret1").await.unwrap();

    let expired = state
        .auth_service
        .issuer()
        .issue_at(user.id, Utc::now() - ChronoDuration::days(1))
        .unwrap();

    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state.clone()))
            .configure(configure_routes),
    )
    .await;

    let missing = test::TestRequest::get().uri("/v1/api/me").send_request(&app).await;
    assert_eq!(missing.status(), 401);

    let reversed: String = pair.access_token.chars().rev().collect();
    let tampered = test::TestRequest::get()
        .uri("/v1/api/me")
        .insert_header(("Authorization", format!("Bearer {}", reversed)))
        .send_request(&app)
        .await;
    assert_eq!(tampered.status(), 401);

    let stale = test::TestRequest::get()
        .uri("/v1/api/me")
        .insert_header(("Authorization", format!("Bearer {}", expired.access_token)))
        .send_request(&app)
        .await;
    assert_eq!(stale.status(), 401);

    // A refresh token is not an access token.
    let wrong_kind = test::TestRequest::get()
        .uri("/v1/api/me")
        .insert_header(("Authorization", format!("Bearer {}", pair.refresh_token)))
        .send_request(&app)
        .await;
    assert_eq!(wrong_kind.status(), 401);
}

#[actix_web::test]
async fn test_revoked_session_is_rejected() {
    let state = test_state();
    state.auth_service.register("alice", "secret1").await.unwrap();
    let pair = state.auth_service.login("alice", "secret1").await.unwrap();

    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state.clone()))
            .configure(configure_routes),
    )
    .await;

    let before = test::TestRequest::get()
        .uri("/v1/api/me")
        .insert_header(("Authorization", format!("Bearer {}", pair.access_token)))
        .send_request(&app)
        .await;
    assert_eq!(before.status(), 200);

    let details = state.auth_service.authenticate(&pair.access_token).await.unwrap();
    assert!(state.auth_service.revoke(&details.session_id).await.unwrap());

    let after = test::TestRequest::get()
        .uri("/v1/api/me")
        .insert_header(("Authorization", format!("Bearer {}", pair.access_token)))
        .send_request(&app)
        .await;
    assert_eq!(after.status(), 401);
}

#[actix_web::test]
async fn test_legacy_token_header() {
    let state = test_state();
    state.auth_service.register("alice", "secret1").await.unwrap();
    let pair = state.auth_service.login("alice", "secret1").await.unwrap();

    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state))
            .configure(configure_routes),
    )
    .await;

    let bare = test::TestRequest::get()
        .uri("/v1/api/me")
        .insert_header(("token", pair.access_token.clone()))
        .send_request(&app)
        .await;
    assert_eq!(bare.status(), 200);

    let prefixed = test::TestRequest::get()
        .uri("/v1/api/me")
        .insert_header(("token", format!("Bearer {}", pair.access_token)))
        .send_request(&app)
        .await;
    assert_eq!(prefixed.status(), 200);
}

#[actix_web::test]
async fn test_refresh_rotates_pair() {
    let state = test_state();
    state.auth_service.register("alice", "secret1").await.unwrap();
    let pair = state.auth_service.login("alice", "secret1").await.unwrap();

    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state))
            .configure(configure_routes),
    )
    .await;

    let refreshed = test::TestRequest::post()
        .uri("/v1/auth/refresh")
        .set_json(json!({ "refresh_token": pair.refresh_token }))
        .send_request(&app)
        .await;
    assert_eq!(refreshed.status(), 200);
    let tokens: Value = test::read_body_json(refreshed).await;
    let new_access = tokens["access_token"].as_str().unwrap();

    let me = test::TestRequest::get()
        .uri("/v1/api/me")
        .insert_header(("Authorization", format!("Bearer {}", new_access)))
        .send_request(&app)
        .await;
    assert_eq!(me.status(), 200);

    // Each refresh token works once.
    let replay = test::TestRequest::post()
        .uri("/v1/auth/refresh")
        .set_json(json!({ "refresh_token": pair.refresh_token }))
        .send_request(&app)
        .await;
    assert_eq!(replay.status(), 401);

    let with_access = test::TestRequest::post()
        .uri("/v1/auth/refresh")
        .set_json(json!({ "refresh_token": new_access }))
        .send_request(&app)
        .await;
    assert_eq!(with_access.status(), 401);
}

#[actix_web::test]
async fn test_logout_ends_sessions() {
    let state = test_state();
    state.auth_service.register("alice", "secret1").await.unwrap();
    let pair = state.auth_service.login("alice", "secret1").await.unwrap();

    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state))
            .configure(configure_routes),
    )
    .await;

    let unauthenticated = test::TestRequest::post()
        .uri("/v1/auth/logout")
        .send_request(&app)
        .await;
    assert_eq!(unauthenticated.status(), 401);

    let logout = test::TestRequest::post()
        .uri("/v1/auth/logout")
        .insert_header(("Authorization", format!("Bearer {}", pair.access_token)))
        .set_json(json!({ "refresh_token": pair.refresh_token }))
        .send_request(&app)
        .await;
    assert_eq!(logout.status(), 200);

    let me = test::TestRequest::get()
        .uri("/v1/api/me")
        .insert_header(("Authorization", format!("Bearer {}", pair.access_token)))
        .send_request(&app)
        .await;
    assert_eq!(me.status(), 401);

    let refresh = test::TestRequest::post()
        .uri("/v1/auth/refresh")
        .set_json(json!({ "refresh_token": pair.refresh_token }))
        .send_request(&app)
        .await;
    assert_eq!(refresh.status(), 401);
}

#[actix_web::test]
async fn test_rejected_logout_keeps_sessions() {
    let state = test_state();
    state.auth_service.register("alice", "secret1").await.unwrap();
    let pair = state.auth_service.login("alice", "secret1").await.unwrap();

    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state))
            .configure(configure_routes),
    )
    .await;

    let logout = test::TestRequest::post()
        .uri("/v1/auth/logout")
        .insert_header(("Authorization", format!("Bearer {}", pair.access_token)))
        .set_json(json!({ "refresh_token": "garbage" }))
        .send_request(&app)
        .await;
    assert_eq!(logout.status(), 401);

    let me = test::TestRequest::get()
        .uri("/v1/api/me")
        .insert_header(("Authorization", format!("Bearer {}", pair.access_token)))
        .send_request(&app)
        .await;
    assert_eq!(me.status(), 200);

    let refresh = test::TestRequest::post()
        .uri("/v1/auth/refresh")
        .set_json(json!({ "refresh_token": pair.refresh_token }))
        .send_request(&app)
        .await;
    assert_eq!(refresh.status(), 200);
}

mock! {
    pub Sessions {}

    #[async_trait]
    impl SessionStore for Sessions {
        async fn set(&self, session_id: &str, user_id: &str, ttl: Duration) -> Result<(), SessionError>;
        async fn get(&self, session_id: &str) -> Result<Option<String>, SessionError>;
        async fn delete(&self, session_id: &str) -> Result<bool, SessionError>;
    }
}

#[actix_web::test]
async fn test_session_store_failure_is_server_error() {
    let mut sessions = MockSessions::new();
    sessions
        .expect_get()
        .returning(|_| Err(SessionError::Unavailable("connection refused".into())));

    let store = Arc::new(MemoryStore::new());
    let state = AppState::from_parts(
        Settings::new_for_test().unwrap(),
        store.clone(),
        store,
        Arc::new(sessions),
        PasswordHasher::with_cost(4),
    )
    .unwrap();
    let pair = state.auth_service.issuer().issue(Uuid::new_v4()).unwrap();

    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state))
            .configure(configure_routes),
    )
    .await;

    let resp = test::TestRequest::get()
        .uri("/v1/api/me")
        .insert_header(("Authorization", format!("Bearer {}", pair.access_token)))
        .send_request(&app)
        .await;
    assert_eq!(resp.status(), 500);

    // Store details stay out of the response.
    assert!(!error_message(resp).await.contains("connection refused"));
}

#[actix_web::test]
async fn test_login_fails_when_session_cannot_be_stored() {
    let mut sessions = MockSessions::new();
    sessions
        .expect_set()
        .returning(|_, _, _| Err(SessionError::Timeout(Duration::from_millis(500))));

    let store = Arc::new(MemoryStore::new());
    let state = AppState::from_parts(
        Settings::new_for_test().unwrap(),
        store.clone(),
        store,
        Arc::new(sessions),
        PasswordHasher::with_cost(4),
    )
    .unwrap();
    state.auth_service.register("alice", "secret1").await.unwrap();

    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state))
            .configure(configure_routes),
    )
    .await;

    let resp = test::TestRequest::post()
        .uri("/v1/auth/login")
        .set_json(json!({ "username": "alice", "password": "secret1" }))
        .send_request(&app)
        .await;
    assert_eq!(resp.status(), 500);
}
