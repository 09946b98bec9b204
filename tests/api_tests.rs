// HTTP tests: full request/response cycle against the in-memory store

use actix_web::http::StatusCode;
use actix_web::{test, web, App};
use matrimony::core::{MissingProfilePolicy, PageLimits};
use matrimony::error::{handle_json_payload_error, handle_query_payload_error};
use matrimony::routes::{configure_routes, AppState};
use matrimony::services::{AccountChanges, DisabledNotifier, IdentityStore, MemoryStore, TokenIssuer};
use serde_json::{json, Value};
use std::sync::Arc;

fn app_state(store: Arc<MemoryStore>) -> AppState {
    AppState {
        store,
        tokens: TokenIssuer::new("test-secret", 3600),
        notifier: Arc::new(DisabledNotifier),
        discovery: MissingProfilePolicy::Unfiltered,
        pagination: PageLimits::default(),
    }
}

macro_rules! test_app {
    ($store:expr) => {
        test::init_service(
            App::new()
                .app_data(web::Data::new(app_state($store)))
                .app_data(web::JsonConfig::default().error_handler(handle_json_payload_error))
                .app_data(web::QueryConfig::default().error_handler(handle_query_payload_error))
                .configure(configure_routes),
        )
        .await
    };
}

/// Register through the API and yield (token, profile id)
macro_rules! register {
    ($app:expr, $email:expr, $gender:expr) => {{
        let req = test::TestRequest::post()
            .uri("/api/profiles/register")
            .set_json(registration($email, $gender))
            .to_request();
        let resp = test::call_service($app, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);

        let body: Value = test::read_body_json(resp).await;
        let token = body["token"].as_str().unwrap().to_string();
        let id = body["user"]["user"].as_i64().unwrap();
        (token, id)
    }};
}

fn registration(email: &str, gender: &str) -> Value {
    json!({
        "email": email,
        "password": "secret-pass",
        "first_name": "Test",
        "last_name": "User",
        "phone_number": "+14155550100",
        "gender": gender,
    })
}

#[actix_web::test]
async fn test_health_endpoint() {
    let app = test_app!(Arc::new(MemoryStore::new()));

    let req = test::TestRequest::get().uri("/health").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;

    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], "matrimony");
}

#[actix_web::test]
async fn test_register_then_duplicate_email() {
    let app = test_app!(Arc::new(MemoryStore::new()));

    let req = test::TestRequest::post()
        .uri("/api/profiles/register")
        .set_json(registration("a@x.com", "Female"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);

    let body: Value = test::read_body_json(resp).await;
    assert!(!body["token"].as_str().unwrap().is_empty());
    assert_eq!(body["user"]["email"], "a@x.com");
    assert_eq!(body["user"]["username"], "a@x.com");
    assert_eq!(body["user"]["gender"], "Female");
    assert_eq!(body["user"]["family_type"], Value::Null);
    assert_eq!(body["user"]["interests"], json!([]));

    let req = test::TestRequest::post()
        .uri("/api/profiles/register")
        .set_json(registration("a@x.com", "Male"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["message"], "Email already exists");
    assert_eq!(body["error"], "validation_failed");
}

#[actix_web::test]
async fn test_register_reports_missing_fields_and_bad_gender() {
    let app = test_app!(Arc::new(MemoryStore::new()));

    let req = test::TestRequest::post()
        .uri("/api/profiles/register")
        .set_json(json!({ "email": "a@x.com", "password": "secret-pass", "first_name": "A", "last_name": "B" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["message"], "Missing required fields: phone_number, gender");

    let req = test::TestRequest::post()
        .uri("/api/profiles/register")
        .set_json(registration("a@x.com", "Other"))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["message"], r#"Gender must be either "Male" or "Female""#);
}

#[actix_web::test]
async fn test_toggle_unknown_profile_is_not_found() {
    let app = test_app!(Arc::new(MemoryStore::new()));
    let (token, _) = register!(&app, "a@x.com", "Female");

    let req = test::TestRequest::post()
        .uri("/api/profiles/toggle_interest")
        .insert_header(("Authorization", format!("Token {}", token)))
        .set_json(json!({ "profile_id": 999 }))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn test_toggle_and_my_interests() {
    let app = test_app!(Arc::new(MemoryStore::new()));
    let (token, _) = register!(&app, "a@x.com", "Female");
    let (_, target) = register!(&app, "b@x.com", "Male");

    let req = test::TestRequest::get()
        .uri("/api/profiles/my_interests")
        .insert_header(("Authorization", format!("Bearer {}", token)))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["count"], 0);
    assert_eq!(body["results"], json!([]));
    assert_eq!(body["current_page"], 1);
    assert_eq!(body["total_pages"], 1);
    assert_eq!(body["next"], Value::Null);
    assert_eq!(body["previous"], Value::Null);

    let req = test::TestRequest::post()
        .uri("/api/profiles/toggle_interest")
        .insert_header(("Authorization", format!("Token {}", token)))
        .set_json(json!({ "profile_id": target }))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["is_interested"], true);
    assert_eq!(body["message"], "Interest expressed");

    let req = test::TestRequest::get()
        .uri("/api/profiles/my_interests")
        .insert_header(("Authorization", format!("Token {}", token)))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["count"], 1);
    assert_eq!(body["results"][0]["user"], target);
}

#[actix_web::test]
async fn test_toggle_target_id_forms() {
    let app = test_app!(Arc::new(MemoryStore::new()));
    let (token, _) = register!(&app, "a@x.com", "Female");
    let (_, target) = register!(&app, "b@x.com", "Male");

    let req = test::TestRequest::post()
        .uri("/api/profiles/toggle_interest")
        .insert_header(("Authorization", format!("Token {}", token)))
        .set_json(json!({ "profile_id": 0 }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["message"], "profile_id is required");

    let req = test::TestRequest::post()
        .uri("/api/profiles/toggle_interest")
        .insert_header(("Authorization", format!("Token {}", token)))
        .set_json(json!({ "profile_id": target.to_string() }))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["is_interested"], true);
}

#[actix_web::test]
async fn test_toggle_self_is_rejected() {
    let app = test_app!(Arc::new(MemoryStore::new()));
    let (token, id) = register!(&app, "a@x.com", "Female");

    let req = test::TestRequest::post()
        .uri("/api/profiles/toggle_interest")
        .insert_header(("Authorization", format!("Token {}", token)))
        .set_json(json!({ "profile_id": id }))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn test_listing_hides_same_gender() {
    let app = test_app!(Arc::new(MemoryStore::new()));
    let (token, _) = register!(&app, "a@x.com", "Female");
    register!(&app, "b@x.com", "Female");
    let (_, male) = register!(&app, "c@x.com", "Male");

    let req = test::TestRequest::get()
        .uri("/api/profiles")
        .insert_header(("Authorization", format!("Token {}", token)))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;

    assert_eq!(body["count"], 1);
    assert_eq!(body["results"][0]["user"], male);
}

#[actix_web::test]
async fn test_listing_page_past_end_is_not_found() {
    let app = test_app!(Arc::new(MemoryStore::new()));
    let (token, _) = register!(&app, "a@x.com", "Female");

    let req = test::TestRequest::get()
        .uri("/api/profiles?page=3")
        .insert_header(("Authorization", format!("Token {}", token)))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["message"], "Invalid page.");
}

#[actix_web::test]
async fn test_huge_page_number_is_not_found() {
    let app = test_app!(Arc::new(MemoryStore::new()));
    let (token, _) = register!(&app, "a@x.com", "Female");

    for uri in [
        "/api/profiles?page=1000000000000000000",
        "/api/profiles/my_interests?page=1000000000000000000&page_size=100",
        "/api/profiles?page=18446744073709551615",
    ] {
        let req = test::TestRequest::get()
            .uri(uri)
            .insert_header(("Authorization", format!("Token {}", token)))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND, "{}", uri);

        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["message"], "Invalid page.");
    }
}

#[actix_web::test]
async fn test_requests_without_token_are_unauthorized() {
    let app = test_app!(Arc::new(MemoryStore::new()));

    let req = test::TestRequest::get().uri("/api/profiles/me").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let req = test::TestRequest::get()
        .uri("/api/profiles/me")
        .insert_header(("Authorization", "Token not-a-jwt"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn test_update_me_email_collision() {
    let app = test_app!(Arc::new(MemoryStore::new()));
    let (token, _) = register!(&app, "a@x.com", "Female");
    register!(&app, "b@x.com", "Male");

    let req = test::TestRequest::patch()
        .uri("/api/profiles/update_me")
        .insert_header(("Authorization", format!("Token {}", token)))
        .set_json(json!({ "email": "b@x.com", "city": "Boston" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let req = test::TestRequest::get()
        .uri("/api/profiles/me")
        .insert_header(("Authorization", format!("Token {}", token)))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["email"], "a@x.com");
    assert_eq!(body["city"], "");
}

#[actix_web::test]
async fn test_update_me_partial() {
    let app = test_app!(Arc::new(MemoryStore::new()));
    let (token, _) = register!(&app, "a@x.com", "Female");

    let req = test::TestRequest::patch()
        .uri("/api/profiles/update_me")
        .insert_header(("Authorization", format!("Token {}", token)))
        .set_json(json!({ "first_name": "Ann", "city": "Boston", "height": 165.456 }))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;

    assert_eq!(body["first_name"], "Ann");
    assert_eq!(body["city"], "Boston");
    assert_eq!(body["height"], 165.46);
    assert_eq!(body["gender"], "Female");
}

#[actix_web::test]
async fn test_login_and_password_change_revokes_old_token() {
    let app = test_app!(Arc::new(MemoryStore::new()));
    register!(&app, "a@x.com", "Female");

    let req = test::TestRequest::post()
        .uri("/api/auth/login")
        .set_json(json!({ "email": "a@x.com", "password": "wrong-pass" }))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["message"], "Unable to log in with provided credentials.");

    let req = test::TestRequest::post()
        .uri("/api/auth/login")
        .set_json(json!({ "username": "a@x.com", "password": "secret-pass" }))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    let old_token = body["token"].as_str().unwrap().to_string();
    assert_eq!(body["user"]["email"], "a@x.com");

    let req = test::TestRequest::put()
        .uri("/api/auth/password/change")
        .insert_header(("Authorization", format!("Token {}", old_token)))
        .set_json(json!({ "old_password": "secret-pass", "new_password": "another-pass" }))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    let new_token = body["token"].as_str().unwrap().to_string();

    let req = test::TestRequest::get()
        .uri("/api/auth/profile")
        .insert_header(("Authorization", format!("Token {}", old_token)))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let req = test::TestRequest::get()
        .uri("/api/auth/profile")
        .insert_header(("Authorization", format!("Token {}", new_token)))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
}

#[actix_web::test]
async fn test_logout_always_succeeds() {
    let app = test_app!(Arc::new(MemoryStore::new()));

    let req = test::TestRequest::post().uri("/api/auth/logout").to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
}

#[actix_web::test]
async fn test_admin_routes_require_staff() {
    let store = Arc::new(MemoryStore::new());
    let app = test_app!(store.clone());
    let (token, id) = register!(&app, "a@x.com", "Female");

    let req = test::TestRequest::get()
        .uri("/api/users")
        .insert_header(("Authorization", format!("Token {}", token)))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    store
        .update_account(
            id,
            &AccountChanges {
                is_staff: Some(true),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let req = test::TestRequest::get()
        .uri("/api/users")
        .insert_header(("Authorization", format!("Token {}", token)))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["count"], 1);
    assert_eq!(body["results"][0]["is_staff"], true);
}

#[actix_web::test]
async fn test_admin_group_membership() {
    let store = Arc::new(MemoryStore::new());
    let app = test_app!(store.clone());
    let (token, id) = register!(&app, "admin@x.com", "Male");
    store
        .update_account(
            id,
            &AccountChanges {
                is_staff: Some(true),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let auth = ("Authorization", format!("Token {}", token));

    let req = test::TestRequest::post()
        .uri("/api/groups")
        .insert_header(auth.clone())
        .set_json(json!({ "name": "moderators" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let group: Value = test::read_body_json(resp).await;
    let group_id = group["id"].as_i64().unwrap();

    let req = test::TestRequest::post()
        .uri(&format!("/api/users/{}/add-groups", id))
        .insert_header(auth.clone())
        .set_json(json!({ "group_ids": [group_id, 4242] }))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["message"], "Groups with IDs [4242] do not exist.");

    let req = test::TestRequest::post()
        .uri(&format!("/api/users/{}/add-groups", id))
        .insert_header(auth.clone())
        .set_json(json!({ "group_ids": [group_id] }))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["message"], "Successfully added 1 group(s) to user.");
    assert_eq!(body["user"]["groups"][0]["name"], "moderators");

    let req = test::TestRequest::post()
        .uri(&format!("/api/users/{}/remove-groups", id))
        .insert_header(auth)
        .set_json(json!({ "group_ids": [group_id] }))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["message"], "Successfully removed 1 group(s) from user.");
    assert_eq!(body["user"]["groups"], json!([]));
}
