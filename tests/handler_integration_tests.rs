mod common;

use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header},
};
use common::{
    InMemoryRepository, PAGE_SIZE, StubAuthProvider, body_json, landmark, test_state, token_for,
    user,
};
use landmark_share::{
    MockStorageService,
    create_router,
    error::{AuthErrorCode, ErrorBody},
    models::{
        GeneralMapView, Landmark, LandmarkDetailView, LandmarkPage, RankedLandmark,
        SessionResponse, UserProfile,
    },
    store::StoreRegistry,
};
use serde_json::{Value, json};
use std::{sync::Arc, time::Duration};
use tower::ServiceExt;
use uuid::Uuid;

const ALICE: Uuid = Uuid::from_u128(100);
const BOB: Uuid = Uuid::from_u128(200);
const BOUNDARY: &str = "landmark-boundary";

// --- Test Utilities ---

struct TestApp {
    router: Router,
    repo: Arc<InMemoryRepository>,
    storage: MockStorageService,
    auth: Arc<StubAuthProvider>,
}

fn spawn_app(repo: InMemoryRepository, auth: StubAuthProvider) -> TestApp {
    let repo = Arc::new(repo);
    let storage = MockStorageService::new();
    let auth = Arc::new(auth);
    let router = create_router(test_state(repo.clone(), storage.clone(), auth.clone()));
    TestApp {
        router,
        repo,
        storage,
        auth,
    }
}

fn alice_app(repo: InMemoryRepository) -> TestApp {
    spawn_app(
        repo.with_user(user(ALICE, "alice@example.com")),
        StubAuthProvider::accepting(ALICE, "alice@example.com"),
    )
}

fn json_request(method: Method, uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn get(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::empty()).unwrap()
}

/// Multipart body with text fields followed by files, in the given order.
fn multipart_body(fields: &[(&str, &str)], photos: &[&str]) -> Body {
    let mut body = String::new();
    for (name, value) in fields {
        body.push_str(&format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
        ));
    }
    for filename in photos {
        body.push_str(&format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"photos\"; filename=\"{filename}\"\r\nContent-Type: image/jpeg\r\n\r\nJPEGDATA\r\n"
        ));
    }
    body.push_str(&format!("--{BOUNDARY}--\r\n"));
    Body::from(body)
}

fn multipart_request(token: &str, body: Body) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri("/landmarks")
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(body)
        .unwrap()
}

// --- Registration & Sign-in ---

#[tokio::test]
async fn test_register_creates_profile_and_sets_session_cookie() {
    let app = spawn_app(
        InMemoryRepository::new(),
        StubAuthProvider::accepting(ALICE, "alice@example.com"),
    );

    let response = app
        .router
        .oneshot(json_request(
            Method::POST,
            "/register",
            None,
            json!({ "email": "alice@example.com", "password": "hunter22", "displayName": "Alice" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let cookie = response.headers()[header::SET_COOKIE].to_str().unwrap().to_string();
    assert!(cookie.starts_with("session="));
    assert!(cookie.contains("HttpOnly"));

    let body: SessionResponse = body_json(response).await;
    assert_eq!(body.user.id, ALICE);
    assert_eq!(body.user.role, "user");
    assert_eq!(body.user.display_name.as_deref(), Some("Alice"));
    assert!(body.access_token.is_some());

    let stored = app.repo.stored_user(ALICE).expect("profile should be stored");
    assert_eq!(stored.role.as_deref(), Some("user"));
}

#[tokio::test]
async fn test_register_error_is_localized_from_cookie() {
    let app = spawn_app(
        InMemoryRepository::new(),
        StubAuthProvider::rejecting(AuthErrorCode::EmailAlreadyInUse),
    );

    let mut request = json_request(
        Method::POST,
        "/register",
        None,
        json!({ "email": "alice@example.com", "password": "hunter22", "displayName": "" }),
    );
    request
        .headers_mut()
        .insert(header::COOKIE, "locale=ru".parse().unwrap());

    let response = app.router.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body: ErrorBody = body_json(response).await;
    assert_eq!(body.error, "auth/email-already-in-use");
    assert_eq!(body.message, "Этот email уже зарегистрирован.");
    assert!(app.repo.stored_user(ALICE).is_none());
}

#[tokio::test]
async fn test_sign_in_wrong_password_uses_accept_language() {
    let app = spawn_app(
        InMemoryRepository::new(),
        StubAuthProvider::rejecting(AuthErrorCode::WrongPassword),
    );

    let mut request = json_request(
        Method::POST,
        "/signin",
        None,
        json!({ "email": "alice@example.com", "password": "nope" }),
    );
    request
        .headers_mut()
        .insert(header::ACCEPT_LANGUAGE, "ru-RU,ru;q=0.9,en;q=0.8".parse().unwrap());

    let response = app.router.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body: ErrorBody = body_json(response).await;
    assert_eq!(body.error, "auth/wrong-password");
    assert_eq!(body.message, "Неверный пароль.");
}

#[tokio::test]
async fn test_sign_in_unknown_provider_error_gets_generic_message() {
    let app = spawn_app(
        InMemoryRepository::new(),
        StubAuthProvider::rejecting(AuthErrorCode::Unknown),
    );

    let response = app
        .router
        .oneshot(json_request(
            Method::POST,
            "/signin",
            None,
            json!({ "email": "alice@example.com", "password": "x" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: ErrorBody = body_json(response).await;
    assert_eq!(body.message, "An error occurred. Please try again.");
}

#[tokio::test]
async fn test_sign_in_without_profile_is_user_not_found() {
    let app = spawn_app(
        InMemoryRepository::new(),
        StubAuthProvider::accepting(ALICE, "alice@example.com"),
    );

    let response = app
        .router
        .oneshot(json_request(
            Method::POST,
            "/signin",
            None,
            json!({ "email": "alice@example.com", "password": "hunter22" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body: ErrorBody = body_json(response).await;
    assert_eq!(body.error, "auth/user-not-found");
}

#[tokio::test]
async fn test_sign_in_returns_profile() {
    let app = alice_app(InMemoryRepository::new());

    let response = app
        .router
        .oneshot(json_request(
            Method::POST,
            "/signin",
            None,
            json!({ "email": "alice@example.com", "password": "hunter22" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key(header::SET_COOKIE));
    let body: SessionResponse = body_json(response).await;
    assert_eq!(body.user.email, "alice@example.com");
}

#[tokio::test]
async fn test_sign_out_revokes_token_and_clears_cookie() {
    let app = alice_app(InMemoryRepository::new());
    let token = token_for(ALICE);

    let response = app
        .router
        .oneshot(json_request(Method::POST, "/signout", Some(&token), json!({})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    let cookie = response.headers()[header::SET_COOKIE].to_str().unwrap();
    assert!(cookie.contains("Max-Age=0"));
    assert_eq!(app.auth.revoked_tokens(), vec![token]);
}

// --- Authenticated API ---

#[tokio::test]
async fn test_authenticated_routes_reject_anonymous_callers() {
    let app = alice_app(InMemoryRepository::new());

    for uri in ["/me", "/landmarks", "/landmarks/top"] {
        let response = app.router.clone().oneshot(get(uri, None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{uri}");
        let body: ErrorBody = body_json(response).await;
        assert_eq!(body.error, "not-authenticated");
        assert_eq!(body.message, "User not authenticated");
    }
}

#[tokio::test]
async fn test_get_me_returns_profile() {
    let app = alice_app(InMemoryRepository::new());

    let response = app
        .router
        .oneshot(get("/me", Some(&token_for(ALICE))))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let profile: UserProfile = body_json(response).await;
    assert_eq!(profile.id, ALICE);
    assert_eq!(profile.role, "user");
}

#[tokio::test]
async fn test_list_landmarks_pages_with_cursor() {
    let seeded: Vec<Landmark> = (0..4).map(|i| landmark(BOB, i, &[(BOB, 4)])).collect();
    let app = alice_app(InMemoryRepository::new().with_landmarks(seeded.clone()));
    let token = token_for(ALICE);

    let response = app
        .router
        .clone()
        .oneshot(get("/landmarks", Some(&token)))
        .await
        .unwrap();
    let first: LandmarkPage = body_json(response).await;
    assert_eq!(first.items.len() as i64, PAGE_SIZE);
    assert!(first.has_more);

    let cursor = first.next_cursor.unwrap();
    let response = app
        .router
        .clone()
        .oneshot(get(&format!("/landmarks?cursor={cursor}"), Some(&token)))
        .await
        .unwrap();
    let second: LandmarkPage = body_json(response).await;
    assert_eq!(second.items.len(), 1);
    assert!(!second.has_more);
    assert_eq!(second.items[0].id, seeded[3].id);

    let response = app
        .router
        .oneshot(get("/landmarks?mine=true", Some(&token)))
        .await
        .unwrap();
    let mine: LandmarkPage = body_json(response).await;
    assert!(mine.items.is_empty());
    assert!(!mine.has_more);
}

#[tokio::test]
async fn test_top_landmarks_are_ranked() {
    let weak = landmark(BOB, 1, &[(BOB, 2)]);
    let strong = landmark(BOB, 2, &[(BOB, 5), (ALICE, 5)]);
    let app = alice_app(InMemoryRepository::new().with_landmarks(vec![weak.clone(), strong.clone()]));

    let response = app
        .router
        .oneshot(get("/landmarks/top", Some(&token_for(ALICE))))
        .await
        .unwrap();

    let top: Vec<RankedLandmark> = body_json(response).await;
    assert_eq!(top.len(), 2);
    assert_eq!(top[0].landmark.id, strong.id);
    assert!(top[0].score > top[1].score);
}

#[tokio::test]
async fn test_top_landmarks_rank_only_newest_page() {
    let mut seeded: Vec<Landmark> = (1..=3).map(|i| landmark(BOB, i, &[(BOB, 1)])).collect();
    let oldest_best = landmark(BOB, 60, &[(BOB, 5), (ALICE, 5)]);
    seeded.push(oldest_best.clone());
    let app = alice_app(InMemoryRepository::new().with_landmarks(seeded));

    let response = app
        .router
        .clone()
        .oneshot(get("/landmarks/top", Some(&token_for(ALICE))))
        .await
        .unwrap();
    let top: Vec<RankedLandmark> = body_json(response).await;
    assert_eq!(top.len() as i64, PAGE_SIZE);
    assert!(top.iter().all(|r| r.landmark.id != oldest_best.id));

    // Once the map has loaded the older page, its top list includes it.
    let token = token_for(ALICE);
    load_map(&app.router, "/generalmap", &token).await;
    let map = load_map(&app.router, "/generalmap/more", &token).await;
    assert_eq!(map.top[0].landmark.id, oldest_best.id);

    let response = app
        .router
        .oneshot(get("/api-docs/openapi.json", None))
        .await
        .unwrap();
    let doc: Value = body_json(response).await;
    let description = doc["paths"]["/landmarks/top"]["get"]["description"]
        .as_str()
        .unwrap();
    assert!(description.contains("newest page"));
}

#[tokio::test]
async fn test_get_landmark_not_found() {
    let app = alice_app(InMemoryRepository::new());

    let response = app
        .router
        .oneshot(get(&format!("/landmarks/{}", Uuid::new_v4()), Some(&token_for(ALICE))))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body: ErrorBody = body_json(response).await;
    assert_eq!(body.error, "landmark-not-found");
}

#[tokio::test]
async fn test_rate_landmark_merges_rating() {
    let raters: Vec<(Uuid, i32)> = (1..=5).map(|i| (Uuid::from_u128(i), 4)).collect();
    let existing = landmark(BOB, 1, &raters);
    let app = alice_app(InMemoryRepository::new().with_landmarks(vec![existing.clone()]));

    let response = app
        .router
        .oneshot(json_request(
            Method::POST,
            &format!("/landmarks/{}/rating", existing.id),
            Some(&token_for(ALICE)),
            json!({ "rating": 5 }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let updated: Landmark = body_json(response).await;
    assert_eq!(updated.average_rating, 4.17);
    assert_eq!(updated.visit_count, 6);
    assert_eq!(updated.user_ratings.get(&ALICE), Some(&5));
    assert_eq!(app.repo.stored_landmarks()[0], updated);
}

#[tokio::test]
async fn test_rate_landmark_rejects_out_of_range() {
    let existing = landmark(BOB, 1, &[(BOB, 3)]);
    let app = alice_app(InMemoryRepository::new().with_landmarks(vec![existing.clone()]));

    let response = app
        .router
        .oneshot(json_request(
            Method::POST,
            &format!("/landmarks/{}/rating", existing.id),
            Some(&token_for(ALICE)),
            json!({ "rating": 9 }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: ErrorBody = body_json(response).await;
    assert_eq!(body.error, "invalid-rating");
    assert_eq!(app.repo.stored_landmarks()[0], existing);
}

#[tokio::test]
async fn test_create_landmark_from_multipart() {
    let app = alice_app(InMemoryRepository::new());
    let body = multipart_body(
        &[
            ("name", "Victory Square"),
            ("description", "Obelisk"),
            ("latitude", "53.9086"),
            ("longitude", "27.5751"),
            ("userRating", "4"),
        ],
        &["first.jpg", "second.jpg"],
    );

    let response = app
        .router
        .oneshot(multipart_request(&token_for(ALICE), body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    let created: Landmark = body_json(response).await;
    assert_eq!(created.name, "Victory Square");
    assert_eq!(created.created_by, ALICE);
    assert_eq!(created.visit_count, 1);
    assert_eq!(created.photos.len(), 2);

    let keys = app.storage.uploaded_keys();
    assert!(keys[0].ends_with("_first.jpg"));
    assert!(keys[1].ends_with("_second.jpg"));
    assert_eq!(app.repo.stored_landmarks().len(), 1);
}

#[tokio::test]
async fn test_create_landmark_missing_field_is_malformed() {
    let app = alice_app(InMemoryRepository::new());
    let body = multipart_body(&[("name", "No coordinates"), ("userRating", "4")], &[]);

    let response = app
        .router
        .oneshot(multipart_request(&token_for(ALICE), body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: ErrorBody = body_json(response).await;
    assert_eq!(body.error, "malformed-payload");
    assert!(app.storage.uploaded_keys().is_empty());
}

// --- Map Freshness ---

fn landmark_fields(name: &str) -> Vec<(&str, &str)> {
    vec![
        ("name", name),
        ("description", "Somewhere new"),
        ("latitude", "53.9"),
        ("longitude", "27.5"),
        ("userRating", "5"),
    ]
}

fn two_user_app(landmarks: Vec<Landmark>) -> TestApp {
    alice_app(
        InMemoryRepository::new()
            .with_user(user(BOB, "bob@example.com"))
            .with_landmarks(landmarks),
    )
}

async fn load_map(router: &Router, uri: &str, token: &str) -> GeneralMapView {
    let response = router.clone().oneshot(get(uri, Some(token))).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    body_json(response).await
}

#[tokio::test]
async fn test_map_reload_shows_other_users_changes() {
    let existing = landmark(ALICE, 1, &[(ALICE, 2)]);
    let app = two_user_app(vec![existing.clone()]);
    let alice = token_for(ALICE);
    let bob = token_for(BOB);

    let before = load_map(&app.router, "/generalmap", &alice).await;
    assert_eq!(before.landmarks.len(), 1);

    let response = app
        .router
        .clone()
        .oneshot(multipart_request(
            &bob,
            multipart_body(&landmark_fields("Bob's Bridge"), &[]),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let created: Landmark = body_json(response).await;

    let response = app
        .router
        .clone()
        .oneshot(json_request(
            Method::POST,
            &format!("/landmarks/{}/rating", existing.id),
            Some(&bob),
            json!({ "rating": 4 }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let after = load_map(&app.router, "/generalmap", &alice).await;
    assert_eq!(after.landmarks.len(), 2);
    assert_eq!(after.markers.len(), 2);
    assert!(after.landmarks.iter().any(|r| r.landmark.id == created.id));
    let rated = after
        .landmarks
        .iter()
        .find(|r| r.landmark.id == existing.id)
        .unwrap();
    assert_eq!(rated.landmark.visit_count, 2);
    assert_eq!(rated.landmark.average_rating, 3.0);

    let response = app
        .router
        .oneshot(get(&format!("/landmark/{}", existing.id), Some(&alice)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let detail: LandmarkDetailView = body_json(response).await;
    assert_eq!(detail.landmark.landmark.visit_count, 2);
    assert_eq!(detail.landmark.landmark.user_ratings.get(&BOB), Some(&4));
    assert_eq!(detail.my_rating, Some(2));
}

#[tokio::test]
async fn test_own_submission_appears_under_mine() {
    let app = two_user_app(vec![landmark(BOB, 1, &[(BOB, 3)])]);
    let alice = token_for(ALICE);

    let before = load_map(&app.router, "/generalmap?mine=true", &alice).await;
    assert!(before.mine);
    assert!(before.landmarks.is_empty());

    let response = app
        .router
        .clone()
        .oneshot(multipart_request(
            &alice,
            multipart_body(&landmark_fields("Alice's Arch"), &[]),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let created: Landmark = body_json(response).await;

    let after = load_map(&app.router, "/generalmap?mine=true", &alice).await;
    assert!(after.mine);
    let ids: Vec<Uuid> = after.landmarks.iter().map(|r| r.landmark.id).collect();
    assert_eq!(ids, vec![created.id]);
    assert_eq!(after.top[0].landmark.id, created.id);
}

#[tokio::test]
async fn test_idle_map_state_is_dropped() {
    let repo = Arc::new(
        InMemoryRepository::new()
            .with_user(user(ALICE, "alice@example.com"))
            .with_landmarks(vec![landmark(ALICE, 1, &[])]),
    );
    let mut state = test_state(
        repo,
        MockStorageService::new(),
        Arc::new(StubAuthProvider::accepting(ALICE, "alice@example.com")),
    );
    state.stores = StoreRegistry::new(Duration::from_millis(20));
    let stores = state.stores.clone();
    let router = create_router(state);

    load_map(&router, "/generalmap", &token_for(ALICE)).await;
    assert!(stores.existing(ALICE).await.is_some());

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(stores.is_empty().await);

    // The next visit rebuilds the map from scratch.
    let again = load_map(&router, "/generalmap", &token_for(ALICE)).await;
    assert_eq!(again.landmarks.len(), 1);
}

// --- Locale ---

#[tokio::test]
async fn test_locale_round_trip() {
    let app = alice_app(InMemoryRepository::new());

    let response = app
        .router
        .clone()
        .oneshot(json_request(Method::PUT, "/locale", None, json!({ "locale": "be" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let cookie = response.headers()[header::SET_COOKIE]
        .to_str()
        .unwrap()
        .split(';')
        .next()
        .unwrap()
        .to_string();
    assert_eq!(cookie, "locale=be");

    let response = app
        .router
        .oneshot(
            Request::builder()
                .uri("/locale")
                .header(header::COOKIE, cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let body: Value = body_json(response).await;
    assert_eq!(body["current"], "be");
    assert_eq!(body["supported"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_health_check() {
    let app = alice_app(InMemoryRepository::new());

    let response = app.router.oneshot(get("/health", None)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}
