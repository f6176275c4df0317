//! API tests driving the router in-process against the in-memory store

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde_json::{json, Value};
use tower::ServiceExt;

use biblio_server::{
    api,
    clock::Clock,
    config::AppConfig,
    repository::Repository,
    services::{tokens::InMemoryBlacklist, Services},
    AppState,
};

struct FixedClock(NaiveDate);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        Utc.from_utc_datetime(&self.0.and_hms_opt(12, 0, 0).unwrap())
    }
}

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, 10).unwrap()
}

struct TestApp {
    state: AppState,
}

impl TestApp {
    fn new() -> Self {
        let mut config = AppConfig::default();
        config.database.in_memory = true;
        config.auth.jwt_secret = "test-secret".to_string();

        let services = Services::new(
            Repository::in_memory(),
            &config,
            Arc::new(InMemoryBlacklist::default()),
            Arc::new(FixedClock(today())),
        );

        Self {
            state: AppState {
                config: Arc::new(config),
                services: Arc::new(services),
            },
        }
    }

    async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = api::app(self.state.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    async fn get(&self, uri: &str, token: &str) -> (StatusCode, Value) {
        self.request(Method::GET, uri, Some(token), None).await
    }

    async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        self.request(Method::POST, uri, token, Some(body)).await
    }

    /// Register a reader and return its access and refresh tokens
    async fn register(&self, username: &str, password: &str) -> (String, String) {
        let (status, body) = self
            .post(
                "/auth/register",
                None,
                json!({"username": username, "email": format!("{}@example.com", username), "password": password}),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
        (
            body["access"].as_str().unwrap().to_string(),
            body["refresh"].as_str().unwrap().to_string(),
        )
    }

    /// Create a superuser out of band and log in through the API
    async fn staff_token(&self) -> String {
        self.state
            .services
            .auth
            .create_superuser("admin".to_string(), None, "adminpwd")
            .await
            .unwrap();
        let (status, body) = self
            .post("/auth/login", None, json!({"username": "admin", "password": "adminpwd"}))
            .await;
        assert_eq!(status, StatusCode::OK);
        body["access"].as_str().unwrap().to_string()
    }

    async fn create_book(&self, token: &str, title: &str) -> i64 {
        let (status, body) = self
            .post(
                "/library/livres",
                Some(token),
                json!({"titre": title, "auteur": "Victor Hugo", "date_publication": "1862-04-03"}),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
        body["id"].as_i64().unwrap()
    }

    async fn borrow(&self, token: &str, book_id: i64) -> (StatusCode, Value) {
        self.post(
            "/library/emprunts",
            Some(token),
            json!({"livre_id": book_id, "date_retour_prevue": "2024-03-24"}),
        )
        .await
    }
}

#[tokio::test]
async fn test_health_check() {
    let app = TestApp::new();
    let (status, body) = app.request(Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");

    let (status, body) = app.request(Method::GET, "/ready", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["backend"], "memory");
}

#[tokio::test]
async fn test_register_and_login() {
    let app = TestApp::new();
    let (access, _) = app.register("alice", "pwd123").await;

    let (status, body) = app.get("/auth/me", &access).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["username"], "alice");
    assert!(body.get("password").is_none());

    let (status, body) = app
        .post("/auth/login", None, json!({"username": "alice", "password": "pwd123"}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["access"].is_string());
    assert!(body["refresh"].is_string());

    let (status, _) = app
        .post("/auth/login", None, json!({"username": "alice", "password": "wrongpwd"}))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_register_rejects_duplicates_and_bad_input() {
    let app = TestApp::new();
    app.register("alice", "pwd123").await;

    let (status, _) = app
        .post("/auth/register", None, json!({"username": "alice", "password": "pwd123"}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app
        .post(
            "/auth/register",
            None,
            json!({"username": "bob", "password": "pwd123", "password2": "pwd124"}),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Les mots de passe ne correspondent pas.");

    let (status, _) = app
        .request(Method::POST, "/auth/register", None, Some(json!({"username": "carol"})))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_change_password() {
    let app = TestApp::new();
    let (access, _) = app.register("alice", "pwd123").await;

    let (status, body) = app
        .post(
            "/auth/change-password",
            Some(&access),
            json!({"old_password": "nope", "new_password": "newpwd"}),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Ancien mot de passe incorrect.");

    // no length rule gets in front of the old password check
    let (status, body) = app
        .post(
            "/auth/change-password",
            Some(&access),
            json!({"old_password": "nope", "new_password": "abc"}),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Ancien mot de passe incorrect.");

    let (status, body) = app
        .post(
            "/auth/change-password",
            Some(&access),
            json!({"old_password": "pwd123", "new_password": ""}),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["message"],
        "Veuillez fournir l'ancien et le nouveau mot de passe."
    );

    let (status, body) = app
        .post(
            "/auth/change-password",
            Some(&access),
            json!({"old_password": "pwd123", "new_password": "newpwd"}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["detail"], "Mot de passe mis à jour avec succès.");

    let (status, _) = app
        .post("/auth/login", None, json!({"username": "alice", "password": "newpwd"}))
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_update_profile() {
    let app = TestApp::new();
    let (access, _) = app.register("alice", "pwd123").await;
    app.register("bob", "pwd123").await;

    let (status, body) = app
        .request(
            Method::PUT,
            "/auth/me",
            Some(&access),
            Some(json!({"first_name": "Alice", "last_name": "Liddell"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["first_name"], "Alice");
    assert_eq!(body["username"], "alice");

    let (status, _) = app
        .request(Method::PUT, "/auth/me", Some(&access), Some(json!({"username": "bob"})))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_logout_revokes_refresh_token() {
    let app = TestApp::new();
    let (access, refresh) = app.register("alice", "pwd123").await;

    let (status, body) = app.post("/auth/refresh", None, json!({"refresh": refresh})).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["access"].is_string());

    let (status, _) = app
        .post("/auth/logout", Some(&access), json!({"refresh": refresh}))
        .await;
    assert_eq!(status, StatusCode::RESET_CONTENT);

    let (status, _) = app.post("/auth/refresh", None, json!({"refresh": refresh})).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .post("/auth/logout", Some(&access), json!({"refresh": refresh}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_missing_or_invalid_token_is_rejected() {
    let app = TestApp::new();

    let (status, body) = app.request(Method::GET, "/library/livres", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "NotAuthorized");

    let (status, _) = app.get("/library/livres", "not-a-jwt").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // a refresh token is not an access token
    let (_, refresh) = app.register("alice", "pwd123").await;
    let (status, _) = app.get("/library/livres", &refresh).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_staff_see_unavailable_books() {
    let app = TestApp::new();
    let staff = app.staff_token().await;
    let (reader, _) = app.register("alice", "pwd123").await;

    let borrowed = app.create_book(&staff, "Les Misérables").await;
    app.create_book(&staff, "Notre-Dame de Paris").await;

    let (status, _) = app.borrow(&reader, borrowed).await;
    assert_eq!(status, StatusCode::CREATED);

    let (_, staff_list) = app.get("/library/livres", &staff).await;
    assert_eq!(staff_list.as_array().unwrap().len(), 2);

    let (_, reader_list) = app.get("/library/livres", &reader).await;
    let reader_list = reader_list.as_array().unwrap();
    assert_eq!(reader_list.len(), 1);
    assert_eq!(reader_list[0]["titre"], "Notre-Dame de Paris");

    // direct lookup still works for the borrowed book
    let (status, body) = app.get(&format!("/library/livres/{}", borrowed), &reader).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["disponible"], false);
    assert_eq!(body["emprunte_par"], "alice");
}

#[tokio::test]
async fn test_book_crud() {
    let app = TestApp::new();
    let (reader, _) = app.register("alice", "pwd123").await;
    let id = app.create_book(&reader, "Candide").await;

    let (status, _) = app
        .post(
            "/library/livres",
            Some(&reader),
            json!({"titre": "Candide", "auteur": "Voltaire", "date_publication": "1759-01-15"}),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app
        .request(
            Method::PUT,
            &format!("/library/livres/{}", id),
            Some(&reader),
            Some(json!({"titre": "Zadig", "auteur": "Voltaire", "date_publication": "1747-01-01"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["titre"], "Zadig");
    assert_eq!(body["disponible"], true);

    let (status, _) = app
        .request(Method::DELETE, &format!("/library/livres/{}", id), Some(&reader), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = app.get(&format!("/library/livres/{}", id), &reader).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_loan_lifecycle() {
    let app = TestApp::new();
    let staff = app.staff_token().await;
    let (reader, _) = app.register("alice", "pwd123").await;
    let book = app.create_book(&staff, "Les Misérables").await;

    let (status, loan) = app.borrow(&reader, book).await;
    assert_eq!(status, StatusCode::CREATED, "{}", loan);
    assert_eq!(loan["date_emprunt"], "2024-03-10");
    assert_eq!(loan["utilisateur"]["username"], "alice");
    assert!(loan["date_retour"].is_null());
    let loan_id = loan["id"].as_i64().unwrap();

    let (_, body) = app.get(&format!("/library/livres/{}", book), &staff).await;
    assert_eq!(body["disponible"], false);

    // the book cannot be borrowed twice
    let (status, _) = app.borrow(&staff, book).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app
        .post(&format!("/library/emprunts/{}/rendre", loan_id), Some(&reader), json!({}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["detail"], "Livre rendu avec succès.");
    assert_eq!(body["emprunt"]["date_retour"], "2024-03-10");

    let (_, body) = app.get(&format!("/library/livres/{}", book), &staff).await;
    assert_eq!(body["disponible"], true);
    assert!(body["emprunte_par"].is_null());

    let (status, body) = app
        .post(&format!("/library/emprunts/{}/rendre", loan_id), Some(&reader), json!({}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Ce livre a déjà été rendu.");
}

#[tokio::test]
async fn test_loan_validation_errors() {
    let app = TestApp::new();
    let (reader, _) = app.register("alice", "pwd123").await;

    let (status, _) = app
        .post("/library/emprunts", Some(&reader), json!({"date_retour_prevue": "2024-03-24"}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app.borrow(&reader, 999).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_loans_are_private_to_their_owner() {
    let app = TestApp::new();
    let staff = app.staff_token().await;
    let (alice, _) = app.register("alice", "pwd123").await;
    let (bob, _) = app.register("bob", "pwd123").await;
    let book = app.create_book(&staff, "Les Misérables").await;

    let (_, loan) = app.borrow(&alice, book).await;
    let loan_id = loan["id"].as_i64().unwrap();

    let (_, bob_loans) = app.get("/library/emprunts", &bob).await;
    assert!(bob_loans.as_array().unwrap().is_empty());
    let (_, staff_loans) = app.get("/library/emprunts", &staff).await;
    assert_eq!(staff_loans.as_array().unwrap().len(), 1);

    let (status, _) = app.get(&format!("/library/emprunts/{}", loan_id), &bob).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = app
        .post(&format!("/library/emprunts/{}/rendre", loan_id), Some(&bob), json!({}))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "Emprunt non trouvé ou non autorisé.");

    let (_, body) = app.get(&format!("/library/livres/{}", book), &staff).await;
    assert_eq!(body["disponible"], false);
}

#[tokio::test]
async fn test_deleting_open_loan_releases_book() {
    let app = TestApp::new();
    let (reader, _) = app.register("alice", "pwd123").await;
    let book = app.create_book(&reader, "Candide").await;

    let (_, loan) = app.borrow(&reader, book).await;
    let loan_id = loan["id"].as_i64().unwrap();

    let (status, body) = app
        .request(
            Method::PUT,
            &format!("/library/emprunts/{}", loan_id),
            Some(&reader),
            Some(json!({"date_retour_prevue": "2024-04-01"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["date_retour_prevue"], "2024-04-01");

    let (status, _) = app
        .request(Method::DELETE, &format!("/library/emprunts/{}", loan_id), Some(&reader), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, body) = app.get(&format!("/library/livres/{}", book), &reader).await;
    assert_eq!(body["disponible"], true);
}

#[tokio::test]
async fn test_trailing_slash_is_accepted() {
    let app = TestApp::new();
    let (reader, _) = app.register("alice", "pwd123").await;
    app.create_book(&reader, "Candide").await;

    let (status, body) = app.get("/library/livres/", &reader).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_malformed_json_is_a_validation_error() {
    let app = TestApp::new();
    let request = Request::builder()
        .method(Method::POST)
        .uri("/auth/login")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();

    let response = api::app(app.state.clone()).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
