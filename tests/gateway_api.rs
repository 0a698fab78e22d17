use axum::extract::Request;
use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum::middleware::{self, Next};
use axum::response::Response;
use chrono::Utc;
use lightweight_classroom_server::gateway::{GatewayState, gateway_routes};
use lightweight_classroom_server::model::{
    NewEnrollment, NewQuizResult, NewUser, QuizResult, QuizResultFilter, QuizResultPatch, Role,
    User, UserFilter,
};
use lightweight_classroom_server::store::remote::{Created, Failure, Updated};
use lightweight_classroom_server::store::{RemoteStore, Storage, StorageErrorKind};
use std::time::Duration;

mod helpers;
use helpers::{
    STORAGE_TIMEOUT, TEST_SECRET, TestServer, create_local_store, create_test_course,
    create_test_user, spawn_server,
};

fn secret_header() -> HeaderName {
    HeaderName::from_static("x-api-secret")
}

async fn setup_gateway() -> (TestServer, tempfile::TempDir) {
    let (store, db_dir) = create_local_store().await;
    let server = TestServer::new(gateway_routes(GatewayState::new(store, TEST_SECRET)))
        .expect("Failed to create TestServer");
    (server, db_dir)
}

fn new_user(clerk_id: &str) -> NewUser {
    NewUser {
        clerk_id: clerk_id.to_string(),
        role: Role::Student,
        email: format!("{}@test.com", clerk_id),
        name: None,
    }
}

// shared secret

#[tokio::test]
async fn test_gateway_rejects_missing_secret() {
    let (server, _db_dir) = setup_gateway().await;

    let response = server.get("/users").await;

    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
    let body: Failure = response.json();
    assert!(!body.success);
    assert_eq!(body.error, "unauthorized");
}

#[tokio::test]
async fn test_gateway_rejects_wrong_secret_uniformly() {
    let (server, _db_dir) = setup_gateway().await;

    for path in ["/users", "/quiz-results", "/courseblocks"] {
        let response = server
            .get(path)
            .add_header(secret_header(), HeaderValue::from_static("guess"))
            .await;

        assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(response.json::<Failure>().error, "unauthorized");
    }
}

// wire contract

#[tokio::test]
async fn test_gateway_create_and_filter() {
    let (server, _db_dir) = setup_gateway().await;

    let response = server
        .post("/users")
        .add_header(secret_header(), HeaderValue::from_static(TEST_SECRET))
        .json(&new_user("student-1"))
        .await;
    assert_eq!(response.status_code(), StatusCode::CREATED);
    let created: Created<User> = response.json();
    assert!(created.success);
    assert_eq!(created.id, "student-1");
    assert_eq!(created.record.role, Role::Student);

    server
        .post("/users")
        .add_header(secret_header(), HeaderValue::from_static(TEST_SECRET))
        .json(&new_user("student-2"))
        .await;

    let response = server
        .get("/users")
        .add_header(secret_header(), HeaderValue::from_static(TEST_SECRET))
        .add_query_param("clerkId", "student-2")
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let users: Vec<User> = response.json();
    assert_eq!(users.len(), 1);
    assert_eq!(users[0].clerk_id, "student-2");
}

#[tokio::test]
async fn test_gateway_duplicate_create_conflicts() {
    let (server, _db_dir) = setup_gateway().await;
    for expected in [StatusCode::CREATED, StatusCode::CONFLICT] {
        let response = server
            .post("/users")
            .add_header(secret_header(), HeaderValue::from_static(TEST_SECRET))
            .json(&new_user("student-1"))
            .await;
        assert_eq!(response.status_code(), expected);
    }
}

#[tokio::test]
async fn test_gateway_attempt_with_stale_count_conflicts() {
    let (store, _db_dir) = create_local_store().await;
    let storage = Storage::local(store.clone());
    create_test_user(&storage, "teacher-1", Role::Teacher).await;
    let course = create_test_course(&storage, "teacher-1", "Gateway").await;
    let grant = storage
        .create::<QuizResult>(NewQuizResult {
            course_id: course.id,
            student_id: "student-1".to_string(),
            quiz_block_id: "quiz-1".to_string(),
            assigned_by: Some("teacher-1".to_string()),
            max_attempts: 2,
        })
        .await
        .unwrap();
    let server = TestServer::new(gateway_routes(GatewayState::new(store, TEST_SECRET)))
        .expect("Failed to create TestServer");

    let attempt = |expected_attempts| QuizResultPatch::Attempt {
        expected_attempts,
        score: 0.75,
        answers: None,
        completed_at: Utc::now(),
    };

    let response = server
        .patch(&format!("/quiz-results/{}", grant.id))
        .add_header(secret_header(), HeaderValue::from_static(TEST_SECRET))
        .json(&attempt(0))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let updated: Updated<QuizResult> = response.json();
    assert_eq!(updated.record.attempts, 1);

    let stale = server
        .patch(&format!("/quiz-results/{}", grant.id))
        .add_header(secret_header(), HeaderValue::from_static(TEST_SECRET))
        .json(&attempt(0))
        .await;
    assert_eq!(stale.status_code(), StatusCode::CONFLICT);

    let missing = server
        .patch("/quiz-results/9999")
        .add_header(secret_header(), HeaderValue::from_static(TEST_SECRET))
        .json(&attempt(0))
        .await;
    assert_eq!(missing.status_code(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_gateway_enrollment_rejects_unknown_course() {
    let (server, _db_dir) = setup_gateway().await;

    let response = server
        .post("/enrollments")
        .add_header(secret_header(), HeaderValue::from_static(TEST_SECRET))
        .json(&NewEnrollment {
            course_id: 77,
            student_id: "student-1".to_string(),
        })
        .await;

    assert_eq!(response.status_code(), StatusCode::CONFLICT);
}

// remote client error mapping

async fn remote_storage(base_url: url::Url, secret: &str, timeout: Duration) -> Storage {
    let remote = RemoteStore::new(base_url, secret, timeout).expect("Failed to build remote store");
    Storage::remote(remote, timeout)
}

#[tokio::test]
async fn test_remote_store_maps_wire_errors() {
    let (store, _db_dir) = create_local_store().await;
    let base_url = spawn_server(gateway_routes(GatewayState::new(store, TEST_SECRET))).await;
    let storage = remote_storage(base_url.clone(), TEST_SECRET, STORAGE_TIMEOUT).await;

    storage.create::<User>(new_user("student-1")).await.unwrap();
    let duplicate = storage.create::<User>(new_user("student-1")).await.unwrap_err();
    assert_eq!(duplicate.kind, StorageErrorKind::Conflict);

    let missing = storage
        .delete::<User>("nobody".to_string())
        .await
        .unwrap_err();
    assert_eq!(missing.kind, StorageErrorKind::NotFound);

    let locked_out = remote_storage(base_url, "wrong-secret", STORAGE_TIMEOUT).await;
    let denied = locked_out
        .fetch::<User>(UserFilter::default())
        .await
        .unwrap_err();
    assert_eq!(denied.kind, StorageErrorKind::Unavailable);
}

async fn stall(request: Request, next: Next) -> Response {
    tokio::time::sleep(Duration::from_millis(500)).await;
    next.run(request).await
}

#[tokio::test]
async fn test_remote_store_times_out_as_unavailable() {
    let (store, _db_dir) = create_local_store().await;
    let gateway =
        gateway_routes(GatewayState::new(store, TEST_SECRET)).layer(middleware::from_fn(stall));
    let base_url = spawn_server(gateway).await;
    let storage = remote_storage(base_url, TEST_SECRET, Duration::from_millis(100)).await;

    let err = storage
        .fetch::<QuizResult>(QuizResultFilter::default())
        .await
        .unwrap_err();

    assert_eq!(err.kind, StorageErrorKind::Unavailable);
}

#[tokio::test]
async fn test_remote_store_unreachable_is_unavailable() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    let base_url = url::Url::parse(&format!("http://{}/", addr)).unwrap();
    let storage = remote_storage(base_url, TEST_SECRET, STORAGE_TIMEOUT).await;

    let err = storage
        .fetch::<User>(UserFilter::default())
        .await
        .unwrap_err();

    assert_eq!(err.kind, StorageErrorKind::Unavailable);
}
