use axum::Router;
use axum::http::{HeaderName, HeaderValue};
pub(crate) use axum_test::TestServer;
use lightweight_classroom_server::gateway::{GatewayState, gateway_routes};
use lightweight_classroom_server::init_test_router;
use lightweight_classroom_server::model::{
    BlockKind, Course, NewCourse, NewCourseBlock, NewUser, Role, User,
};
use lightweight_classroom_server::store::{BackendKind, LocalStore, RemoteStore, Storage};
use serde_json::json;
use std::time::Duration;
use tempfile::TempDir;
use url::Url;

pub const TEST_SECRET: &str = "test-gateway-secret";
pub const STORAGE_TIMEOUT: Duration = Duration::from_secs(5);
pub const QUIZ_BLOCK_ID: &str = "quiz-1";

pub struct TestEnv {
    pub server: TestServer,
    pub storage: Storage,
    // dropping this deletes the database
    _db_dir: TempDir,
}

// test infra setup

pub async fn create_local_store() -> (LocalStore, TempDir) {
    create_local_store_with_timeout(STORAGE_TIMEOUT).await
}

pub async fn create_local_store_with_timeout(timeout: Duration) -> (LocalStore, TempDir) {
    let db_dir = TempDir::with_prefix("classroom-test").expect("Failed to create temp dir");
    let db_path = db_dir.path().join("classroom.db");
    let store = LocalStore::connect(db_path.to_str().expect("Non UTF-8 temp path"), 5, timeout)
        .expect("Failed to create test database pool");
    store.migrate().await.expect("Failed to apply test schema");
    (store, db_dir)
}

/// Serves `router` on an ephemeral port and returns its base URL.
pub async fn spawn_server(router: Router) -> Url {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test listener");
    let addr = listener.local_addr().expect("No local address");
    tokio::spawn(async move {
        axum::serve(listener, router.into_make_service())
            .await
            .expect("Test gateway failed");
    });
    Url::parse(&format!("http://{}/", addr)).expect("Invalid test URL")
}

pub async fn setup_local_environment() -> TestEnv {
    let (store, db_dir) = create_local_store().await;
    let storage = Storage::local(store);
    build_env(storage, db_dir)
}

pub async fn setup_remote_environment() -> TestEnv {
    setup_remote_environment_with(|gateway| gateway).await
}

/// Remote backend whose gateway router is first passed through `wrap`, e.g. to inject
/// failures.
pub async fn setup_remote_environment_with(wrap: impl FnOnce(Router) -> Router) -> TestEnv {
    let (store, db_dir) = create_local_store().await;
    let gateway = wrap(gateway_routes(GatewayState::new(store, TEST_SECRET)));
    let base_url = spawn_server(gateway).await;

    let remote = RemoteStore::new(base_url, TEST_SECRET, STORAGE_TIMEOUT)
        .expect("Failed to build remote store");
    let storage = Storage::remote(remote, STORAGE_TIMEOUT);
    build_env(storage, db_dir)
}

pub async fn setup_environment(backend: BackendKind) -> TestEnv {
    match backend {
        BackendKind::Local => setup_local_environment().await,
        BackendKind::Remote => setup_remote_environment().await,
    }
}

fn build_env(storage: Storage, db_dir: TempDir) -> TestEnv {
    let app = init_test_router(storage.clone());
    let server = TestServer::new(app).expect("Failed to create TestServer");
    TestEnv {
        server,
        storage,
        _db_dir: db_dir,
    }
}

// request helpers

pub fn identity_header() -> HeaderName {
    HeaderName::from_static("x-user-id")
}

pub fn identity(clerk_id: &str) -> HeaderValue {
    HeaderValue::from_str(clerk_id).expect("Invalid identity header value")
}

// data helpers

pub async fn create_test_user(storage: &Storage, clerk_id: &str, role: Role) -> User {
    storage
        .create::<User>(NewUser {
            clerk_id: clerk_id.to_string(),
            role,
            email: format!("{}@test.com", clerk_id),
            name: Some(format!("Test {}", clerk_id)),
        })
        .await
        .expect("Failed to insert test user")
}

pub async fn create_test_course(storage: &Storage, creator_id: &str, title: &str) -> Course {
    storage
        .create::<Course>(NewCourse {
            title: title.to_string(),
            description: "Test Desc".to_string(),
            resources: vec![json!("https://example.org/syllabus.pdf")],
            creator_id: creator_id.to_string(),
        })
        .await
        .expect("Failed to insert test course")
}

/// A course with a text block followed by the quiz block `QUIZ_BLOCK_ID`.
pub async fn create_test_quiz_course(storage: &Storage, creator_id: &str) -> Course {
    let course = create_test_course(storage, creator_id, "Quiz Course").await;
    storage
        .replace_blocks(
            course.id,
            vec![
                NewCourseBlock {
                    id: "intro".to_string(),
                    course_id: course.id,
                    kind: BlockKind::Text,
                    position: 0,
                    content: json!({ "text": "Read this first" }),
                },
                NewCourseBlock {
                    id: QUIZ_BLOCK_ID.to_string(),
                    course_id: course.id,
                    kind: BlockKind::Quiz,
                    position: 1,
                    content: json!({
                        "question": "What is 2 + 2?",
                        "options": ["3", "4", "5"],
                        "correctIndex": 1
                    }),
                },
            ],
        )
        .await
        .expect("Failed to insert test blocks");
    course
}
