use axum::http::StatusCode;
use lightweight_classroom_server::enrich::EnrichedEnrollment;
use lightweight_classroom_server::model::{
    BlockInput, BlockKind, Course, CourseBlock, CourseBlockFilter, CourseFilter, Enrollment,
    EnrollmentFilter, NewEnrollment, NewQuizResult, QuizResult, QuizResultFilter, Role, User,
};
use lightweight_classroom_server::payloads::courses::{
    CreateCoursePayload, EnrollStudentsPayload, SaveBlocksPayload, UpdateCoursePayload,
};
use lightweight_classroom_server::quiz::EnrollmentReport;
use lightweight_classroom_server::response::ApiResponse;
use lightweight_classroom_server::store::BackendKind;
use serde_json::{Value, json};

mod helpers;
use helpers::{
    QUIZ_BLOCK_ID, TestEnv, create_test_course, create_test_quiz_course, create_test_user,
    identity, identity_header, setup_environment, setup_local_environment,
};

fn block(id: &str, kind: BlockKind, content: Value) -> BlockInput {
    BlockInput {
        id: Some(id.to_string()),
        kind,
        content,
    }
}

fn lesson_blocks() -> Vec<BlockInput> {
    vec![
        block("welcome", BlockKind::Text, json!({ "text": "Welcome" })),
        block(
            "diagram",
            BlockKind::Image,
            json!({ "url": "https://example.org/diagram.png" }),
        ),
        block(
            "check",
            BlockKind::Quiz,
            json!({ "question": "Ready?", "options": ["yes", "no"], "correctIndex": 0 }),
        ),
    ]
}

async fn save_blocks(
    env: &TestEnv,
    caller: &str,
    course_id: i64,
    blocks: Vec<BlockInput>,
) -> axum_test::TestResponse {
    env.server
        .put("/courseblocks")
        .add_header(identity_header(), identity(caller))
        .add_query_param("courseId", course_id)
        .json(&SaveBlocksPayload { blocks })
        .await
}

async fn get_blocks(env: &TestEnv, course_id: i64) -> Vec<CourseBlock> {
    env.server
        .get("/courseblocks")
        .add_query_param("courseId", course_id)
        .await
        .json::<ApiResponse<Vec<CourseBlock>>>()
        .data
        .unwrap()
}

// create_course

#[tokio::test]
async fn test_create_course_success() {
    let env = setup_local_environment().await;
    create_test_user(&env.storage, "teacher-1", Role::Teacher).await;

    let response = env
        .server
        .post("/courses")
        .add_header(identity_header(), identity("teacher-1"))
        .json(&CreateCoursePayload {
            title: "Algebra".to_string(),
            description: "Linear equations".to_string(),
            resources: vec![json!({ "name": "notes", "url": "https://example.org/notes" })],
        })
        .await;

    assert_eq!(response.status_code(), StatusCode::OK);
    let course = response.json::<ApiResponse<Course>>().data.unwrap();
    assert_eq!(course.title, "Algebra");
    assert_eq!(course.creator_id, "teacher-1");
    assert_eq!(course.resources.len(), 1);
}

#[tokio::test]
async fn test_create_course_forbidden_for_student() {
    let env = setup_local_environment().await;
    create_test_user(&env.storage, "student-1", Role::Student).await;

    let response = env
        .server
        .post("/courses")
        .add_header(identity_header(), identity("student-1"))
        .json(&CreateCoursePayload {
            title: "Sneaky".to_string(),
            description: String::new(),
            resources: Vec::new(),
        })
        .await;

    assert_eq!(response.status_code(), StatusCode::FORBIDDEN);
    let courses = env
        .storage
        .fetch::<Course>(CourseFilter::default())
        .await
        .unwrap();
    assert!(courses.is_empty());
}

#[tokio::test]
async fn test_create_course_unknown_caller_forbidden() {
    let env = setup_local_environment().await;

    let response = env
        .server
        .post("/courses")
        .add_header(identity_header(), identity("nobody"))
        .json(&CreateCoursePayload {
            title: "Ghost".to_string(),
            description: String::new(),
            resources: Vec::new(),
        })
        .await;

    assert_eq!(response.status_code(), StatusCode::FORBIDDEN);
}

// list_courses

async fn list_courses_depends_on_role(backend: BackendKind) {
    let env = setup_environment(backend).await;
    create_test_user(&env.storage, "teacher-1", Role::Teacher).await;
    create_test_user(&env.storage, "teacher-2", Role::Teacher).await;
    create_test_user(&env.storage, "student-1", Role::Student).await;
    let first = create_test_course(&env.storage, "teacher-1", "First").await;
    let _second = create_test_course(&env.storage, "teacher-2", "Second").await;
    env.storage
        .create::<Enrollment>(NewEnrollment {
            course_id: first.id,
            student_id: "student-1".to_string(),
        })
        .await
        .unwrap();

    let list = |caller: Option<&'static str>| {
        let mut request = env.server.get("/courses");
        if let Some(caller) = caller {
            request = request.add_header(identity_header(), identity(caller));
        }
        request
    };

    let teacher_view = list(Some("teacher-1"))
        .await
        .json::<ApiResponse<Vec<Course>>>()
        .data
        .unwrap();
    assert_eq!(teacher_view.len(), 2);

    let student_view = list(Some("student-1"))
        .await
        .json::<ApiResponse<Vec<Course>>>()
        .data
        .unwrap();
    assert_eq!(student_view.len(), 1);
    assert_eq!(student_view[0].id, first.id);

    let unknown_view = list(Some("nobody")).await;
    assert_eq!(unknown_view.status_code(), StatusCode::OK);
    assert!(
        unknown_view
            .json::<ApiResponse<Vec<Course>>>()
            .data
            .unwrap()
            .is_empty()
    );

    let anonymous_view = list(None)
        .await
        .json::<ApiResponse<Vec<Course>>>()
        .data
        .unwrap();
    assert!(anonymous_view.is_empty());
}

#[tokio::test]
async fn test_list_courses_depends_on_role_local() {
    list_courses_depends_on_role(BackendKind::Local).await;
}

#[tokio::test]
async fn test_list_courses_depends_on_role_remote() {
    list_courses_depends_on_role(BackendKind::Remote).await;
}

// update_course

#[tokio::test]
async fn test_update_course_by_owner() {
    let env = setup_local_environment().await;
    create_test_user(&env.storage, "teacher-1", Role::Teacher).await;
    let course = create_test_course(&env.storage, "teacher-1", "Draft").await;

    let response = env
        .server
        .patch(&format!("/courses/{}", course.id))
        .add_header(identity_header(), identity("teacher-1"))
        .json(&UpdateCoursePayload {
            title: Some("Final".to_string()),
            ..Default::default()
        })
        .await;

    assert_eq!(response.status_code(), StatusCode::OK);
    let updated = response.json::<ApiResponse<Course>>().data.unwrap();
    assert_eq!(updated.title, "Final");
    assert_eq!(updated.description, course.description);
}

#[tokio::test]
async fn test_update_course_by_other_teacher_forbidden() {
    let env = setup_local_environment().await;
    create_test_user(&env.storage, "teacher-1", Role::Teacher).await;
    create_test_user(&env.storage, "teacher-2", Role::Teacher).await;
    let course = create_test_course(&env.storage, "teacher-1", "Mine").await;

    let response = env
        .server
        .patch(&format!("/courses/{}", course.id))
        .add_header(identity_header(), identity("teacher-2"))
        .json(&UpdateCoursePayload {
            title: Some("Theirs".to_string()),
            ..Default::default()
        })
        .await;

    assert_eq!(response.status_code(), StatusCode::FORBIDDEN);
}

// save_course_blocks / get_course_blocks

async fn saving_blocks_is_idempotent(backend: BackendKind) {
    let env = setup_environment(backend).await;
    create_test_user(&env.storage, "teacher-1", Role::Teacher).await;
    let course = create_test_course(&env.storage, "teacher-1", "Blocks").await;

    let first = save_blocks(&env, "teacher-1", course.id, lesson_blocks()).await;
    assert_eq!(first.status_code(), StatusCode::OK);
    let after_first = get_blocks(&env, course.id).await;

    let second = save_blocks(&env, "teacher-1", course.id, lesson_blocks()).await;
    assert_eq!(second.status_code(), StatusCode::OK);
    let after_second = get_blocks(&env, course.id).await;

    assert_eq!(after_first, after_second);
    let positions: Vec<i32> = after_second.iter().map(|b| b.position).collect();
    assert_eq!(positions, vec![0, 1, 2]);
    let ids: Vec<&str> = after_second.iter().map(|b| b.id.as_str()).collect();
    assert_eq!(ids, vec!["welcome", "diagram", "check"]);
}

#[tokio::test]
async fn test_saving_blocks_is_idempotent_local() {
    saving_blocks_is_idempotent(BackendKind::Local).await;
}

#[tokio::test]
async fn test_saving_blocks_is_idempotent_remote() {
    saving_blocks_is_idempotent(BackendKind::Remote).await;
}

async fn saving_fewer_blocks_replaces_all(backend: BackendKind) {
    let env = setup_environment(backend).await;
    create_test_user(&env.storage, "teacher-1", Role::Teacher).await;
    let course = create_test_course(&env.storage, "teacher-1", "Shrinking").await;
    save_blocks(&env, "teacher-1", course.id, lesson_blocks()).await;

    let mut reordered = lesson_blocks();
    reordered.remove(1);
    reordered.reverse();
    let response = save_blocks(&env, "teacher-1", course.id, reordered).await;
    assert_eq!(response.status_code(), StatusCode::OK);

    let blocks = get_blocks(&env, course.id).await;
    let layout: Vec<(i32, &str)> = blocks.iter().map(|b| (b.position, b.id.as_str())).collect();
    assert_eq!(layout, vec![(0, "check"), (1, "welcome")]);

    let cleared = save_blocks(&env, "teacher-1", course.id, Vec::new()).await;
    assert_eq!(cleared.status_code(), StatusCode::OK);
    assert!(get_blocks(&env, course.id).await.is_empty());
}

#[tokio::test]
async fn test_saving_fewer_blocks_replaces_all_local() {
    saving_fewer_blocks_replaces_all(BackendKind::Local).await;
}

#[tokio::test]
async fn test_saving_fewer_blocks_replaces_all_remote() {
    saving_fewer_blocks_replaces_all(BackendKind::Remote).await;
}

#[tokio::test]
async fn test_save_blocks_rejects_malformed_quiz() {
    let env = setup_local_environment().await;
    create_test_user(&env.storage, "teacher-1", Role::Teacher).await;
    let course = create_test_course(&env.storage, "teacher-1", "Broken").await;
    save_blocks(&env, "teacher-1", course.id, lesson_blocks()).await;

    let broken = vec![block(
        "bad-quiz",
        BlockKind::Quiz,
        json!({ "question": "Pick", "options": ["only"], "correctIndex": 3 }),
    )];
    let response = save_blocks(&env, "teacher-1", course.id, broken).await;

    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(get_blocks(&env, course.id).await.len(), 3);
}

#[tokio::test]
async fn test_save_blocks_rejects_duplicate_ids() {
    let env = setup_local_environment().await;
    create_test_user(&env.storage, "teacher-1", Role::Teacher).await;
    let course = create_test_course(&env.storage, "teacher-1", "Dupes").await;

    let blocks = vec![
        block("same", BlockKind::Text, json!({ "text": "a" })),
        block("same", BlockKind::Text, json!({ "text": "b" })),
    ];
    let response = save_blocks(&env, "teacher-1", course.id, blocks).await;

    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_save_blocks_by_other_teacher_forbidden() {
    let env = setup_local_environment().await;
    create_test_user(&env.storage, "teacher-1", Role::Teacher).await;
    create_test_user(&env.storage, "teacher-2", Role::Teacher).await;
    let course = create_test_course(&env.storage, "teacher-1", "Owned").await;

    let response = save_blocks(&env, "teacher-2", course.id, lesson_blocks()).await;

    assert_eq!(response.status_code(), StatusCode::FORBIDDEN);
    assert!(get_blocks(&env, course.id).await.is_empty());
}

#[tokio::test]
async fn test_save_blocks_unknown_course() {
    let env = setup_local_environment().await;
    create_test_user(&env.storage, "teacher-1", Role::Teacher).await;

    let response = save_blocks(&env, "teacher-1", 999, lesson_blocks()).await;

    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
}

// delete_course

async fn deleting_course_removes_dependents(backend: BackendKind) {
    let env = setup_environment(backend).await;
    create_test_user(&env.storage, "teacher-1", Role::Teacher).await;
    create_test_user(&env.storage, "student-1", Role::Student).await;
    let course = create_test_quiz_course(&env.storage, "teacher-1").await;
    env.storage
        .create::<Enrollment>(NewEnrollment {
            course_id: course.id,
            student_id: "student-1".to_string(),
        })
        .await
        .unwrap();
    env.storage
        .create::<QuizResult>(NewQuizResult {
            course_id: course.id,
            student_id: "student-1".to_string(),
            quiz_block_id: QUIZ_BLOCK_ID.to_string(),
            assigned_by: Some("teacher-1".to_string()),
            max_attempts: 1,
        })
        .await
        .unwrap();

    let response = env
        .server
        .delete(&format!("/courses/{}", course.id))
        .add_header(identity_header(), identity("teacher-1"))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);

    let storage = &env.storage;
    assert!(
        storage
            .fetch::<Course>(CourseFilter::by_id(course.id))
            .await
            .unwrap()
            .is_empty()
    );
    assert!(
        storage
            .fetch::<CourseBlock>(CourseBlockFilter::by_course(course.id))
            .await
            .unwrap()
            .is_empty()
    );
    assert!(
        storage
            .fetch::<Enrollment>(EnrollmentFilter::by_course(course.id))
            .await
            .unwrap()
            .is_empty()
    );
    assert!(
        storage
            .fetch::<QuizResult>(QuizResultFilter {
                course_id: Some(course.id),
                ..Default::default()
            })
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn test_deleting_course_removes_dependents_local() {
    deleting_course_removes_dependents(BackendKind::Local).await;
}

#[tokio::test]
async fn test_deleting_course_removes_dependents_remote() {
    deleting_course_removes_dependents(BackendKind::Remote).await;
}

#[tokio::test]
async fn test_delete_unknown_course() {
    let env = setup_local_environment().await;
    create_test_user(&env.storage, "teacher-1", Role::Teacher).await;

    let response = env
        .server
        .delete("/courses/4242")
        .add_header(identity_header(), identity("teacher-1"))
        .await;

    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
}

// enroll_students / list_enrollments

#[tokio::test]
async fn test_enroll_students_reports_each_student() {
    let env = setup_local_environment().await;
    create_test_user(&env.storage, "teacher-1", Role::Teacher).await;
    create_test_user(&env.storage, "student-1", Role::Student).await;
    create_test_user(&env.storage, "teacher-2", Role::Teacher).await;
    let course = create_test_course(&env.storage, "teacher-1", "Roster").await;

    let response = env
        .server
        .post(&format!("/courses/{}/students", course.id))
        .add_header(identity_header(), identity("teacher-1"))
        .json(&EnrollStudentsPayload {
            student_ids: vec![
                "student-1".to_string(),
                "student-1".to_string(),
                "ghost".to_string(),
                "teacher-2".to_string(),
            ],
        })
        .await;

    assert_eq!(response.status_code(), StatusCode::OK);
    let report = response.json::<ApiResponse<EnrollmentReport>>().data.unwrap();
    assert_eq!(report.enrolled.len(), 1);
    assert_eq!(report.enrolled[0].student_id, "student-1");
    let failed: Vec<&str> = report.failed.iter().map(|f| f.student_id.as_str()).collect();
    assert_eq!(failed, vec!["ghost", "teacher-2"]);

    // enrolling again reuses the existing row
    env.server
        .post(&format!("/courses/{}/students", course.id))
        .add_header(identity_header(), identity("teacher-1"))
        .json(&EnrollStudentsPayload {
            student_ids: vec!["student-1".to_string()],
        })
        .await;
    let rows = env
        .storage
        .fetch::<Enrollment>(EnrollmentFilter::by_course(course.id))
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
}

async fn enrollments_are_distinct_and_resolved(backend: BackendKind) {
    let env = setup_environment(backend).await;
    create_test_user(&env.storage, "teacher-1", Role::Teacher).await;
    create_test_user(&env.storage, "student-1", Role::Student).await;
    create_test_user(&env.storage, "student-2", Role::Student).await;
    let course = create_test_course(&env.storage, "teacher-1", "Roster").await;

    for student_id in ["student-1", "student-1", "student-2"] {
        env.storage
            .create::<Enrollment>(NewEnrollment {
                course_id: course.id,
                student_id: student_id.to_string(),
            })
            .await
            .unwrap();
    }
    env.storage
        .delete::<User>("student-2".to_string())
        .await
        .unwrap();

    let response = env
        .server
        .get("/enrollments")
        .add_query_param("courseId", course.id)
        .await;

    assert_eq!(response.status_code(), StatusCode::OK);
    let enrollments = response
        .json::<ApiResponse<Vec<EnrichedEnrollment>>>()
        .data
        .unwrap();
    assert_eq!(enrollments.len(), 1);
    assert_eq!(enrollments[0].student.clerk_id, "student-1");
    assert_eq!(enrollments[0].student.name.as_deref(), Some("Test student-1"));
}

#[tokio::test]
async fn test_enrollments_are_distinct_and_resolved_local() {
    enrollments_are_distinct_and_resolved(BackendKind::Local).await;
}

#[tokio::test]
async fn test_enrollments_are_distinct_and_resolved_remote() {
    enrollments_are_distinct_and_resolved(BackendKind::Remote).await;
}

#[tokio::test]
async fn test_list_enrollments_without_course_is_bad_request() {
    let env = setup_local_environment().await;
    create_test_user(&env.storage, "teacher-1", Role::Teacher).await;

    let response = env
        .server
        .get("/enrollments")
        .add_header(identity_header(), identity("teacher-1"))
        .await;

    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    let body = response.json::<ApiResponse<Value>>();
    assert!(!body.success);
}
