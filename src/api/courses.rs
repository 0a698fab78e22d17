use crate::AppState;
use crate::auth::{self, Caller};
use crate::enrich::{self, EnrichedEnrollment};
use crate::errors::AppError;
use crate::extract::{Json, Path, Query};
use crate::model::block::normalize_blocks;
use crate::model::{
    Course, CourseBlock, CourseBlockFilter, CourseFilter, CoursePatch, NewCourse, Role,
};
use crate::payloads::courses::{
    CourseBlocksParams, CreateCoursePayload, EnrollStudentsPayload, EnrollmentsParams,
    SaveBlocksPayload, UpdateCoursePayload,
};
use crate::quiz::{self, EnrollmentReport};
use crate::response::ApiResponse;
use axum::extract::State;
use tracing::{debug, info, instrument, warn};

/// Lists the courses visible to the caller.
///
/// Teachers and admins see every course, students see the courses they are enrolled
/// in, and an unknown or anonymous caller sees none.
///
/// Returns (wrapped in `ApiResponse`)
/// * `Vec<Course>`: Visible courses ordered by id (200 OK).
/// * `500 Internal Server Error`: If the storage backend fails.
#[instrument(skip(state))]
pub async fn list_courses(
    State(state): State<AppState>,
    caller: Option<Caller>,
) -> Result<ApiResponse<Vec<Course>>, AppError> {
    let Some(caller) = caller else {
        debug!("Anonymous course listing, returning nothing");
        return Ok(ApiResponse::ok(Vec::new()));
    };

    let Some(user) = auth::resolve(&state.storage, &caller).await? else {
        debug!("Caller {} is unknown, returning no courses", caller.id());
        return Ok(ApiResponse::ok(Vec::new()));
    };

    let courses = state.storage.fetch::<Course>(CourseFilter::default()).await?;
    let courses = match user.role {
        Role::Teacher | Role::Admin => courses,
        Role::Student => {
            let enrolled = enrich::enrolled_course_ids(&state.storage, &user.clerk_id).await?;
            courses
                .into_iter()
                .filter(|course| enrolled.contains(&course.id))
                .collect()
        }
    };

    info!(
        "Listing {} courses for {} {}",
        courses.len(),
        user.role,
        user.clerk_id
    );
    Ok(ApiResponse::ok(courses))
}

/// Creates a course owned by the calling teacher.
///
/// Request Body: `CreateCoursePayload`
///
/// Returns (wrapped in `ApiResponse`)
/// * `Course`: The new course (200 OK).
/// * `400 Bad Request`: If the title is blank.
/// * `403 Forbidden`: If the caller is not a teacher.
#[instrument(skip(state, payload))]
pub async fn create_course(
    State(state): State<AppState>,
    caller: Caller,
    Json(payload): Json<CreateCoursePayload>,
) -> Result<ApiResponse<Course>, AppError> {
    let teacher = auth::require_teacher(&state.storage, &caller).await?;
    debug!("Create course payload: {:?}", payload);

    if payload.title.trim().is_empty() {
        return Err(AppError::BadRequest("title is required".to_string()));
    }

    let course = state
        .storage
        .create::<Course>(NewCourse {
            title: payload.title,
            description: payload.description,
            resources: payload.resources,
            creator_id: teacher.clerk_id.clone(),
        })
        .await?;

    info!("Teacher {} created course {}", teacher.clerk_id, course.id);
    Ok(ApiResponse::ok(course))
}

/// Updates title, description or resources of a course the caller created.
///
/// Request Body: `UpdateCoursePayload`
///
/// Returns (wrapped in `ApiResponse`)
/// * `Course`: The updated course (200 OK).
/// * `403 Forbidden`: If the caller is not the course's creator.
/// * `404 Not Found`: If the course does not exist.
#[instrument(skip(state, payload))]
pub async fn update_course(
    State(state): State<AppState>,
    caller: Caller,
    Path(course_id): Path<i64>,
    Json(payload): Json<UpdateCoursePayload>,
) -> Result<ApiResponse<Course>, AppError> {
    let teacher = auth::require_teacher(&state.storage, &caller).await?;
    auth::require_course_owner(&state.storage, &teacher, course_id).await?;

    if matches!(&payload.title, Some(title) if title.trim().is_empty()) {
        return Err(AppError::BadRequest("title must not be blank".to_string()));
    }

    let course = state
        .storage
        .update::<Course>(
            course_id,
            CoursePatch {
                title: payload.title,
                description: payload.description,
                resources: payload.resources,
            },
        )
        .await?;

    info!("Course {} updated by {}", course_id, teacher.clerk_id);
    Ok(ApiResponse::ok(course))
}

/// Deletes a course the caller created, together with its blocks, enrollments and
/// quiz results.
///
/// Returns (wrapped in `ApiResponse`)
/// * `bool`: true if the course was deleted (200 OK).
/// * `403 Forbidden`: If the caller is not the course's creator.
/// * `404 Not Found`: If the course does not exist.
#[instrument(skip(state))]
pub async fn delete_course(
    State(state): State<AppState>,
    caller: Caller,
    Path(course_id): Path<i64>,
) -> Result<ApiResponse<bool>, AppError> {
    let teacher = auth::require_teacher(&state.storage, &caller).await?;
    auth::require_course_owner(&state.storage, &teacher, course_id).await?;

    state.storage.delete::<Course>(course_id).await?;

    info!("Course {} deleted by {}", course_id, teacher.clerk_id);
    Ok(ApiResponse::ok(true))
}

/// Blocks of a course ordered by position. Open to everyone.
///
/// Query Parameters:
/// * `courseId`: The course whose blocks to return.
///
/// Returns (wrapped in `ApiResponse`)
/// * `Vec<CourseBlock>`: The blocks, positions `0..N-1` (200 OK).
#[instrument(skip(state))]
pub async fn get_course_blocks(
    State(state): State<AppState>,
    Query(params): Query<CourseBlocksParams>,
) -> Result<ApiResponse<Vec<CourseBlock>>, AppError> {
    let mut blocks = state
        .storage
        .fetch::<CourseBlock>(CourseBlockFilter::by_course(params.course_id))
        .await?;
    blocks.sort_by_key(|block| block.position);

    debug!(
        "Fetched {} blocks for course {}",
        blocks.len(),
        params.course_id
    );
    Ok(ApiResponse::ok(blocks))
}

/// Replaces every block of a course with the submitted list.
///
/// The list order defines the positions. Saving the same list twice yields the same
/// blocks.
///
/// Query Parameters:
/// * `courseId`: The course to save.
///
/// Request Body: `SaveBlocksPayload`
///
/// Returns (wrapped in `ApiResponse`)
/// * `Vec<CourseBlock>`: The stored blocks (200 OK).
/// * `400 Bad Request`: If a block is malformed or ids repeat.
/// * `403 Forbidden`: If the caller is not the course's creator.
/// * `404 Not Found`: If the course does not exist.
#[instrument(skip(state, payload))]
pub async fn save_course_blocks(
    State(state): State<AppState>,
    caller: Caller,
    Query(params): Query<CourseBlocksParams>,
    Json(payload): Json<SaveBlocksPayload>,
) -> Result<ApiResponse<Vec<CourseBlock>>, AppError> {
    let teacher = auth::require_teacher(&state.storage, &caller).await?;
    auth::require_course_owner(&state.storage, &teacher, params.course_id).await?;

    let blocks = normalize_blocks(params.course_id, payload.blocks).map_err(|reason| {
        warn!("Rejecting block list for course {}: {}", params.course_id, reason);
        AppError::BadRequest(reason)
    })?;

    let saved = state
        .storage
        .replace_blocks(params.course_id, blocks)
        .await?;

    info!(
        "Saved {} blocks for course {}",
        saved.len(),
        params.course_id
    );
    Ok(ApiResponse::ok(saved))
}

/// Enrolls students in a course. Each student succeeds or fails on its own.
///
/// Request Body: `EnrollStudentsPayload`
///
/// Returns (wrapped in `ApiResponse`)
/// * `EnrollmentReport`: Enrolled students and per-student failures (200 OK).
/// * `403 Forbidden`: If the caller is not a teacher.
/// * `404 Not Found`: If the course does not exist.
#[instrument(skip(state, payload))]
pub async fn enroll_students(
    State(state): State<AppState>,
    caller: Caller,
    Path(course_id): Path<i64>,
    Json(payload): Json<EnrollStudentsPayload>,
) -> Result<ApiResponse<EnrollmentReport>, AppError> {
    let report =
        quiz::enroll_students(&state.storage, &caller, course_id, payload.student_ids).await?;
    Ok(ApiResponse::ok(report))
}

/// Students enrolled in a course, one entry per student.
///
/// Query Parameters:
/// * `courseId`: The course.
///
/// Returns (wrapped in `ApiResponse`)
/// * `Vec<EnrichedEnrollment>`: Enrollments of students that still exist (200 OK).
#[instrument(skip(state))]
pub async fn list_enrollments(
    State(state): State<AppState>,
    Query(params): Query<EnrollmentsParams>,
) -> Result<ApiResponse<Vec<EnrichedEnrollment>>, AppError> {
    let enrollments = enrich::enrollments(&state.storage, params.course_id).await?;
    Ok(ApiResponse::ok(enrollments))
}
