use crate::AppState;
use crate::auth::Caller;
use crate::enrich::{self, EnrichedQuizResult};
use crate::errors::AppError;
use crate::extract::{Json, Query};
use crate::model::{QuizResult, QuizResultFilter};
use crate::payloads::quiz::{AssignQuizPayload, QuizResultsParams, SubmitQuizPayload};
use crate::quiz::{self, AssignmentReport, QuizAssignment, Submission};
use crate::response::ApiResponse;
use axum::extract::State;
use tracing::{debug, instrument};

/// Assigns a quiz block to one or more students.
///
/// Request Body: `AssignQuizPayload`
///
/// Returns (wrapped in `ApiResponse`)
/// * `AssignmentReport`: Created grants and per-student failures (200 OK, also when
///   some students failed).
/// * `400 Bad Request`: If `maxAttempts` is below 1 or no students are given.
/// * `403 Forbidden`: If the caller is not a teacher.
/// * `404 Not Found`: If the course does not exist, or the block is missing or not a quiz.
#[instrument(skip(state, payload))]
pub async fn assign_quiz(
    State(state): State<AppState>,
    caller: Caller,
    Json(payload): Json<AssignQuizPayload>,
) -> Result<ApiResponse<AssignmentReport>, AppError> {
    debug!("Assign quiz payload: {:?}", payload);

    let report = quiz::assign(
        &state.storage,
        &caller,
        QuizAssignment {
            course_id: payload.course_id,
            quiz_block_id: payload.quiz_block_id,
            student_ids: payload.student_ids,
            max_attempts: payload.max_attempts,
        },
    )
    .await?;

    Ok(ApiResponse::ok(report))
}

/// Records a graded attempt by the calling student.
///
/// Request Body: `SubmitQuizPayload`
///
/// Returns (wrapped in `ApiResponse`)
/// * `QuizResult`: The grant after this attempt (200 OK).
/// * `400 Bad Request`: If the score is outside `0..=1`.
/// * `403 Forbidden`: If the quiz is not assigned to the caller, or no attempts are left.
/// * `409 Conflict`: If concurrent submissions kept racing this one.
#[instrument(skip(state, payload))]
pub async fn submit_quiz_result(
    State(state): State<AppState>,
    caller: Caller,
    Json(payload): Json<SubmitQuizPayload>,
) -> Result<ApiResponse<QuizResult>, AppError> {
    debug!("Submit quiz payload: {:?}", payload);

    let grant = quiz::submit(
        &state.storage,
        &caller,
        Submission {
            course_id: payload.course_id,
            quiz_block_id: payload.quiz_block_id,
            score: payload.score,
            answers: payload.answers,
        },
    )
    .await?;

    Ok(ApiResponse::ok(grant))
}

/// Quiz results of a course, optionally for one student, with student details.
///
/// Query Parameters:
/// * `courseId`: The course.
/// * `clerkId`: Optional student filter.
///
/// Returns (wrapped in `ApiResponse`)
/// * `Vec<EnrichedQuizResult>`: Results sorted by quiz block id (200 OK).
#[instrument(skip(state))]
pub async fn list_quiz_results(
    State(state): State<AppState>,
    Query(params): Query<QuizResultsParams>,
) -> Result<ApiResponse<Vec<EnrichedQuizResult>>, AppError> {
    let filter = QuizResultFilter {
        course_id: Some(params.course_id),
        student_id: params.clerk_id,
        ..Default::default()
    };

    let results = enrich::quiz_results(&state.storage, filter).await?;
    Ok(ApiResponse::ok(results))
}
