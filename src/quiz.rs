//! Quiz assignment state machine: assign, attempt, grade, lock.
//!
//! Per (course, student, quiz block) a grant moves `Assigned -> Attempting -> Completed`.
//! Attempts are recorded in place with a compare-and-swap on the attempt counter, so
//! two racing submissions cannot both spend the last attempt.

use crate::auth::{self, Caller};
use crate::errors::AppError;
use crate::model::{
    CourseBlock, CourseBlockFilter, Enrollment, EnrollmentFilter, GrantState, NewEnrollment,
    NewQuizResult, QuizResult, QuizResultFilter, QuizResultPatch, Role, User, UserFilter,
};
use crate::store::{Storage, StorageError};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashSet;
use tracing::{debug, info, instrument, warn};

/// Read-evaluate-write rounds a submission may spend after losing a race.
const SUBMIT_ROUNDS: usize = 3;

#[derive(Debug, Clone)]
pub struct QuizAssignment {
    pub course_id: i64,
    pub quiz_block_id: String,
    pub student_ids: Vec<String>,
    pub max_attempts: i32,
}

#[derive(Debug, Clone)]
pub struct Submission {
    pub course_id: i64,
    pub quiz_block_id: String,
    pub score: f64,
    pub answers: Option<JsonValue>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BatchFailure {
    pub student_id: String,
    pub message: String,
}

/// Outcome of assigning a quiz to several students. Items succeed or fail independently.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentReport {
    pub created: Vec<QuizResult>,
    pub failed: Vec<BatchFailure>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct EnrollmentReport {
    pub enrolled: Vec<Enrollment>,
    pub failed: Vec<BatchFailure>,
}

/// Assigns a quiz block to every listed student.
///
/// Each student is enrolled in the course if needed, then receives a fresh grant (or has
/// their existing grant re-issued in place). A failure for one student is reported in
/// the result and does not stop the remaining students.
#[instrument(
    skip(storage, request),
    fields(course_id = request.course_id, quiz_block_id = %request.quiz_block_id)
)]
pub async fn assign(
    storage: &Storage,
    caller: &Caller,
    request: QuizAssignment,
) -> Result<AssignmentReport, AppError> {
    let teacher = auth::require_teacher(storage, caller).await?;

    if request.max_attempts < 1 {
        return Err(AppError::BadRequest(format!(
            "maxAttempts must be at least 1, got {}",
            request.max_attempts
        )));
    }
    if request.student_ids.is_empty() {
        return Err(AppError::BadRequest("studentIds must not be empty".to_string()));
    }

    auth::require_course(storage, request.course_id).await?;
    require_quiz_block(storage, request.course_id, &request.quiz_block_id).await?;

    info!(
        "Teacher {} assigning quiz {} to {} students",
        teacher.clerk_id,
        request.quiz_block_id,
        request.student_ids.len()
    );

    let mut report = AssignmentReport::default();
    for student_id in distinct(request.student_ids) {
        let outcome = assign_one(
            storage,
            &teacher,
            request.course_id,
            &request.quiz_block_id,
            &student_id,
            request.max_attempts,
        )
        .await;

        match outcome {
            Ok(grant) => report.created.push(grant),
            Err(e) => {
                warn!("Assigning quiz to student {} failed: {}", student_id, e);
                report.failed.push(BatchFailure {
                    student_id,
                    message: e.client_message(),
                });
            }
        }
    }

    info!(
        "Quiz assignment finished: {} created, {} failed",
        report.created.len(),
        report.failed.len()
    );
    Ok(report)
}

async fn assign_one(
    storage: &Storage,
    teacher: &User,
    course_id: i64,
    quiz_block_id: &str,
    student_id: &str,
    max_attempts: i32,
) -> Result<QuizResult, AppError> {
    require_student(storage, student_id).await?;
    ensure_enrollment(storage, course_id, student_id).await?;

    let existing = storage
        .fetch::<QuizResult>(QuizResultFilter::grant(course_id, student_id, quiz_block_id))
        .await?;

    let grant = match select_grant(existing) {
        Some(grant) => {
            debug!("Re-issuing grant {} for student {}", grant.id, student_id);
            storage
                .update::<QuizResult>(
                    grant.id,
                    QuizResultPatch::Reissue {
                        max_attempts,
                        assigned_by: teacher.clerk_id.clone(),
                    },
                )
                .await?
        }
        None => {
            storage
                .create::<QuizResult>(NewQuizResult {
                    course_id,
                    student_id: student_id.to_string(),
                    quiz_block_id: quiz_block_id.to_string(),
                    assigned_by: Some(teacher.clerk_id.clone()),
                    max_attempts,
                })
                .await?
        }
    };

    Ok(grant)
}

/// Records one graded attempt for the caller.
///
/// Authorization and the write form one unit: the grant is read, checked and written
/// conditionally. Losing a race re-reads the grant and re-evaluates it.
#[instrument(
    skip(storage, submission),
    fields(course_id = submission.course_id, quiz_block_id = %submission.quiz_block_id)
)]
pub async fn submit(
    storage: &Storage,
    caller: &Caller,
    submission: Submission,
) -> Result<QuizResult, AppError> {
    if !submission.score.is_finite() || !(0.0..=1.0).contains(&submission.score) {
        return Err(AppError::BadRequest(format!(
            "score must be between 0 and 1, got {}",
            submission.score
        )));
    }

    let filter = QuizResultFilter::grant(
        submission.course_id,
        caller.id(),
        submission.quiz_block_id.clone(),
    );

    for round in 1..=SUBMIT_ROUNDS {
        let grants = storage.fetch::<QuizResult>(filter.clone()).await?;
        let Some(grant) = select_grant(grants) else {
            warn!(
                "Student {} submitted quiz {} without a grant",
                caller.id(),
                submission.quiz_block_id
            );
            return Err(AppError::Forbidden(format!(
                "Quiz {} is not assigned to this student",
                submission.quiz_block_id
            )));
        };

        if grant.state() == GrantState::Completed {
            warn!(
                "Student {} has used {} of {} attempts on grant {}",
                caller.id(),
                grant.attempts,
                grant.max_attempts,
                grant.id
            );
            return Err(AppError::AttemptsExhausted(format!(
                "{} of {} attempts already used",
                grant.attempts, grant.max_attempts
            )));
        }

        let patch = QuizResultPatch::Attempt {
            expected_attempts: grant.attempts,
            score: submission.score,
            answers: submission.answers.clone(),
            completed_at: Utc::now(),
        };

        match storage.update::<QuizResult>(grant.id, patch).await {
            Ok(updated) => {
                info!(
                    "Recorded attempt {} of {} on grant {} with score {} ({} left)",
                    updated.attempts,
                    updated.max_attempts,
                    updated.id,
                    submission.score,
                    updated.attempts_left()
                );
                return Ok(updated);
            }
            Err(e) if e.is_conflict() => {
                warn!(
                    "Grant {} changed underneath submission (round {}): {}",
                    grant.id, round, e
                );
            }
            Err(e) => return Err(e.into()),
        }
    }

    Err(AppError::Conflict(
        "The quiz result kept changing concurrently; submission not recorded".to_string(),
    ))
}

/// Enrolls every listed student in a course the caller teaches.
#[instrument(skip(storage, student_ids))]
pub async fn enroll_students(
    storage: &Storage,
    caller: &Caller,
    course_id: i64,
    student_ids: Vec<String>,
) -> Result<EnrollmentReport, AppError> {
    auth::require_teacher(storage, caller).await?;
    auth::require_course(storage, course_id).await?;

    let mut report = EnrollmentReport::default();
    for student_id in distinct(student_ids) {
        let outcome = async {
            require_student(storage, &student_id).await?;
            Ok::<_, AppError>(ensure_enrollment(storage, course_id, &student_id).await?)
        }
        .await;

        match outcome {
            Ok(enrollment) => report.enrolled.push(enrollment),
            Err(e) => {
                warn!("Enrolling student {} failed: {}", student_id, e);
                report.failed.push(BatchFailure {
                    student_id,
                    message: e.client_message(),
                });
            }
        }
    }

    Ok(report)
}

/// Returns an existing enrollment for the pair, creating one when there is none.
pub async fn ensure_enrollment(
    storage: &Storage,
    course_id: i64,
    student_id: &str,
) -> Result<Enrollment, StorageError> {
    let existing = storage
        .find::<Enrollment>(EnrollmentFilter::membership(course_id, student_id))
        .await?;
    if let Some(enrollment) = existing {
        return Ok(enrollment);
    }

    debug!("Enrolling student {} in course {}", student_id, course_id);
    storage
        .create::<Enrollment>(NewEnrollment {
            course_id,
            student_id: student_id.to_string(),
        })
        .await
}

/// Picks the grant that counts when several rows exist for one student and quiz:
/// the most recently created one.
pub fn select_grant(grants: Vec<QuizResult>) -> Option<QuizResult> {
    grants.into_iter().max_by_key(|grant| grant.id)
}

async fn require_student(storage: &Storage, student_id: &str) -> Result<User, AppError> {
    match storage.find::<User>(UserFilter::by_id(student_id)).await? {
        Some(user) if user.role == Role::Student => Ok(user),
        Some(user) => Err(AppError::BadRequest(format!(
            "User {} is a {}, not a student",
            student_id, user.role
        ))),
        None => Err(AppError::NotFound(format!(
            "Student {} not found",
            student_id
        ))),
    }
}

async fn require_quiz_block(
    storage: &Storage,
    course_id: i64,
    quiz_block_id: &str,
) -> Result<CourseBlock, AppError> {
    let block = storage
        .find::<CourseBlock>(CourseBlockFilter {
            id: Some(quiz_block_id.to_string()),
            course_id: Some(course_id),
        })
        .await?;

    match block {
        Some(block) if block.is_quiz() => Ok(block),
        Some(block) => Err(AppError::NotFound(format!(
            "Block {} in course {} is a {} block, not a quiz",
            quiz_block_id, course_id, block.kind
        ))),
        None => Err(AppError::NotFound(format!(
            "Quiz block {} not found in course {}",
            quiz_block_id, course_id
        ))),
    }
}

fn distinct(ids: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    ids.into_iter().filter(|id| seen.insert(id.clone())).collect()
}
