//! Joins quiz results and enrollments with the users they refer to.
//!
//! Rows whose identity no longer resolves to a user are dropped from the output. The
//! filter only applies on read; nothing is deleted.

use crate::model::{
    Enrollment, EnrollmentFilter, QuizResult, QuizResultFilter, User, UserFilter,
};
use crate::store::{Storage, StorageError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::debug;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StudentSummary {
    pub clerk_id: String,
    pub email: String,
    pub name: Option<String>,
}

impl From<&User> for StudentSummary {
    fn from(user: &User) -> Self {
        StudentSummary {
            clerk_id: user.clerk_id.clone(),
            email: user.email.clone(),
            name: user.name.clone(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EnrichedQuizResult {
    #[serde(flatten)]
    pub result: QuizResult,
    pub student: StudentSummary,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EnrichedEnrollment {
    pub course_id: i64,
    pub student: StudentSummary,
    pub enrolled_at: DateTime<Utc>,
}

/// Quiz results matching `filter`, each with its student, sorted by quiz block id.
pub async fn quiz_results(
    storage: &Storage,
    filter: QuizResultFilter,
) -> Result<Vec<EnrichedQuizResult>, StorageError> {
    let results = storage.fetch::<QuizResult>(filter).await?;
    let users = resolve_users(storage, results.iter().map(|r| r.student_id.as_str())).await?;

    let mut enriched: Vec<EnrichedQuizResult> = results
        .into_iter()
        .filter_map(|result| {
            let student = users.get(&result.student_id)?;
            Some(EnrichedQuizResult {
                student: StudentSummary::from(student),
                result,
            })
        })
        .collect();

    // stable, so rows for the same block keep storage order
    enriched.sort_by(|a, b| a.result.quiz_block_id.cmp(&b.result.quiz_block_id));
    Ok(enriched)
}

/// Distinct enrolled students of a course. Duplicate enrollment rows collapse into the
/// earliest one.
pub async fn enrollments(
    storage: &Storage,
    course_id: i64,
) -> Result<Vec<EnrichedEnrollment>, StorageError> {
    let rows = storage
        .fetch::<Enrollment>(EnrollmentFilter::by_course(course_id))
        .await?;
    let rows = dedup_enrollments(rows);
    let users = resolve_users(storage, rows.iter().map(|e| e.student_id.as_str())).await?;

    Ok(rows
        .into_iter()
        .filter_map(|enrollment| {
            let student = users.get(&enrollment.student_id)?;
            Some(EnrichedEnrollment {
                course_id: enrollment.course_id,
                student: StudentSummary::from(student),
                enrolled_at: enrollment.created_at,
            })
        })
        .collect())
}

/// Ids of the courses a student is enrolled in, without duplicates.
pub async fn enrolled_course_ids(
    storage: &Storage,
    student_id: &str,
) -> Result<HashSet<i64>, StorageError> {
    Ok(storage
        .fetch::<Enrollment>(EnrollmentFilter::by_student(student_id))
        .await?
        .into_iter()
        .map(|enrollment| enrollment.course_id)
        .collect())
}

fn dedup_enrollments(rows: Vec<Enrollment>) -> Vec<Enrollment> {
    let mut rows = rows;
    rows.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
    let mut seen = HashSet::new();
    rows.into_iter()
        .filter(|enrollment| seen.insert(enrollment.student_id.clone()))
        .collect()
}

/// One lookup per distinct identity; identities without a user are left out.
async fn resolve_users<'a>(
    storage: &Storage,
    ids: impl Iterator<Item = &'a str>,
) -> Result<HashMap<String, User>, StorageError> {
    let distinct: HashSet<&str> = ids.collect();
    let mut users = HashMap::with_capacity(distinct.len());

    for id in distinct {
        match storage.find::<User>(UserFilter::by_id(id)).await? {
            Some(user) => {
                users.insert(user.clerk_id.clone(), user);
            }
            None => debug!("Dropping rows for unresolvable identity {}", id),
        }
    }

    Ok(users)
}
