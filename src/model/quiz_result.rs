use crate::store::{Collection, Patchable, Record};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// A quiz grant and its attempt ledger for one (course, student, quiz block).
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QuizResult {
    pub id: i64,
    pub course_id: i64,
    pub student_id: String,
    pub quiz_block_id: String,
    pub score: Option<f64>,
    pub answers: Option<JsonValue>,
    pub assigned_by: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
    pub attempts: i32,
    pub max_attempts: i32,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum GrantState {
    Assigned,
    Attempting,
    Completed,
}

impl QuizResult {
    pub fn state(&self) -> GrantState {
        if self.attempts >= self.max_attempts {
            GrantState::Completed
        } else if self.attempts == 0 {
            GrantState::Assigned
        } else {
            GrantState::Attempting
        }
    }

    pub fn attempts_left(&self) -> i32 {
        (self.max_attempts - self.attempts).max(0)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct NewQuizResult {
    pub course_id: i64,
    pub student_id: String,
    pub quiz_block_id: String,
    pub assigned_by: Option<String>,
    pub max_attempts: i32,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct QuizResultFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub course_id: Option<i64>,
    #[serde(rename = "clerkId", skip_serializing_if = "Option::is_none")]
    pub student_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quiz_block_id: Option<String>,
}

impl QuizResultFilter {
    pub fn grant(
        course_id: i64,
        student_id: impl Into<String>,
        quiz_block_id: impl Into<String>,
    ) -> Self {
        Self {
            id: None,
            course_id: Some(course_id),
            student_id: Some(student_id.into()),
            quiz_block_id: Some(quiz_block_id.into()),
        }
    }
}

/// In-place mutations of a grant.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum QuizResultPatch {
    /// Records one graded attempt. Applies only while the stored attempt count still
    /// equals `expected_attempts` and is below the limit.
    #[serde(rename_all = "camelCase")]
    Attempt {
        expected_attempts: i32,
        score: f64,
        answers: Option<JsonValue>,
        completed_at: DateTime<Utc>,
    },
    /// Re-assignment: resets the ledger under a new limit.
    #[serde(rename_all = "camelCase")]
    Reissue {
        max_attempts: i32,
        assigned_by: String,
    },
}

impl Record for QuizResult {
    const COLLECTION: Collection = Collection::QuizResults;
    type Id = i64;
    type New = NewQuizResult;
    type Filter = QuizResultFilter;

    fn id(&self) -> &i64 {
        &self.id
    }
}

impl Patchable for QuizResult {
    type Patch = QuizResultPatch;
}
