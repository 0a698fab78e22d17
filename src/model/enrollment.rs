use crate::store::{Collection, Record};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A student's membership in a course. Duplicate rows for the same pair are tolerated.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Enrollment {
    pub id: i64,
    pub course_id: i64,
    pub student_id: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct NewEnrollment {
    pub course_id: i64,
    pub student_id: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct EnrollmentFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub course_id: Option<i64>,
    #[serde(rename = "clerkId", skip_serializing_if = "Option::is_none")]
    pub student_id: Option<String>,
}

impl EnrollmentFilter {
    pub fn by_course(course_id: i64) -> Self {
        Self {
            course_id: Some(course_id),
            ..Default::default()
        }
    }

    pub fn by_student(student_id: impl Into<String>) -> Self {
        Self {
            student_id: Some(student_id.into()),
            ..Default::default()
        }
    }

    pub fn membership(course_id: i64, student_id: impl Into<String>) -> Self {
        Self {
            course_id: Some(course_id),
            student_id: Some(student_id.into()),
        }
    }
}

impl Record for Enrollment {
    const COLLECTION: Collection = Collection::Enrollments;
    type Id = i64;
    type New = NewEnrollment;
    type Filter = EnrollmentFilter;

    fn id(&self) -> &i64 {
        &self.id
    }
}
