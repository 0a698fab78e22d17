use super::{LocalPatch, LocalTable};
use crate::model::{
    Course, CourseBlock, CourseBlockFilter, CourseFilter, CoursePatch, Enrollment,
    EnrollmentFilter, NewCourse, NewCourseBlock, NewEnrollment, NewQuizResult, NewUser,
    QuizResult, QuizResultFilter, QuizResultPatch, User, UserFilter, UserPatch,
};
use crate::schema::{course_blocks, courses, enrollments, quiz_results, users};
use crate::store::StorageError;
use chrono::{NaiveDateTime, Utc};
use diesel::dsl::exists;
use diesel::prelude::*;
use diesel::sqlite::Sqlite;
use serde_json::Value as JsonValue;

fn now() -> NaiveDateTime {
    Utc::now().naive_utc()
}

fn malformed(column: &str, reason: impl std::fmt::Display) -> StorageError {
    StorageError::unknown(format!("Malformed {} column: {}", column, reason))
}

// users

#[derive(Queryable, Selectable, Insertable, Debug)]
#[diesel(table_name = users, check_for_backend(Sqlite))]
struct UserRow {
    clerk_id: String,
    role: String,
    email: String,
    name: Option<String>,
    created_at: NaiveDateTime,
}

#[derive(AsChangeset, Debug)]
#[diesel(table_name = users)]
struct UserChangeset {
    role: Option<String>,
    email: Option<String>,
    name: Option<String>,
}

impl TryFrom<UserRow> for User {
    type Error = StorageError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        Ok(User {
            role: row.role.parse().map_err(|e| malformed("role", e))?,
            clerk_id: row.clerk_id,
            email: row.email,
            name: row.name,
            created_at: row.created_at.and_utc(),
        })
    }
}

impl LocalTable for User {
    fn load(conn: &mut SqliteConnection, filter: UserFilter) -> Result<Vec<Self>, StorageError> {
        let mut query = users::table.select(UserRow::as_select()).into_boxed();
        if let Some(clerk_id) = filter.clerk_id {
            query = query.filter(users::clerk_id.eq(clerk_id));
        }
        if let Some(role) = filter.role {
            query = query.filter(users::role.eq(role.as_str()));
        }
        if let Some(email) = filter.email {
            query = query.filter(users::email.eq(email));
        }

        query
            .order(users::clerk_id.asc())
            .load::<UserRow>(conn)?
            .into_iter()
            .map(User::try_from)
            .collect()
    }

    fn insert(conn: &mut SqliteConnection, new: NewUser) -> Result<Self, StorageError> {
        let row = UserRow {
            clerk_id: new.clerk_id,
            role: new.role.as_str().to_string(),
            email: new.email,
            name: new.name,
            created_at: now(),
        };

        diesel::insert_into(users::table)
            .values(&row)
            .returning(UserRow::as_returning())
            .get_result::<UserRow>(conn)?
            .try_into()
    }

    fn remove(conn: &mut SqliteConnection, id: String) -> Result<usize, StorageError> {
        Ok(diesel::delete(users::table.find(id)).execute(conn)?)
    }
}

impl LocalPatch for User {
    fn apply(
        conn: &mut SqliteConnection,
        id: String,
        patch: UserPatch,
    ) -> Result<Self, StorageError> {
        if patch.role.is_none() && patch.email.is_none() && patch.name.is_none() {
            return users::table
                .find(id)
                .select(UserRow::as_select())
                .first::<UserRow>(conn)?
                .try_into();
        }

        let changeset = UserChangeset {
            role: patch.role.map(|role| role.as_str().to_string()),
            email: patch.email,
            name: patch.name,
        };

        diesel::update(users::table.find(id))
            .set(&changeset)
            .returning(UserRow::as_returning())
            .get_result::<UserRow>(conn)?
            .try_into()
    }
}

// courses

#[derive(Queryable, Selectable, Debug)]
#[diesel(table_name = courses, check_for_backend(Sqlite))]
struct CourseRow {
    id: i64,
    title: String,
    description: String,
    resources: String,
    creator_id: String,
    created_at: NaiveDateTime,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = courses)]
struct NewCourseRow {
    title: String,
    description: String,
    resources: String,
    creator_id: String,
    created_at: NaiveDateTime,
}

#[derive(AsChangeset, Debug)]
#[diesel(table_name = courses)]
struct CourseChangeset {
    title: Option<String>,
    description: Option<String>,
    resources: Option<String>,
}

impl TryFrom<CourseRow> for Course {
    type Error = StorageError;

    fn try_from(row: CourseRow) -> Result<Self, Self::Error> {
        Ok(Course {
            id: row.id,
            title: row.title,
            description: row.description,
            resources: serde_json::from_str::<Vec<JsonValue>>(&row.resources)
                .map_err(|e| malformed("resources", e))?,
            creator_id: row.creator_id,
            created_at: row.created_at.and_utc(),
        })
    }
}

impl LocalTable for Course {
    fn load(conn: &mut SqliteConnection, filter: CourseFilter) -> Result<Vec<Self>, StorageError> {
        let mut query = courses::table.select(CourseRow::as_select()).into_boxed();
        if let Some(id) = filter.id {
            query = query.filter(courses::id.eq(id));
        }
        if let Some(creator_id) = filter.creator_id {
            query = query.filter(courses::creator_id.eq(creator_id));
        }

        query
            .order(courses::id.asc())
            .load::<CourseRow>(conn)?
            .into_iter()
            .map(Course::try_from)
            .collect()
    }

    fn insert(conn: &mut SqliteConnection, new: NewCourse) -> Result<Self, StorageError> {
        let row = NewCourseRow {
            title: new.title,
            description: new.description,
            resources: serde_json::to_string(&new.resources)?,
            creator_id: new.creator_id,
            created_at: now(),
        };

        diesel::insert_into(courses::table)
            .values(&row)
            .returning(CourseRow::as_returning())
            .get_result::<CourseRow>(conn)?
            .try_into()
    }

    /// Removes the course together with everything that hangs off it.
    fn remove(conn: &mut SqliteConnection, id: i64) -> Result<usize, StorageError> {
        conn.transaction::<_, StorageError, _>(|tx_conn| {
            diesel::delete(quiz_results::table.filter(quiz_results::course_id.eq(id)))
                .execute(tx_conn)?;
            diesel::delete(enrollments::table.filter(enrollments::course_id.eq(id)))
                .execute(tx_conn)?;
            diesel::delete(course_blocks::table.filter(course_blocks::course_id.eq(id)))
                .execute(tx_conn)?;
            Ok(diesel::delete(courses::table.find(id)).execute(tx_conn)?)
        })
    }
}

impl LocalPatch for Course {
    fn apply(
        conn: &mut SqliteConnection,
        id: i64,
        patch: CoursePatch,
    ) -> Result<Self, StorageError> {
        let changeset = CourseChangeset {
            title: patch.title,
            description: patch.description,
            resources: patch
                .resources
                .map(|resources| serde_json::to_string(&resources))
                .transpose()?,
        };

        if changeset.title.is_none()
            && changeset.description.is_none()
            && changeset.resources.is_none()
        {
            return courses::table
                .find(id)
                .select(CourseRow::as_select())
                .first::<CourseRow>(conn)?
                .try_into();
        }

        diesel::update(courses::table.find(id))
            .set(&changeset)
            .returning(CourseRow::as_returning())
            .get_result::<CourseRow>(conn)?
            .try_into()
    }
}

// enrollments

#[derive(Queryable, Selectable, Debug)]
#[diesel(table_name = enrollments, check_for_backend(Sqlite))]
struct EnrollmentRow {
    id: i64,
    course_id: i64,
    student_id: String,
    created_at: NaiveDateTime,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = enrollments)]
struct NewEnrollmentRow {
    course_id: i64,
    student_id: String,
    created_at: NaiveDateTime,
}

impl From<EnrollmentRow> for Enrollment {
    fn from(row: EnrollmentRow) -> Self {
        Enrollment {
            id: row.id,
            course_id: row.course_id,
            student_id: row.student_id,
            created_at: row.created_at.and_utc(),
        }
    }
}

impl LocalTable for Enrollment {
    fn load(
        conn: &mut SqliteConnection,
        filter: EnrollmentFilter,
    ) -> Result<Vec<Self>, StorageError> {
        let mut query = enrollments::table
            .select(EnrollmentRow::as_select())
            .into_boxed();
        if let Some(course_id) = filter.course_id {
            query = query.filter(enrollments::course_id.eq(course_id));
        }
        if let Some(student_id) = filter.student_id {
            query = query.filter(enrollments::student_id.eq(student_id));
        }

        Ok(query
            .order(enrollments::id.asc())
            .load::<EnrollmentRow>(conn)?
            .into_iter()
            .map(Enrollment::from)
            .collect())
    }

    fn insert(conn: &mut SqliteConnection, new: NewEnrollment) -> Result<Self, StorageError> {
        let row = NewEnrollmentRow {
            course_id: new.course_id,
            student_id: new.student_id,
            created_at: now(),
        };

        Ok(diesel::insert_into(enrollments::table)
            .values(&row)
            .returning(EnrollmentRow::as_returning())
            .get_result::<EnrollmentRow>(conn)?
            .into())
    }

    fn remove(conn: &mut SqliteConnection, id: i64) -> Result<usize, StorageError> {
        Ok(diesel::delete(enrollments::table.find(id)).execute(conn)?)
    }
}

// course blocks

#[derive(Queryable, Selectable, Insertable, Debug)]
#[diesel(table_name = course_blocks, check_for_backend(Sqlite))]
struct CourseBlockRow {
    id: String,
    course_id: i64,
    kind: String,
    position: i32,
    content: String,
}

impl TryFrom<CourseBlockRow> for CourseBlock {
    type Error = StorageError;

    fn try_from(row: CourseBlockRow) -> Result<Self, Self::Error> {
        Ok(CourseBlock {
            kind: row.kind.parse().map_err(|e| malformed("kind", e))?,
            content: serde_json::from_str(&row.content).map_err(|e| malformed("content", e))?,
            id: row.id,
            course_id: row.course_id,
            position: row.position,
        })
    }
}

impl TryFrom<NewCourseBlock> for CourseBlockRow {
    type Error = StorageError;

    fn try_from(block: NewCourseBlock) -> Result<Self, Self::Error> {
        Ok(CourseBlockRow {
            content: serde_json::to_string(&block.content)?,
            kind: block.kind.as_str().to_string(),
            id: block.id,
            course_id: block.course_id,
            position: block.position,
        })
    }
}

impl LocalTable for CourseBlock {
    fn load(
        conn: &mut SqliteConnection,
        filter: CourseBlockFilter,
    ) -> Result<Vec<Self>, StorageError> {
        let mut query = course_blocks::table
            .select(CourseBlockRow::as_select())
            .into_boxed();
        if let Some(id) = filter.id {
            query = query.filter(course_blocks::id.eq(id));
        }
        if let Some(course_id) = filter.course_id {
            query = query.filter(course_blocks::course_id.eq(course_id));
        }

        query
            .order((course_blocks::course_id.asc(), course_blocks::position.asc()))
            .load::<CourseBlockRow>(conn)?
            .into_iter()
            .map(CourseBlock::try_from)
            .collect()
    }

    fn insert(conn: &mut SqliteConnection, new: NewCourseBlock) -> Result<Self, StorageError> {
        let row = CourseBlockRow::try_from(new)?;

        diesel::insert_into(course_blocks::table)
            .values(&row)
            .returning(CourseBlockRow::as_returning())
            .get_result::<CourseBlockRow>(conn)?
            .try_into()
    }

    fn remove(conn: &mut SqliteConnection, id: String) -> Result<usize, StorageError> {
        Ok(diesel::delete(course_blocks::table.find(id)).execute(conn)?)
    }
}

/// Delete-all-then-recreate inside one transaction so readers never see a mix.
pub(super) fn replace_course_blocks(
    conn: &mut SqliteConnection,
    course_id: i64,
    blocks: Vec<NewCourseBlock>,
) -> Result<Vec<CourseBlock>, StorageError> {
    conn.transaction::<_, StorageError, _>(|tx_conn| {
        let course_exists =
            diesel::select(exists(courses::table.find(course_id))).get_result::<bool>(tx_conn)?;
        if !course_exists {
            return Err(StorageError::not_found(format!(
                "Course with ID {} not found",
                course_id
            )));
        }

        diesel::delete(course_blocks::table.filter(course_blocks::course_id.eq(course_id)))
            .execute(tx_conn)?;

        let rows = blocks
            .into_iter()
            .map(|block| CourseBlockRow::try_from(NewCourseBlock { course_id, ..block }))
            .collect::<Result<Vec<_>, _>>()?;

        if !rows.is_empty() {
            diesel::insert_into(course_blocks::table)
                .values(&rows)
                .execute(tx_conn)?;
        }

        CourseBlock::load(tx_conn, CourseBlockFilter::by_course(course_id))
    })
}

// quiz results

#[derive(Queryable, Selectable, Debug)]
#[diesel(table_name = quiz_results, check_for_backend(Sqlite))]
struct QuizResultRow {
    id: i64,
    course_id: i64,
    student_id: String,
    quiz_block_id: String,
    score: Option<f64>,
    answers: Option<String>,
    assigned_by: Option<String>,
    completed_at: Option<NaiveDateTime>,
    attempts: i32,
    max_attempts: i32,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = quiz_results)]
struct NewQuizResultRow {
    course_id: i64,
    student_id: String,
    quiz_block_id: String,
    assigned_by: Option<String>,
    attempts: i32,
    max_attempts: i32,
    created_at: NaiveDateTime,
}

impl TryFrom<QuizResultRow> for QuizResult {
    type Error = StorageError;

    fn try_from(row: QuizResultRow) -> Result<Self, Self::Error> {
        Ok(QuizResult {
            id: row.id,
            course_id: row.course_id,
            student_id: row.student_id,
            quiz_block_id: row.quiz_block_id,
            score: row.score,
            answers: row
                .answers
                .map(|answers| serde_json::from_str(&answers))
                .transpose()
                .map_err(|e| malformed("answers", e))?,
            assigned_by: row.assigned_by,
            completed_at: row.completed_at.map(|at| at.and_utc()),
            attempts: row.attempts,
            max_attempts: row.max_attempts,
        })
    }
}

impl LocalTable for QuizResult {
    fn load(
        conn: &mut SqliteConnection,
        filter: QuizResultFilter,
    ) -> Result<Vec<Self>, StorageError> {
        let mut query = quiz_results::table
            .select(QuizResultRow::as_select())
            .into_boxed();
        if let Some(id) = filter.id {
            query = query.filter(quiz_results::id.eq(id));
        }
        if let Some(course_id) = filter.course_id {
            query = query.filter(quiz_results::course_id.eq(course_id));
        }
        if let Some(student_id) = filter.student_id {
            query = query.filter(quiz_results::student_id.eq(student_id));
        }
        if let Some(quiz_block_id) = filter.quiz_block_id {
            query = query.filter(quiz_results::quiz_block_id.eq(quiz_block_id));
        }

        query
            .order(quiz_results::id.asc())
            .load::<QuizResultRow>(conn)?
            .into_iter()
            .map(QuizResult::try_from)
            .collect()
    }

    fn insert(conn: &mut SqliteConnection, new: NewQuizResult) -> Result<Self, StorageError> {
        let row = NewQuizResultRow {
            course_id: new.course_id,
            student_id: new.student_id,
            quiz_block_id: new.quiz_block_id,
            assigned_by: new.assigned_by,
            attempts: 0,
            max_attempts: new.max_attempts,
            created_at: now(),
        };

        diesel::insert_into(quiz_results::table)
            .values(&row)
            .returning(QuizResultRow::as_returning())
            .get_result::<QuizResultRow>(conn)?
            .try_into()
    }

    fn remove(conn: &mut SqliteConnection, id: i64) -> Result<usize, StorageError> {
        Ok(diesel::delete(quiz_results::table.find(id)).execute(conn)?)
    }
}

impl LocalPatch for QuizResult {
    fn apply(
        conn: &mut SqliteConnection,
        id: i64,
        patch: QuizResultPatch,
    ) -> Result<Self, StorageError> {
        let updated = match patch {
            QuizResultPatch::Attempt {
                expected_attempts,
                score,
                answers,
                completed_at,
            } => {
                let answers = answers
                    .map(|answers| serde_json::to_string(&answers))
                    .transpose()?;

                // compare-and-swap on the attempt counter
                diesel::update(
                    quiz_results::table
                        .filter(quiz_results::id.eq(id))
                        .filter(quiz_results::attempts.eq(expected_attempts))
                        .filter(quiz_results::attempts.lt(quiz_results::max_attempts)),
                )
                .set((
                    quiz_results::attempts.eq(expected_attempts + 1),
                    quiz_results::score.eq(Some(score)),
                    quiz_results::answers.eq(answers),
                    quiz_results::completed_at.eq(Some(completed_at.naive_utc())),
                ))
                .returning(QuizResultRow::as_returning())
                .get_result::<QuizResultRow>(conn)
                .optional()?
            }
            QuizResultPatch::Reissue {
                max_attempts,
                assigned_by,
            } => diesel::update(quiz_results::table.find(id))
                .set((
                    quiz_results::attempts.eq(0),
                    quiz_results::max_attempts.eq(max_attempts),
                    quiz_results::assigned_by.eq(Some(assigned_by)),
                    quiz_results::score.eq(None::<f64>),
                    quiz_results::answers.eq(None::<String>),
                    quiz_results::completed_at.eq(None::<NaiveDateTime>),
                ))
                .returning(QuizResultRow::as_returning())
                .get_result::<QuizResultRow>(conn)
                .optional()?,
        };

        match updated {
            Some(row) => row.try_into(),
            None => {
                let grant_exists = diesel::select(exists(quiz_results::table.find(id)))
                    .get_result::<bool>(conn)?;
                if grant_exists {
                    Err(StorageError::conflict(format!(
                        "Quiz result {} changed concurrently or has no attempts left",
                        id
                    )))
                } else {
                    Err(StorageError::not_found(format!("Quiz result {} not found", id)))
                }
            }
        }
    }
}
