//! Role resolution for callers identified by the `x-user-id` header.
//!
//! Identity is established upstream; this layer only looks the caller up in the store.

use crate::errors::AppError;
use crate::model::{Course, CourseFilter, Role, User, UserFilter};
use crate::store::Storage;
use axum::extract::{FromRequestParts, OptionalFromRequestParts};
use axum::http::request::Parts;
use std::convert::Infallible;
use tracing::{debug, warn};

pub const IDENTITY_HEADER: &str = "x-user-id";

/// Identity key of the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller(pub String);

impl Caller {
    pub fn id(&self) -> &str {
        &self.0
    }

    fn from_parts(parts: &Parts) -> Option<Self> {
        parts
            .headers
            .get(IDENTITY_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(|value| Caller(value.to_string()))
    }
}

impl<S: Send + Sync> FromRequestParts<S> for Caller {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Caller::from_parts(parts).ok_or_else(|| {
            AppError::Unauthorized(format!("Missing {} header", IDENTITY_HEADER))
        })
    }
}

impl<S: Send + Sync> OptionalFromRequestParts<S> for Caller {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> Result<Option<Self>, Self::Rejection> {
        Ok(Caller::from_parts(parts))
    }
}

/// Looks up the caller's user record. `None` when the identity does not resolve.
pub async fn resolve(storage: &Storage, caller: &Caller) -> Result<Option<User>, AppError> {
    let user = storage.find::<User>(UserFilter::by_id(caller.id())).await?;
    debug!(
        "Resolved caller {} to role {:?}",
        caller.id(),
        user.as_ref().map(|u| u.role)
    );
    Ok(user)
}

/// Resolves the caller and requires `role`. An unknown caller is treated like a role mismatch.
pub async fn require_role(
    storage: &Storage,
    caller: &Caller,
    role: Role,
) -> Result<User, AppError> {
    match resolve(storage, caller).await? {
        Some(user) if user.role == role => Ok(user),
        Some(user) => {
            warn!(
                "Caller {} has role {} but {} is required",
                caller.id(),
                user.role,
                role
            );
            Err(AppError::Forbidden(format!("Only a {} may do this", role)))
        }
        None => {
            warn!("Caller {} does not resolve to a user", caller.id());
            Err(AppError::Forbidden(format!("Only a {} may do this", role)))
        }
    }
}

pub async fn require_teacher(storage: &Storage, caller: &Caller) -> Result<User, AppError> {
    require_role(storage, caller, Role::Teacher).await
}

/// Loads the course and requires `teacher` to be its creator.
pub async fn require_course_owner(
    storage: &Storage,
    teacher: &User,
    course_id: i64,
) -> Result<Course, AppError> {
    let course = require_course(storage, course_id).await?;
    if course.creator_id != teacher.clerk_id {
        warn!(
            "Teacher {} is not the creator of course {}",
            teacher.clerk_id, course_id
        );
        return Err(AppError::Forbidden(format!(
            "Course {} belongs to another teacher",
            course_id
        )));
    }
    Ok(course)
}

pub async fn require_course(storage: &Storage, course_id: i64) -> Result<Course, AppError> {
    storage
        .find::<Course>(CourseFilter::by_id(course_id))
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Course with ID {} not found", course_id)))
}
