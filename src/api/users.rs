use crate::AppState;
use crate::auth::{self, Caller};
use crate::errors::AppError;
use crate::extract::{Json, Path};
use crate::model::{NewUser, Role, User, UserPatch};
use crate::payloads::users::{CreateUserPayload, UpdateRolePayload};
use crate::response::ApiResponse;
use axum::extract::State;
use tracing::{debug, info, instrument, warn};

/// Mirrors a user created by the identity provider.
///
/// Request Body: `CreateUserPayload`
///
/// Returns (wrapped in `ApiResponse`)
/// * `User`: The stored user (200 OK).
/// * `400 Bad Request`: If the identity key or email is blank.
/// * `409 Conflict`: If a user with this identity key already exists.
/// * `500 Internal Server Error`: If the storage backend fails.
#[instrument(skip(state, payload))]
pub async fn create_user(
    State(state): State<AppState>,
    Json(payload): Json<CreateUserPayload>,
) -> Result<ApiResponse<User>, AppError> {
    info!("Mirroring new user {}", payload.clerk_id);
    debug!("Create user payload: {:?}", payload);

    if payload.clerk_id.trim().is_empty() || payload.email.trim().is_empty() {
        return Err(AppError::BadRequest(
            "clerkId and email are required".to_string(),
        ));
    }

    let clerk_id = payload.clerk_id.clone();
    let created = state
        .storage
        .create::<User>(NewUser {
            clerk_id: payload.clerk_id,
            role: payload.role,
            email: payload.email,
            name: payload.name,
        })
        .await;

    match created {
        Ok(user) => {
            info!("User {} stored with role {}", user.clerk_id, user.role);
            Ok(ApiResponse::ok(user))
        }
        Err(e) if e.is_conflict() => {
            warn!("User {} already exists: {}", clerk_id, e);
            Err(AppError::Conflict(format!("User {} already exists", clerk_id)))
        }
        Err(e) => Err(e.into()),
    }
}

/// Mirrors a user deletion. Rows that refer to the user stay and are hidden on read.
///
/// Returns (wrapped in `ApiResponse`)
/// * `bool`: true if the user was removed (200 OK).
/// * `404 Not Found`: If no such user exists.
/// * `500 Internal Server Error`: If the storage backend fails.
#[instrument(skip(state))]
pub async fn delete_user(
    State(state): State<AppState>,
    Path(clerk_id): Path<String>,
) -> Result<ApiResponse<bool>, AppError> {
    info!("Removing mirrored user {}", clerk_id);

    match state.storage.delete::<User>(clerk_id.clone()).await {
        Ok(()) => Ok(ApiResponse::ok(true)),
        Err(e) if e.is_not_found() => Err(AppError::NotFound(format!(
            "User {} not found",
            clerk_id
        ))),
        Err(e) => Err(e.into()),
    }
}

/// Changes a user's role. Only an admin may do this.
///
/// Request Body: `UpdateRolePayload`
///
/// Returns (wrapped in `ApiResponse`)
/// * `User`: The updated user (200 OK).
/// * `401 Unauthorized`: If the identity header is missing.
/// * `403 Forbidden`: If the caller is not an admin.
/// * `404 Not Found`: If the target user does not exist.
#[instrument(skip(state, payload))]
pub async fn update_role(
    State(state): State<AppState>,
    caller: Caller,
    Path(clerk_id): Path<String>,
    Json(payload): Json<UpdateRolePayload>,
) -> Result<ApiResponse<User>, AppError> {
    let admin = auth::require_role(&state.storage, &caller, Role::Admin).await?;
    info!(
        "Admin {} setting role of {} to {}",
        admin.clerk_id, clerk_id, payload.role
    );

    let patch = UserPatch {
        role: Some(payload.role),
        ..Default::default()
    };
    match state.storage.update::<User>(clerk_id.clone(), patch).await {
        Ok(user) => Ok(ApiResponse::ok(user)),
        Err(e) if e.is_not_found() => Err(AppError::NotFound(format!(
            "User {} not found",
            clerk_id
        ))),
        Err(e) => Err(e.into()),
    }
}
