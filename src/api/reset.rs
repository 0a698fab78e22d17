use crate::AppState;
use crate::errors::AppError;
use crate::extract::Json;
use crate::model::{User, UserFilter};
use crate::payloads::reset::{RedeemResetPayload, RequestResetPayload};
use crate::reset::ResetTokenError;
use crate::response::ApiResponse;
use axum::extract::State;
use tracing::{debug, info, instrument, warn};

/// Issues a reset token when the email belongs to a user.
///
/// Always answers `true` so the endpoint does not reveal which emails exist. Delivery
/// of the token happens elsewhere.
#[instrument(skip(state, payload))]
pub async fn request_password_reset(
    State(state): State<AppState>,
    Json(payload): Json<RequestResetPayload>,
) -> Result<ApiResponse<bool>, AppError> {
    let user = state
        .storage
        .find::<User>(UserFilter::by_email(payload.email.clone()))
        .await?;

    match user {
        Some(user) => {
            let token = state.reset_tokens.issue(&user.email);
            info!("Issued password reset token for user {}", user.clerk_id);
            debug!("Reset token for {}: {}", user.email, token);
        }
        None => debug!("No user with email {}, no reset token issued", payload.email),
    }

    Ok(ApiResponse::ok(true))
}

/// Redeems a reset token, returning the email it was issued for.
///
/// Returns (wrapped in `ApiResponse`)
/// * `String`: The email (200 OK).
/// * `403 Forbidden`: If the token expired.
/// * `404 Not Found`: If the token is unknown or already used.
#[instrument(skip(state, payload))]
pub async fn redeem_password_reset(
    State(state): State<AppState>,
    Json(payload): Json<RedeemResetPayload>,
) -> Result<ApiResponse<String>, AppError> {
    match state.reset_tokens.redeem(&payload.token) {
        Ok(email) => {
            info!("Reset token redeemed");
            Ok(ApiResponse::ok(email))
        }
        Err(e @ ResetTokenError::Unknown) => {
            warn!("Attempt to redeem an unknown reset token");
            Err(AppError::NotFound(e.to_string()))
        }
        Err(e @ ResetTokenError::Expired) => {
            warn!("Attempt to redeem an expired reset token");
            Err(AppError::Forbidden(e.to_string()))
        }
    }
}
