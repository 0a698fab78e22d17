//! Remote store gateway: the HTTP side of the remote backend's wire contract, served
//! over a local store.
//!
//! Every call must carry the shared secret in `x-api-secret`; anything else gets a
//! uniform 401. Conditional writes (the attempt compare-and-swap) are evaluated here,
//! server side.

use crate::model::{Course, CourseBlock, Enrollment, NewCourseBlock, QuizResult, User};
use crate::store::remote::{Created, Deleted, Failure, SECRET_HEADER, Updated};
use crate::store::{LocalPatch, LocalStore, LocalTable, Record, StorageError, StorageErrorKind};
use axum::extract::{Path, Query, Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, patch};
use axum::{Json, Router};
use serde::Deserialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

#[derive(Clone)]
pub struct GatewayState {
    store: LocalStore,
    secret: Arc<str>,
}

impl GatewayState {
    pub fn new(store: LocalStore, secret: &str) -> Self {
        Self {
            store,
            secret: Arc::from(secret),
        }
    }
}

#[derive(Debug, Error)]
enum GatewayError {
    #[error("unauthorized")]
    Unauthorized,

    #[error("{0}")]
    Storage(#[from] StorageError),
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = match &self {
            GatewayError::Unauthorized => StatusCode::UNAUTHORIZED,
            GatewayError::Storage(e) => match e.kind {
                StorageErrorKind::NotFound => StatusCode::NOT_FOUND,
                StorageErrorKind::Conflict => StatusCode::CONFLICT,
                StorageErrorKind::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
                StorageErrorKind::Unknown => {
                    error!("Gateway storage failure: {}", e);
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
        };
        let error = match self {
            GatewayError::Unauthorized => "unauthorized".to_string(),
            GatewayError::Storage(e) => e.message,
        };

        (
            status,
            Json(Failure {
                success: false,
                error,
            }),
        )
            .into_response()
    }
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct ReplaceBlocksParams {
    course_id: i64,
}

pub fn gateway_routes(state: GatewayState) -> Router {
    Router::new()
        .route(&collection::<User>(), get(list::<User>).post(create::<User>))
        .route(&item::<User>(), patch(update::<User>).delete(remove::<User>))
        .route(&collection::<Course>(), get(list::<Course>).post(create::<Course>))
        .route(
            &item::<Course>(),
            patch(update::<Course>).delete(remove::<Course>),
        )
        .route(
            &collection::<CourseBlock>(),
            get(list::<CourseBlock>)
                .post(create::<CourseBlock>)
                .put(replace_blocks),
        )
        .route(
            &collection::<Enrollment>(),
            get(list::<Enrollment>).post(create::<Enrollment>),
        )
        .route(
            &collection::<QuizResult>(),
            get(list::<QuizResult>).post(create::<QuizResult>),
        )
        .route(&item::<QuizResult>(), patch(update::<QuizResult>))
        .layer(middleware::from_fn_with_state(state.clone(), require_secret))
        .with_state(state)
}

fn collection<R: Record>() -> String {
    format!("/{}", R::COLLECTION.path())
}

fn item<R: Record>() -> String {
    format!("/{}/{{id}}", R::COLLECTION.path())
}

async fn require_secret(
    State(state): State<GatewayState>,
    request: Request,
    next: Next,
) -> Response {
    let presented = request
        .headers()
        .get(SECRET_HEADER)
        .and_then(|value| value.to_str().ok());

    if presented != Some(state.secret.as_ref()) {
        warn!(
            "Rejecting {} {}: missing or wrong shared secret",
            request.method(),
            request.uri().path()
        );
        return GatewayError::Unauthorized.into_response();
    }

    next.run(request).await
}

async fn list<R: LocalTable>(
    State(state): State<GatewayState>,
    Query(filter): Query<R::Filter>,
) -> Result<Json<Vec<R>>, GatewayError> {
    let records = state.store.fetch::<R>(filter).await?;
    debug!("Gateway listed {} {} records", records.len(), R::COLLECTION);
    Ok(Json(records))
}

async fn create<R: LocalTable>(
    State(state): State<GatewayState>,
    Json(new): Json<R::New>,
) -> Result<(StatusCode, Json<Created<R>>), GatewayError> {
    let record = state.store.create::<R>(new).await?;
    let id = serde_json::to_value(record.id()).map_err(StorageError::from)?;
    info!("Gateway created {} record {}", R::COLLECTION, record.id());

    Ok((
        StatusCode::CREATED,
        Json(Created {
            success: true,
            id,
            record,
        }),
    ))
}

async fn update<R: LocalPatch>(
    State(state): State<GatewayState>,
    Path(id): Path<R::Id>,
    Json(patch): Json<R::Patch>,
) -> Result<Json<Updated<R>>, GatewayError> {
    let record = state.store.update::<R>(id, patch).await?;
    info!("Gateway updated {} record {}", R::COLLECTION, record.id());

    Ok(Json(Updated {
        success: true,
        record,
    }))
}

async fn remove<R: LocalTable>(
    State(state): State<GatewayState>,
    Path(id): Path<R::Id>,
) -> Result<Json<Deleted>, GatewayError> {
    info!("Gateway deleting {} record {}", R::COLLECTION, id);
    state.store.delete::<R>(id).await?;
    Ok(Json(Deleted { success: true }))
}

#[instrument(skip(state, blocks))]
async fn replace_blocks(
    State(state): State<GatewayState>,
    Query(params): Query<ReplaceBlocksParams>,
    Json(blocks): Json<Vec<NewCourseBlock>>,
) -> Result<Json<Vec<CourseBlock>>, GatewayError> {
    let saved = state.store.replace_blocks(params.course_id, blocks).await?;
    info!(
        "Gateway replaced blocks of course {} ({} blocks)",
        params.course_id,
        saved.len()
    );
    Ok(Json(saved))
}
