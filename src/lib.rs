use crate::cli::Args;
use crate::gateway::GatewayState;
use crate::reset::ResetTokens;
use crate::store::{LocalStore, RemoteStore, Storage};
use anyhow::{Context, anyhow};
use axum::Router;
use axum::routing::{delete, get, patch, post};
use std::time::Duration;
use tracing::info;

pub mod auth;
pub mod cli;
pub mod enrich;
pub mod gateway;
pub mod model;
pub mod payloads;
pub mod quiz;
pub mod reset;
pub mod response;
pub mod schema;
pub mod store;

mod api;
mod errors;
mod extract;

pub use errors::AppError;

/// Shared by every request; fixed after start-up.
#[derive(Clone)]
pub struct AppState {
    pub storage: Storage,
    pub reset_tokens: ResetTokens,
}

pub async fn init_router(args: &Args) -> anyhow::Result<(Router, AppState)> {
    info!("Initializing storage backend...");
    let storage = init_storage(args)
        .await
        .context("Failed to initialize storage")?;

    let state = AppState {
        storage,
        reset_tokens: ResetTokens::new(chrono::Duration::seconds(args.reset_token_ttl_secs)),
    };

    info!("Initializing router...");
    Ok((init_router_internal(state.clone()), state))
}

pub async fn init_gateway_router(args: &Args) -> anyhow::Result<Router> {
    let secret = args
        .remote_store_secret
        .as_deref()
        .ok_or_else(|| anyhow!("REMOTE_STORE_SECRET is required to run the gateway"))?;

    info!("Initializing local store for the gateway...");
    let store = init_local_store(args).await?;

    Ok(gateway::gateway_routes(GatewayState::new(store, secret)))
}

pub fn init_test_router(storage: Storage) -> Router {
    init_router_internal(AppState {
        storage,
        reset_tokens: ResetTokens::new(chrono::Duration::hours(1)),
    })
}

/// Picks the backend once: the remote gateway when a URL is configured, the local
/// database otherwise.
async fn init_storage(args: &Args) -> anyhow::Result<Storage> {
    let timeout = Duration::from_secs(args.storage_timeout_secs);

    match &args.remote_store_url {
        Some(url) => {
            let secret = args
                .remote_store_secret
                .clone()
                .ok_or_else(|| anyhow!("REMOTE_STORE_SECRET is required with REMOTE_STORE_URL"))?;
            info!("Using remote store at {}", url);
            let store = RemoteStore::new(url.clone(), secret, timeout)?;
            Ok(Storage::remote(store, timeout))
        }
        None => {
            info!("Using local store at {}", args.database_url);
            let store = init_local_store(args).await?;
            Ok(Storage::local(store))
        }
    }
}

async fn init_local_store(args: &Args) -> anyhow::Result<LocalStore> {
    let timeout = Duration::from_secs(args.storage_timeout_secs);
    let store = LocalStore::connect(&args.database_url, args.db_pool_max_size, timeout)
        .context("Failed to initialize database pool")?;
    store
        .migrate()
        .await
        .context("Failed to apply database schema")?;
    Ok(store)
}

fn init_router_internal(state: AppState) -> Router {
    Router::new()
        .merge(user_routes())
        .merge(course_routes())
        .merge(quiz_routes())
        .merge(reset_routes())
        .with_state(state)
}

fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/users", post(api::users::create_user))
        .route("/users/{clerk_id}", delete(api::users::delete_user))
        .route("/users/{clerk_id}/role", patch(api::users::update_role))
}

fn course_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/courses",
            get(api::courses::list_courses).post(api::courses::create_course),
        )
        .route(
            "/courses/{course_id}",
            patch(api::courses::update_course).delete(api::courses::delete_course),
        )
        .route(
            "/courses/{course_id}/students",
            post(api::courses::enroll_students),
        )
        .route(
            "/courseblocks",
            get(api::courses::get_course_blocks).put(api::courses::save_course_blocks),
        )
        .route("/enrollments", get(api::courses::list_enrollments))
}

fn quiz_routes() -> Router<AppState> {
    Router::new()
        .route("/quiz-assignments", post(api::quiz::assign_quiz))
        .route(
            "/quiz-results",
            get(api::quiz::list_quiz_results).post(api::quiz::submit_quiz_result),
        )
}

fn reset_routes() -> Router<AppState> {
    Router::new()
        .route("/password-reset", post(api::reset::request_password_reset))
        .route(
            "/password-reset/redeem",
            post(api::reset::redeem_password_reset),
        )
}
