use std::hash::{Hash, Hasher};
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Request, State};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use chrono::Utc;
use revise_core::ai::{
    DeckGenerationRequest, DeckGenerationResponse, DistractorRequest, DistractorResponse,
};
use revise_core::sync::{SyncRequest, SyncResponse};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::ai::GeminiClient;
use crate::auth::{extract_bearer_token, AuthenticatedUser, IdentityJwtVerifier};
use crate::config::AppConfig;
use crate::error::AppError;
use crate::rate_limit::{EndpointRateLimiter, ProtectedEndpoint, RateLimitMetricsSnapshot};
use crate::store::{SyncStore, UserProfile};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    store: SyncStore,
    jwt_verifier: Arc<IdentityJwtVerifier>,
    gemini: Arc<GeminiClient>,
    endpoint_rate_limiter: Arc<EndpointRateLimiter>,
}

impl AppState {
    pub fn from_config(config: Arc<AppConfig>) -> Result<Self, AppError> {
        let store = SyncStore::open(&config.database_path)?;
        Self::new(config, store)
    }

    pub fn new(config: Arc<AppConfig>, store: SyncStore) -> Result<Self, AppError> {
        Ok(Self {
            store,
            jwt_verifier: Arc::new(IdentityJwtVerifier::new(&config)),
            gemini: Arc::new(GeminiClient::new(config.gemini.clone())?),
            endpoint_rate_limiter: Arc::new(EndpointRateLimiter::from_config(config.as_ref())),
            config,
        })
    }
}

pub fn app_router(state: AppState) -> Router {
    let protected_routes = Router::new()
        .route("/sync", post(sync))
        .route("/profile", get(profile))
        .route("/ai/deck", post(generate_deck))
        .route("/ai/distractors", post(generate_distractors))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .route("/healthz", get(healthz))
        .nest("/v1", protected_routes)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_headers(Any)
                .allow_methods(Any),
        )
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp: i64,
    rate_limit: RateLimitMetricsSnapshot,
}

async fn healthz(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        timestamp: Utc::now().timestamp(),
        rate_limit: state.endpoint_rate_limiter.metrics_snapshot(),
    })
}

async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = extract_bearer_token(request.headers())?;
    let user = state.jwt_verifier.verify_access_token(token)?;
    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| AppError::bad_request(rejection.body_text()))
}

async fn sync(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    payload: Result<Json<SyncRequest>, JsonRejection>,
) -> Result<Json<SyncResponse>, AppError> {
    state
        .endpoint_rate_limiter
        .check(ProtectedEndpoint::Sync, &user.user_id)
        .await?;
    let request = json_body(payload)?;

    let pushed = request.pushed();
    if pushed > state.config.max_sync_batch {
        return Err(AppError::bad_request(format!(
            "Sync batch of {pushed} records exceeds the limit of {}",
            state.config.max_sync_batch
        )));
    }

    let user_hash = user_fingerprint(&user.user_id);
    let response = state.store.apply_sync(&user.user_id, request).await?;
    tracing::info!(
        endpoint = "sync",
        user = user_hash,
        pushed,
        pulled_decks = response.updated_decks.len(),
        pulled_states = response.updated_knowledge_states.len(),
        new_timestamp = %response.new_timestamp,
        "Applied sync round"
    );
    Ok(Json(response))
}

async fn profile(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
) -> Result<Json<UserProfile>, AppError> {
    state
        .endpoint_rate_limiter
        .check(ProtectedEndpoint::Profile, &user.user_id)
        .await?;
    let profile = state
        .store
        .get_or_create_profile(&user.user_id, user.email.as_deref())
        .await?;
    Ok(Json(profile))
}

async fn generate_deck(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    payload: Result<Json<DeckGenerationRequest>, JsonRejection>,
) -> Result<Json<DeckGenerationResponse>, AppError> {
    state
        .endpoint_rate_limiter
        .check(ProtectedEndpoint::Generation, &user.user_id)
        .await?;
    let request = json_body(payload)?;

    let flashcard_text = state
        .gemini
        .generate_flashcard_text(&request.documents)
        .await?;
    tracing::info!(
        endpoint = "ai_deck",
        user = user_fingerprint(&user.user_id),
        documents = request.documents.len(),
        "Generated flashcards"
    );
    Ok(Json(DeckGenerationResponse { flashcard_text }))
}

async fn generate_distractors(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    payload: Result<Json<DistractorRequest>, JsonRejection>,
) -> Result<Json<DistractorResponse>, AppError> {
    state
        .endpoint_rate_limiter
        .check(ProtectedEndpoint::Generation, &user.user_id)
        .await?;
    let request = json_body(payload)?;

    let distractors = state
        .gemini
        .generate_distractors(&request.question, &request.answer)
        .await?;
    tracing::info!(
        endpoint = "ai_distractors",
        user = user_fingerprint(&user.user_id),
        count = distractors.len(),
        "Generated distractors"
    );
    Ok(Json(DistractorResponse { distractors }))
}

pub fn user_fingerprint(user_id: &str) -> u64 {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    user_id.hash(&mut hasher);
    hasher.finish()
}
