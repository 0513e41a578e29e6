//! REST endpoints for the wizard, the admin layout editor and the user listing.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use secrecy::SecretString;
use serde::Deserialize;
use tokio::sync::{Mutex, RwLock};
use tower_http::cors::{Any, CorsLayer};
use uuid::Uuid;

use super::admin::{CommitError, CommitReport, DraftView, LayoutDraft, Proposal};
use super::engine::{StepEngine, StepView};
use super::listing::{UserListingPage, list_users};
use super::memory::SettingsDeviceMemory;
use super::model::{ComponentName, PageNumber, ProfileField};
use super::state::WizardSession;
use crate::error::{ConfigError, DatabaseError, WizardError};
use crate::store::Database;

/// Devices idle this long are dropped from memory; their progress is
/// already in the store and reloads on the next request.
pub const SESSION_IDLE_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// One device's wizard: its engine plus the session once loaded.
struct DeviceSlot {
    engine: StepEngine,
    session: Option<WizardSession>,
    last_used: Instant,
}

type SlotHandle = Arc<Mutex<DeviceSlot>>;

/// Shared state for all routes.
#[derive(Clone)]
pub struct AppState {
    db: Arc<dyn Database>,
    devices: Arc<RwLock<HashMap<Uuid, SlotHandle>>>,
    layout: Arc<LayoutDraft>,
    idle_timeout: Duration,
}

impl AppState {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self::with_idle_timeout(db, SESSION_IDLE_TIMEOUT)
    }

    pub fn with_idle_timeout(db: Arc<dyn Database>, idle_timeout: Duration) -> Self {
        Self {
            layout: Arc::new(LayoutDraft::new(Arc::clone(&db))),
            devices: Arc::new(RwLock::new(HashMap::new())),
            idle_timeout,
            db,
        }
    }

    async fn slot(&self, device_id: Uuid) -> SlotHandle {
        if let Some(slot) = self.devices.read().await.get(&device_id) {
            return Arc::clone(slot);
        }
        let mut devices = self.devices.write().await;
        // Slots in use are locked and always kept.
        let before = devices.len();
        devices.retain(|_, slot| match slot.try_lock() {
            Ok(idle) => idle.last_used.elapsed() < self.idle_timeout,
            Err(_) => true,
        });
        if devices.len() < before {
            tracing::debug!(evicted = before - devices.len(), "Dropped idle device sessions");
        }
        let slot = devices.entry(device_id).or_insert_with(|| {
            let memory = Arc::new(SettingsDeviceMemory::new(
                Arc::clone(&self.db),
                device_id.to_string(),
            ));
            Arc::new(Mutex::new(DeviceSlot {
                engine: StepEngine::new(Arc::clone(&self.db), memory),
                session: None,
                last_used: Instant::now(),
            }))
        });
        Arc::clone(slot)
    }

    /// Forget a finished device so its slot does not outlive the wizard.
    async fn release(&self, device_id: Uuid) {
        if self.devices.write().await.remove(&device_id).is_some() {
            tracing::debug!(%device_id, "Device session released");
        }
    }
}

/// Build the router with every wizard, admin and listing route.
pub fn wizard_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/wizard/{device_id}", get(load_session))
        .route("/api/wizard/{device_id}/fields", put(set_field))
        .route("/api/wizard/{device_id}/identify", post(identify))
        .route("/api/wizard/{device_id}/advance", post(advance))
        .route("/api/wizard/{device_id}/back", post(back))
        .route("/api/wizard/{device_id}/complete", post(complete))
        .route("/api/admin/layout", get(get_layout))
        .route("/api/admin/layout/assign", post(assign_component))
        .route("/api/admin/layout/commit", post(commit_layout))
        .route("/api/admin/layout/reset", post(reset_layout))
        .route("/api/users", get(get_users))
        .with_state(state)
}

/// CORS for the configured origin; `*` allows any.
pub fn cors_layer(origin: &str) -> Result<CorsLayer, ConfigError> {
    if origin == "*" {
        return Ok(CorsLayer::permissive());
    }
    let origin = HeaderValue::from_str(origin).map_err(|e| ConfigError::InvalidValue {
        key: "WIZARD_CORS_ORIGIN".to_string(),
        message: e.to_string(),
    })?;
    Ok(CorsLayer::new()
        .allow_origin(origin)
        .allow_methods(Any)
        .allow_headers(Any))
}

// ── Errors ──────────────────────────────────────────────────────────────

enum ApiError {
    BadRequest(String),
    Wizard(WizardError),
    Database(DatabaseError),
    Commit(CommitError),
}

impl From<WizardError> for ApiError {
    fn from(e: WizardError) -> Self {
        Self::Wizard(e)
    }
}

impl From<DatabaseError> for ApiError {
    fn from(e: DatabaseError) -> Self {
        Self::Database(e)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<CommitError> for ApiError {
    fn from(e: CommitError) -> Self {
        Self::Commit(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::Wizard(e) => {
                let status = match &e {
                    WizardError::Validation(_) => StatusCode::BAD_REQUEST,
                    WizardError::InvalidTransition { .. }
                    | WizardError::NoUser
                    | WizardError::Busy => StatusCode::CONFLICT,
                    WizardError::Database(_)
                    | WizardError::ProfileWrite { .. }
                    | WizardError::StepWrite { .. }
                    | WizardError::DeviceMemory(_) => StatusCode::SERVICE_UNAVAILABLE,
                };
                (status, e.to_string())
            }
            Self::Database(e) => (StatusCode::SERVICE_UNAVAILABLE, e.to_string()),
            Self::Commit(CommitError::Validation(e)) => (StatusCode::BAD_REQUEST, e.to_string()),
            Self::Commit(CommitError::Database(e)) => {
                (StatusCode::SERVICE_UNAVAILABLE, e.to_string())
            }
        };
        if status.is_server_error() {
            tracing::warn!(status = status.as_u16(), error = %message, "Request failed");
        }
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

fn parse_device_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::BadRequest("Invalid device ID".to_string()))
}

// ── Health ──────────────────────────────────────────────────────────────

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "onboarding-wizard"
    }))
}

// ── Wizard ──────────────────────────────────────────────────────────────

type SessionFuture<'a> = Pin<Box<dyn Future<Output = Result<(), WizardError>> + Send + 'a>>;

/// Run `action` against the device's session, loading it first if needed.
///
/// Only one request per device runs at a time; overlapping ones get `Busy`.
async fn with_session<F>(state: &AppState, raw_id: &str, action: F) -> Result<Json<StepView>, ApiError>
where
    F: for<'a> FnOnce(&'a StepEngine, &'a mut WizardSession) -> SessionFuture<'a>,
{
    let device_id = parse_device_id(raw_id)?;
    let slot = state.slot(device_id).await;
    let mut guard = slot.try_lock().map_err(|_| WizardError::Busy)?;
    guard.last_used = Instant::now();
    let DeviceSlot {
        engine, session, ..
    } = &mut *guard;

    let loaded = match session.take() {
        Some(existing) => existing,
        None => engine.load().await?,
    };
    let session = session.insert(loaded);
    action(engine, session).await?;
    let view = engine.view(session);
    if view.done {
        state.release(device_id).await;
    }
    Ok(Json(view))
}

/// Load (or reload) the session from the store, like opening the page.
async fn load_session(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
) -> Result<Json<StepView>, ApiError> {
    let device_id = parse_device_id(&device_id)?;
    let slot = state.slot(device_id).await;
    let mut guard = slot.try_lock().map_err(|_| WizardError::Busy)?;
    guard.last_used = Instant::now();
    let session = guard.engine.load().await?;
    let view = guard.engine.view(&session);
    if view.done {
        state.release(device_id).await;
    } else {
        guard.session = Some(session);
    }
    Ok(Json(view))
}

#[derive(Deserialize)]
struct FieldRequest {
    field: ProfileField,
    value: String,
}

async fn set_field(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
    body: Result<Json<FieldRequest>, JsonRejection>,
) -> Result<Json<StepView>, ApiError> {
    let Json(body) = body?;
    with_session(&state, &device_id, move |engine, session| {
        Box::pin(async move { engine.set_field(session, body.field, body.value) })
    })
    .await
}

#[derive(Deserialize)]
struct IdentifyRequest {
    email: String,
    password: String,
}

async fn identify(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
    body: Result<Json<IdentifyRequest>, JsonRejection>,
) -> Result<Json<StepView>, ApiError> {
    let Json(body) = body?;
    let password = SecretString::from(body.password);
    let email = body.email;
    with_session(&state, &device_id, move |engine, session| {
        Box::pin(async move { engine.identify(session, &email, &password).await })
    })
    .await
}

async fn advance(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
) -> Result<Json<StepView>, ApiError> {
    with_session(&state, &device_id, |engine, session| {
        Box::pin(engine.advance(session))
    })
    .await
}

async fn back(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
) -> Result<Json<StepView>, ApiError> {
    with_session(&state, &device_id, |engine, session| Box::pin(engine.back(session))).await
}

async fn complete(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
) -> Result<Json<StepView>, ApiError> {
    with_session(&state, &device_id, |engine, session| {
        Box::pin(engine.complete(session))
    })
    .await
}

// ── Admin layout ────────────────────────────────────────────────────────

async fn get_layout(State(state): State<AppState>) -> Result<Json<DraftView>, ApiError> {
    Ok(Json(state.layout.current().await?))
}

#[derive(Deserialize)]
struct AssignRequest {
    component: ComponentName,
    page: PageNumber,
}

async fn assign_component(
    State(state): State<AppState>,
    body: Result<Json<AssignRequest>, JsonRejection>,
) -> Result<Json<Proposal>, ApiError> {
    let Json(body) = body?;
    Ok(Json(state.layout.propose(body.component, body.page).await?))
}

async fn commit_layout(State(state): State<AppState>) -> Result<Response, ApiError> {
    let report: CommitReport = state.layout.commit().await?;
    let status = if report.is_complete() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    Ok((status, Json(report)).into_response())
}

async fn reset_layout(State(state): State<AppState>) -> Result<Json<DraftView>, ApiError> {
    Ok(Json(state.layout.reload().await?))
}

// ── Listing ─────────────────────────────────────────────────────────────

async fn get_users(State(state): State<AppState>) -> Result<Json<UserListingPage>, ApiError> {
    Ok(Json(list_users(state.db.as_ref()).await?))
}
