// 🌐 REST API (axum) over the register
//
// Guard terminals talk to /api/sessions: the session keeps the last lookup so
// the confirm call can only log what was just authorized. Admin screens use
// the vehicle, entry, stats and export routes.

use crate::clock::{parse_date, Clock};
use crate::error::AccessError;
use crate::export::{export_filename, write_entries_csv, write_vehicles_csv, ExportKind};
use crate::ledger::{entries_between, entries_for_plate, entries_on, Entry, EntryCategory, EntryView};
use crate::session::{GuardSession, LookupOutcome};
use crate::stats::{aggregate, daily_summary, DailySummary, EntryStats, StatsPeriod};
use crate::vehicles::{
    get_vehicle, list_active_vehicles, list_all_vehicles, lookup_vehicle, register_vehicle,
    set_vehicle_status, NewVehicle, Vehicle, VehicleFilter, VehicleStatus,
};
use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::NaiveDate;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use thiserror::Error;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

/// Sessions nobody touched for this long are dropped
pub const DEFAULT_SESSION_IDLE: Duration = Duration::from_secs(12 * 60 * 60);

struct SessionSlot {
    session: GuardSession,
    last_used: Instant,
}

type SessionMap = HashMap<Uuid, SessionSlot>;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    db: Arc<Mutex<Connection>>,
    clock: Arc<dyn Clock>,
    sessions: Arc<Mutex<SessionMap>>,
    session_idle: Duration,
    top_vehicles: usize,
}

impl AppState {
    pub fn new(conn: Connection, clock: Arc<dyn Clock>, top_vehicles: usize) -> Self {
        Self {
            db: Arc::new(Mutex::new(conn)),
            clock,
            sessions: Arc::new(Mutex::new(HashMap::new())),
            session_idle: DEFAULT_SESSION_IDLE,
            top_vehicles,
        }
    }

    pub fn with_session_idle(mut self, idle: Duration) -> Self {
        self.session_idle = idle;
        self
    }

    /// Open guard sessions, after dropping the idle ones
    pub fn open_sessions(&self) -> usize {
        let mut sessions = lock(&self.sessions);
        prune_idle_sessions(&mut sessions, Instant::now(), self.session_idle);
        sessions.len()
    }
}

/// Removes sessions idle for longer than `idle`; returns how many went
fn prune_idle_sessions(sessions: &mut SessionMap, now: Instant, idle: Duration) -> usize {
    let before = sessions.len();
    sessions.retain(|_, slot| now.saturating_duration_since(slot.last_used) <= idle);

    let pruned = before - sessions.len();
    if pruned > 0 {
        tracing::info!(pruned, "Idle guard sessions dropped");
    }
    pruned
}

/// Live session for `id`, marked as used now
fn active_session<'a>(
    sessions: &'a mut SessionMap,
    id: Uuid,
    idle: Duration,
) -> ApiResult<&'a mut GuardSession> {
    let now = Instant::now();
    prune_idle_sessions(sessions, now, idle);

    let slot = sessions
        .get_mut(&id)
        .ok_or_else(|| ApiError::NotFound(format!("Session {}", id)))?;
    slot.last_used = now;
    Ok(&mut slot.session)
}

/// A panic in one handler must not lock every later request out
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ============================================================================
// Responses & errors
// ============================================================================

/// API Response wrapper
#[derive(Serialize)]
pub struct ApiResponse<T> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    fields: Vec<FieldMessage>,
}

#[derive(Serialize)]
struct FieldMessage {
    field: String,
    message: String,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            fields: Vec::new(),
        }
    }
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Access(#[from] AccessError),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Access(AccessError::Validation(_)) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Access(AccessError::DuplicatePlate(_)) => StatusCode::CONFLICT,
            ApiError::Access(AccessError::InvalidRange { .. }) => StatusCode::BAD_REQUEST,
            ApiError::Access(AccessError::NoAuthorizedLookup) => StatusCode::CONFLICT,
            ApiError::Access(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!("Request failed: {}", self);
            "Internal error".to_string()
        } else {
            tracing::warn!("Request rejected: {}", self);
            self.to_string()
        };

        let fields = match &self {
            ApiError::Access(e) => e
                .field_errors()
                .iter()
                .map(|f| FieldMessage {
                    field: f.field.clone(),
                    message: f.message.clone(),
                })
                .collect(),
            ApiError::NotFound(_) => Vec::new(),
        };

        let body = ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(message),
            fields,
        };

        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

fn date_param(field: &str, raw: &str) -> Result<NaiveDate, AccessError> {
    parse_date(raw).map_err(|e| AccessError::invalid(field, e.to_string()))
}

// ============================================================================
// Vehicles
// ============================================================================

#[derive(Debug, Deserialize, Default)]
pub struct VehicleListQuery {
    #[serde(default)]
    all: bool,
    #[serde(default)]
    plate: String,
    #[serde(default)]
    unit: String,
    #[serde(default)]
    owner: String,
}

impl VehicleListQuery {
    fn fetch(&self, conn: &Connection) -> Result<Vec<Vehicle>, AccessError> {
        let vehicles = if self.all {
            list_all_vehicles(conn)?
        } else {
            list_active_vehicles(conn)?
        };

        let filter = VehicleFilter {
            plate: self.plate.clone(),
            unit: self.unit.clone(),
            owner: self.owner.clone(),
        };
        Ok(filter.apply(&vehicles))
    }
}

/// GET /api/vehicles - Active vehicles (or every vehicle with `all=true`)
async fn list_vehicles(
    State(state): State<AppState>,
    Query(query): Query<VehicleListQuery>,
) -> ApiResult<Json<ApiResponse<Vec<Vehicle>>>> {
    let conn = lock(&state.db);
    Ok(Json(ApiResponse::ok(query.fetch(&conn)?)))
}

/// POST /api/vehicles - Register a vehicle
async fn create_vehicle(
    State(state): State<AppState>,
    Json(form): Json<NewVehicle>,
) -> ApiResult<(StatusCode, Json<ApiResponse<Vehicle>>)> {
    let conn = lock(&state.db);
    let vehicle = register_vehicle(&conn, state.clock.as_ref(), &form)?;

    Ok((StatusCode::CREATED, Json(ApiResponse::ok(vehicle))))
}

#[derive(Serialize)]
struct LookupResponse {
    plate: String,
    authorized: bool,
    vehicle: Option<Vehicle>,
}

/// GET /api/vehicles/lookup/:plate - Stateless authorization check
async fn lookup(
    State(state): State<AppState>,
    Path(plate): Path<String>,
) -> ApiResult<Json<ApiResponse<LookupResponse>>> {
    let conn = lock(&state.db);
    let vehicle = lookup_vehicle(&conn, &plate)?;

    Ok(Json(ApiResponse::ok(LookupResponse {
        plate: crate::plate::canonicalize(&plate),
        authorized: vehicle.is_some(),
        vehicle,
    })))
}

fn change_status(state: &AppState, id: i64, status: VehicleStatus) -> ApiResult<Vehicle> {
    let conn = lock(&state.db);

    if !set_vehicle_status(&conn, id, status)? {
        return Err(ApiError::NotFound(format!("Vehicle {}", id)));
    }

    get_vehicle(&conn, id)?.ok_or_else(|| ApiError::NotFound(format!("Vehicle {}", id)))
}

/// POST /api/vehicles/:id/deactivate
async fn deactivate(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<Json<ApiResponse<Vehicle>>> {
    Ok(Json(ApiResponse::ok(change_status(&state, id, VehicleStatus::Inactive)?)))
}

/// POST /api/vehicles/:id/reactivate
async fn reactivate(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<Json<ApiResponse<Vehicle>>> {
    Ok(Json(ApiResponse::ok(change_status(&state, id, VehicleStatus::Active)?)))
}

// ============================================================================
// Entries & statistics
// ============================================================================

#[derive(Debug, Deserialize, Default)]
pub struct EntriesQuery {
    date: Option<String>,
    from: Option<String>,
    to: Option<String>,
}

impl EntriesQuery {
    fn fetch(&self, conn: &Connection, clock: &dyn Clock) -> Result<Vec<EntryView>, AccessError> {
        match (&self.date, &self.from, &self.to) {
            (Some(date), None, None) => entries_on(conn, date_param("date", date)?),
            (None, Some(from), Some(to)) => {
                entries_between(conn, date_param("from", from)?, date_param("to", to)?)
            }
            (None, None, None) => entries_on(conn, clock.today()),
            _ => Err(AccessError::invalid(
                "date",
                "Use either date=YYYY-MM-DD or both from= and to=",
            )),
        }
    }
}

/// GET /api/entries - Entries of one day (default today) or an inclusive range
async fn list_entries(
    State(state): State<AppState>,
    Query(query): Query<EntriesQuery>,
) -> ApiResult<Json<ApiResponse<Vec<EntryView>>>> {
    let conn = lock(&state.db);
    Ok(Json(ApiResponse::ok(query.fetch(&conn, state.clock.as_ref())?)))
}

/// GET /api/entries/plate/:plate - History of one plate
async fn plate_history(
    State(state): State<AppState>,
    Path(plate): Path<String>,
) -> ApiResult<Json<ApiResponse<Vec<EntryView>>>> {
    let conn = lock(&state.db);
    Ok(Json(ApiResponse::ok(entries_for_plate(&conn, &plate)?)))
}

#[derive(Debug, Deserialize, Default)]
pub struct StatsQuery {
    days: Option<u32>,
    period: Option<String>,
    top: Option<usize>,
}

/// GET /api/stats - Aggregates over a window ending today
async fn stats(
    State(state): State<AppState>,
    Query(query): Query<StatsQuery>,
) -> ApiResult<Json<ApiResponse<EntryStats>>> {
    let window_days = match (query.days, &query.period) {
        (Some(days), _) => days,
        (None, Some(period)) => period.parse::<StatsPeriod>()?.window_days(),
        (None, None) => StatsPeriod::Weekly.window_days(),
    };
    let top = query.top.unwrap_or(state.top_vehicles);

    let conn = lock(&state.db);
    Ok(Json(ApiResponse::ok(aggregate(&conn, state.clock.as_ref(), window_days, top)?)))
}

/// GET /api/summary - Entries today and authorized vehicle count
async fn summary(State(state): State<AppState>) -> ApiResult<Json<ApiResponse<DailySummary>>> {
    let conn = lock(&state.db);
    Ok(Json(ApiResponse::ok(daily_summary(&conn, state.clock.as_ref())?)))
}

// ============================================================================
// CSV export
// ============================================================================

fn csv_response(filename: String, body: Vec<u8>) -> Response {
    let disposition = format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        filename,
        urlencoding::encode(&filename)
    );

    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    )
        .into_response()
}

/// GET /api/export/vehicles.csv
async fn export_vehicles(
    State(state): State<AppState>,
    Query(query): Query<VehicleListQuery>,
) -> ApiResult<Response> {
    let conn = lock(&state.db);
    let vehicles = query.fetch(&conn)?;

    let mut body = Vec::new();
    write_vehicles_csv(&mut body, &vehicles, query.all)?;

    let filename = export_filename(ExportKind::Vehicles, state.clock.today());
    Ok(csv_response(filename, body))
}

/// GET /api/export/entries.csv
async fn export_entries(
    State(state): State<AppState>,
    Query(query): Query<EntriesQuery>,
) -> ApiResult<Response> {
    let conn = lock(&state.db);
    let entries = query.fetch(&conn, state.clock.as_ref())?;

    let mut body = Vec::new();
    write_entries_csv(&mut body, &entries)?;

    let filename = export_filename(ExportKind::Entries, state.clock.today());
    Ok(csv_response(filename, body))
}

// ============================================================================
// Guard sessions
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct OpenSessionRequest {
    guard: String,
}

#[derive(Serialize)]
struct SessionResponse {
    session_id: Uuid,
    guard: String,
}

#[derive(Debug, Deserialize)]
pub struct LookupRequest {
    plate: String,
}

#[derive(Debug, Deserialize)]
pub struct ConfirmRequest {
    #[serde(default)]
    category: Option<String>,
}

/// POST /api/sessions - Start a shift for a guard
async fn open_session(
    State(state): State<AppState>,
    Json(req): Json<OpenSessionRequest>,
) -> ApiResult<(StatusCode, Json<ApiResponse<SessionResponse>>)> {
    let mut session = GuardSession::new();
    let guard = session.sign_in(&req.guard)?.to_string();
    let session_id = session.id();

    let now = Instant::now();
    let mut sessions = lock(&state.sessions);
    prune_idle_sessions(&mut sessions, now, state.session_idle);
    sessions.insert(
        session_id,
        SessionSlot {
            session,
            last_used: now,
        },
    );
    drop(sessions);

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok(SessionResponse { session_id, guard })),
    ))
}

/// POST /api/sessions/:id/lookup - Check a plate within the session
async fn session_lookup(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<LookupRequest>,
) -> ApiResult<Json<ApiResponse<LookupOutcome>>> {
    let mut sessions = lock(&state.sessions);
    let session = active_session(&mut sessions, id, state.session_idle)?;

    let conn = lock(&state.db);
    let outcome = session.lookup(&conn, &req.plate)?.clone();

    Ok(Json(ApiResponse::ok(outcome)))
}

/// POST /api/sessions/:id/confirm - Log the entry for the authorized lookup
async fn session_confirm(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<ConfirmRequest>,
) -> ApiResult<(StatusCode, Json<ApiResponse<Entry>>)> {
    let category = match &req.category {
        Some(raw) => raw.parse::<EntryCategory>()?,
        None => EntryCategory::default(),
    };

    let mut sessions = lock(&state.sessions);
    let session = active_session(&mut sessions, id, state.session_idle)?;

    let conn = lock(&state.db);
    let entry = session.confirm_entry(&conn, state.clock.as_ref(), category)?;

    Ok((StatusCode::CREATED, Json(ApiResponse::ok(entry))))
}

/// DELETE /api/sessions/:id - End the shift
async fn close_session(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<StatusCode> {
    match lock(&state.sessions).remove(&id) {
        Some(slot) => {
            tracing::info!(session = %id, guard = ?slot.session.guard(), "Guard session closed");
            Ok(StatusCode::NO_CONTENT)
        }
        None => Err(ApiError::NotFound(format!("Session {}", id))),
    }
}

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

// ============================================================================
// Router
// ============================================================================

pub fn router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/summary", get(summary))
        .route("/vehicles", get(list_vehicles).post(create_vehicle))
        .route("/vehicles/lookup/:plate", get(lookup))
        .route("/vehicles/:id/deactivate", post(deactivate))
        .route("/vehicles/:id/reactivate", post(reactivate))
        .route("/entries", get(list_entries))
        .route("/entries/plate/:plate", get(plate_history))
        .route("/stats", get(stats))
        .route("/export/vehicles.csv", get(export_vehicles))
        .route("/export/entries.csv", get(export_entries))
        .route("/sessions", post(open_session))
        .route("/sessions/:id/lookup", post(session_lookup))
        .route("/sessions/:id/confirm", post(session_confirm))
        .route("/sessions/:id", axum::routing::delete(close_session))
        .with_state(state);

    Router::new()
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot(last_used: Instant) -> SessionSlot {
        let mut session = GuardSession::new();
        session.sign_in("Ana").unwrap();
        SessionSlot { session, last_used }
    }

    #[test]
    fn test_prune_drops_only_idle_sessions() {
        let start = Instant::now();
        let mut sessions = SessionMap::new();
        let stale = Uuid::new_v4();
        let fresh = Uuid::new_v4();
        sessions.insert(stale, slot(start));
        sessions.insert(fresh, slot(start + Duration::from_secs(50 * 60)));

        let later = start + Duration::from_secs(60 * 60);
        let pruned = prune_idle_sessions(&mut sessions, later, Duration::from_secs(30 * 60));

        assert_eq!(pruned, 1);
        assert!(!sessions.contains_key(&stale));
        assert!(sessions.contains_key(&fresh));
    }

    #[test]
    fn test_active_session_refreshes_last_used() {
        let start = Instant::now();
        let mut sessions = SessionMap::new();
        let id = Uuid::new_v4();
        sessions.insert(id, slot(start));

        let session = active_session(&mut sessions, id, DEFAULT_SESSION_IDLE).unwrap();
        assert_eq!(session.guard(), Some("Ana"));
        assert!(sessions[&id].last_used >= start);

        let missing = active_session(&mut sessions, Uuid::new_v4(), DEFAULT_SESSION_IDLE);
        assert!(matches!(missing, Err(ApiError::NotFound(_))));
    }

    #[test]
    fn test_zero_idle_drops_sessions_once_time_passes() {
        let start = Instant::now();
        let mut sessions = SessionMap::new();
        sessions.insert(Uuid::new_v4(), slot(start));

        assert_eq!(prune_idle_sessions(&mut sessions, start, Duration::ZERO), 0);
        let later = start + Duration::from_millis(1);
        assert_eq!(prune_idle_sessions(&mut sessions, later, Duration::ZERO), 1);
        assert!(sessions.is_empty());
    }
}
