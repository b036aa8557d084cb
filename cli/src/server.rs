use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, Request, State},
    http::{HeaderValue, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post, put},
};
use chrono::{Local, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use tower_http::limit::RequestBodyLimitLayer;
use tracing::error;

use whey_core::error::ProgressError;
use whey_core::models::{
    AggregatedEntry, BalanceReport, ConsumptionEntry, DayEvaluation, EntryStatus, LoggedEntry,
    NewConsumptionEntry, StreakSnapshot,
};
use whey_core::service::WheyService;

const BODY_LIMIT: usize = 1024 * 1024; // 1 MB

#[derive(Clone)]
struct AppState {
    service: Arc<WheyService>,
    api_key: Option<String>,
}

// --- Request / Response types ---

/// Either `food` (a saved food, optionally with `quantity_g`) or a one-off
/// entry with `label`, `quantity_g` and `protein_g`.
#[derive(Deserialize)]
struct CreateEntryRequest {
    food: Option<String>,
    label: Option<String>,
    quantity_g: Option<f64>,
    protein_g: Option<f64>,
    eaten_at: NaiveDateTime,
    status: Option<String>,
}

#[derive(Deserialize)]
struct UpdateStatusRequest {
    status: String,
}

#[derive(Deserialize)]
struct StreakQuery {
    today: Option<NaiveDate>,
}

#[derive(Deserialize)]
struct EvaluateQuery {
    #[serde(default)]
    saver: bool,
}

#[derive(Serialize)]
struct DayEntries {
    date: NaiveDate,
    entries: Vec<ConsumptionEntry>,
    groups: Vec<AggregatedEntry>,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

// --- Error handling ---

enum ApiError {
    NotFound(String),
    BadRequest(String),
    Conflict(String),
    Internal(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::Conflict(msg) => (StatusCode::CONFLICT, msg),
            Self::Internal(err) => {
                error!("internal server error: {err:#}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast_ref::<ProgressError>() {
            Some(e @ ProgressError::DayAlreadyEvaluated { .. }) => Self::Conflict(e.to_string()),
            Some(e @ ProgressError::InvalidEntry(_)) => Self::BadRequest(e.to_string()),
            _ => Self::Internal(err),
        }
    }
}

fn parse_path_date(date_str: &str) -> Result<NaiveDate, ApiError> {
    NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
        .map_err(|_| ApiError::BadRequest(format!("Invalid date '{date_str}'. Use YYYY-MM-DD")))
}

fn parse_status(status: &str) -> Result<EntryStatus, ApiError> {
    status
        .parse()
        .map_err(|e: anyhow::Error| ApiError::BadRequest(e.to_string()))
}

// --- Middleware ---

async fn require_auth(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if let Some(ref expected_key) = state.api_key {
        let authorized = request
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .is_some_and(|token| token == expected_key);

        if !authorized {
            return (
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse {
                    error: "Invalid or missing API key".to_string(),
                }),
            )
                .into_response();
        }
    }
    next.run(request).await
}

async fn security_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(
        "x-content-type-options",
        HeaderValue::from_static("nosniff"),
    );
    headers.insert("x-frame-options", HeaderValue::from_static("DENY"));
    headers.insert(
        "content-security-policy",
        HeaderValue::from_static("default-src 'none'"),
    );
    response
}

// --- Handlers ---

async fn get_entries(
    State(state): State<AppState>,
    Path(date_str): Path<String>,
) -> Result<Json<DayEntries>, ApiError> {
    let date = parse_path_date(&date_str)?;
    let entries = state.service.get_entries(date)?;
    let groups = state.service.get_aggregated_entries(date)?;
    Ok(Json(DayEntries {
        date,
        entries,
        groups,
    }))
}

async fn create_entry(
    State(state): State<AppState>,
    Json(req): Json<CreateEntryRequest>,
) -> Result<(StatusCode, Json<LoggedEntry>), ApiError> {
    let status = req
        .status
        .as_deref()
        .map_or(Ok(EntryStatus::Done), parse_status)?;

    let entry = if let Some(protein_g) = req.protein_g {
        let label = req.label.or(req.food).ok_or_else(|| {
            ApiError::BadRequest("label is required when protein_g is given".to_string())
        })?;
        let quantity_g = req.quantity_g.ok_or_else(|| {
            ApiError::BadRequest("quantity_g is required when protein_g is given".to_string())
        })?;
        NewConsumptionEntry {
            eaten_at: req.eaten_at,
            quantity_g,
            protein_g,
            food_id: None,
            label,
            status,
        }
    } else {
        let name = req.food.ok_or_else(|| {
            ApiError::BadRequest("Either food or label with protein_g is required".to_string())
        })?;
        let food = state
            .service
            .find_food(&name)?
            .ok_or_else(|| ApiError::BadRequest(format!("Food '{name}' not found")))?;
        let quantity_g = req.quantity_g.or(food.default_serving_g).ok_or_else(|| {
            ApiError::BadRequest(format!("'{}' has no default serving; quantity_g is required", food.name))
        })?;
        NewConsumptionEntry {
            eaten_at: req.eaten_at,
            quantity_g,
            protein_g: food.protein_for(quantity_g),
            food_id: Some(food.id),
            label: food.name,
            status,
        }
    };

    let logged = state.service.log_entry(&entry)?;
    Ok((StatusCode::CREATED, Json(logged)))
}

async fn update_entry_status(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<UpdateStatusRequest>,
) -> Result<Json<LoggedEntry>, ApiError> {
    let status = parse_status(&req.status)?;
    if state.service.find_entry(id)?.is_none() {
        return Err(ApiError::NotFound(format!("Entry {id} not found")));
    }
    let logged = state.service.set_entry_status(id, status)?;
    Ok(Json(logged))
}

async fn delete_entry(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    if state.service.delete_entry(id)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("Entry {id} not found")))
    }
}

async fn get_balance(
    State(state): State<AppState>,
    Path(date_str): Path<String>,
) -> Result<Json<BalanceReport>, ApiError> {
    let date = parse_path_date(&date_str)?;
    Ok(Json(state.service.get_daily_balance(date)?))
}

async fn get_streak(
    State(state): State<AppState>,
    Query(query): Query<StreakQuery>,
) -> Result<Json<StreakSnapshot>, ApiError> {
    let today = query.today.unwrap_or_else(|| Local::now().date_naive());
    Ok(Json(state.service.get_streak_state(today)?))
}

async fn evaluate_day(
    State(state): State<AppState>,
    Path(date_str): Path<String>,
    Query(query): Query<EvaluateQuery>,
) -> Result<Json<DayEvaluation>, ApiError> {
    let date = parse_path_date(&date_str)?;
    Ok(Json(state.service.evaluate_day(date, query.saver)?))
}

fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/entries", post(create_entry))
        // A date for reads, an entry id for changes. The router needs one
        // parameter name per segment.
        .route("/api/entries/{key}", get(get_entries).delete(delete_entry))
        .route("/api/entries/{key}/status", put(update_entry_status))
        .route("/api/balance/{date}", get(get_balance))
        .route("/api/streak", get(get_streak))
        .route("/api/evaluate/{date}", post(evaluate_day))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT))
        .layer(middleware::from_fn(security_headers))
        .with_state(state)
}

// --- Server startup ---

pub async fn start_server(
    service: Arc<WheyService>,
    port: u16,
    bind: &str,
    api_key: Option<String>,
    new_api_key: bool,
) -> anyhow::Result<()> {
    let state = AppState {
        service,
        api_key: api_key.clone(),
    };

    let app = build_router(state);

    if let Some(ref key) = api_key {
        let head = key.get(..4).unwrap_or_default();
        let tail = key.get(key.len().saturating_sub(4)..).unwrap_or_default();
        eprintln!("API key: {head}...{tail} (see api_key file in data directory)");
        if new_api_key {
            eprintln!("Try: curl -H 'Authorization: Bearer <key>' http://{bind}:{port}/api/streak");
        }
    } else {
        eprintln!("Warning: Authentication disabled (--no-auth). API is open to anyone.");
    }

    if bind != "127.0.0.1" && bind != "localhost" && api_key.is_none() {
        eprintln!(
            "Warning: Listening on {bind} with no authentication. Any device on your network can access this API."
        );
    }

    let listener = tokio::net::TcpListener::bind(format!("{bind}:{port}")).await?;
    eprintln!("Listening on http://{bind}:{port}");
    tracing::info!(%bind, port, auth = api_key.is_some(), "server started");
    axum::serve(listener, app).await?;

    Ok(())
}
