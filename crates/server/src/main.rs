use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, State,
    },
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use export::AdminCredentials;
use server_api::{ApiContext, SessionRegistry};
use shared::{
    domain::SessionId,
    error::{ApiError, ErrorCode},
    protocol::{
        ExportRequest, QuestionView, ResponseTableView, SelectAnswerRequest, SessionView,
        SubmitResponse,
    },
};
use storage::Storage;
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

mod app_state;
mod config;

use app_state::AppState;
use config::load_settings;

const MAX_REQUEST_BYTES: usize = 16 * 1024;
const SWEEP_INTERVAL_SECS: u64 = 60;

type HandlerError = (StatusCode, Json<ApiError>);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let settings = load_settings();
    let database_url = storage::normalize_database_url(&settings.database_url);
    let storage = Storage::new(&database_url).await.map_err(|error| {
        error!(
            %database_url,
            error = %format!("{error:#}"),
            "failed to open SQLite database; verify parent directory exists and permissions are correct"
        );
        error
    })?;
    let api = ApiContext {
        storage,
        admin: AdminCredentials::new(settings.admin_username, settings.admin_password),
        sessions: SessionRegistry::new(Duration::from_secs(settings.session_ttl_seconds)),
    };
    let sweep_every = Duration::from_secs(settings.session_ttl_seconds.min(SWEEP_INTERVAL_SECS));
    let _sweeper = api.sessions.spawn_sweeper(sweep_every);

    let app = build_router(Arc::new(AppState { api }));

    let addr: SocketAddr = settings.server_bind.parse()?;
    info!(%addr, %database_url, "survey server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("survey server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        error!(%error, "failed to listen for shutdown signal");
    }
}

fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/questions", get(http_list_questions))
        .route("/sessions", post(http_create_session))
        .route(
            "/sessions/:session_id",
            get(http_session_view).delete(http_discard_session),
        )
        .route("/sessions/:session_id/select", post(http_select_answer))
        .route("/sessions/:session_id/advance", post(http_advance))
        .route("/sessions/:session_id/retreat", post(http_retreat))
        .route("/sessions/:session_id/submit", post(http_submit))
        .route("/sessions/:session_id/restart", post(http_restart))
        .route("/responses/table", post(http_response_table))
        .route("/responses/export", post(http_export_responses))
        .layer(RequestBodyLimitLayer::new(MAX_REQUEST_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn status_for(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::Validation => StatusCode::BAD_REQUEST,
        ErrorCode::Conflict => StatusCode::CONFLICT,
        ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn reject(error: ApiError) -> HandlerError {
    (status_for(error.code), Json(error))
}

/// Malformed bodies get the same `ApiError` body as every other failure.
/// Oversized bodies keep their 413 status.
fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, HandlerError> {
    payload.map(|Json(value)| value).map_err(|rejection| {
        let status = match rejection.status() {
            StatusCode::PAYLOAD_TOO_LARGE => StatusCode::PAYLOAD_TOO_LARGE,
            _ => StatusCode::BAD_REQUEST,
        };
        debug!(%status, reason = %rejection.body_text(), "request body rejected");
        (
            status,
            Json(ApiError::new(ErrorCode::Validation, rejection.body_text())),
        )
    })
}

fn session_id(path: Result<Path<Uuid>, PathRejection>) -> Result<SessionId, HandlerError> {
    path.map(|Path(id)| SessionId(id)).map_err(|rejection| {
        reject(ApiError::new(ErrorCode::Validation, rejection.body_text()))
    })
}

async fn healthz(State(state): State<Arc<AppState>>) -> Result<&'static str, HandlerError> {
    state.api.storage.health_check().await.map_err(|e| {
        error!(error = %format!("{e:#}"), "health check failed");
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ApiError::new(ErrorCode::Internal, e.to_string())),
        )
    })?;
    Ok("ok")
}

async fn http_list_questions() -> Json<Vec<QuestionView>> {
    Json(server_api::list_questions())
}

async fn http_create_session(State(state): State<Arc<AppState>>) -> (StatusCode, Json<SessionView>) {
    let view = server_api::create_session(&state.api).await;
    (StatusCode::CREATED, Json(view))
}

async fn http_session_view(
    State(state): State<Arc<AppState>>,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<SessionView>, HandlerError> {
    let view = server_api::session_view(&state.api, session_id(path)?)
        .await
        .map_err(reject)?;
    Ok(Json(view))
}

async fn http_discard_session(
    State(state): State<Arc<AppState>>,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<StatusCode, HandlerError> {
    server_api::discard_session(&state.api, session_id(path)?)
        .await
        .map_err(reject)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn http_select_answer(
    State(state): State<Arc<AppState>>,
    path: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<SelectAnswerRequest>, JsonRejection>,
) -> Result<Json<SessionView>, HandlerError> {
    let session_id = session_id(path)?;
    let req = json_body(payload)?;
    let view = server_api::select_answer(&state.api, session_id, req.answer.as_deref())
        .await
        .map_err(reject)?;
    Ok(Json(view))
}

async fn http_advance(
    State(state): State<Arc<AppState>>,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<SessionView>, HandlerError> {
    let view = server_api::advance(&state.api, session_id(path)?)
        .await
        .map_err(reject)?;
    Ok(Json(view))
}

async fn http_retreat(
    State(state): State<Arc<AppState>>,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<SessionView>, HandlerError> {
    let view = server_api::retreat(&state.api, session_id(path)?)
        .await
        .map_err(reject)?;
    Ok(Json(view))
}

async fn http_submit(
    State(state): State<Arc<AppState>>,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<SubmitResponse>, HandlerError> {
    let submitted = server_api::submit(&state.api, session_id(path)?)
        .await
        .map_err(reject)?;
    Ok(Json(submitted))
}

async fn http_restart(
    State(state): State<Arc<AppState>>,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<SessionView>, HandlerError> {
    let view = server_api::restart(&state.api, session_id(path)?)
        .await
        .map_err(reject)?;
    Ok(Json(view))
}

async fn http_response_table(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ExportRequest>, JsonRejection>,
) -> Result<Json<ResponseTableView>, HandlerError> {
    let req = json_body(payload)?;
    let table = server_api::response_table(&state.api, &req.username, &req.password)
        .await
        .map_err(reject)?;
    Ok(Json(table))
}

async fn http_export_responses(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ExportRequest>, JsonRejection>,
) -> Result<impl IntoResponse, HandlerError> {
    let req = json_body(payload)?;
    let workbook = server_api::export_responses(&state.api, &req.username, &req.password)
        .await
        .map_err(reject)?;

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(workbook.mime_type),
    );
    if let Ok(value) =
        HeaderValue::from_str(&format!("attachment; filename=\"{}\"", workbook.file_name))
    {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }

    Ok((StatusCode::OK, headers, workbook.bytes))
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
