use std::{net::SocketAddr, sync::Arc};

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use server_api::{
    create_todo, delete_todo, list_todos, parse_update_request, reorder_todos, update_todo,
    ApiContext,
};
use shared::{
    domain::{ItemId, TodoItem},
    error::{ApiError, ErrorCode},
    protocol::{CreateTodoRequest, ListTodosQuery, ReorderRequest, ReorderResponse, TodoPage},
};
use storage::Storage;
use tower_http::{
    cors::CorsLayer,
    limit::RequestBodyLimitLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{error, info, warn, Level};
use tracing_subscriber::EnvFilter;

mod app_state;
mod config;

use app_state::AppState;
use config::{load_settings, prepare_database_url, HttpOptions};

type HttpError = (StatusCode, Json<ApiError>);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings = load_settings();
    let database_url = prepare_database_url(&settings.database_url)?;
    let storage = Storage::new(&database_url).await.map_err(|error| {
        error!(
            %database_url,
            %error,
            "failed to open SQLite database; verify parent directory exists and permissions are correct"
        );
        error
    })?;
    let api = ApiContext::new(storage).with_max_page_size(settings.max_page_size);

    let state = AppState { api };
    let app = build_router(Arc::new(state), settings.http_options());

    let addr: SocketAddr = settings.server_bind.parse()?;
    info!(%addr, %database_url, "server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("server stopped");
    Ok(())
}

fn build_router(state: Arc<AppState>, http: HttpOptions) -> Router {
    let router = Router::new()
        .route("/healthz", get(healthz))
        .route("/", get(http_list_todos).post(http_create_todo))
        .route("/reorder", post(http_reorder_todos))
        .route("/:id", put(http_update_todo).delete(http_delete_todo))
        .with_state(state)
        .layer(RequestBodyLimitLayer::new(http.max_body_bytes))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        );

    if http.cors_allow_any {
        router.layer(CorsLayer::permissive())
    } else {
        router
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            warn!(%error, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(error) => {
                warn!(%error, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("received Ctrl+C, shutting down"),
        () = terminate => info!("received SIGTERM, shutting down"),
    }
}

fn http_error(err: ApiError) -> HttpError {
    let status = match err.code {
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::Validation => StatusCode::BAD_REQUEST,
        ErrorCode::Conflict => StatusCode::CONFLICT,
        ErrorCode::Internal => {
            error!(message = %err.message, "request failed");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, Json(err))
}

fn bad_request(message: impl Into<String>) -> HttpError {
    http_error(ApiError::validation(message))
}

/// Oversized bodies keep their 413; any other unreadable body is a 400.
fn json_rejection(rejection: JsonRejection, message: &str) -> HttpError {
    if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return (
            StatusCode::PAYLOAD_TOO_LARGE,
            Json(ApiError::validation(rejection.body_text())),
        );
    }
    bad_request(message)
}

async fn healthz(State(state): State<Arc<AppState>>) -> Result<&'static str, HttpError> {
    state.api.storage.health_check().await.map_err(|e| {
        error!(error = %e, "health check failed");
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ApiError::new(ErrorCode::Internal, e.to_string())),
        )
    })?;
    Ok("ok")
}

async fn http_list_todos(
    State(state): State<Arc<AppState>>,
    query: Result<Query<ListTodosQuery>, QueryRejection>,
) -> Result<Json<TodoPage>, HttpError> {
    let Query(q) = query.map_err(|rejection| {
        bad_request(format!("invalid query: {}", rejection.body_text()))
    })?;
    let page = list_todos(&state.api, &q).await.map_err(http_error)?;
    Ok(Json(page))
}

async fn http_create_todo(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<CreateTodoRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<TodoItem>), HttpError> {
    let Json(req) = payload.map_err(|r| json_rejection(r, "invalid 'text' expected string"))?;
    let item = create_todo(&state.api, req).await.map_err(http_error)?;
    Ok((StatusCode::CREATED, Json(item)))
}

async fn http_update_todo(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    payload: Result<Json<serde_json::Value>, JsonRejection>,
) -> Result<Json<TodoItem>, HttpError> {
    let Json(body) = payload.map_err(|r| json_rejection(r, "action is not defined"))?;
    let req = parse_update_request(body).map_err(http_error)?;
    let item = update_todo(&state.api, &ItemId(id), req)
        .await
        .map_err(http_error)?;
    Ok(Json(item))
}

async fn http_reorder_todos(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ReorderRequest>, JsonRejection>,
) -> Result<Json<ReorderResponse>, HttpError> {
    let Json(req) = payload.map_err(|r| {
        json_rejection(r, "invalid 'sourceId'/'destinationId' expected strings")
    })?;
    let response = reorder_todos(&state.api, req).await.map_err(http_error)?;
    Ok(Json(response))
}

async fn http_delete_todo(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, HttpError> {
    delete_todo(&state.api, &ItemId(id))
        .await
        .map_err(http_error)?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
