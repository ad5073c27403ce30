//! API server for funnel-scout.

use crate::analyzer::FunnelScout;
use crate::error::AppError;
use crate::models::{PagePreview, RunResult};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::Semaphore;
use warp::{Filter, Rejection, Reply, http::StatusCode};

/// Runs allowed at the same time; each run already fans out internally.
const MAX_CONCURRENT_RUNS: usize = 2;

/// API response structure
#[derive(Serialize, Deserialize)]
struct ApiResponse<T> {
    success: bool,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<T>,
}

/// Body of `POST /analyze` and `POST /preview`.
#[derive(Deserialize)]
struct UrlRequest {
    url: String,
}

/// Wraps an [`AppError`] so it can travel through warp's rejection chain.
#[derive(Debug)]
struct ApiError(AppError);

impl warp::reject::Reject for ApiError {}

/// Builds every route served by the API.
fn routes(
    scout: Arc<FunnelScout>,
) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    let scout_filter = warp::any().map(move || scout.clone());

    let semaphore = Arc::new(Semaphore::new(MAX_CONCURRENT_RUNS));
    let semaphore_filter = warp::any().map(move || semaphore.clone());

    let health = warp::path("health")
        .and(warp::path::end())
        .and(warp::get())
        .map(|| {
            warp::reply::json(&ApiResponse::<()> {
                success: true,
                message: "Funnel Scout API is running".to_string(),
                result: None,
            })
        });

    let analyze = warp::path("analyze")
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::json())
        .and(scout_filter.clone())
        .and(semaphore_filter)
        .and_then(handle_analyze);

    let preview = warp::path("preview")
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::json())
        .and(scout_filter)
        .and_then(handle_preview);

    health
        .or(analyze)
        .or(preview)
        .with(warp::cors().allow_any_origin())
        .recover(handle_rejection)
}

/// Start the API server
pub(crate) async fn start_api_server(scout: FunnelScout, port: u16) -> anyhow::Result<()> {
    let routes = routes(Arc::new(scout));
    tracing::info!("Starting API server on port {}", port);
    warp::serve(routes).run(([0, 0, 0, 0], port)).await;
    Ok(())
}

async fn handle_analyze(
    request: UrlRequest,
    scout: Arc<FunnelScout>,
    semaphore: Arc<Semaphore>,
) -> Result<impl Reply, Rejection> {
    let _permit = semaphore
        .acquire()
        .await
        .map_err(|e| warp::reject::custom(ApiError(AppError::Generic(e.into()))))?;

    tracing::info!(target: "analyze_task", "API analysis requested for {}", request.url);
    let result = scout
        .analyze(&request.url)
        .await
        .map_err(|e| warp::reject::custom(ApiError(e)))?;

    Ok(warp::reply::json(&ApiResponse::<RunResult> {
        success: true,
        message: format!(
            "Found {} ad-like pages and {} funnels",
            result.classified, result.funnel_count
        ),
        result: Some(result),
    }))
}

async fn handle_preview(request: UrlRequest, scout: Arc<FunnelScout>) -> Result<impl Reply, Rejection> {
    tracing::info!(target: "render_task", "API preview requested for {}", request.url);
    let preview = scout
        .preview(&request.url)
        .await
        .map_err(|e| warp::reject::custom(ApiError(e)))?;

    Ok(warp::reply::json(&ApiResponse::<PagePreview> {
        success: true,
        message: "Preview generated".to_string(),
        result: Some(preview),
    }))
}

/// Handle API rejections
async fn handle_rejection(err: Rejection) -> Result<impl Reply, Infallible> {
    let (status, message) = if err.is_not_found() {
        (StatusCode::NOT_FOUND, "Not Found".to_string())
    } else if let Some(ApiError(app_error)) = err.find::<ApiError>() {
        match app_error {
            AppError::InvalidUrl(_) => (StatusCode::BAD_REQUEST, app_error.to_string()),
            other => {
                tracing::error!("Request failed: {}", other);
                (StatusCode::INTERNAL_SERVER_ERROR, other.to_string())
            }
        }
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, "Method not allowed".to_string())
    } else {
        (StatusCode::BAD_REQUEST, "Bad request".to_string())
    };

    Ok(warp::reply::with_status(
        warp::reply::json(&ApiResponse::<()> {
            success: false,
            message,
            result: None,
        }),
        status,
    ))
}
