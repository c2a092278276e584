//! HTTP front end: upload and download routes.

use crate::config::Settings;
use crate::scheduler::spawn_sweeper;
use anyhow::{Context, Result};
use axum::body::Body;
use axum::extract::{DefaultBodyLimit, Path, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, put};
use axum::Router;
use droplet_core::{Allocator, Reclaimer, StorageRoot};
use futures_util::StreamExt;
use std::io;
use std::sync::Arc;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::signal;
use tokio_util::io::ReaderStream;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

/// Shared request state.
#[derive(Debug)]
pub struct AppState {
    pub root: StorageRoot,
    pub allocator: Allocator,
    /// Largest accepted upload, in bytes.
    pub max_size: u64,
    pub insecure: bool,
}

/// Request failures, mapped onto HTTP status codes.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound,
    TooLarge,
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message).into_response(),
            ApiError::NotFound => (StatusCode::NOT_FOUND, "file not found").into_response(),
            ApiError::TooLarge => {
                (StatusCode::PAYLOAD_TOO_LARGE, "file too large").into_response()
            }
            ApiError::Internal(message) => {
                error!(error = %message, "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error").into_response()
            }
        }
    }
}

impl From<droplet_core::Error> for ApiError {
    fn from(err: droplet_core::Error) -> Self {
        if err.is_invalid_input() {
            ApiError::BadRequest(err.to_string())
        } else {
            ApiError::Internal(err.to_string())
        }
    }
}

impl From<io::Error> for ApiError {
    fn from(err: io::Error) -> Self {
        ApiError::Internal(err.to_string())
    }
}

/// Build the router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/:filename", put(upload).post(upload))
        .route("/:token/:filename", get(download))
        // Size is enforced while streaming so the limit applies to the file, not a buffer
        .layer(DefaultBodyLimit::disable())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until Ctrl-C or SIGTERM, sweeping in the background.
pub async fn run(settings: Settings) -> Result<()> {
    let root = StorageRoot::init(&settings.root).with_context(|| {
        format!("Failed to create storage root at {}", settings.root.display())
    })?;
    let allocator = Allocator::new(root.clone(), settings.allocator.clone())
        .context("Invalid allocator settings")?;
    let reclaimer = Reclaimer::new(root.clone(), settings.retention);

    let state = Arc::new(AppState {
        root,
        allocator,
        max_size: settings.max_size,
        insecure: settings.insecure,
    });

    let listener = tokio::net::TcpListener::bind(settings.listen)
        .await
        .with_context(|| format!("Failed to bind {}", settings.listen))?;

    info!(
        listen = %settings.listen,
        debug = settings.debug,
        retention = ?settings.retention,
        sweep_interval_secs = settings.sweep_interval.as_secs(),
        max_size = settings.max_size,
        "droplet serving"
    );

    let sweeper = spawn_sweeper(reclaimer, settings.sweep_interval);

    let served = axum::serve(listener, router(state).into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await;

    sweeper.abort();
    served.context("HTTP server failed")
}

async fn upload(
    State(state): State<Arc<AppState>>,
    Path(filename): Path<String>,
    headers: HeaderMap,
    body: Body,
) -> Result<String, ApiError> {
    let declared = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
        .ok_or_else(|| ApiError::BadRequest("missing or invalid Content-Length".into()))?;

    if declared > state.max_size {
        debug!(declared, max_size = state.max_size, "upload rejected");
        return Err(ApiError::TooLarge);
    }

    let allocation = {
        let state = Arc::clone(&state);
        let filename = filename.clone();
        tokio::task::spawn_blocking(move || state.allocator.allocate(&filename))
            .await
            .map_err(|err| ApiError::Internal(err.to_string()))??
    };

    let written = write_body(&allocation.destination, body, state.max_size).await?;
    info!(
        public_path = %allocation.public_path,
        bytes = written,
        "upload stored"
    );

    let url = format!(
        "{}://{}/{}",
        request_scheme(&headers, state.insecure),
        request_host(&headers),
        public_url_path(&allocation.public_path)
    );
    Ok(format!(
        "\n{} uploaded!\nwget {}\ncurl -O {}\n",
        filename, url, url
    ))
}

/// Stream `body` into a new file at `path`, failing once `limit` is exceeded.
///
/// Never replaces an existing file. A failed write leaves the partial file
/// for the reclaimer.
async fn write_body(path: &std::path::Path, body: Body, limit: u64) -> Result<u64, ApiError> {
    let mut file = match OpenOptions::new().write(true).create_new(true).open(path).await {
        Ok(file) => file,
        Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
            return Err(ApiError::Internal(format!(
                "destination {} already exists",
                path.display()
            )));
        }
        Err(err) => return Err(err.into()),
    };
    let mut stream = body.into_data_stream();
    let mut written = 0u64;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|err| ApiError::Internal(err.to_string()))?;
        written += chunk.len() as u64;
        if written > limit {
            warn!(path = %path.display(), limit, "upload exceeded size limit");
            return Err(ApiError::TooLarge);
        }
        file.write_all(&chunk).await?;
    }

    file.flush().await?;
    Ok(written)
}

async fn download(
    State(state): State<Arc<AppState>>,
    Path((token, filename)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let path = state.root.resolve(&token, &filename)?;

    let file = match File::open(&path).await {
        Ok(file) => file,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Err(ApiError::NotFound),
        Err(err) => return Err(err.into()),
    };
    let metadata = file.metadata().await?;
    if !metadata.is_file() {
        return Err(ApiError::NotFound);
    }

    let headers = [
        (
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/octet-stream"),
        ),
        (header::CONTENT_LENGTH, HeaderValue::from(metadata.len())),
    ];
    Ok((headers, Body::from_stream(ReaderStream::new(file))).into_response())
}

/// Scheme for returned URLs: the proxy's view if forwarded, else configuration.
fn request_scheme(headers: &HeaderMap, insecure: bool) -> &'static str {
    let forwarded = headers
        .get("x-forwarded-proto")
        .and_then(|value| value.to_str().ok())
        .map(str::trim);

    match forwarded {
        Some(proto) if proto.eq_ignore_ascii_case("https") => "https",
        Some(proto) if proto.eq_ignore_ascii_case("http") => "http",
        _ if insecure => "http",
        _ => "https",
    }
}

fn request_host(headers: &HeaderMap) -> &str {
    headers
        .get(header::HOST)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .unwrap_or("localhost")
}

/// Percent-encode the filename part of `<token>/<filename>`.
fn public_url_path(public_path: &str) -> String {
    match public_path.split_once('/') {
        Some((token, filename)) => format!("{}/{}", token, urlencoding::encode(filename)),
        None => public_path.to_string(),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            warn!(error = %err, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Received termination signal, shutting down");
}
