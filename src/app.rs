use crate::arr::{RadarrClient, SonarrClient};
use crate::config::AppConfig;
use crate::error::RequestError;
use crate::events::LogSink;
use crate::models::{numeric_id, BackendKind, MediaKind, MediaRequest, Overrides, SeasonSpec};
use crate::overseerr::{ArrService, OverseerrClient};
use crate::resolver::{BackendClients, Outcome, Resolver, ResolverOptions, SystemClock};
use anyhow::Result;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

const MAX_BODY_BYTES: usize = 64 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub resolver: Arc<Resolver>,
}

pub async fn run_server(config: AppConfig) -> Result<()> {
    let backend = build_backend(&config)?;
    let options = ResolverOptions::from_config(&config);
    let resolver = Arc::new(Resolver::new(
        backend,
        options,
        Arc::new(LogSink),
        Arc::new(SystemClock),
    ));
    info!("Configured backend: {}", resolver.backend_name());

    let state = AppState { resolver };
    let app = build_router(state);

    let addr = config.server.bind;
    info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

fn build_backend(config: &AppConfig) -> Result<BackendClients> {
    match config.backend {
        BackendKind::Overseerr => {
            let overseerr = config
                .overseerr
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("missing [overseerr] section"))?;
            let client = OverseerrClient::new(&overseerr.base_url, &overseerr.api_key)?;
            Ok(BackendClients::Overseerr(Arc::new(client)))
        }
        BackendKind::Arr => {
            let radarr = config
                .radarr
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("missing [radarr] section"))?;
            let sonarr = config
                .sonarr
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("missing [sonarr] section"))?;
            Ok(BackendClients::Arr {
                radarr: Arc::new(RadarrClient::new(&radarr.base_url, &radarr.api_key)?),
                sonarr: Arc::new(SonarrClient::new(&sonarr.base_url, &sonarr.api_key)?),
            })
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/request", post(handle_request))
        .route("/api/targets", get(handle_targets))
        .route("/health", get(health))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// The invokable action. Numeric override fields accept both integers and
/// numeric strings; anything else is rejected before any network call.
#[derive(Debug, Deserialize)]
struct ActionPayload {
    query: String,
    media_type: String,
    seasons: Option<Value>,
    #[serde(default)]
    is_4k: bool,
    overseerr_server_id: Option<Value>,
    overseerr_profile_id: Option<Value>,
    profile_preset: Option<String>,
    quality_profile_id: Option<Value>,
    language_profile_id: Option<Value>,
    root_folder_path: Option<String>,
}

impl ActionPayload {
    fn into_request(self) -> crate::error::Result<MediaRequest> {
        if self.query.trim().is_empty() {
            return Err(RequestError::Validation("query must not be empty".into()));
        }
        let kind = MediaKind::parse(&self.media_type)?;
        let seasons = match &self.seasons {
            Some(value) => Some(SeasonSpec::parse(value)?),
            None => None,
        };
        let overrides = Overrides {
            server_id: optional_id(self.overseerr_server_id.as_ref(), "overseerr_server_id")?,
            profile_id: optional_id(self.overseerr_profile_id.as_ref(), "overseerr_profile_id")?,
            profile_preset: self.profile_preset,
            quality_profile_id: optional_id(
                self.quality_profile_id.as_ref(),
                "quality_profile_id",
            )?,
            language_profile_id: optional_id(
                self.language_profile_id.as_ref(),
                "language_profile_id",
            )?,
            root_folder_path: self.root_folder_path,
        };
        Ok(MediaRequest {
            query: self.query.trim().to_string(),
            kind,
            seasons,
            is_4k: self.is_4k,
            overrides,
        })
    }
}

fn optional_id(value: Option<&Value>, field: &str) -> crate::error::Result<Option<i64>> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(v) => numeric_id(v, field).map(Some),
    }
}

async fn handle_request(
    State(state): State<AppState>,
    Json(payload): Json<ActionPayload>,
) -> (StatusCode, Json<Value>) {
    let request = match payload.into_request() {
        Ok(request) => request,
        Err(err) => return error_response(&err),
    };

    match state.resolver.handle(request).await {
        Ok(Outcome::Submitted(submission)) => (
            StatusCode::CREATED,
            Json(json!({
                "status": "submitted",
                "tmdb_id": submission.tmdb_id,
                "request_id": submission.request_id,
                "media_id": submission.media_id,
            })),
        ),
        Ok(Outcome::Duplicate) => (
            StatusCode::OK,
            Json(json!({"status": "duplicate", "detail": "identical request suppressed"})),
        ),
        Err(err) => error_response(&err),
    }
}

fn error_response(err: &RequestError) -> (StatusCode, Json<Value>) {
    let status = match err {
        RequestError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        RequestError::NotFound(_) => StatusCode::NOT_FOUND,
        RequestError::NotConfigured(_) => StatusCode::CONFLICT,
        RequestError::Upstream { .. } => StatusCode::BAD_GATEWAY,
    };
    (status, Json(json!({"status": "error", "error": err.to_string()})))
}

async fn health(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let (reachable, detail) = match state.resolver.clients() {
        BackendClients::Overseerr(client) => {
            let up = client.ping().await;
            (up, json!({"overseerr": up}))
        }
        BackendClients::Arr { radarr, sonarr } => {
            let (radarr_up, sonarr_up) = tokio::join!(radarr.ping(), sonarr.ping());
            (
                radarr_up && sonarr_up,
                json!({"radarr": radarr_up, "sonarr": sonarr_up}),
            )
        }
    };
    let status = if reachable {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(json!({
            "backend": state.resolver.backend_name(),
            "reachable": detail,
        })),
    )
}

/// Discovery of selectable destinations. Individual listing failures
/// degrade to empty arrays rather than failing the whole response.
async fn handle_targets(State(state): State<AppState>) -> Json<Value> {
    match state.resolver.clients() {
        BackendClients::Overseerr(client) => {
            let radarr = client
                .list_servers(ArrService::Radarr)
                .await
                .unwrap_or_default();
            let sonarr = client
                .list_servers(ArrService::Sonarr)
                .await
                .unwrap_or_default();
            let movie_profiles = match client.default_server_id(ArrService::Radarr).await {
                Some(id) => client
                    .server_profiles(ArrService::Radarr, id)
                    .await
                    .unwrap_or_default(),
                None => Vec::new(),
            };
            let tv_profiles = match client.default_server_id(ArrService::Sonarr).await {
                Some(id) => client
                    .server_profiles(ArrService::Sonarr, id)
                    .await
                    .unwrap_or_default(),
                None => Vec::new(),
            };
            let users = client.list_users().await.unwrap_or_default();
            Json(json!({
                "backend": "overseerr",
                "radarr_servers": radarr,
                "sonarr_servers": sonarr,
                "movie_profiles": movie_profiles,
                "tv_profiles": tv_profiles,
                "users": users,
            }))
        }
        BackendClients::Arr { radarr, sonarr } => {
            let (radarr_roots, radarr_profiles, sonarr_roots, sonarr_profiles) = tokio::join!(
                radarr.root_folders(),
                radarr.quality_profiles(),
                sonarr.root_folders(),
                sonarr.quality_profiles(),
            );
            Json(json!({
                "backend": "arr",
                "radarr": {
                    "root_folders": radarr_roots.unwrap_or_default(),
                    "quality_profiles": radarr_profiles.unwrap_or_default(),
                },
                "sonarr": {
                    "root_folders": sonarr_roots.unwrap_or_default(),
                    "quality_profiles": sonarr_profiles.unwrap_or_default(),
                },
            }))
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        term.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Shutdown signal received (Ctrl+C)");
        }
        _ = terminate => {
            info!("Shutdown signal received (SIGTERM)");
        }
    }
}
