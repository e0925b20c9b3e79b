use crate::arr::{RadarrApi, SonarrApi};
use crate::config::{AppConfig, DefaultSeasons, OverseerrDefaults, Preset, PresetTarget};
use crate::error::{RequestError, Result};
use crate::events::{failure_event, EventSink, RequestCompleted};
use crate::models::{MediaKind, MediaRequest, Overrides, ResolvedTarget, SeasonSpec};
use crate::overseerr::{ArrService, OverseerrApi};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Two identical (query, kind) submissions inside this window collapse to
/// one upstream call.
const DUPLICATE_WINDOW_SECS: i64 = 10;
const DEDUPE_TTL_SECS: i64 = 120;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Exactly one backend's clients are live per configured instance.
pub enum BackendClients {
    Overseerr(Arc<dyn OverseerrApi>),
    Arr {
        radarr: Arc<dyn RadarrApi>,
        sonarr: Arc<dyn SonarrApi>,
    },
}

impl BackendClients {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Overseerr(_) => "overseerr",
            Self::Arr { .. } => "arr",
        }
    }
}

/// Configuration snapshot the resolver merges overrides against.
#[derive(Debug, Clone, Default)]
pub struct ResolverOptions {
    pub overseerr: OverseerrDefaults,
    pub radarr_root: Option<String>,
    pub radarr_profile: Option<i64>,
    pub sonarr_root: Option<String>,
    pub sonarr_profile: Option<i64>,
    pub sonarr_language_profile: Option<i64>,
    pub presets: Vec<Preset>,
    pub default_tv_seasons: DefaultSeasons,
}

impl ResolverOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            overseerr: config
                .overseerr
                .as_ref()
                .map(|o| o.defaults.clone())
                .unwrap_or_default(),
            radarr_root: config.radarr.as_ref().and_then(|r| r.root_folder.clone()),
            radarr_profile: config.radarr.as_ref().and_then(|r| r.quality_profile_id),
            sonarr_root: config.sonarr.as_ref().and_then(|s| s.root_folder.clone()),
            sonarr_profile: config.sonarr.as_ref().and_then(|s| s.quality_profile_id),
            sonarr_language_profile: config.sonarr.as_ref().and_then(|s| s.language_profile_id),
            presets: config.presets.clone(),
            default_tv_seasons: config.options.default_tv_seasons,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Submitted(Submission),
    /// Suppressed by the duplicate window; no upstream call was made.
    Duplicate,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Submission {
    pub tmdb_id: Option<i64>,
    pub request_id: Option<i64>,
    pub media_id: Option<i64>,
    pub status: Option<i64>,
}

/// Stateless per request apart from the duplicate-suppression map; every
/// destination is recomputed from (request, options) on each call.
pub struct Resolver {
    backend: BackendClients,
    options: ResolverOptions,
    events: Arc<dyn EventSink>,
    clock: Arc<dyn Clock>,
    recent: Mutex<HashMap<String, i64>>,
}

impl Resolver {
    pub fn new(
        backend: BackendClients,
        options: ResolverOptions,
        events: Arc<dyn EventSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            backend,
            options,
            events,
            clock,
            recent: Mutex::new(HashMap::new()),
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn clients(&self) -> &BackendClients {
        &self.backend
    }

    pub async fn handle(&self, request: MediaRequest) -> Result<Outcome> {
        if self.is_duplicate(&request).await {
            warn!(
                "duplicate request for '{}' ({}) within {}s, ignoring",
                request.query, request.kind, DUPLICATE_WINDOW_SECS
            );
            return Ok(Outcome::Duplicate);
        }

        let seasons = self.effective_seasons(&request);
        let result = match &self.backend {
            BackendClients::Overseerr(client) => {
                self.dispatch_overseerr(client.as_ref(), &request, seasons.as_ref())
                    .await
            }
            BackendClients::Arr { radarr, sonarr } => {
                self.dispatch_arr(radarr.as_ref(), sonarr.as_ref(), &request, seasons.as_ref())
                    .await
            }
        };

        match result {
            Ok(submission) => {
                self.events
                    .request_complete(RequestCompleted {
                        backend: self.backend.name(),
                        media_type: request.kind.as_str().to_string(),
                        query: request.query.clone(),
                        tmdb_id: submission.tmdb_id,
                        request_id: submission.request_id,
                        media_id: submission.media_id,
                        status: submission.status,
                    })
                    .await;
                Ok(Outcome::Submitted(submission))
            }
            Err(err) => {
                self.events
                    .request_failed(failure_event(
                        self.backend.name(),
                        request.kind,
                        &request.query,
                        &err.to_string(),
                    ))
                    .await;
                Err(err)
            }
        }
    }

    /// Caller-supplied seasons win; otherwise the configured default mode.
    /// Movies never carry a season spec.
    fn effective_seasons(&self, request: &MediaRequest) -> Option<SeasonSpec> {
        if request.kind != MediaKind::Tv {
            return None;
        }
        if let Some(spec) = &request.seasons {
            return Some(spec.clone());
        }
        Some(match self.options.default_tv_seasons {
            DefaultSeasons::Season1 => SeasonSpec::specific([1]),
            DefaultSeasons::All => SeasonSpec::All,
        })
    }

    async fn dispatch_overseerr(
        &self,
        client: &dyn OverseerrApi,
        request: &MediaRequest,
        seasons: Option<&SeasonSpec>,
    ) -> Result<Submission> {
        let mut target = self.overseerr_target(request.kind, &request.overrides);
        if target.server_id.is_none() {
            // Last layer: what the server itself reports as default. A
            // failed listing degrades to omitting serverId entirely.
            let service = ArrService::for_kind(request.kind);
            if let Some(id) = client.default_server_id(service).await {
                debug!("server_id resolved from server-reported default: {id}");
                target.server_id = Some(id);
            }
        }

        let response = client
            .request_media(
                &request.query,
                request.kind,
                seasons,
                request.is_4k,
                target.server_id,
                target.profile_id,
            )
            .await?;
        Ok(overseerr_submission(&response))
    }

    async fn dispatch_arr(
        &self,
        radarr: &dyn RadarrApi,
        sonarr: &dyn SonarrApi,
        request: &MediaRequest,
        seasons: Option<&SeasonSpec>,
    ) -> Result<Submission> {
        let target = self.arr_target(request.kind, &request.overrides)?;
        let root = target
            .root_folder
            .as_deref()
            .ok_or_else(|| RequestError::NotConfigured("no root folder resolved".into()))?;
        let profile = target
            .profile_id
            .ok_or_else(|| RequestError::NotConfigured("no quality profile resolved".into()))?;

        match request.kind {
            MediaKind::Movie => {
                let tmdb_id = ensure_tmdb_id(&request.query, |q| radarr.lookup(q)).await?;
                let response = radarr.add_movie(tmdb_id, root, profile).await?;
                Ok(Submission {
                    tmdb_id: Some(tmdb_id),
                    request_id: response.get("id").and_then(Value::as_i64),
                    ..Submission::default()
                })
            }
            MediaKind::Tv => {
                let tmdb_id = ensure_tmdb_id(&request.query, |q| sonarr.lookup(q)).await?;
                let response = sonarr
                    .add_series(tmdb_id, root, profile, target.language_profile_id, seasons)
                    .await?;
                Ok(Submission {
                    tmdb_id: Some(tmdb_id),
                    request_id: response.get("id").and_then(Value::as_i64),
                    ..Submission::default()
                })
            }
        }
    }

    /// Overseerr destination: override -> saved per-service selection ->
    /// legacy single-server field. The server-reported default is applied
    /// later because it needs a network call.
    fn overseerr_target(&self, kind: MediaKind, overrides: &Overrides) -> ResolvedTarget {
        let saved = &self.options.overseerr;
        let (saved_server, saved_profile) = match kind {
            MediaKind::Movie => (saved.radarr_server_id, saved.movie_profile_id),
            MediaKind::Tv => (saved.sonarr_server_id, saved.tv_profile_id),
        };

        let server_id = first_present(
            "server_id",
            [
                ("call override", overrides.server_id),
                ("saved selection", saved_server),
                ("legacy server field", saved.server_id),
            ],
        );
        let profile_id = first_present(
            "profile_id",
            [
                ("call override", overrides.profile_id),
                ("saved selection", saved_profile),
                ("legacy profile field", saved.profile_id),
            ],
        );

        ResolvedTarget {
            server_id,
            profile_id,
            ..ResolvedTarget::default()
        }
    }

    /// Arr destination: override -> named preset -> configured default.
    /// Root and quality profile are mandatory; language profile is not.
    fn arr_target(&self, kind: MediaKind, overrides: &Overrides) -> Result<ResolvedTarget> {
        let preset = self.chosen_preset(kind, overrides)?;
        let preset_root = preset.and_then(|p| p.root_folder.clone());
        let preset_profile = preset.and_then(|p| p.quality_profile_id);
        let preset_language = preset.and_then(|p| p.language_profile_id);

        let (default_root, default_profile) = match kind {
            MediaKind::Movie => (self.options.radarr_root.clone(), self.options.radarr_profile),
            MediaKind::Tv => (self.options.sonarr_root.clone(), self.options.sonarr_profile),
        };

        let root_folder = first_present(
            "root_folder",
            [
                ("call override", overrides.root_folder_path.clone()),
                ("preset", preset_root),
                ("configured default", default_root),
            ],
        );
        let profile_id = first_present(
            "quality_profile_id",
            [
                ("call override", overrides.quality_profile_id),
                ("preset", preset_profile),
                ("configured default", default_profile),
            ],
        );
        let language_profile_id = match kind {
            MediaKind::Movie => None,
            MediaKind::Tv => first_present(
                "language_profile_id",
                [
                    ("call override", overrides.language_profile_id),
                    ("preset", preset_language),
                    ("configured default", self.options.sonarr_language_profile),
                ],
            ),
        };

        Ok(ResolvedTarget {
            server_id: None,
            profile_id,
            root_folder,
            language_profile_id,
        })
    }

    fn chosen_preset(&self, kind: MediaKind, overrides: &Overrides) -> Result<Option<&PresetTarget>> {
        let Some(name) = overrides.profile_preset.as_deref() else {
            return Ok(None);
        };
        let preset = self
            .options
            .presets
            .iter()
            .find(|p| p.name == name)
            .ok_or_else(|| RequestError::Validation(format!("unknown preset '{name}'")))?;
        Ok(match kind {
            MediaKind::Movie => preset.radarr.as_ref(),
            MediaKind::Tv => preset.sonarr.as_ref(),
        })
    }

    /// Returns true when the same (query, kind) pair was submitted inside
    /// the duplicate window. Prunes stale entries on every check.
    async fn is_duplicate(&self, request: &MediaRequest) -> bool {
        let key = format!("{}:{}", request.query, request.kind);
        let now = self.clock.now().timestamp();
        let mut recent = self.recent.lock().await;
        recent.retain(|_, ts| now - *ts <= DEDUPE_TTL_SECS);
        if let Some(last) = recent.get(&key) {
            if now - *last < DUPLICATE_WINDOW_SECS {
                return true;
            }
        }
        recent.insert(key, now);
        false
    }
}

/// Evaluate an ordered list of named sources, returning the first present
/// value. Keeping precedence as data makes it loggable and testable.
fn first_present<T, const N: usize>(field: &str, sources: [(&'static str, Option<T>); N]) -> Option<T> {
    for (name, value) in sources {
        if let Some(value) = value {
            debug!("{field} resolved from {name}");
            return Some(value);
        }
    }
    None
}

/// A `tmdb:<id>` prefix is a direct-id convention interpreted here, before
/// the client lookup.
async fn ensure_tmdb_id<'a, F, Fut>(query: &'a str, lookup: F) -> Result<i64>
where
    F: FnOnce(&'a str) -> Fut,
    Fut: std::future::Future<Output = Result<Vec<Value>>>,
{
    if let Some(rest) = strip_tmdb_prefix(query) {
        return rest.trim().parse::<i64>().map_err(|_| {
            RequestError::Validation(format!("malformed tmdb id in query '{query}'"))
        });
    }
    let results = lookup(query).await?;
    let first = results
        .first()
        .ok_or_else(|| RequestError::NotFound(format!("no lookup results for '{query}'")))?;
    first
        .get("tmdbId")
        .and_then(Value::as_i64)
        .filter(|id| *id != 0)
        .ok_or_else(|| {
            RequestError::NotFound(format!(
                "no TMDB id in lookup result for '{query}'; use 'tmdb:<id>'"
            ))
        })
}

fn strip_tmdb_prefix(query: &str) -> Option<&str> {
    let trimmed = query.trim();
    if trimmed.len() >= 5 && trimmed[..5].eq_ignore_ascii_case("tmdb:") {
        Some(&trimmed[5..])
    } else {
        None
    }
}

fn overseerr_submission(response: &Value) -> Submission {
    let media_id = response
        .pointer("/media/tmdbId")
        .and_then(Value::as_i64)
        .or_else(|| response.get("mediaId").and_then(Value::as_i64));
    Submission {
        tmdb_id: media_id,
        request_id: response.get("id").and_then(Value::as_i64),
        media_id,
        status: response.get("status").and_then(Value::as_i64),
    }
}
