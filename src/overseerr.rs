use crate::error::{RequestError, Result};
use crate::http::HttpClient;
use crate::models::{numeric_id, MediaKind, QualityProfile, SeasonSpec, ServerProfile};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::debug;

/// Which arr service a registered Overseerr server belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrService {
    Radarr,
    Sonarr,
}

impl ArrService {
    pub fn path_segment(&self) -> &'static str {
        match self {
            Self::Radarr => "radarr",
            Self::Sonarr => "sonarr",
        }
    }

    pub fn for_kind(kind: MediaKind) -> Self {
        match kind {
            MediaKind::Movie => Self::Radarr,
            MediaKind::Tv => Self::Sonarr,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverseerrUser {
    pub id: i64,
    #[serde(rename = "displayName")]
    pub display_name: Option<String>,
    pub email: Option<String>,
}

#[async_trait]
pub trait OverseerrApi: Send + Sync {
    async fn ping(&self) -> bool;
    async fn search(&self, query: &str) -> Result<Vec<Value>>;
    async fn request_media(
        &self,
        query: &str,
        kind: MediaKind,
        seasons: Option<&SeasonSpec>,
        is_4k: bool,
        server_id: Option<i64>,
        profile_id: Option<i64>,
    ) -> Result<Value>;
    async fn list_servers(&self, service: ArrService) -> Result<Vec<ServerProfile>>;
    async fn server_profiles(&self, service: ArrService, server_id: i64)
        -> Result<Vec<QualityProfile>>;
    async fn list_users(&self) -> Result<Vec<OverseerrUser>>;

    /// The server Overseerr would use by default: the one marked default,
    /// else the first returned. `None` when the listing is empty or fails.
    async fn default_server_id(&self, service: ArrService) -> Option<i64> {
        let servers = self.list_servers(service).await.ok()?;
        servers
            .iter()
            .find(|s| s.is_default)
            .or_else(|| servers.first())
            .map(|s| s.id)
    }
}

#[derive(Debug, Clone)]
pub struct OverseerrClient {
    http: HttpClient,
}

impl OverseerrClient {
    pub fn new(base_url: &str, api_key: &str) -> Result<Self> {
        Ok(Self {
            http: HttpClient::new(base_url, api_key)?,
        })
    }
}

#[async_trait]
impl OverseerrApi for OverseerrClient {
    async fn ping(&self) -> bool {
        self.http.get_value("/api/v1/status").await.is_ok()
    }

    async fn search(&self, query: &str) -> Result<Vec<Value>> {
        let path = format!("/api/v1/search?query={}", urlencoding::encode(query));
        let body = self.http.get_value(&path).await?;
        // Tolerate both `{results: [...]}` and bare-array response shapes.
        match body {
            Value::Object(mut map) => match map.remove("results") {
                Some(Value::Array(items)) => Ok(items),
                _ => Ok(Vec::new()),
            },
            Value::Array(items) => Ok(items),
            _ => Ok(Vec::new()),
        }
    }

    async fn request_media(
        &self,
        query: &str,
        kind: MediaKind,
        seasons: Option<&SeasonSpec>,
        is_4k: bool,
        server_id: Option<i64>,
        profile_id: Option<i64>,
    ) -> Result<Value> {
        let results = self.search(query).await?;
        if results.is_empty() {
            return Err(RequestError::NotFound(format!("no results for '{query}'")));
        }

        let best = best_match(&results, kind)
            .ok_or_else(|| RequestError::NotFound(format!("no suitable '{kind}' result for '{query}'")))?;
        let tmdb_id = extract_tmdb_id(best)
            .ok_or_else(|| RequestError::NotFound("best match is missing a TMDB id".into()))?;
        debug!("matched '{}' -> tmdb id {}", query, tmdb_id);

        let mut payload = Map::new();
        payload.insert("mediaType".into(), json!(kind.as_str()));
        payload.insert("mediaId".into(), json!(tmdb_id));
        payload.insert("is4k".into(), json!(is_4k));
        if let Some(id) = server_id {
            payload.insert("serverId".into(), json!(id));
        }
        if let Some(id) = profile_id {
            payload.insert("profileId".into(), json!(id));
        }
        if kind == MediaKind::Tv {
            if let Some(spec) = seasons {
                payload.insert("seasons".into(), spec.to_overseerr());
            }
        }

        self.http.post_value("/api/v1/request", &Value::Object(payload)).await
    }

    async fn list_servers(&self, service: ArrService) -> Result<Vec<ServerProfile>> {
        let path = format!("/api/v1/service/{}", service.path_segment());
        self.http.get_json(&path).await
    }

    async fn server_profiles(
        &self,
        service: ArrService,
        server_id: i64,
    ) -> Result<Vec<QualityProfile>> {
        #[derive(Deserialize)]
        struct ServerDetails {
            #[serde(default)]
            profiles: Vec<QualityProfile>,
        }

        let path = format!("/api/v1/service/{}/{}", service.path_segment(), server_id);
        let details: ServerDetails = self.http.get_json(&path).await?;
        Ok(details.profiles)
    }

    async fn list_users(&self) -> Result<Vec<OverseerrUser>> {
        #[derive(Deserialize)]
        struct UserPage {
            #[serde(default)]
            results: Vec<OverseerrUser>,
        }

        let page: UserPage = self.http.get_json("/api/v1/user").await?;
        Ok(page.results)
    }
}

/// Filter candidates to the requested kind, falling back to the full pool
/// when no candidate carries a matching type tag; pick the highest-scored
/// one, first max winning ties.
pub fn best_match(results: &[Value], kind: MediaKind) -> Option<&Value> {
    let typed: Vec<&Value> = results
        .iter()
        .filter(|r| {
            r.get("mediaType")
                .or_else(|| r.get("media_type"))
                .and_then(|v| v.as_str())
                == Some(kind.as_str())
        })
        .collect();
    let pool: Vec<&Value> = if typed.is_empty() {
        results.iter().collect()
    } else {
        typed
    };

    let mut best: Option<(&Value, f64)> = None;
    for candidate in pool {
        let s = score(candidate);
        match best {
            Some((_, current)) if s <= current => {}
            _ => best = Some((candidate, s)),
        }
    }
    best.map(|(c, _)| c)
}

fn score(candidate: &Value) -> f64 {
    ["popularity", "voteAverage", "vote_average"]
        .iter()
        .find_map(|key| candidate.get(*key).and_then(|v| v.as_f64()))
        .unwrap_or(0.0)
}

fn extract_tmdb_id(candidate: &Value) -> Option<i64> {
    ["id", "tmdbId", "tmdb_id"]
        .iter()
        .find_map(|key| candidate.get(*key).and_then(|v| numeric_id(v, "tmdb id").ok()))
}
