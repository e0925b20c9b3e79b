use crate::error::{RequestError, Result};
use crate::http::HttpClient;
use crate::models::{numeric_id, QualityProfile, RootFolder, SeasonSpec};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tracing::debug;

#[async_trait]
pub trait RadarrApi: Send + Sync {
    async fn ping(&self) -> bool;
    async fn lookup(&self, query: &str) -> Result<Vec<Value>>;
    async fn add_movie(&self, tmdb_id: i64, root: &str, quality_profile_id: i64) -> Result<Value>;
    async fn root_folders(&self) -> Result<Vec<RootFolder>>;
    async fn quality_profiles(&self) -> Result<Vec<QualityProfile>>;
}

#[async_trait]
pub trait SonarrApi: Send + Sync {
    async fn ping(&self) -> bool;
    async fn lookup(&self, query: &str) -> Result<Vec<Value>>;
    async fn add_series(
        &self,
        tmdb_id: i64,
        root: &str,
        quality_profile_id: i64,
        language_profile_id: Option<i64>,
        seasons: Option<&SeasonSpec>,
    ) -> Result<Value>;
    async fn root_folders(&self) -> Result<Vec<RootFolder>>;
    async fn quality_profiles(&self) -> Result<Vec<QualityProfile>>;
}

#[derive(Debug, Clone)]
pub struct RadarrClient {
    http: HttpClient,
}

impl RadarrClient {
    pub fn new(base_url: &str, api_key: &str) -> Result<Self> {
        Ok(Self {
            http: HttpClient::new(base_url, api_key)?,
        })
    }
}

#[async_trait]
impl RadarrApi for RadarrClient {
    async fn ping(&self) -> bool {
        self.http.get_value("/api/v3/system/status").await.is_ok()
    }

    async fn lookup(&self, query: &str) -> Result<Vec<Value>> {
        let path = format!("/api/v3/movie/lookup?term={}", urlencoding::encode(query));
        self.http.get_json(&path).await
    }

    async fn add_movie(&self, tmdb_id: i64, root: &str, quality_profile_id: i64) -> Result<Value> {
        let items = self.lookup(&format!("tmdb:{tmdb_id}")).await?;
        let movie = items
            .first()
            .ok_or_else(|| RequestError::NotFound(format!("Radarr lookup failed for tmdb:{tmdb_id}")))?;
        let payload = build_movie_payload(movie, tmdb_id, root, quality_profile_id);
        debug!("adding movie tmdb:{} under {}", tmdb_id, root);
        self.http.post_value("/api/v3/movie", &payload).await
    }

    async fn root_folders(&self) -> Result<Vec<RootFolder>> {
        self.http.get_json("/api/v3/rootfolder").await
    }

    async fn quality_profiles(&self) -> Result<Vec<QualityProfile>> {
        self.http.get_json("/api/v3/qualityprofile").await
    }
}

#[derive(Debug, Clone)]
pub struct SonarrClient {
    http: HttpClient,
}

impl SonarrClient {
    pub fn new(base_url: &str, api_key: &str) -> Result<Self> {
        Ok(Self {
            http: HttpClient::new(base_url, api_key)?,
        })
    }
}

#[async_trait]
impl SonarrApi for SonarrClient {
    async fn ping(&self) -> bool {
        self.http.get_value("/api/v3/system/status").await.is_ok()
    }

    async fn lookup(&self, query: &str) -> Result<Vec<Value>> {
        let path = format!("/api/v3/series/lookup?term={}", urlencoding::encode(query));
        self.http.get_json(&path).await
    }

    async fn add_series(
        &self,
        tmdb_id: i64,
        root: &str,
        quality_profile_id: i64,
        language_profile_id: Option<i64>,
        seasons: Option<&SeasonSpec>,
    ) -> Result<Value> {
        let items = self.lookup(&format!("tmdb:{tmdb_id}")).await?;
        let series = items
            .first()
            .ok_or_else(|| RequestError::NotFound(format!("Sonarr lookup failed for tmdb:{tmdb_id}")))?;
        let payload = build_series_payload(
            series,
            tmdb_id,
            root,
            quality_profile_id,
            language_profile_id,
            seasons,
        )?;
        debug!("adding series tmdb:{} under {}", tmdb_id, root);
        self.http.post_value("/api/v3/series", &payload).await
    }

    async fn root_folders(&self) -> Result<Vec<RootFolder>> {
        self.http.get_json("/api/v3/rootfolder").await
    }

    async fn quality_profiles(&self) -> Result<Vec<QualityProfile>> {
        self.http.get_json("/api/v3/qualityprofile").await
    }
}

/// Creation payload for Radarr: title/year/slug/images copied verbatim from
/// the lookup result, monitored, with an immediate search.
fn build_movie_payload(movie: &Value, tmdb_id: i64, root: &str, quality_profile_id: i64) -> Value {
    json!({
        "tmdbId": tmdb_id,
        "title": movie.get("title").cloned().unwrap_or(Value::Null),
        "year": movie.get("year").cloned().unwrap_or(Value::Null),
        "titleSlug": movie.get("titleSlug").cloned().unwrap_or(Value::Null),
        "qualityProfileId": quality_profile_id,
        "monitored": true,
        "rootFolderPath": root,
        "addOptions": {"searchForMovie": true},
        "images": movie.get("images").cloned().unwrap_or_else(|| json!([])),
    })
}

/// Creation payload for Sonarr with a monitored flag per reported season.
/// With no season spec every season is monitored; `languageProfileId` is
/// omitted entirely (not null) when unset.
fn build_series_payload(
    series: &Value,
    tmdb_id: i64,
    root: &str,
    quality_profile_id: i64,
    language_profile_id: Option<i64>,
    seasons: Option<&SeasonSpec>,
) -> Result<Value> {
    let reported = series
        .get("seasons")
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default();

    let mut season_flags = Vec::with_capacity(reported.len());
    for entry in &reported {
        let number = numeric_id(
            entry.get("seasonNumber").unwrap_or(&Value::Null),
            "seasonNumber",
        )?;
        let number = u32::try_from(number).map_err(|_| {
            RequestError::Validation(format!("negative season number {number} in lookup result"))
        })?;
        let monitored = seasons.map_or(true, |spec| spec.monitors(number));
        season_flags.push(json!({"seasonNumber": number, "monitored": monitored}));
    }

    let mut payload = Map::new();
    payload.insert("title".into(), series.get("title").cloned().unwrap_or(Value::Null));
    payload.insert(
        "titleSlug".into(),
        series.get("titleSlug").cloned().unwrap_or(Value::Null),
    );
    payload.insert(
        "images".into(),
        series.get("images").cloned().unwrap_or_else(|| json!([])),
    );
    payload.insert("seasons".into(), Value::Array(season_flags));
    payload.insert("rootFolderPath".into(), json!(root));
    payload.insert("qualityProfileId".into(), json!(quality_profile_id));
    if let Some(lang) = language_profile_id {
        payload.insert("languageProfileId".into(), json!(lang));
    }
    payload.insert("monitored".into(), json!(true));
    payload.insert(
        "addOptions".into(),
        json!({"searchForMissingEpisodes": true}),
    );
    payload.insert("tmdbId".into(), json!(tmdb_id));
    Ok(Value::Object(payload))
}
