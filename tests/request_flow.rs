use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use fetcharr::app::{build_router, AppState};
use fetcharr::arr::{RadarrApi, SonarrApi};
use fetcharr::error::RequestError;
use fetcharr::events::{EventSink, RequestCompleted, RequestFailed};
use fetcharr::models::{MediaKind, QualityProfile, RootFolder, SeasonSpec, ServerProfile};
use fetcharr::overseerr::{ArrService, OverseerrApi, OverseerrUser};
use fetcharr::resolver::{BackendClients, Resolver, ResolverOptions, SystemClock};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use tower::util::ServiceExt;

#[derive(Debug, Clone)]
struct RecordedRequest {
    query: String,
    kind: MediaKind,
    seasons: Option<SeasonSpec>,
    is_4k: bool,
    server_id: Option<i64>,
    profile_id: Option<i64>,
}

/// Overseerr stand-in that records every submission it receives.
struct FakeOverseerr {
    calls: Mutex<Vec<RecordedRequest>>,
    response: Value,
    fail_with: Option<fn() -> RequestError>,
}

impl FakeOverseerr {
    fn succeeding() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            response: json!({"id": 77, "status": 2, "media": {"tmdbId": 438631}}),
            fail_with: None,
        }
    }

    fn failing(fail_with: fn() -> RequestError) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            response: Value::Null,
            fail_with: Some(fail_with),
        }
    }

    fn calls(&self) -> Vec<RecordedRequest> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl OverseerrApi for FakeOverseerr {
    async fn ping(&self) -> bool {
        true
    }

    async fn search(&self, _query: &str) -> fetcharr::error::Result<Vec<Value>> {
        Ok(Vec::new())
    }

    async fn request_media(
        &self,
        query: &str,
        kind: MediaKind,
        seasons: Option<&SeasonSpec>,
        is_4k: bool,
        server_id: Option<i64>,
        profile_id: Option<i64>,
    ) -> fetcharr::error::Result<Value> {
        self.calls.lock().unwrap().push(RecordedRequest {
            query: query.to_string(),
            kind,
            seasons: seasons.cloned(),
            is_4k,
            server_id,
            profile_id,
        });
        if let Some(fail) = self.fail_with {
            return Err(fail());
        }
        Ok(self.response.clone())
    }

    async fn list_servers(&self, _service: ArrService) -> fetcharr::error::Result<Vec<ServerProfile>> {
        Ok(Vec::new())
    }

    async fn server_profiles(
        &self,
        _service: ArrService,
        _server_id: i64,
    ) -> fetcharr::error::Result<Vec<QualityProfile>> {
        Ok(Vec::new())
    }

    async fn list_users(&self) -> fetcharr::error::Result<Vec<OverseerrUser>> {
        Ok(Vec::new())
    }
}

struct FakeRadarr;

#[async_trait::async_trait]
impl RadarrApi for FakeRadarr {
    async fn ping(&self) -> bool {
        true
    }

    async fn lookup(&self, _query: &str) -> fetcharr::error::Result<Vec<Value>> {
        Ok(vec![json!({"tmdbId": 438631, "title": "Dune"})])
    }

    async fn add_movie(
        &self,
        _tmdb_id: i64,
        _root: &str,
        _quality_profile_id: i64,
    ) -> fetcharr::error::Result<Value> {
        Ok(json!({"id": 5}))
    }

    async fn root_folders(&self) -> fetcharr::error::Result<Vec<RootFolder>> {
        Ok(vec![RootFolder {
            id: Some(1),
            path: "/movies".into(),
        }])
    }

    async fn quality_profiles(&self) -> fetcharr::error::Result<Vec<QualityProfile>> {
        Ok(vec![QualityProfile {
            id: 7,
            name: "HD-1080p".into(),
        }])
    }
}

struct FakeSonarr;

#[async_trait::async_trait]
impl SonarrApi for FakeSonarr {
    async fn ping(&self) -> bool {
        true
    }

    async fn lookup(&self, _query: &str) -> fetcharr::error::Result<Vec<Value>> {
        Ok(vec![json!({"tmdbId": 1396, "title": "Breaking Bad", "seasons": []})])
    }

    async fn add_series(
        &self,
        _tmdb_id: i64,
        _root: &str,
        _quality_profile_id: i64,
        _language_profile_id: Option<i64>,
        _seasons: Option<&SeasonSpec>,
    ) -> fetcharr::error::Result<Value> {
        Ok(json!({"id": 9}))
    }

    async fn root_folders(&self) -> fetcharr::error::Result<Vec<RootFolder>> {
        Ok(Vec::new())
    }

    async fn quality_profiles(&self) -> fetcharr::error::Result<Vec<QualityProfile>> {
        Ok(Vec::new())
    }
}

#[derive(Default)]
struct RecordingSink {
    completed: Mutex<Vec<RequestCompleted>>,
    failed: Mutex<Vec<RequestFailed>>,
}

#[async_trait::async_trait]
impl EventSink for RecordingSink {
    async fn request_complete(&self, event: RequestCompleted) {
        self.completed.lock().unwrap().push(event);
    }

    async fn request_failed(&self, event: RequestFailed) {
        self.failed.lock().unwrap().push(event);
    }
}

fn overseerr_app(
    fake: Arc<FakeOverseerr>,
    options: ResolverOptions,
    sink: Arc<RecordingSink>,
) -> Router {
    let resolver = Arc::new(Resolver::new(
        BackendClients::Overseerr(fake),
        options,
        sink,
        Arc::new(SystemClock),
    ));
    build_router(AppState { resolver })
}

fn arr_app(options: ResolverOptions) -> Router {
    let resolver = Arc::new(Resolver::new(
        BackendClients::Arr {
            radarr: Arc::new(FakeRadarr),
            sonarr: Arc::new(FakeSonarr),
        },
        options,
        Arc::new(RecordingSink::default()),
        Arc::new(SystemClock),
    ));
    build_router(AppState { resolver })
}

fn post_request(body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/request")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn response_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn movie_request_submits_and_reports_ids() {
    let fake = Arc::new(FakeOverseerr::succeeding());
    let sink = Arc::new(RecordingSink::default());
    let app = overseerr_app(fake.clone(), ResolverOptions::default(), sink.clone());

    let response = app
        .oneshot(post_request(json!({"query": "Dune", "media_type": "movie"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = response_json(response).await;
    assert_eq!(body["status"], "submitted");
    assert_eq!(body["tmdb_id"], 438631);
    assert_eq!(body["request_id"], 77);

    let calls = fake.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].query, "Dune");
    assert_eq!(calls[0].kind, MediaKind::Movie);
    assert!(calls[0].seasons.is_none());
    assert!(!calls[0].is_4k);

    let completed = sink.completed.lock().unwrap();
    assert_eq!(completed.len(), 1);
    assert_eq!(completed[0].tmdb_id, Some(438631));
}

#[tokio::test]
async fn tv_request_without_seasons_defaults_to_season_one() {
    let fake = Arc::new(FakeOverseerr::succeeding());
    let app = overseerr_app(
        fake.clone(),
        ResolverOptions::default(),
        Arc::new(RecordingSink::default()),
    );

    let response = app
        .oneshot(post_request(
            json!({"query": "Breaking Bad", "media_type": "tv"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let calls = fake.calls();
    assert_eq!(calls[0].seasons, Some(SeasonSpec::specific([1])));
}

#[tokio::test]
async fn season_string_and_override_flow_through() {
    let fake = Arc::new(FakeOverseerr::succeeding());
    let app = overseerr_app(
        fake.clone(),
        ResolverOptions::default(),
        Arc::new(RecordingSink::default()),
    );

    let response = app
        .oneshot(post_request(json!({
            "query": "Breaking Bad",
            "media_type": "show",
            "seasons": "all",
            "is_4k": true,
            "overseerr_server_id": "2",
            "overseerr_profile_id": 6,
        })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let calls = fake.calls();
    assert_eq!(calls[0].kind, MediaKind::Tv);
    assert_eq!(calls[0].seasons, Some(SeasonSpec::All));
    assert!(calls[0].is_4k);
    assert_eq!(calls[0].server_id, Some(2));
    assert_eq!(calls[0].profile_id, Some(6));
}

#[tokio::test]
async fn invalid_media_type_is_unprocessable_without_upstream_calls() {
    let fake = Arc::new(FakeOverseerr::succeeding());
    let app = overseerr_app(
        fake.clone(),
        ResolverOptions::default(),
        Arc::new(RecordingSink::default()),
    );

    let response = app
        .oneshot(post_request(json!({"query": "Dune", "media_type": "music"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert!(fake.calls().is_empty());
}

#[tokio::test]
async fn malformed_override_id_is_unprocessable() {
    let fake = Arc::new(FakeOverseerr::succeeding());
    let app = overseerr_app(
        fake.clone(),
        ResolverOptions::default(),
        Arc::new(RecordingSink::default()),
    );

    let response = app
        .oneshot(post_request(json!({
            "query": "Dune",
            "media_type": "movie",
            "overseerr_profile_id": "not-a-number",
        })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert!(fake.calls().is_empty());
}

#[tokio::test]
async fn not_found_upstream_and_failure_events_map_to_statuses() {
    let cases: [(fn() -> RequestError, StatusCode); 2] = [
        (
            || RequestError::NotFound("no results for 'Dune'".into()),
            StatusCode::NOT_FOUND,
        ),
        (
            || RequestError::upstream(503, "GET http://overseerr.local:5055/api -> 503: busy"),
            StatusCode::BAD_GATEWAY,
        ),
    ];

    for (fail, want) in cases {
        let fake = Arc::new(FakeOverseerr::failing(fail));
        let sink = Arc::new(RecordingSink::default());
        let app = overseerr_app(fake, ResolverOptions::default(), sink.clone());

        let response = app
            .oneshot(post_request(json!({"query": "Dune", "media_type": "movie"})))
            .await
            .unwrap();
        assert_eq!(response.status(), want);

        let failed = sink.failed.lock().unwrap();
        assert_eq!(failed.len(), 1);
        // The event payload never carries a full URL.
        assert!(!failed[0].error.contains("http://"));
    }
}

#[tokio::test]
async fn unconfigured_arr_backend_is_a_conflict() {
    let app = arr_app(ResolverOptions::default());

    let response = app
        .oneshot(post_request(json!({"query": "Dune", "media_type": "movie"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn configured_arr_backend_submits() {
    let options = ResolverOptions {
        radarr_root: Some("/movies".into()),
        radarr_profile: Some(7),
        ..ResolverOptions::default()
    };
    let app = arr_app(options);

    let response = app
        .oneshot(post_request(json!({"query": "Dune", "media_type": "movie"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = response_json(response).await;
    assert_eq!(body["tmdb_id"], 438631);
    assert_eq!(body["request_id"], 5);
}

#[tokio::test]
async fn duplicate_submission_is_suppressed() {
    let fake = Arc::new(FakeOverseerr::succeeding());
    let sink = Arc::new(RecordingSink::default());
    let resolver = Arc::new(Resolver::new(
        BackendClients::Overseerr(fake.clone()),
        ResolverOptions::default(),
        sink,
        Arc::new(SystemClock),
    ));
    let state = AppState { resolver };

    let first = build_router(state.clone())
        .oneshot(post_request(json!({"query": "Dune", "media_type": "movie"})))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::CREATED);

    let second = build_router(state)
        .oneshot(post_request(json!({"query": "Dune", "media_type": "movie"})))
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::OK);
    let body = response_json(second).await;
    assert_eq!(body["status"], "duplicate");
    assert_eq!(fake.calls().len(), 1);
}

#[tokio::test]
async fn health_reports_backend() {
    let app = overseerr_app(
        Arc::new(FakeOverseerr::succeeding()),
        ResolverOptions::default(),
        Arc::new(RecordingSink::default()),
    );

    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["backend"], "overseerr");
    assert_eq!(body["reachable"]["overseerr"], true);
}

#[tokio::test]
async fn targets_lists_arr_destinations() {
    let app = arr_app(ResolverOptions::default());

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/targets")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["backend"], "arr");
    assert_eq!(body["radarr"]["root_folders"][0]["path"], "/movies");
    assert_eq!(body["radarr"]["quality_profiles"][0]["name"], "HD-1080p");
}
