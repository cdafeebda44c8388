#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Actix-Web API server for septic system lookups.
//!
//! Loads septic records and coverage boundaries from a `DuckDB` file into
//! an in-memory spatial index at startup, then serves coverage checks and
//! rate-limited lookups over the REST API.

pub mod config;
mod handlers;
pub mod usage;

use std::path::Path;
use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{App, HttpServer, middleware, web};
use septic_map_guard::Guard;
use septic_map_lookup::LookupEngine;
use septic_map_lookup::config::ConfigError;
use septic_map_lookup::store::{CoverageLookup, RecordStore};
use septic_map_spatial::{SpatialError, SpatialIndex};

pub use config::ServerConfig;
pub use usage::LogUsageRecorder;

/// Default location of the records database, relative to the working
/// directory.
pub const DEFAULT_DB_PATH: &str = "data/septic.duckdb";

/// Errors that prevent the server from starting.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Toml(#[from] toml::de::Error),
    #[error(transparent)]
    InvalidEngineConfig(#[from] ConfigError),
    #[error("Invalid config: {message}")]
    Config { message: String },
    #[error(transparent)]
    Spatial(#[from] SpatialError),
}

/// Shared application state.
pub struct AppState {
    pub engine: Arc<LookupEngine>,
    pub guard: Arc<Guard>,
    /// Records in the spatial index, for the health endpoint.
    pub record_count: usize,
    /// Coverage regions in the spatial index, for the health endpoint.
    pub region_count: usize,
}

impl AppState {
    /// Wires an engine and an in-memory guard around `index`.
    #[must_use]
    pub fn new(index: Arc<SpatialIndex>, config: ServerConfig) -> Self {
        let record_count = index.record_count();
        let region_count = index.region_count();

        let engine = LookupEngine::new(
            Arc::clone(&index) as Arc<dyn RecordStore>,
            index as Arc<dyn CoverageLookup>,
            config.engine,
        )
        .with_usage_recorder(Arc::new(LogUsageRecorder));

        Self {
            engine: Arc::new(engine),
            guard: Arc::new(Guard::in_memory(config.guard)),
            record_count,
            region_count,
        }
    }
}

/// Registers the `/api` routes.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .route("/health", web::get().to(handlers::health))
            .route("/coverage", web::get().to(handlers::coverage))
            .route("/lookup", web::post().to(handlers::lookup)),
    );
}

/// Starts the septic map API server.
///
/// Loads the config, opens the records database named by `SEPTIC_MAP_DB`
/// (default [`DEFAULT_DB_PATH`]), builds the spatial index, and serves
/// until shut down. The caller provides the async runtime (e.g. via
/// `#[actix_web::main]`).
///
/// # Errors
///
/// * If the config or database cannot be loaded
/// * If the HTTP server fails to bind or encounters a runtime error
#[allow(clippy::future_not_send)]
pub async fn run_server() -> std::io::Result<()> {
    pretty_env_logger::init_custom_env("RUST_LOG");

    let config = ServerConfig::load().map_err(std::io::Error::other)?;

    let db_path = std::env::var("SEPTIC_MAP_DB").unwrap_or_else(|_| DEFAULT_DB_PATH.to_string());
    log::info!("Loading spatial index from {db_path}...");
    let index = SpatialIndex::open(Path::new(&db_path)).map_err(std::io::Error::other)?;

    let state = web::Data::new(AppState::new(Arc::new(index), config));

    let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8080);

    log::info!("Starting server on {bind_addr}:{port}");

    HttpServer::new(move || {
        let cors = Cors::permissive();

        App::new()
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .app_data(state.clone())
            .configure(configure)
    })
    .bind((bind_addr, port))?
    .run()
    .await
}

#[cfg(test)]
mod tests {
    use actix_web::http::StatusCode;
    use actix_web::test;
    use async_trait::async_trait;
    use septic_map_lookup::{EngineConfig, StoreError};
    use septic_map_lookup_models::{
        AttributeValue, Attributes, Coordinate, CoverageRegion, NearbyRecord, QualityTier,
        SepticRecord,
    };
    use septic_map_spatial::geometry::parse_geojson_to_multipolygon;
    use serde_json::{Value, json};

    use super::*;

    const HILLSBOROUGH: &str = r#"{"type":"Polygon","coordinates":[[[-82.8,27.6],[-82.0,27.6],[-82.0,28.2],[-82.8,28.2],[-82.8,27.6]]]}"#;

    fn index() -> Arc<SpatialIndex> {
        let mut attributes = Attributes::new();
        attributes.insert(
            "APNO".to_string(),
            AttributeValue::Text("AP1267843".to_string()),
        );

        let record = SepticRecord {
            id: "r1".to_string(),
            source_id: "fl-doh".to_string(),
            county: "Hillsborough".to_string(),
            state: "FL".to_string(),
            location: Coordinate::new(27.9501, -82.46).unwrap(),
            parcel_id: None,
            address: Some("100 Main St".to_string()),
            quality: Some(QualityTier::VerifiedPermit),
            data_source: "Florida DOH".to_string(),
            attributes,
        };
        let region = CoverageRegion {
            id: "fl-hillsborough".to_string(),
            name: "Hillsborough County Septic Permits".to_string(),
            state: "FL".to_string(),
            county: Some("Hillsborough".to_string()),
            quality: QualityTier::VerifiedPermit,
            record_count: 1,
        };

        Arc::new(SpatialIndex::from_parts(
            vec![record],
            vec![(region, parse_geojson_to_multipolygon(HILLSBOROUGH).unwrap())],
        ))
    }

    fn state() -> web::Data<AppState> {
        web::Data::new(AppState::new(index(), ServerConfig::default()))
    }

    struct DownStore;

    #[async_trait]
    impl RecordStore for DownStore {
        async fn nearby(
            &self,
            _point: Coordinate,
            _radius_meters: f64,
        ) -> Result<Vec<NearbyRecord>, StoreError> {
            Err(StoreError::Backend {
                message: "connection reset".to_string(),
            })
        }
    }

    #[actix_web::test]
    async fn health_reports_index_size() {
        let app = test::init_service(App::new().app_data(state()).configure(configure)).await;
        let req = test::TestRequest::get().uri("/api/health").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;

        assert_eq!(body["healthy"], true);
        assert_eq!(body["recordCount"], 1);
        assert_eq!(body["regionCount"], 1);
    }

    #[actix_web::test]
    async fn coverage_distinguishes_covered_and_uncovered() {
        let app = test::init_service(App::new().app_data(state()).configure(configure)).await;

        let req = test::TestRequest::get()
            .uri("/api/coverage?lat=27.95&lng=-82.46")
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["isCovered"], true);
        assert_eq!(body["quality"], "VERIFIED_PERMIT");
        assert_eq!(body["classification"], "SEPTIC");

        let req = test::TestRequest::get()
            .uri("/api/coverage?lat=40.0&lng=-100.0")
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["isCovered"], false);
        assert_eq!(body["classification"], "UNKNOWN");
        assert!(body["message"].as_str().is_some());
    }

    #[actix_web::test]
    async fn out_of_range_coordinate_is_bad_request() {
        let app = test::init_service(App::new().app_data(state()).configure(configure)).await;

        let req = test::TestRequest::get()
            .uri("/api/coverage?lat=95.0&lng=-82.46")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let req = test::TestRequest::post()
            .uri("/api/lookup")
            .set_json(json!({ "lat": 27.95, "lng": 200.0 }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn lookup_returns_classification_and_rate_headers() {
        let app = test::init_service(App::new().app_data(state()).configure(configure)).await;

        let req = test::TestRequest::post()
            .uri("/api/lookup")
            .insert_header(("X-Forwarded-For", "203.0.113.7, 10.0.0.1"))
            .set_json(json!({ "lat": 27.95, "lng": -82.46, "address": "100 Main St" }))
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers().get("X-RateLimit-Remaining").unwrap(),
            "9"
        );
        assert!(resp.headers().get("X-Abuse-Suspected").is_none());

        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["classification"], "SEPTIC");
        assert_eq!(body["riskLabel"], "CONFIRMED");
        assert_eq!(body["nearest"]["record"]["id"], "r1");
        assert_eq!(body["systemInfo"]["permitNumber"]["value"], "AP1267843");
    }

    #[actix_web::test]
    async fn eleventh_lookup_is_rate_limited_per_caller() {
        let app = test::init_service(App::new().app_data(state()).configure(configure)).await;

        let lookup = |ip: &'static str| {
            test::TestRequest::post()
                .uri("/api/lookup")
                .insert_header(("X-Forwarded-For", ip))
                .set_json(json!({ "lat": 27.95, "lng": -82.46 }))
                .to_request()
        };

        for _ in 0..10 {
            let resp = test::call_service(&app, lookup("198.51.100.1")).await;
            assert_eq!(resp.status(), StatusCode::OK);
        }

        let resp = test::call_service(&app, lookup("198.51.100.1")).await;
        assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(resp.headers().get("X-RateLimit-Remaining").unwrap(), "0");
        assert!(resp.headers().get("Retry-After").is_some());

        let resp = test::call_service(&app, lookup("198.51.100.2")).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[actix_web::test]
    async fn user_header_takes_precedence_over_address() {
        let app = test::init_service(App::new().app_data(state()).configure(configure)).await;

        for i in 0..11 {
            let req = test::TestRequest::post()
                .uri("/api/lookup")
                .insert_header(("X-User-Id", "alice"))
                .insert_header(("X-Forwarded-For", format!("192.0.2.{i}")))
                .set_json(json!({ "lat": 27.95, "lng": -82.46 }))
                .to_request();
            let resp = test::call_service(&app, req).await;
            let expected = if i < 10 {
                StatusCode::OK
            } else {
                StatusCode::TOO_MANY_REQUESTS
            };
            assert_eq!(resp.status(), expected);
        }
    }

    #[actix_web::test]
    async fn coverage_checks_share_the_rate_limit() {
        let app = test::init_service(App::new().app_data(state()).configure(configure)).await;

        for i in 0..10 {
            let req = test::TestRequest::get()
                .uri(&format!("/api/coverage?lat=27.9{i}&lng=-82.46"))
                .insert_header(("X-Forwarded-For", "198.51.100.9"))
                .to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::OK);
        }

        let req = test::TestRequest::get()
            .uri("/api/coverage?lat=27.95&lng=-82.46")
            .insert_header(("X-Forwarded-For", "198.51.100.9"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(resp.headers().get("X-RateLimit-Remaining").unwrap(), "0");

        let req = test::TestRequest::post()
            .uri("/api/lookup")
            .insert_header(("X-Forwarded-For", "198.51.100.9"))
            .set_json(json!({ "lat": 27.95, "lng": -82.46 }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[actix_web::test]
    async fn walking_addresses_sets_abuse_header() {
        let app = test::init_service(App::new().app_data(state()).configure(configure)).await;

        for i in 0..10 {
            let req = test::TestRequest::post()
                .uri("/api/lookup")
                .insert_header(("X-User-Id", "walker"))
                .set_json(json!({
                    "lat": 27.95,
                    "lng": -82.46,
                    "address": format!("{} Main St", 200 + i),
                }))
                .to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::OK);

            let header = resp.headers().get("X-Abuse-Suspected");
            if i < 9 {
                assert!(header.is_none());
            } else {
                assert_eq!(header.unwrap(), "SEQUENTIAL_SCAN");
            }
        }
    }

    #[actix_web::test]
    async fn repeated_lookups_are_flagged_while_rate_limited() {
        let app = test::init_service(App::new().app_data(state()).configure(configure)).await;

        let mut last = None;
        for _ in 0..21 {
            let req = test::TestRequest::post()
                .uri("/api/lookup")
                .insert_header(("X-Forwarded-For", "198.51.100.77"))
                .set_json(json!({ "lat": 27.95, "lng": -82.46 }))
                .to_request();
            last = Some(test::call_service(&app, req).await);
        }

        let resp = last.unwrap();
        assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(resp.headers().get("X-Abuse-Suspected").unwrap(), "REPETITION");
    }

    #[actix_web::test]
    async fn store_failure_is_service_unavailable() {
        let index = index();
        let engine = LookupEngine::new(
            Arc::new(DownStore),
            index as Arc<dyn CoverageLookup>,
            EngineConfig::default(),
        );
        let state = web::Data::new(AppState {
            engine: Arc::new(engine),
            guard: Arc::new(Guard::in_memory(septic_map_guard::GuardConfig::default())),
            record_count: 0,
            region_count: 0,
        });
        let app = test::init_service(App::new().app_data(state).configure(configure)).await;

        let req = test::TestRequest::get()
            .uri("/api/coverage?lat=27.95&lng=-82.46")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
