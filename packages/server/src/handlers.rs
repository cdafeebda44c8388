//! HTTP handler functions for the septic lookup API.

use actix_web::http::StatusCode;
use actix_web::{HttpRequest, HttpResponse, HttpResponseBuilder, web};
use chrono::{Datelike as _, Utc};
use septic_map_guard::{AdmissionDecision, identity_for};
use septic_map_lookup::{EngineError, LookupRequest};
use septic_map_lookup_models::Coordinate;
use septic_map_server_models::{
    ApiCoverage, ApiHealth, ApiLookup, ApiRateLimited, CoordinateParams, LookupBody,
};

use crate::AppState;

/// Header set by an upstream auth proxy with the authenticated user id.
const USER_ID_HEADER: &str = "X-User-Id";

/// `GET /api/health`
pub async fn health(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(ApiHealth {
        healthy: true,
        version: env!("CARGO_PKG_VERSION").to_string(),
        record_count: state.record_count,
        region_count: state.region_count,
    })
}

/// `GET /api/coverage`
///
/// Reports whether the area around a coordinate has septic data, with the
/// headline classification. Shares the caller's rate limit with lookups.
pub async fn coverage(
    req: HttpRequest,
    state: web::Data<AppState>,
    params: web::Query<CoordinateParams>,
) -> HttpResponse {
    let point = match Coordinate::new(params.lat, params.lng) {
        Ok(point) => point,
        Err(e) => return bad_request(&e.to_string()),
    };

    let identity = client_identity(&req);
    let admission = state.guard.check(&identity, &coordinate_key(point)).await;
    if !admission.admitted {
        return rate_limited(&admission);
    }

    match state.engine.resolve_context(point).await {
        Ok(result) => admitted(&admission).json(ApiCoverage::from(result)),
        Err(e) => engine_error(&e),
    }
}

/// `POST /api/lookup`
///
/// Classifies a coordinate on behalf of a rate-limited caller.
pub async fn lookup(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Json<LookupBody>,
) -> HttpResponse {
    let body = body.into_inner();
    let point = match Coordinate::new(body.lat, body.lng) {
        Ok(point) => point,
        Err(e) => return bad_request(&e.to_string()),
    };
    let address = body
        .address
        .map(|a| a.trim().to_string())
        .filter(|a| !a.is_empty());

    let identity = client_identity(&req);
    let query_key = address.clone().unwrap_or_else(|| coordinate_key(point));

    let admission = state.guard.check(&identity, &query_key).await;
    if !admission.admitted {
        return rate_limited(&admission);
    }

    let request = LookupRequest {
        point,
        address,
        identity: Some(identity),
    };

    match state.engine.lookup(&request).await {
        Ok(result) => admitted(&admission).json(ApiLookup::new(result, Utc::now().year())),
        Err(e) => engine_error(&e),
    }
}

/// History key for a query without an address. Starts with `@` so it never
/// parses as a house number.
fn coordinate_key(point: Coordinate) -> String {
    format!("@{:.5},{:.5}", point.lat(), point.lng())
}

/// Rate-limit key for the caller: the authenticated user when an upstream
/// proxy supplied one, otherwise the first `X-Forwarded-For` hop or the
/// peer address.
fn client_identity(req: &HttpRequest) -> String {
    let user = req
        .headers()
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok());

    let forwarded = req
        .headers()
        .get("X-Forwarded-For")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string);

    let address = forwarded
        .or_else(|| req.peer_addr().map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string());

    identity_for(user, &address)
}

fn rate_headers(response: &mut HttpResponseBuilder, admission: &AdmissionDecision) {
    response.insert_header(("X-RateLimit-Remaining", admission.remaining.to_string()));
    response.insert_header((
        "X-RateLimit-Reset",
        admission.reset_at.timestamp().to_string(),
    ));
    if let Some(finding) = admission.abuse {
        response.insert_header(("X-Abuse-Suspected", finding.reason.as_ref()));
    }
}

fn admitted(admission: &AdmissionDecision) -> HttpResponseBuilder {
    let mut response = HttpResponse::Ok();
    rate_headers(&mut response, admission);
    response
}

fn rate_limited(admission: &AdmissionDecision) -> HttpResponse {
    let millis = (admission.reset_at - Utc::now()).num_milliseconds().max(0);
    let retry_after_seconds = (millis + 999) / 1000;

    let mut response = HttpResponse::TooManyRequests();
    rate_headers(&mut response, admission);
    response.insert_header(("Retry-After", retry_after_seconds.to_string()));
    response.json(ApiRateLimited {
        error: "Rate limit exceeded".to_string(),
        reset_at: admission.reset_at,
        retry_after_seconds,
    })
}

fn bad_request(message: &str) -> HttpResponse {
    HttpResponse::BadRequest().json(serde_json::json!({ "error": message }))
}

fn engine_error(e: &EngineError) -> HttpResponse {
    if e.is_invalid_input() {
        return bad_request(&e.to_string());
    }

    log::error!("Lookup failed: {e}");
    HttpResponseBuilder::new(StatusCode::SERVICE_UNAVAILABLE).json(serde_json::json!({
        "error": "Lookup temporarily unavailable"
    }))
}
