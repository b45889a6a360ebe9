//! Health & readiness handlers.
//!
//! - GET /healthz  -> simple liveness ("ok")
//! - GET /readyz   -> readiness that checks DB connectivity and the media host

use crate::models::media::MediaType;
use crate::services::media_service::MediaService;
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use bytes::Bytes;
use serde::Serialize;
use std::collections::HashMap;
use uuid::Uuid;

/// `GET /healthz`
///
/// Very small liveness probe — always returns 200 OK with a plain JSON body.
/// This endpoint should be cheap and never perform I/O.
pub async fn healthz() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok".into(),
        }),
    )
}

/// `GET /readyz`
///
/// Readiness probe that:
/// 1. Runs a lightweight query against SQLite (`SELECT 1`).
/// 2. Performs a best-effort store/open/delete roundtrip through the media host.
///
/// Returns JSON describing each check. HTTP 200 when all checks pass,
/// HTTP 503 when any check fails.
pub async fn readyz(State(service): State<MediaService>) -> impl IntoResponse {
    // 1) SQLite check
    let sqlite_check = match sqlx::query_scalar::<_, i64>("SELECT 1")
        .fetch_one(&*service.db)
        .await
    {
        Ok(v) if v == 1 => (true, None::<String>),
        Ok(v) => (false, Some(format!("unexpected result: {}", v))),
        Err(e) => (false, Some(format!("error: {}", e))),
    };

    // 2) Media host roundtrip with a throwaway payload
    let probe_name = format!("readyz-{}", Uuid::new_v4());
    let host_check = match service
        .host
        .store(&probe_name, MediaType::Photo, Bytes::from_static(b"readyz"))
        .await
    {
        Ok(hosted) => match service.host.open(&hosted.public_id).await {
            Ok((_, len)) if len == 6 => match service.host.delete(&hosted.public_id).await {
                Ok(_) => (true, None::<String>),
                Err(e) => (true, Some(format!("could not remove probe file: {}", e))),
            },
            Ok((_, len)) => {
                let _ = service.host.delete(&hosted.public_id).await;
                (false, Some(format!("probe length mismatch: {}", len)))
            }
            Err(e) => (false, Some(format!("could not read probe file: {}", e))),
        },
        Err(e) => (false, Some(format!("could not store probe file: {}", e))),
    };

    let sqlite_ok = sqlite_check.0;
    let host_ok = host_check.0;
    let overall_ok = sqlite_ok && host_ok;

    let mut checks = HashMap::new();
    checks.insert(
        "sqlite",
        CheckStatus {
            ok: sqlite_ok,
            error: sqlite_check.1,
        },
    );
    checks.insert(
        "media_host",
        CheckStatus {
            ok: host_ok,
            error: host_check.1,
        },
    );

    let body = ReadyResponse {
        status: if overall_ok {
            "ok".into()
        } else {
            "error".into()
        },
        checks,
    };

    let status = if overall_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body))
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
}

#[derive(Serialize)]
struct ReadyResponse {
    status: String,
    checks: HashMap<&'static str, CheckStatus>,
}

#[derive(Serialize)]
struct CheckStatus {
    ok: bool,
    error: Option<String>,
}
