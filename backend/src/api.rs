use crate::errors::ApiError;
use crate::issuance;
use crate::models::*;
use crate::registry::{CredentialDetails, CredentialHash};
use crate::state::AppState;
use axum::{
    extract::{Path, Request, State},
    http::{HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use base64::Engine;
use chrono::Utc;
use devcred_zk::types::CircuitKind;
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};
use tracing::Instrument;
use uuid::Uuid;

pub fn router(state: AppState) -> Router {
    let protected_routes = Router::new()
        .route("/api/v1/credentials/issue", post(issue_credential))
        .route("/api/v1/credentials/:hash/revoke", post(revoke_credential))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/api/v1/credentials/verify", post(verify_credential))
        .route("/api/v1/credentials/:hash", get(get_credential))
        .route("/api/v1/zk/vk/:circuit", get(get_vk))
        .merge(protected_routes)
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}

async fn auth_middleware(
    State(state): State<AppState>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    if let Some(provided_key) = headers.get("X-API-KEY") {
        if provided_key == state.config.api_key.as_str() {
            return Ok(next.run(request).await);
        }
    }

    tracing::warn!(path = %request.uri().path(), "unauthorized access attempt");
    Err(StatusCode::UNAUTHORIZED)
}

fn parse_hash(raw: &str) -> Result<CredentialHash, ApiError> {
    raw.parse().map_err(ApiError::BadRequest)
}

async fn issue_credential(State(state): State<AppState>, Json(req): Json<IssueCredentialRequest>) -> Response {
    let request_id = Uuid::new_v4();
    let span = tracing::info_span!("issue", %request_id, subject = %req.user_address);

    let started = Instant::now();
    let result = issuance::issue_credential(&state, req).instrument(span).await;
    let elapsed_ms = started.elapsed().as_millis() as u64;

    match result {
        Ok(issued) => {
            tracing::info!(%request_id, hash = %issued.credential_hash, elapsed_ms, "credential issued");
            Json(IssueCredentialResponse::issued(issued, elapsed_ms)).into_response()
        }
        Err(e) => {
            let err = ApiError::from(e);
            tracing::warn!(%request_id, status = %err.status(), error = %err, elapsed_ms, "issuance failed");
            (err.status(), Json(IssueCredentialResponse::failed(err.message(), elapsed_ms))).into_response()
        }
    }
}

async fn verify_credential(
    State(state): State<AppState>,
    Json(req): Json<VerifyCredentialRequest>,
) -> Result<Json<VerifyCredentialResponse>, ApiError> {
    let is_valid = issuance::verify_credential(&state, &req).await?;

    Ok(Json(VerifyCredentialResponse {
        success: true,
        is_valid,
        verified_at: Utc::now(),
        error: None,
    }))
}

async fn get_credential(
    State(state): State<AppState>,
    Path(hash): Path<String>,
) -> Result<Json<CredentialDetails>, ApiError> {
    let hash = parse_hash(&hash)?;
    Ok(Json(state.registry.get_credential_details(&hash).await?))
}

/// Revokes as the service's verifier identity.
async fn revoke_credential(
    State(state): State<AppState>,
    Path(hash): Path<String>,
) -> Result<Json<CredentialDetails>, ApiError> {
    let hash = parse_hash(&hash)?;
    state.registry.revoke_credential(&state.config.service_address, &hash).await?;
    Ok(Json(state.registry.get_credential_details(&hash).await?))
}

async fn get_vk(State(state): State<AppState>, Path(circuit): Path<String>) -> Result<Json<ZkVkResponse>, ApiError> {
    let kind: CircuitKind = circuit
        .parse()
        .map_err(|_| ApiError::NotFound(format!("unknown circuit: {circuit}")))?;

    let keys = state.keys.get(kind).await.map_err(|e| {
        tracing::error!(error = %e, circuit = kind.name(), "key setup failed");
        ApiError::Internal
    })?;
    let vk_bytes = devcred_zk::groth16::serialize_vk(keys.vk.as_ref()).map_err(|_| ApiError::Internal)?;

    let b64 = base64::engine::general_purpose::STANDARD.encode(vk_bytes);

    Ok(Json(ZkVkResponse {
        circuit: kind.name().to_string(),
        curve: "bn254".to_string(),
        proof_system: "groth16".to_string(),
        vk_b64: b64,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::tests::three_repos;
    use crate::config::Config;
    use crate::credentials::CredentialType;
    use crate::registry::tests::{addr, entry, hash};
    use crate::registry::{CredentialRegistry, CredentialStatus, InMemoryStore, SystemClock};
    use crate::stats::FixtureStatsProvider;
    use axum::body::Body;
    use http_body_util::BodyExt;
    use std::collections::HashMap;
    use std::sync::Arc;
    use tower::ServiceExt;

    async fn app(dir: &tempfile::TempDir) -> (Router, AppState) {
        let vars: HashMap<&str, String> = [
            ("DATA_DIR", dir.path().to_string_lossy().to_string()),
            ("API_KEY", "test-key".to_string()),
        ]
        .into();
        let config = Config::from_lookup(|k| vars.get(k).cloned()).unwrap();
        let registry = CredentialRegistry::open(
            Arc::new(InMemoryStore::new()),
            config.service_address.clone(),
            Arc::new(SystemClock),
        )
        .await
        .unwrap();
        let stats = Arc::new(FixtureStatsProvider::new().with_user("dev", three_repos()));
        let state = AppState::new(config, registry, stats);
        (router(state.clone()), state)
    }

    async fn body_json(resp: Response) -> serde_json::Value {
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&body).unwrap()
    }

    fn post_json(uri: &str, key: Option<&str>, body: serde_json::Value) -> axum::http::Request<Body> {
        let mut builder = axum::http::Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json");
        if let Some(key) = key {
            builder = builder.header("X-API-KEY", key);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    fn get(uri: &str) -> axum::http::Request<Body> {
        axum::http::Request::builder().method("GET").uri(uri).body(Body::empty()).unwrap()
    }

    /// A credential registered directly, expiring far in the future.
    async fn seed(state: &AppState) -> CredentialHash {
        let mut e = entry(1, &addr(2));
        e.expires_at = Utc::now().timestamp() + 3_600;
        state.registry.register_credential(&state.config.service_address, e).await.unwrap();
        hash(1)
    }

    #[tokio::test]
    async fn protected_routes_require_api_key() {
        let dir = tempfile::tempdir().unwrap();
        let (app, state) = app(&dir).await;
        let h = seed(&state).await;

        let uri = format!("/api/v1/credentials/{h}/revoke");
        let resp = app.clone().oneshot(post_json(&uri, None, serde_json::json!({}))).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        let resp = app.clone().oneshot(post_json(&uri, Some("wrong"), serde_json::json!({}))).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let resp = app.clone().oneshot(post_json(&uri, Some("test-key"), serde_json::json!({}))).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json["status"], "revoked");
        assert_eq!(json["record"]["credentialType"], CredentialType::Aggregate.as_str());

        let resp = app.oneshot(post_json(&uri, Some("test-key"), serde_json::json!({}))).await.unwrap();
        assert_eq!(resp.status(), StatusCode::CONFLICT);
        assert!(body_json(resp).await["error"].as_str().unwrap().contains("already revoked"));
    }

    #[tokio::test]
    async fn credential_lookup_and_errors() {
        let dir = tempfile::tempdir().unwrap();
        let (app, state) = app(&dir).await;
        let h = seed(&state).await;

        let resp = app.clone().oneshot(get(&format!("/api/v1/credentials/{h}"))).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await["status"], "valid");

        let resp = app.clone().oneshot(get(&format!("/api/v1/credentials/{}", hash(2)))).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let resp = app.clone().oneshot(get("/api/v1/credentials/0xnothex")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = app.oneshot(get("/api/v1/zk/vk/ledger_v9")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        assert_eq!(state.registry.credential_status(&h).await.unwrap(), CredentialStatus::Valid);
    }

    #[tokio::test]
    async fn verify_without_proofs_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let (app, state) = app(&dir).await;
        let h = seed(&state).await;

        let body = serde_json::json!({ "credentialHash": h.to_string(), "zkProofs": [] });
        let resp = app.oneshot(post_json("/api/v1/credentials/verify", None, body)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json["success"], true);
        assert_eq!(json["isValid"], false);
        assert!(json["verifiedAt"].is_string());
    }

    #[tokio::test]
    async fn failed_issuance_reports_in_body() {
        let dir = tempfile::tempdir().unwrap();
        let (app, _state) = app(&dir).await;

        let body = serde_json::json!({
            "userAddress": "0x00000000000000000000000000000000000000b0",
            "githubUsername": "dev",
            "targetSkillLevel": "expert",
            "privacyLevel": "minimal"
        });
        let resp = app.oneshot(post_json("/api/v1/credentials/issue", Some("test-key"), body)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let json = body_json(resp).await;
        assert_eq!(json["success"], false);
        assert!(json["error"].as_str().unwrap().contains("Expert"));
        assert!(json["processingTimeMs"].is_u64());
    }
}
