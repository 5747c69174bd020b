//! HTTP request handlers

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use tracing::error;

use super::dto::{ErrorResponse, PolicyListResponse, PolicySummary, TargetsResponse};
use crate::controller::{inspect_policy, ControllerState};
use crate::crd::{NamespacedName, Selector};
use crate::error::Error;

type ApiError = (StatusCode, Json<ErrorResponse>);

fn error_response(status: StatusCode, error: &str, err: &Error) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
            message: err.status_message(),
        }),
    )
}

/// Health check endpoint
pub async fn health() -> &'static str {
    "ok"
}

/// Metrics endpoint, refreshing the Machine and MachineSet inventory first
pub async fn metrics(State(state): State<Arc<ControllerState>>) -> impl IntoResponse {
    state
        .metrics
        .refresh_inventory(&state.store, state.config.namespace.as_deref())
        .await;
    match state.metrics.encode() {
        Ok(body) => (StatusCode::OK, body),
        Err(e) => {
            error!("Failed to encode metrics: {:?}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

/// List all health check policies
pub async fn list_policies(
    State(state): State<Arc<ControllerState>>,
) -> Result<Json<PolicyListResponse>, ApiError> {
    let namespace = state.config.namespace.as_deref();
    match state
        .store
        .policies
        .list(namespace, &Selector::everything())
        .await
    {
        Ok(policies) => {
            let items: Vec<PolicySummary> = policies.iter().map(PolicySummary::from).collect();
            let total = items.len();
            Ok(Json(PolicyListResponse { items, total }))
        }
        Err(e) => {
            error!("Failed to list MachineHealthChecks: {:?}", e);
            Err(error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "list_failed",
                &e,
            ))
        }
    }
}

/// Evaluate a policy's targets without remediating
pub async fn policy_targets(
    State(state): State<Arc<ControllerState>>,
    Path((namespace, name)): Path<(String, String)>,
) -> Result<Json<TargetsResponse>, ApiError> {
    let key = NamespacedName::new(&namespace, &name);
    let policy = match state.store.policies.get(&key).await {
        Ok(Some(policy)) => policy,
        Ok(None) => {
            let err = Error::NotFound {
                kind: "MachineHealthCheck".to_string(),
                name,
                namespace,
            };
            return Err(error_response(StatusCode::NOT_FOUND, "not_found", &err));
        }
        Err(e) => {
            error!("Failed to get MachineHealthCheck {}: {:?}", key, e);
            return Err(error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "get_failed",
                &e,
            ));
        }
    };

    match inspect_policy(&state.store, &policy, Utc::now()).await {
        Ok(targets) => Ok(Json(TargetsResponse {
            policy: name,
            namespace,
            targets,
        })),
        Err(e) if e.is_config_error() => Err(error_response(
            StatusCode::UNPROCESSABLE_ENTITY,
            "invalid_policy",
            &e,
        )),
        Err(e) => {
            error!("Failed to evaluate targets of {}: {:?}", key, e);
            Err(error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "evaluation_failed",
                &e,
            ))
        }
    }
}
