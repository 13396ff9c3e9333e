//! Admin endpoints: login and reconciliation review

use axum::extract::{Path, State};
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use shared::checkout::CheckoutOutcome;
use shared::error::{ApiResponse, AppError};

use crate::activity::ActivityAction;
use crate::auth::{AdminIdentity, create_token};
use crate::error::ServiceResult;
use crate::state::AppState;
use crate::store::{AttemptState, CheckoutAttempt};
use crate::util::verify_password;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub email: String,
}

/// POST /api/admin/login
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> ServiceResult<Json<ApiResponse<LoginResponse>>> {
    let email = req.email.trim().to_lowercase();
    let activity = state.checkout.activity();

    // Verify even for an unknown email so both paths cost the same
    let password_ok = verify_password(&req.password, &state.admin.password_hash);
    if email != state.admin.email.to_lowercase() || !password_ok {
        tracing::warn!(email = %email, "Admin login failed");
        activity.log(
            ActivityAction::AdminLoginFailed,
            "admin",
            email.clone(),
            None,
            serde_json::json!({}),
        );
        return Err(AppError::invalid_credentials().into());
    }

    let token = create_token(&email, &state.jwt_secret).map_err(|e| {
        tracing::error!(error = %e, "Failed to create admin token");
        AppError::internal("Failed to create session")
    })?;

    activity.log(
        ActivityAction::AdminLogin,
        "admin",
        email.clone(),
        Some(email.clone()),
        serde_json::json!({}),
    );
    Ok(Json(ApiResponse::success(LoginResponse { token, email })))
}

/// GET /api/admin/reconciliation: captured payments without a complete order
pub async fn list_unreconciled(
    State(state): State<AppState>,
) -> ServiceResult<Json<ApiResponse<Vec<CheckoutAttempt>>>> {
    let attempts = state
        .checkout
        .ledger()
        .list_by_state(&[AttemptState::Charged, AttemptState::DeadLetter])
        .await?;
    Ok(Json(ApiResponse::success(attempts)))
}

/// POST /api/admin/reconciliation/{attempt_id}/replay
pub async fn replay(
    State(state): State<AppState>,
    Extension(identity): Extension<AdminIdentity>,
    Path(attempt_id): Path<String>,
) -> ServiceResult<Json<ApiResponse<CheckoutOutcome>>> {
    tracing::info!(attempt_id = %attempt_id, admin = %identity.email, "Manual reconciliation replay");
    let result = state.checkout.reconcile(&attempt_id).await;

    state.checkout.activity().log(
        ActivityAction::ReconciliationReplayed,
        "checkout_attempt",
        attempt_id.clone(),
        Some(identity.email),
        match &result {
            Ok(outcome) => serde_json::json!({ "order_id": outcome.order_id }),
            Err(e) => serde_json::json!({ "error": e.to_string() }),
        },
    );

    Ok(Json(ApiResponse::success(result?)))
}
