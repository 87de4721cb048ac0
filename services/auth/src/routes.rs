//! Authentication service routes

use axum::{
    Extension, Json, Router,
    extract::State,
    middleware,
    response::IntoResponse,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    AppState,
    error::{AuthError, AuthResult},
    middleware::{AuthenticatedUser, auth_middleware},
    models::{RequestType, SessionTokens, User},
};

/// Request for user login
#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Request carrying a refresh token
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshTokenRequest {
    pub refresh_token: String,
}

/// Response for token refresh
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshTokenResponse {
    pub access_token: String,
}

/// Request for a verification code
#[derive(Deserialize)]
pub struct VerificationRequest {
    pub email: String,
}

/// Response for a verification code request; the code itself goes to the notifier
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationResponse {
    pub request_type: RequestType,
}

/// Request to confirm a verification code
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmVerificationRequest {
    pub email: String,
    pub verification_code: String,
    pub request_type: RequestType,
}

/// Response for a successful confirmation
#[derive(Serialize)]
pub struct ConfirmVerificationResponse {
    pub verified: bool,
}

/// Create the router for the authentication service
pub fn create_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/auth/me", get(me))
        .route("/auth/logout", post(logout))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .route("/health", get(health_check))
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh_token))
        .route("/auth/auto-login", post(auto_login))
        .route("/auth/verification", post(request_verification))
        .route("/auth/verification/confirm", post(confirm_verification))
        .merge(protected)
        .with_state(state)
}

/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "carrier-auth"
    }))
}

/// User login endpoint
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> AuthResult<Json<SessionTokens>> {
    info!("Login attempt for {}", payload.email);

    let tokens = state.auth.login(&payload.email, &payload.password).await?;
    Ok(Json(tokens))
}

/// Access token refresh endpoint
pub async fn refresh_token(
    State(state): State<AppState>,
    Json(payload): Json<RefreshTokenRequest>,
) -> AuthResult<Json<RefreshTokenResponse>> {
    let access_token = state.auth.refresh_session(&payload.refresh_token).await?;
    Ok(Json(RefreshTokenResponse { access_token }))
}

/// Token pair rotation endpoint
pub async fn auto_login(
    State(state): State<AppState>,
    Json(payload): Json<RefreshTokenRequest>,
) -> AuthResult<Json<SessionTokens>> {
    let tokens = state.auth.auto_login(&payload.refresh_token).await?;
    Ok(Json(tokens))
}

/// Current user endpoint
pub async fn me(Extension(AuthenticatedUser(user)): Extension<AuthenticatedUser>) -> Json<User> {
    Json(user)
}

/// Logout endpoint
pub async fn logout(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(user)): Extension<AuthenticatedUser>,
) -> AuthResult<impl IntoResponse> {
    state.auth.end_session(user.id).await?;

    Ok(Json(serde_json::json!({
        "message": "Logged out successfully"
    })))
}

/// Verification code request endpoint
pub async fn request_verification(
    State(state): State<AppState>,
    Json(payload): Json<VerificationRequest>,
) -> AuthResult<Json<VerificationResponse>> {
    let issued = state.auth.request_verification(&payload.email).await?;
    Ok(Json(VerificationResponse {
        request_type: issued.request_type,
    }))
}

/// Verification code confirmation endpoint
pub async fn confirm_verification(
    State(state): State<AppState>,
    Json(payload): Json<ConfirmVerificationRequest>,
) -> AuthResult<Json<ConfirmVerificationResponse>> {
    let verified = state
        .auth
        .confirm_verification(
            &payload.email,
            &payload.verification_code,
            payload.request_type,
        )
        .await?;

    if !verified {
        return Err(AuthError::CodeInvalidOrExpired);
    }

    Ok(Json(ConfirmVerificationResponse { verified }))
}
