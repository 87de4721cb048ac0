//! Bearer token authentication middleware

use axum::{body::Body, extract::State, http::Request, middleware::Next, response::Response};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
};

use crate::{AppState, error::AuthError, models::User};

/// User resolved from the request's access token
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub User);

/// Validate the bearer access token and attach the resolved user to the request
pub async fn auth_middleware(
    State(state): State<AppState>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, AuthError> {
    let TypedHeader(Authorization(bearer)) = bearer.ok_or(AuthError::MissingToken)?;

    let user = state.auth.authenticate_token(bearer.token()).await?;

    req.extensions_mut().insert(AuthenticatedUser(user));

    Ok(next.run(req).await)
}
