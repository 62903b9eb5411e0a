use std::collections::BTreeMap;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;

use crate::infra::http::error::ApiError;
use crate::infra::http::models::{
    AuthRequest, AuthResponse, RegisterRequest, RegisterResponse, ResponseEnvelope,
};
use crate::infra::http::state::AppState;

pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user = state
        .users
        .register(&payload.login, &payload.password, &payload.token)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ResponseEnvelope {
            response: RegisterResponse { login: user.login },
        }),
    ))
}

pub async fn authenticate(
    State(state): State<AppState>,
    Json(payload): Json<AuthRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let issued = state
        .users
        .authenticate(&payload.login, &payload.password)
        .await?;

    Ok(Json(ResponseEnvelope {
        response: AuthResponse {
            token: issued.token,
        },
    }))
}

pub async fn logout(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state.users.logout(&token).await?;

    Ok(Json(ResponseEnvelope {
        response: BTreeMap::from([(token, true)]),
    }))
}
