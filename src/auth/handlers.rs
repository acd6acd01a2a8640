use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, State,
    },
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    auth::{
        dto::{
            required, AuthResponse, LoginRequest, MessageResponse, PublicUser,
            RegisterRequest, TokenResponse, UpdateDetailsRequest, UpdatePasswordRequest,
            UpdateRoleRequest, UserResponse, UsersResponse,
        },
        extractors::{AdminUser, AuthUser},
    },
    errors::AppError,
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
}

pub fn me_routes() -> Router<AppState> {
    Router::new()
        .route("/me", get(get_me))
        .route("/updatedetails", put(update_details))
        .route("/updatepassword", put(update_password))
        .route("/logout", get(logout))
}

pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users))
        .route("/users/:id/role", put(update_role))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<AuthResponse>), AppError> {
    let Json(payload) = payload?;
    let missing = "Please provide name, email and password";
    let name = required(payload.name, missing)?;
    let email = required(payload.email, missing)?;
    let password = required(payload.password, missing)?;

    let user = state.users.register(&name, &email, &password).await?;
    let token = state.keys.sign(user.id)?;
    Ok((StatusCode::CREATED, Json(AuthResponse::new(token, user))))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<AuthResponse>, AppError> {
    let Json(payload) = payload?;
    let missing = "Please provide email and password";
    let email = required(payload.email, missing)?;
    let password = required(payload.password, missing)?;

    let user = state.users.authenticate(&email, &password).await?;
    let token = state.keys.sign(user.id)?;
    Ok(Json(AuthResponse::new(token, user)))
}

#[instrument(skip_all)]
pub async fn get_me(AuthUser(user): AuthUser) -> Json<UserResponse> {
    Json(user.into())
}

#[instrument(skip_all)]
pub async fn update_details(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    payload: Result<Json<UpdateDetailsRequest>, JsonRejection>,
) -> Result<Json<UserResponse>, AppError> {
    let Json(payload) = payload?;
    let user = state
        .users
        .update_details(user.id, payload.name, payload.email)
        .await?;
    info!(user_id = %user.id, "details updated");
    Ok(Json(user.into()))
}

#[instrument(skip_all)]
pub async fn update_password(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    payload: Result<Json<UpdatePasswordRequest>, JsonRejection>,
) -> Result<Json<TokenResponse>, AppError> {
    let Json(payload) = payload?;
    let missing = "Please provide currentPassword and newPassword";
    let current = required(payload.current_password, missing)?;
    let new_password = required(payload.new_password, missing)?;

    let user = state
        .users
        .change_password(user.id, &current, &new_password)
        .await?;
    let token = state.keys.sign(user.id)?;
    Ok(Json(TokenResponse {
        success: true,
        token,
    }))
}

/// Tokens cannot be revoked server-side; the client drops its copy.
#[instrument(skip_all)]
pub async fn logout(AuthUser(user): AuthUser) -> Json<MessageResponse> {
    info!(user_id = %user.id, "user logged out");
    Json(MessageResponse {
        success: true,
        message: "Logged out. Discard the stored token.".into(),
    })
}

#[instrument(skip_all)]
pub async fn list_users(
    State(state): State<AppState>,
    admin: AdminUser,
) -> Result<Json<UsersResponse>, AppError> {
    let users: Vec<PublicUser> = state
        .users
        .list()
        .await?
        .into_iter()
        .map(PublicUser::from)
        .collect();
    info!(admin_id = %admin.user.id, count = users.len(), "users listed");
    Ok(Json(UsersResponse {
        success: true,
        count: users.len(),
        users,
    }))
}

#[instrument(skip_all)]
pub async fn update_role(
    State(state): State<AppState>,
    admin: AdminUser,
    id: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<UpdateRoleRequest>, JsonRejection>,
) -> Result<Json<UserResponse>, AppError> {
    let Path(id) = id?;
    let Json(payload) = payload?;
    info!(
        admin_id = %admin.user.id,
        target = %id,
        role = %payload.role,
        "role change requested"
    );
    let user = state.users.set_role(id, payload.role).await?;
    Ok(Json(user.into()))
}
