use std::marker::PhantomData;

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
};
use tracing::warn;

use crate::{
    auth::repo_types::{Role, User},
    errors::AppError,
    state::AppState,
};

/// Authenticated caller, resolved from the bearer token.
///
/// The resolved user is cached in the request extensions, so stacking
/// several gates on one route only hits the store once.
#[derive(Debug, Clone)]
pub struct AuthUser(pub User);

pub(crate) fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ")?.trim();
    (!token.is_empty()).then_some(token)
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<User>() {
            return Ok(AuthUser(user.clone()));
        }

        let token = bearer_token(&parts.headers).ok_or(AppError::NotAuthenticated)?;

        let claims = state.keys.verify(token).map_err(|e| {
            warn!(error = %e, "token verification failed");
            AppError::InvalidToken
        })?;

        let user = state.users.get(claims.sub).await?.ok_or_else(|| {
            warn!(user_id = %claims.sub, "token subject no longer exists");
            AppError::UserNotFound
        })?;

        parts.extensions.insert(user.clone());
        Ok(AuthUser(user))
    }
}

/// Allow-list of roles for a route.
pub trait RolePolicy: Send + Sync + 'static {
    const ALLOWED: &'static [Role];
}

pub struct AdminOnly;

impl RolePolicy for AdminOnly {
    const ALLOWED: &'static [Role] = &[Role::Admin];
}

pub fn authorize(user: &User, allowed: &[Role]) -> Result<(), AppError> {
    if allowed.contains(&user.role) {
        Ok(())
    } else {
        Err(AppError::Forbidden(user.role))
    }
}

/// Runs [`AuthUser`] and then checks the caller's role against `P`.
pub struct Authorized<P: RolePolicy> {
    pub user: User,
    _policy: PhantomData<P>,
}

pub type AdminUser = Authorized<AdminOnly>;

#[async_trait]
impl<P: RolePolicy> FromRequestParts<AppState> for Authorized<P> {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let AuthUser(user) = AuthUser::from_request_parts(parts, state).await?;
        if let Err(e) = authorize(&user, P::ALLOWED) {
            warn!(user_id = %user.id, role = %user.role, "role not allowed");
            return Err(e);
        }
        Ok(Self {
            user,
            _policy: PhantomData,
        })
    }
}
