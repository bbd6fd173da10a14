//! Cookie-based sessions and admin impersonation.
//!
//! Sessions are carried in private (encrypted) cookies. An admin may start
//! impersonating another user, which adds a second cookie; while it is set,
//! the impersonated user is the *effective* user for every state-changing
//! operation and for notification routing, while the admin remains the actor
//! recorded in notification payloads.

use std::sync::{Arc, Mutex};

use axum::{
    Json,
    extract::{FromRef, FromRequestParts, State},
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Response},
};
use axum_extra::extract::{
    PrivateCookieJar,
    cookie::{Cookie, Key, SameSite},
};
use rusqlite::Connection;
use serde::Deserialize;
use time::{Duration, OffsetDateTime};

use crate::{AppState, Error, user::UserID, user::get_user_by_id};

pub(crate) const COOKIE_USER_ID: &str = "user_id";
pub(crate) const COOKIE_IMPERSONATE: &str = "impersonate_user_id";
/// The default duration for which auth cookies are valid.
pub(crate) const DEFAULT_COOKIE_DURATION: Duration = Duration::hours(8);

/// The authenticated session extracted from the request's cookies.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AuthSession {
    /// The ID of the logged-in user.
    pub user_id: UserID,
    /// The ID of the user being impersonated, if impersonation is active.
    pub impersonating: Option<UserID>,
}

impl AuthSession {
    /// The user on whose behalf operations run and to whom notifications
    /// are routed. Under impersonation this is the impersonated user.
    pub fn effective_user_id(&self) -> UserID {
        self.impersonating.unwrap_or(self.user_id)
    }

    /// Whether the session is currently impersonating another user.
    pub fn is_impersonated(&self) -> bool {
        self.impersonating.is_some()
    }
}

impl<S> FromRequestParts<S> for AuthSession
where
    Key: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let jar: PrivateCookieJar = match PrivateCookieJar::from_request_parts(parts, state).await {
            Ok(jar) => jar,
            Err(rejection) => match rejection {},
        };

        let user_id = jar
            .get(COOKIE_USER_ID)
            .and_then(|cookie| cookie.value_trimmed().parse::<i64>().ok())
            .map(UserID::new)
            .ok_or(Error::Unauthorized)?;

        let impersonating = jar
            .get(COOKIE_IMPERSONATE)
            .and_then(|cookie| cookie.value_trimmed().parse::<i64>().ok())
            .map(UserID::new);

        Ok(AuthSession {
            user_id,
            impersonating,
        })
    }
}

/// Add the session cookie to the cookie jar, indicating that a user is logged
/// in and authenticated.
///
/// Returns the cookie jar with the cookie added.
pub(crate) fn set_auth_cookie(
    jar: PrivateCookieJar,
    user_id: UserID,
    duration: Duration,
) -> PrivateCookieJar {
    jar.add(session_cookie(COOKIE_USER_ID, user_id, duration))
}

/// Add the impersonation cookie, marking `target_id` as the effective user.
pub(crate) fn set_impersonation_cookie(
    jar: PrivateCookieJar,
    target_id: UserID,
    duration: Duration,
) -> PrivateCookieJar {
    jar.add(session_cookie(COOKIE_IMPERSONATE, target_id, duration))
}

/// Set the impersonation cookie to an invalid value and set its max age to
/// zero, which should delete the cookie on the client side.
pub(crate) fn invalidate_impersonation_cookie(jar: PrivateCookieJar) -> PrivateCookieJar {
    jar.add(
        Cookie::build((COOKIE_IMPERSONATE, "deleted"))
            .path("/")
            .expires(OffsetDateTime::UNIX_EPOCH)
            .max_age(Duration::ZERO)
            .http_only(true)
            .same_site(SameSite::Strict),
    )
}

fn session_cookie(name: &'static str, id: UserID, duration: Duration) -> Cookie<'static> {
    Cookie::build((name, id.as_i64().to_string()))
        .path("/")
        .expires(OffsetDateTime::now_utc() + duration)
        .http_only(true)
        .same_site(SameSite::Strict)
        .build()
}

/// The state needed for the session endpoints.
#[derive(Debug, Clone)]
pub struct AuthEndpointState {
    /// The database connection used to look up users.
    pub db_connection: Arc<Mutex<Connection>>,
    /// The key for signing and encrypting private cookies.
    pub cookie_key: Key,
    /// How long session cookies stay valid.
    pub cookie_duration: Duration,
}

impl FromRef<AppState> for AuthEndpointState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
            cookie_key: state.cookie_key.clone(),
            cookie_duration: state.cookie_duration,
        }
    }
}

impl FromRef<AuthEndpointState> for Key {
    fn from_ref(state: &AuthEndpointState) -> Self {
        state.cookie_key.clone()
    }
}

/// The form data for logging in.
#[derive(Debug, Deserialize)]
pub struct LogInForm {
    /// The ID of the user to start a session as.
    pub user_id: i64,
}

/// Start a session as an existing user.
///
/// There is no password check; the caller only has to name a registered user.
/// This matches the trust model of the WebSocket handshake, which also
/// accepts a bare user ID.
///
/// # Panics
///
/// Panics if the lock for the database connection is already held by the same thread.
pub async fn log_in_endpoint(
    State(state): State<AuthEndpointState>,
    jar: PrivateCookieJar,
    Json(form): Json<LogInForm>,
) -> Result<Response, Error> {
    let user = {
        let connection = state.db_connection.lock().unwrap();
        get_user_by_id(UserID::new(form.user_id), &connection)?
    };

    tracing::info!(user_id = %user.id, name = %user.name, "user logged in");

    let jar = set_auth_cookie(jar, user.id, state.cookie_duration);

    Ok((jar, Json(user)).into_response())
}

/// The form data for starting impersonation.
#[derive(Debug, Deserialize)]
pub struct ImpersonateForm {
    /// The ID of the user to impersonate.
    pub user_id: i64,
}

/// Start impersonating another user.
///
/// Only admins may impersonate. The check runs against the *real* session
/// user, so an impersonated session cannot be used to pivot to a third user.
///
/// # Panics
///
/// Panics if the lock for the database connection is already held by the same thread.
pub async fn start_impersonation_endpoint(
    State(state): State<AuthEndpointState>,
    session: AuthSession,
    jar: PrivateCookieJar,
    Json(form): Json<ImpersonateForm>,
) -> Result<Response, Error> {
    let (admin, target) = {
        let connection = state.db_connection.lock().unwrap();
        let admin = get_user_by_id(session.user_id, &connection)?;

        if !admin.role.is_admin() {
            return Err(Error::Forbidden);
        }

        let target = get_user_by_id(UserID::new(form.user_id), &connection)?;

        (admin, target)
    };

    tracing::info!(
        admin_id = %admin.id,
        target_id = %target.id,
        "admin started impersonation"
    );

    let jar = set_impersonation_cookie(jar, target.id, state.cookie_duration);

    Ok((jar, Json(target)).into_response())
}

/// Stop impersonating and return to the admin's own identity.
pub async fn stop_impersonation_endpoint(
    session: AuthSession,
    jar: PrivateCookieJar,
) -> Result<Response, Error> {
    if let Some(target_id) = session.impersonating {
        tracing::info!(
            admin_id = %session.user_id,
            target_id = %target_id,
            "admin stopped impersonation"
        );
    }

    let jar = invalidate_impersonation_cookie(jar);

    Ok((jar, StatusCode::NO_CONTENT).into_response())
}
