use askama::Template;
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use axum::Form;
use serde::Deserialize;

use crate::auth::{password, session, users};
use crate::error::{AppError, AppResult};
use crate::extractors::{extract_session_token, MaybeUser};
use crate::routes::home::Html;
use crate::state::AppState;

// -- Templates --

#[derive(Template)]
#[template(path = "auth/register.html")]
pub struct RegisterTemplate {
    pub username: Option<String>,
    pub error: Option<String>,
    pub name: String,
}

#[derive(Template)]
#[template(path = "auth/login.html")]
pub struct LoginTemplate {
    pub username: Option<String>,
    pub error: Option<String>,
    pub name: String,
}

// -- Request types --

#[derive(Deserialize, Default)]
#[serde(default)]
pub struct CredentialsForm {
    pub username: String,
    pub password: String,
}

impl CredentialsForm {
    fn validate(&self) -> AppResult<&str> {
        let username = self.username.trim();
        if username.is_empty() {
            return Err(AppError::Validation("Username is required.".into()));
        }
        if self.password.is_empty() {
            return Err(AppError::Validation("Password is required.".into()));
        }
        Ok(username)
    }
}

// -- Register --

/// GET /auth/register
pub async fn register_page(maybe_user: MaybeUser) -> Html<RegisterTemplate> {
    Html(RegisterTemplate {
        username: maybe_user.username(),
        error: None,
        name: String::new(),
    })
}

/// POST /auth/register — create the account, then send the user to log in.
pub async fn register(
    State(state): State<AppState>,
    Form(form): Form<CredentialsForm>,
) -> AppResult<Response> {
    let rerender = |error: String| {
        (
            StatusCode::UNPROCESSABLE_ENTITY,
            Html(RegisterTemplate {
                username: None,
                error: Some(error),
                name: form.username.clone(),
            }),
        )
            .into_response()
    };

    let username = match form.validate() {
        Ok(username) => username.to_string(),
        Err(e) => return Ok(rerender(e.to_string())),
    };

    let plaintext = form.password.clone();
    let cost = state.config.auth.bcrypt_cost;
    let hashed = tokio::task::spawn_blocking(move || password::hash(&plaintext, cost))
        .await
        .map_err(|e| AppError::Internal(format!("hashing task failed: {}", e)))??;

    let conn = state.db.get()?;
    match users::create_user(&conn, &username, &hashed) {
        Ok(_) => Ok(Redirect::to("/auth/login").into_response()),
        Err(e) if e.is_user_facing() => Ok(rerender(e.to_string())),
        Err(e) => Err(e),
    }
}

// -- Login --

/// GET /auth/login
pub async fn login_page(maybe_user: MaybeUser) -> Html<LoginTemplate> {
    Html(LoginTemplate {
        username: maybe_user.username(),
        error: None,
        name: String::new(),
    })
}

/// POST /auth/login — check the password and start a session.
pub async fn login(
    State(state): State<AppState>,
    Form(form): Form<CredentialsForm>,
) -> AppResult<Response> {
    let rerender = |status: StatusCode, error: String| {
        (
            status,
            Html(LoginTemplate {
                username: None,
                error: Some(error),
                name: form.username.clone(),
            }),
        )
            .into_response()
    };

    let username = match form.validate() {
        Ok(username) => username.to_string(),
        Err(e) => return Ok(rerender(StatusCode::UNPROCESSABLE_ENTITY, e.to_string())),
    };

    let user = {
        let conn = state.db.get()?;
        users::find_by_username(&conn, &username)?
    };

    let verified = match user {
        Some(user) => {
            let plaintext = form.password.clone();
            let hashed = user.password_hash.clone();
            let ok = tokio::task::spawn_blocking(move || password::verify(&plaintext, &hashed))
                .await
                .map_err(|e| AppError::Internal(format!("verify task failed: {}", e)))?;
            ok.then_some(user)
        }
        None => None,
    };

    let Some(user) = verified else {
        tracing::info!("Failed login for {}", username);
        return Ok(rerender(
            StatusCode::UNAUTHORIZED,
            "Incorrect username or password.".to_string(),
        ));
    };

    let hours = state.config.auth.session_hours;
    let token = {
        let conn = state.db.get()?;
        session::create_session(&conn, user.id, hours)?
    };
    tracing::info!(user_id = user.id, "Logged in {}", user.username);

    let cookie = session::session_cookie(&state.config.auth.cookie_name, &token, hours);
    Ok(([(header::SET_COOKIE, cookie)], Redirect::to("/")).into_response())
}

// -- Logout --

/// POST /auth/logout — end the session and clear the cookie.
pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> AppResult<Response> {
    let cookie_name = &state.config.auth.cookie_name;

    if let Some(token) = extract_session_token(&headers, cookie_name) {
        let conn = state.db.get()?;
        session::delete_session(&conn, token)?;
    }

    Ok((
        [(header::SET_COOKIE, session::clear_session_cookie(cookie_name))],
        Redirect::to("/"),
    )
        .into_response())
}
