use askama::Template;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::blog::repository;
use crate::error::AppResult;
use crate::extractors::MaybeUser;
use crate::routes::blog::PostView;
use crate::state::AppState;

#[derive(Template)]
#[template(path = "blog/index.html")]
pub struct IndexTemplate {
    pub username: Option<String>,
    pub error: Option<String>,
    pub posts: Vec<PostView>,
}

/// Wrapper to render askama templates as axum responses
pub struct Html<T: Template>(pub T);

impl<T: Template> IntoResponse for Html<T> {
    fn into_response(self) -> Response {
        match self.0.render() {
            Ok(body) => (
                StatusCode::OK,
                [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
                body,
            )
                .into_response(),
            Err(e) => {
                tracing::error!("Template render error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Template error").into_response()
            }
        }
    }
}

/// GET / — every post, newest first.
pub async fn index(
    State(state): State<AppState>,
    maybe_user: MaybeUser,
) -> AppResult<Html<IndexTemplate>> {
    let viewer = maybe_user.id();

    let posts = {
        let conn = state.db.get()?;
        repository::list_posts(&conn)?
    };

    let posts = posts
        .into_iter()
        .map(|p| PostView::new(p, viewer))
        .collect();

    Ok(Html(IndexTemplate {
        username: maybe_user.username(),
        error: None,
        posts,
    }))
}
