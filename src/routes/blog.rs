use askama::Template;
use axum::extract::multipart::MultipartError;
use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{Form, Router};
use chrono::{NaiveDateTime, Utc};
use serde::Deserialize;

use crate::blog::{self, repository, upload, Attachment, NewPost};
use crate::db::models::{Post, PostComment, PostImage};
use crate::error::{AppError, AppResult};
use crate::extractors::CurrentUser;
use crate::routes::home::Html;
use crate::state::AppState;

// --- View structs ---

pub struct PostView {
    pub id: i64,
    pub title: String,
    pub body: String,
    pub username: String,
    pub created: String,
    pub is_author: bool,
}

impl PostView {
    pub fn new(post: Post, viewer: Option<i64>) -> Self {
        Self {
            is_author: viewer == Some(post.author_id),
            created: parse_and_format_time(&post.created),
            id: post.id,
            title: post.title,
            body: post.body,
            username: post.username,
        }
    }
}

pub struct CommentView {
    pub id: i64,
    pub username: String,
    pub body: String,
    pub created: String,
    pub is_author: bool,
}

impl CommentView {
    fn new(comment: PostComment, viewer: i64) -> Self {
        Self {
            is_author: comment.user_id == viewer,
            created: parse_and_format_time(&comment.created),
            id: comment.id,
            username: comment.username,
            body: comment.body,
        }
    }
}

pub struct ImageView {
    pub name: String,
    pub is_picture: bool,
}

impl From<PostImage> for ImageView {
    fn from(image: PostImage) -> Self {
        let is_picture = matches!(
            upload::extension(&image.name).as_deref(),
            Some("png" | "jpg" | "jpeg" | "gif")
        );
        Self {
            name: image.name,
            is_picture,
        }
    }
}

// --- Templates ---

#[derive(Template)]
#[template(path = "blog/create.html")]
pub struct CreateTemplate {
    pub username: Option<String>,
    pub error: Option<String>,
    pub title: String,
    pub body: String,
}

#[derive(Template)]
#[template(path = "blog/update.html")]
pub struct UpdateTemplate {
    pub username: Option<String>,
    pub error: Option<String>,
    pub post_id: i64,
    pub title: String,
    pub body: String,
}

#[derive(Template)]
#[template(path = "blog/details.html")]
pub struct DetailsTemplate {
    pub username: Option<String>,
    pub error: Option<String>,
    pub post: PostView,
    pub images: Vec<ImageView>,
    pub liked: bool,
    pub like_total: i64,
    pub comments: Vec<CommentView>,
    pub comment_body: String,
}

// --- Forms ---

#[derive(Deserialize, Default)]
#[serde(default)]
pub struct PostForm {
    pub title: String,
    pub body: String,
}

#[derive(Deserialize, Default)]
#[serde(default)]
pub struct CommentForm {
    pub body: String,
}

// --- Router ---

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/create", get(create_page).post(create))
        .route("/{id}/update", get(update_page).post(update))
        .route("/{id}/delete", post(delete))
        .route("/{id}/post_like", get(post_like))
        .route("/{id}/details", get(details))
        .route("/{id}/post_comment", get(comment_page).post(post_comment))
        .route("/{id}/{comment_id}/comment_delete", post(comment_delete))
}

fn details_url(post_id: i64) -> String {
    format!("/{}/details", post_id)
}

/// Re-render a form with the error shown, or pass other errors through.
fn form_error<T: Template>(err: AppError, page: impl FnOnce(String) -> T) -> AppResult<Response> {
    if err.is_user_facing() {
        Ok((StatusCode::UNPROCESSABLE_ENTITY, Html(page(err.to_string()))).into_response())
    } else {
        Err(err)
    }
}

// --- Handlers ---

async fn create_page(user: CurrentUser) -> Html<CreateTemplate> {
    Html(CreateTemplate {
        username: Some(user.username),
        error: None,
        title: String::new(),
        body: String::new(),
    })
}

async fn create(
    State(state): State<AppState>,
    user: CurrentUser,
    multipart: Multipart,
) -> AppResult<Response> {
    let new_post = match read_new_post(multipart).await {
        Ok(new_post) => new_post,
        Err(e) => {
            return form_error(AppError::Validation(e.to_string()), |error| CreateTemplate {
                username: Some(user.username.clone()),
                error: Some(error),
                title: String::new(),
                body: String::new(),
            })
        }
    };

    let (title, body) = (new_post.title.clone(), new_post.body.clone());

    match blog::publish(&state.db, &state.uploads, user.id, new_post).await {
        Ok(_) => Ok(Redirect::to("/").into_response()),
        Err(e) => form_error(e, |error| CreateTemplate {
            username: Some(user.username.clone()),
            error: Some(error),
            title,
            body,
        }),
    }
}

/// Collect the title, body and optional file parts of the create form.
/// A file part with an empty filename means no file was chosen.
async fn read_new_post(mut multipart: Multipart) -> Result<NewPost, MultipartError> {
    let mut new_post = NewPost::default();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "title" => new_post.title = field.text().await?,
            "body" => new_post.body = field.text().await?,
            "file" => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let data = field.bytes().await?;
                if !filename.is_empty() {
                    new_post.attachment = Some(Attachment {
                        filename,
                        data: data.to_vec(),
                    });
                }
            }
            _ => {}
        }
    }

    Ok(new_post)
}

async fn update_page(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> AppResult<Html<UpdateTemplate>> {
    let post = {
        let conn = state.db.get()?;
        repository::get_post(&conn, id, user.id, true)?
    };

    Ok(Html(UpdateTemplate {
        username: Some(user.username),
        error: None,
        post_id: post.id,
        title: post.title,
        body: post.body,
    }))
}

async fn update(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
    Form(form): Form<PostForm>,
) -> AppResult<Response> {
    let conn = state.db.get()?;
    repository::get_post(&conn, id, user.id, true)?;

    let title = match blog::require_title(&form.title) {
        Ok(title) => title,
        Err(e) => {
            return form_error(e, |error| UpdateTemplate {
                username: Some(user.username.clone()),
                error: Some(error),
                post_id: id,
                title: form.title.clone(),
                body: form.body.clone(),
            })
        }
    };

    repository::update_post(&conn, id, title, &form.body)?;
    Ok(Redirect::to("/").into_response())
}

async fn delete(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> AppResult<Response> {
    let images = {
        let conn = state.db.get()?;
        repository::get_post(&conn, id, user.id, true)?;
        repository::delete_post(&conn, id)?
    };

    for name in images {
        if let Err(e) = state.uploads.remove(&name).await {
            tracing::warn!(post_id = id, "Could not remove upload {}: {}", name, e);
        }
    }

    Ok(Redirect::to("/").into_response())
}

async fn post_like(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> AppResult<Response> {
    let conn = state.db.get()?;
    repository::toggle_like(&conn, id, user.id)?;
    Ok(Redirect::to(&details_url(id)).into_response())
}

async fn details(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> AppResult<Html<DetailsTemplate>> {
    render_details(&state, user, id, None, String::new())
}

fn render_details(
    state: &AppState,
    user: CurrentUser,
    id: i64,
    error: Option<String>,
    comment_body: String,
) -> AppResult<Html<DetailsTemplate>> {
    let conn = state.db.get()?;
    let post = repository::get_post(&conn, id, user.id, false)?;
    let liked = repository::get_post_like(&conn, id, user.id)?.is_some();
    let like_total = repository::get_post_like_total(&conn, id)?;
    let images = repository::list_post_images(&conn, id)?;
    let comments = repository::get_post_comments(&conn, id)?;

    Ok(Html(DetailsTemplate {
        post: PostView::new(post, Some(user.id)),
        images: images.into_iter().map(ImageView::from).collect(),
        liked,
        like_total,
        comments: comments
            .into_iter()
            .map(|c| CommentView::new(c, user.id))
            .collect(),
        comment_body,
        username: Some(user.username),
        error,
    }))
}

async fn comment_page(_user: CurrentUser, Path(id): Path<i64>) -> Redirect {
    Redirect::to(&details_url(id))
}

async fn post_comment(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
    Form(form): Form<CommentForm>,
) -> AppResult<Response> {
    let body = match blog::require_body(&form.body) {
        Ok(body) => body,
        Err(e) => {
            let page = render_details(&state, user, id, Some(e.to_string()), form.body.clone())?;
            return Ok((StatusCode::UNPROCESSABLE_ENTITY, page).into_response());
        }
    };

    let conn = state.db.get()?;
    repository::create_comment(&conn, id, user.id, body)?;
    Ok(Redirect::to(&details_url(id)).into_response())
}

async fn comment_delete(
    State(state): State<AppState>,
    user: CurrentUser,
    Path((id, comment_id)): Path<(i64, i64)>,
) -> AppResult<Response> {
    let conn = state.db.get()?;
    repository::get_post(&conn, id, user.id, false)?;
    repository::get_post_comment(&conn, comment_id, id, user.id, true)?;
    repository::delete_comment(&conn, id, comment_id)?;
    Ok(Redirect::to(&details_url(id)).into_response())
}

// --- Time formatting ---

pub fn parse_and_format_time(db_time: &str) -> String {
    NaiveDateTime::parse_from_str(db_time, "%Y-%m-%d %H:%M:%S")
        .map(|dt| format_relative_time(&dt))
        .unwrap_or_else(|_| db_time.to_string())
}

pub fn format_relative_time(dt: &NaiveDateTime) -> String {
    let now = Utc::now().naive_utc();
    let diff = now.signed_duration_since(*dt);

    let seconds = diff.num_seconds();
    if seconds < 60 {
        return "just now".to_string();
    }

    let minutes = diff.num_minutes();
    if minutes < 60 {
        return format!("{}m ago", minutes);
    }

    let hours = diff.num_hours();
    if hours < 24 {
        return format!("{}h ago", hours);
    }

    let days = diff.num_days();
    if days < 7 {
        return format!("{}d ago", days);
    }

    format!("on {}", dt.format("%b %-d, %Y"))
}

// --- Tests ---

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn format_relative_time_just_now() {
        let now = Utc::now().naive_utc();
        assert_eq!(format_relative_time(&now), "just now");
    }

    #[test]
    fn format_relative_time_minutes() {
        let dt = Utc::now().naive_utc() - chrono::Duration::minutes(5);
        assert_eq!(format_relative_time(&dt), "5m ago");
    }

    #[test]
    fn format_relative_time_hours() {
        let dt = Utc::now().naive_utc() - chrono::Duration::hours(3);
        assert_eq!(format_relative_time(&dt), "3h ago");
    }

    #[test]
    fn format_relative_time_days() {
        let dt = Utc::now().naive_utc() - chrono::Duration::days(2);
        assert_eq!(format_relative_time(&dt), "2d ago");
    }

    #[test]
    fn format_relative_time_old_date() {
        let dt = NaiveDate::from_ymd_opt(2025, 1, 15)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        assert_eq!(format_relative_time(&dt), "on Jan 15, 2025");
    }

    #[test]
    fn parse_and_format_bad_input_returns_raw() {
        assert_eq!(parse_and_format_time("not-a-date"), "not-a-date");
    }

    #[test]
    fn post_view_marks_author() {
        let post = Post {
            id: 1,
            title: "t".into(),
            body: "b".into(),
            created: "2025-01-15 12:00:00".into(),
            author_id: 7,
            username: "alice".into(),
        };
        assert!(PostView::new(post.clone(), Some(7)).is_author);
        assert!(!PostView::new(post.clone(), Some(8)).is_author);
        let anonymous = PostView::new(post, None);
        assert!(!anonymous.is_author);
        assert_eq!(anonymous.created, "on Jan 15, 2025");
    }

    #[test]
    fn image_view_tells_pictures_from_documents() {
        let image = |name: &str| {
            ImageView::from(PostImage {
                id: 1,
                post_id: 1,
                name: name.into(),
            })
        };
        assert!(image("1_cat.JPG").is_picture);
        assert!(!image("1_notes.pdf").is_picture);
        assert!(!image("1_readme.txt").is_picture);
    }
}
