use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::db::models::MediaType;
use crate::error::{AppError, AppResult};
use crate::extractors::{ApiQuery, CurrentUser};
use crate::media::{StoredMedia, POST_FOLDER};
use crate::routes::form::FormData;
use crate::social::feed::{
    self, FeedPage, PageRequest, PostView, RepliesPage, TimelinePage, FEED_PAGE_SIZE,
    REPLY_PAGE_SIZE,
};
use crate::social::posts::{self as post_rows, normalize_content, NewMedia, NewPost};
use crate::social::{toggle_relation, RelationKind};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/post", get(home_feed).post(create_post))
        .route("/post/{post_id}/likes", post(toggle_like))
        .route("/post/{post_id}/reposts", post(toggle_repost))
        .route("/post/{post_id}/bookmarks", post(toggle_bookmark))
        .route("/post/{post_id}/delete", delete(delete_post))
        .route("/post/{post_id}/replies", get(replies))
        .route("/post/user/{handler}", get(user_timeline))
}

async fn home_feed(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ApiQuery(query): ApiQuery<FeedQuery>,
) -> AppResult<Json<FeedPage>> {
    let page = PageRequest::new(query.page, query.limit, FEED_PAGE_SIZE)?;
    let author_id = query.user_id.as_deref().filter(|id| !id.is_empty());
    let conn = state.db.get()?;
    Ok(Json(feed::home_feed(&conn, &user.id, author_id, page)?))
}

async fn create_post(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    mut form: FormData,
) -> AppResult<Response> {
    let gif = form.non_blank("gif").map(str::to_string);

    // A gif replaces any attached image, which is then never uploaded.
    let image = match gif {
        Some(_) => None,
        None => form.take_file("image"),
    };
    if let Some(ref upload) = image {
        upload.validate_image(state.config.storage.max_upload_bytes)?;
    }

    let content = normalize_content(form.text("content"), image.is_some(), gif.as_deref())?;
    let parent_id = form.non_blank("parentId").map(str::to_string);

    let stored = match image {
        Some(ref upload) => Some(state.media.upload(POST_FOLDER, upload).await?),
        None => None,
    };

    let media = match (gif, &stored) {
        (Some(url), _) => Some(NewMedia {
            url,
            public_id: None,
            media_type: MediaType::Gif,
        }),
        (None, Some(StoredMedia { url, public_id })) => Some(NewMedia {
            url: url.clone(),
            public_id: Some(public_id.clone()),
            media_type: MediaType::Image,
        }),
        (None, None) => None,
    };
    let new_post = NewPost {
        content,
        parent_id,
        media,
    };

    match persist_post(&state, &user.id, &new_post) {
        Ok(view) => Ok((StatusCode::CREATED, Json(view)).into_response()),
        Err(e) => {
            if let Some(stored) = stored {
                state.media.destroy_logged(&stored.public_id).await;
            }
            Err(e)
        }
    }
}

fn persist_post(state: &AppState, author_id: &str, new_post: &NewPost) -> AppResult<PostView> {
    let mut conn = state.db.get()?;
    let post_id = post_rows::insert_post(&mut conn, author_id, new_post)?;
    feed::load_post(&conn, author_id, &post_id)?
        .ok_or_else(|| AppError::Internal(format!("post {post_id} vanished after insert")))
}

fn toggle(
    state: &AppState,
    kind: RelationKind,
    actor_id: &str,
    target_id: &str,
) -> AppResult<Json<Value>> {
    let mut conn = state.db.get()?;
    let toggled = toggle_relation(&mut conn, kind, actor_id, target_id)?;
    Ok(Json(json!({ "success": true, "active": toggled.is_active() })))
}

async fn toggle_like(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(post_id): Path<String>,
) -> AppResult<Json<Value>> {
    toggle(&state, RelationKind::Like, &user.id, &post_id)
}

async fn toggle_repost(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(post_id): Path<String>,
) -> AppResult<Json<Value>> {
    toggle(&state, RelationKind::Repost, &user.id, &post_id)
}

async fn toggle_bookmark(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(post_id): Path<String>,
) -> AppResult<Json<Value>> {
    toggle(&state, RelationKind::Bookmark, &user.id, &post_id)
}

async fn delete_post(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(post_id): Path<String>,
) -> AppResult<Json<Value>> {
    let orphaned = {
        let mut conn = state.db.get()?;
        post_rows::delete_post(&mut conn, &user.id, &post_id)?
    };
    for public_id in orphaned {
        state.media.destroy_logged(&public_id).await;
    }
    Ok(Json(json!({ "success": true })))
}

async fn replies(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(post_id): Path<String>,
    ApiQuery(query): ApiQuery<PageQuery>,
) -> AppResult<Json<RepliesPage>> {
    let page = PageRequest::new(query.page, query.limit, REPLY_PAGE_SIZE)?;
    let conn = state.db.get()?;
    Ok(Json(feed::replies(&conn, &user.id, &post_id, page)?))
}

async fn user_timeline(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(handler): Path<String>,
    ApiQuery(query): ApiQuery<PageQuery>,
) -> AppResult<Json<TimelinePage>> {
    let page = PageRequest::new(query.page, query.limit, FEED_PAGE_SIZE)?;
    let conn = state.db.get()?;
    Ok(Json(feed::user_timeline(&conn, &user.id, &handler, page)?))
}
