use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

use crate::db::models::{Notification, Profile};
use crate::error::{AppError, AppResult};
use crate::extractors::CurrentUser;
use crate::media::{StoredMedia, Upload, PROFILE_FOLDER};
use crate::routes::form::FormData;
use crate::social::profile::{self, ProfileChanges, UserListEntry};
use crate::social::{toggle_relation, RelationKind};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/user", get(list_users))
        .route(
            "/user/notifications",
            get(list_notifications).post(mark_notifications_read),
        )
        .route("/user/{user_id}/follow", post(toggle_follow))
        .route("/user/edit", post(edit_profile))
}

async fn list_users(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> AppResult<Json<Vec<UserListEntry>>> {
    let conn = state.db.get()?;
    Ok(Json(profile::list_users(&conn, &user.id)?))
}

async fn list_notifications(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> AppResult<Json<Vec<Notification>>> {
    let conn = state.db.get()?;
    Ok(Json(profile::notifications(&conn, &user.id)?))
}

async fn mark_notifications_read(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> AppResult<Json<Value>> {
    let conn = state.db.get()?;
    let updated = profile::mark_all_read(&conn, &user.id)?;
    Ok(Json(json!({ "success": true, "updated": updated })))
}

async fn toggle_follow(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(user_id): Path<String>,
) -> AppResult<Json<Value>> {
    let mut conn = state.db.get()?;
    let toggled = toggle_relation(&mut conn, RelationKind::Follow, &user.id, &user_id)?;
    Ok(Json(json!({ "success": true, "active": toggled.is_active() })))
}

/// Uploads whichever images were sent. On failure nothing uploaded so far is kept.
async fn upload_profile_images(
    state: &AppState,
    avatar: Option<Upload>,
    banner: Option<Upload>,
) -> AppResult<(Option<StoredMedia>, Option<StoredMedia>)> {
    let avatar = match avatar {
        Some(upload) => Some(state.media.upload(PROFILE_FOLDER, &upload).await?),
        None => None,
    };
    let banner = match banner {
        Some(upload) => match state.media.upload(PROFILE_FOLDER, &upload).await {
            Ok(stored) => Some(stored),
            Err(e) => {
                if let Some(ref stored) = avatar {
                    state.media.destroy_logged(&stored.public_id).await;
                }
                return Err(e);
            }
        },
        None => None,
    };
    Ok((avatar, banner))
}

async fn edit_profile(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    mut form: FormData,
) -> AppResult<Json<Profile>> {
    let bio = form.text("bio").or_else(|| form.text("about"));
    let mut changes = ProfileChanges::text_diff(&user, form.text("username"), bio)?;

    let avatar = form.take_file("avatar");
    let banner = form.take_file("banner");
    let max_bytes = state.config.storage.max_upload_bytes;
    for upload in avatar.iter().chain(banner.iter()) {
        upload.validate_image(max_bytes)?;
    }

    if changes.is_empty() && avatar.is_none() && banner.is_none() {
        return Ok(Json(user.profile()));
    }

    let (new_avatar, new_banner) = upload_profile_images(&state, avatar, banner).await?;
    changes.avatar = new_avatar;
    changes.banner = new_banner;

    let updated = {
        let result = state
            .db
            .get()
            .map_err(AppError::from)
            .and_then(|conn| profile::apply_profile_changes(&conn, &user.id, &changes));
        match result {
            Ok(updated) => updated,
            Err(e) => {
                for stored in changes.avatar.iter().chain(changes.banner.iter()) {
                    state.media.destroy_logged(&stored.public_id).await;
                }
                return Err(e);
            }
        }
    };

    // The row no longer points at the replaced images.
    if changes.avatar.is_some() {
        if let Some(ref old) = user.avatar_public_id {
            state.media.destroy_logged(old).await;
        }
    }
    if changes.banner.is_some() {
        if let Some(ref old) = user.banner_public_id {
            state.media.destroy_logged(old).await;
        }
    }

    tracing::info!(user_id = %user.id, "profile updated");
    Ok(Json(updated.profile()))
}
