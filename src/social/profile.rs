//! Read-shaping of users and notifications, and the profile edit diff.

use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use serde::Serialize;

use crate::db::models::{Notification, User, UserSummary};
use crate::error::{AppError, AppResult};
use crate::media::StoredMedia;

pub const MAX_USERNAME_LEN: usize = 15;

/// Header shown above a user's timeline.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ProfileHeader {
    pub id: String,
    pub username: String,
    pub handler: String,
    pub bio: Option<String>,
    pub avatar: Option<String>,
    pub banner: Option<String>,
    pub followers: i64,
    pub following: i64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserListEntry {
    #[serde(flatten)]
    pub user: UserSummary,
    pub bio: Option<String>,
    pub is_followed: bool,
}

pub fn find_user(conn: &Connection, id: &str) -> AppResult<Option<User>> {
    let sql = format!("SELECT {} FROM users WHERE id = ?1", User::COLUMNS);
    Ok(conn.query_row(&sql, params![id], User::from_row).optional()?)
}

pub fn find_user_by_email(conn: &Connection, email: &str) -> AppResult<Option<User>> {
    let sql = format!("SELECT {} FROM users WHERE email = ?1", User::COLUMNS);
    Ok(conn
        .query_row(&sql, params![email], User::from_row)
        .optional()?)
}

pub fn profile_header(conn: &Connection, handler: &str) -> AppResult<Option<ProfileHeader>> {
    Ok(conn
        .query_row(
            "SELECT u.id, u.username, u.handler, u.bio, u.avatar, u.banner,
                    (SELECT COUNT(*) FROM follows f WHERE f.following_id = u.id),
                    (SELECT COUNT(*) FROM follows f WHERE f.follower_id = u.id)
             FROM users u WHERE u.handler = ?1",
            params![handler],
            |row| {
                Ok(ProfileHeader {
                    id: row.get(0)?,
                    username: row.get(1)?,
                    handler: row.get(2)?,
                    bio: row.get(3)?,
                    avatar: row.get(4)?,
                    banner: row.get(5)?,
                    followers: row.get(6)?,
                    following: row.get(7)?,
                })
            },
        )
        .optional()?)
}

/// Everyone except the viewer, flagged with whether the viewer follows them.
pub fn list_users(conn: &Connection, viewer_id: &str) -> AppResult<Vec<UserListEntry>> {
    let mut stmt = conn.prepare(
        "SELECT u.id, u.username, u.avatar, u.handler, u.bio,
                EXISTS (SELECT 1 FROM follows f
                        WHERE f.follower_id = ?1 AND f.following_id = u.id)
         FROM users u
         WHERE u.id <> ?1
         ORDER BY u.username COLLATE NOCASE, u.id",
    )?;
    let users = stmt
        .query_map(params![viewer_id], |row| {
            Ok(UserListEntry {
                user: UserSummary {
                    id: row.get(0)?,
                    username: row.get(1)?,
                    avatar: row.get(2)?,
                    handler: row.get(3)?,
                },
                bio: row.get(4)?,
                is_followed: row.get(5)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(users)
}

pub fn notifications(conn: &Connection, user_id: &str) -> AppResult<Vec<Notification>> {
    let mut stmt = conn.prepare(
        "SELECT n.id, n.kind, n.content, n.post_id, n.is_read, n.created_at,
                u.id, u.username, u.avatar, u.handler
         FROM notifications n
         JOIN users u ON u.id = n.related_user_id
         WHERE n.user_id = ?1
         ORDER BY n.created_at DESC, n.id DESC",
    )?;
    let rows = stmt
        .query_map(params![user_id], |row| {
            Ok(Notification {
                id: row.get(0)?,
                kind: row.get(1)?,
                content: row.get(2)?,
                post_id: row.get(3)?,
                is_read: row.get(4)?,
                created_at: row.get(5)?,
                related_user_id: row.get(6)?,
                related_user: UserSummary {
                    id: row.get(6)?,
                    username: row.get(7)?,
                    avatar: row.get(8)?,
                    handler: row.get(9)?,
                },
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Returns how many notifications flipped to read.
pub fn mark_all_read(conn: &Connection, user_id: &str) -> AppResult<usize> {
    Ok(conn.execute(
        "UPDATE notifications SET is_read = 1 WHERE user_id = ?1 AND is_read = 0",
        params![user_id],
    )?)
}

/// The subset of profile fields that actually change.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfileChanges {
    pub username: Option<String>,
    pub bio: Option<String>,
    pub avatar: Option<StoredMedia>,
    pub banner: Option<StoredMedia>,
}

impl ProfileChanges {
    /// Keeps only text fields that are non-blank and differ from `current`.
    pub fn text_diff(
        current: &User,
        username: Option<&str>,
        bio: Option<&str>,
    ) -> AppResult<Self> {
        let username = username
            .map(str::trim)
            .filter(|s| !s.is_empty() && *s != current.username)
            .map(str::to_string);
        if let Some(ref name) = username {
            if name.chars().count() > MAX_USERNAME_LEN {
                return Err(AppError::BadRequest(format!(
                    "Username must be {MAX_USERNAME_LEN} characters or less"
                )));
            }
        }

        let bio = bio
            .map(str::trim)
            .filter(|s| !s.is_empty() && Some(*s) != current.bio.as_deref())
            .map(str::to_string);

        Ok(Self {
            username,
            bio,
            avatar: None,
            banner: None,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.username.is_none() && self.bio.is_none() && self.avatar.is_none() && self.banner.is_none()
    }
}

/// Writes only the changed columns and returns the fresh row.
pub fn apply_profile_changes(
    conn: &Connection,
    user_id: &str,
    changes: &ProfileChanges,
) -> AppResult<User> {
    let mut sets: Vec<&str> = Vec::new();
    let mut values: Vec<Value> = Vec::new();

    if let Some(ref username) = changes.username {
        sets.push("username");
        values.push(Value::Text(username.clone()));
    }
    if let Some(ref bio) = changes.bio {
        sets.push("bio");
        values.push(Value::Text(bio.clone()));
    }
    if let Some(ref avatar) = changes.avatar {
        sets.push("avatar");
        values.push(Value::Text(avatar.url.clone()));
        sets.push("avatar_public_id");
        values.push(Value::Text(avatar.public_id.clone()));
    }
    if let Some(ref banner) = changes.banner {
        sets.push("banner");
        values.push(Value::Text(banner.url.clone()));
        sets.push("banner_public_id");
        values.push(Value::Text(banner.public_id.clone()));
    }

    if !sets.is_empty() {
        let assignments = sets
            .iter()
            .enumerate()
            .map(|(i, col)| format!("{col} = ?{}", i + 1))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "UPDATE users SET {assignments} WHERE id = ?{}",
            sets.len() + 1
        );
        values.push(Value::Text(user_id.to_string()));
        conn.execute(&sql, params_from_iter(values))?;
    }

    find_user(conn, user_id)?.ok_or_else(|| AppError::not_found("User"))
}
