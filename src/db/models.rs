use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

/// Full user row. Never serialized directly: it carries the password hash.
#[derive(Debug, Clone)]
pub struct User {
    pub id: String,
    pub email: String,
    pub handler: String,
    pub username: String,
    pub password_hash: String,
    pub avatar: Option<String>,
    pub avatar_public_id: Option<String>,
    pub banner: Option<String>,
    pub banner_public_id: Option<String>,
    pub bio: Option<String>,
    pub created_at: String,
}

impl User {
    pub const COLUMNS: &'static str = "id, email, handler, username, password_hash, avatar, \
         avatar_public_id, banner, banner_public_id, bio, created_at";

    pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            email: row.get(1)?,
            handler: row.get(2)?,
            username: row.get(3)?,
            password_hash: row.get(4)?,
            avatar: row.get(5)?,
            avatar_public_id: row.get(6)?,
            banner: row.get(7)?,
            banner_public_id: row.get(8)?,
            bio: row.get(9)?,
            created_at: row.get(10)?,
        })
    }

    pub fn profile(&self) -> Profile {
        Profile {
            id: self.id.clone(),
            email: self.email.clone(),
            handler: self.handler.clone(),
            username: self.username.clone(),
            avatar: self.avatar.clone(),
            banner: self.banner.clone(),
            bio: self.bio.clone(),
        }
    }
}

/// The caller's own profile as returned by verify-token and profile edit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Profile {
    pub id: String,
    pub email: String,
    pub handler: String,
    pub username: String,
    pub avatar: Option<String>,
    pub banner: Option<String>,
    pub bio: Option<String>,
}

/// Public author/actor card embedded in posts and notifications.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserSummary {
    pub id: String,
    pub username: String,
    pub avatar: Option<String>,
    pub handler: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MediaType {
    Image,
    Gif,
}

impl MediaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Image => "IMAGE",
            MediaType::Gif => "GIF",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "IMAGE" => Some(MediaType::Image),
            "GIF" => Some(MediaType::Gif),
            _ => None,
        }
    }
}

impl FromSql for MediaType {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let s = value.as_str()?;
        Self::parse(s).ok_or_else(|| FromSqlError::Other(format!("unknown media type {s}").into()))
    }
}

impl ToSql for MediaType {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(self.as_str().into())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Media {
    pub id: String,
    pub post_id: String,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_id: Option<String>,
    #[serde(rename = "type")]
    pub media_type: MediaType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NotificationKind {
    Follow,
    Like,
    Repost,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Follow => "FOLLOW",
            NotificationKind::Like => "LIKE",
            NotificationKind::Repost => "REPOST",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "FOLLOW" => Some(NotificationKind::Follow),
            "LIKE" => Some(NotificationKind::Like),
            "REPOST" => Some(NotificationKind::Repost),
            _ => None,
        }
    }
}

impl FromSql for NotificationKind {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let s = value.as_str()?;
        Self::parse(s)
            .ok_or_else(|| FromSqlError::Other(format!("unknown notification kind {s}").into()))
    }
}

impl ToSql for NotificationKind {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(self.as_str().into())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub content: String,
    pub related_user_id: String,
    pub related_user: UserSummary,
    pub post_id: Option<String>,
    pub is_read: bool,
    pub created_at: String,
}
