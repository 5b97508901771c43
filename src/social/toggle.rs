//! Flip a user↔target relation and keep its notification in step.
//!
//! Every toggle runs in a single `BEGIN IMMEDIATE` transaction. The relation
//! table's primary key decides the outcome: the row is deleted first, and only
//! if nothing was deleted is an insert attempted. An insert that loses a race
//! to a concurrent writer falls back to a delete instead of failing.

use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};

use crate::db::models::NotificationKind;
use crate::db::now_timestamp;
use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    Like,
    Repost,
    Bookmark,
    Follow,
}

/// Which way a toggle went.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Toggled {
    Added,
    Removed,
}

impl Toggled {
    pub fn is_active(self) -> bool {
        self == Toggled::Added
    }
}

impl RelationKind {
    fn table(self) -> &'static str {
        match self {
            RelationKind::Like => "likes",
            RelationKind::Repost => "reposts",
            RelationKind::Bookmark => "bookmarks",
            RelationKind::Follow => "follows",
        }
    }

    /// (actor column, target column)
    fn columns(self) -> (&'static str, &'static str) {
        match self {
            RelationKind::Follow => ("follower_id", "following_id"),
            _ => ("user_id", "post_id"),
        }
    }

    /// Bookmarks are private and never notify anyone.
    pub fn notification_kind(self) -> Option<NotificationKind> {
        match self {
            RelationKind::Like => Some(NotificationKind::Like),
            RelationKind::Repost => Some(NotificationKind::Repost),
            RelationKind::Follow => Some(NotificationKind::Follow),
            RelationKind::Bookmark => None,
        }
    }

    fn targets_post(self) -> bool {
        self != RelationKind::Follow
    }
}

/// Who a notification for this toggle goes to, and which post it is about.
struct Recipient {
    user_id: String,
    post_id: Option<String>,
}

pub fn toggle_relation(
    conn: &mut Connection,
    kind: RelationKind,
    actor_id: &str,
    target_id: &str,
) -> AppResult<Toggled> {
    if kind == RelationKind::Follow && actor_id == target_id {
        return Err(AppError::BadRequest("You cannot follow yourself".into()));
    }

    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let actor_name: String = tx
        .query_row(
            "SELECT username FROM users WHERE id = ?1",
            params![actor_id],
            |r| r.get(0),
        )
        .optional()?
        .ok_or_else(|| AppError::not_found("User"))?;

    let recipient = resolve_recipient(&tx, kind, target_id)?;

    let toggled = if delete_relation(&tx, kind, actor_id, target_id)? {
        Toggled::Removed
    } else if insert_relation(&tx, kind, actor_id, target_id)? {
        Toggled::Added
    } else {
        // A concurrent writer inserted the row between our delete and insert.
        tracing::debug!(?kind, actor_id, target_id, "toggle lost insert race");
        delete_relation(&tx, kind, actor_id, target_id)?;
        Toggled::Removed
    };

    if let Some(notification_kind) = kind.notification_kind() {
        if recipient.user_id != actor_id {
            match toggled {
                Toggled::Added => create_notification(
                    &tx,
                    notification_kind,
                    &recipient,
                    actor_id,
                    &actor_name,
                )?,
                Toggled::Removed => {
                    remove_notification(&tx, notification_kind, &recipient, actor_id)?
                }
            }
        }
    }

    tx.commit()?;

    tracing::info!(?kind, ?toggled, actor_id, target_id, "relation toggled");
    Ok(toggled)
}

/// Whether the relation currently exists.
pub fn relation_exists(
    conn: &Connection,
    kind: RelationKind,
    actor_id: &str,
    target_id: &str,
) -> AppResult<bool> {
    let (actor_col, target_col) = kind.columns();
    let sql = format!(
        "SELECT COUNT(*) > 0 FROM {} WHERE {} = ?1 AND {} = ?2",
        kind.table(),
        actor_col,
        target_col
    );
    Ok(conn.query_row(&sql, params![actor_id, target_id], |r| r.get(0))?)
}

fn resolve_recipient(conn: &Connection, kind: RelationKind, target_id: &str) -> AppResult<Recipient> {
    if kind.targets_post() {
        let author_id: String = conn
            .query_row(
                "SELECT author_id FROM posts WHERE id = ?1",
                params![target_id],
                |r| r.get(0),
            )
            .optional()?
            .ok_or_else(|| AppError::not_found("Post"))?;
        Ok(Recipient {
            user_id: author_id,
            post_id: Some(target_id.to_string()),
        })
    } else {
        let exists: bool = conn.query_row(
            "SELECT COUNT(*) > 0 FROM users WHERE id = ?1",
            params![target_id],
            |r| r.get(0),
        )?;
        if !exists {
            return Err(AppError::not_found("User"));
        }
        Ok(Recipient {
            user_id: target_id.to_string(),
            post_id: None,
        })
    }
}

fn delete_relation(
    conn: &Connection,
    kind: RelationKind,
    actor_id: &str,
    target_id: &str,
) -> AppResult<bool> {
    let (actor_col, target_col) = kind.columns();
    let sql = format!(
        "DELETE FROM {} WHERE {} = ?1 AND {} = ?2",
        kind.table(),
        actor_col,
        target_col
    );
    let rows = conn.execute(&sql, params![actor_id, target_id])?;
    Ok(rows > 0)
}

/// Returns false when the row already existed.
fn insert_relation(
    conn: &Connection,
    kind: RelationKind,
    actor_id: &str,
    target_id: &str,
) -> AppResult<bool> {
    let (actor_col, target_col) = kind.columns();
    let sql = format!(
        "INSERT INTO {} ({}, {}, created_at) VALUES (?1, ?2, ?3) ON CONFLICT DO NOTHING",
        kind.table(),
        actor_col,
        target_col
    );
    match conn.execute(&sql, params![actor_id, target_id, now_timestamp()]) {
        Ok(rows) => Ok(rows > 0),
        Err(e) if crate::db::is_unique_violation(&e) => Ok(false),
        Err(e) => Err(e.into()),
    }
}

fn notification_text(kind: NotificationKind, actor_name: &str) -> String {
    match kind {
        NotificationKind::Follow => format!("{actor_name} started following you"),
        NotificationKind::Like => format!("{actor_name} liked your post"),
        NotificationKind::Repost => format!("{actor_name} reposted your post"),
    }
}

fn create_notification(
    conn: &Connection,
    kind: NotificationKind,
    recipient: &Recipient,
    actor_id: &str,
    actor_name: &str,
) -> AppResult<()> {
    // Clear anything left over for this exact event so the pair stays 1:1.
    remove_notification(conn, kind, recipient, actor_id)?;
    conn.execute(
        "INSERT INTO notifications (id, user_id, kind, related_user_id, post_id, content, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            uuid::Uuid::now_v7().to_string(),
            recipient.user_id,
            kind.as_str(),
            actor_id,
            recipient.post_id,
            notification_text(kind, actor_name),
            now_timestamp(),
        ],
    )?;
    Ok(())
}

fn remove_notification(
    conn: &Connection,
    kind: NotificationKind,
    recipient: &Recipient,
    actor_id: &str,
) -> AppResult<()> {
    // `IS` compares NULL post ids (follows) as equal.
    conn.execute(
        "DELETE FROM notifications
         WHERE user_id = ?1 AND kind = ?2 AND related_user_id = ?3 AND post_id IS ?4",
        params![recipient.user_id, kind.as_str(), actor_id, recipient.post_id],
    )?;
    Ok(())
}
