//! Post rows: creation with attached media, and owner-only deletion.

use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};

use crate::db::models::MediaType;
use crate::db::now_timestamp;
use crate::error::{AppError, AppResult};

pub const MAX_CONTENT_LEN: usize = 2000;

#[derive(Debug, Clone, PartialEq)]
pub struct NewMedia {
    pub url: String,
    pub public_id: Option<String>,
    pub media_type: MediaType,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewPost {
    pub content: Option<String>,
    pub parent_id: Option<String>,
    pub media: Option<NewMedia>,
}

/// Trims the text and checks that the post will have something in it.
pub fn normalize_content(
    content: Option<&str>,
    has_image: bool,
    gif: Option<&str>,
) -> AppResult<Option<String>> {
    let content = content
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);
    let has_gif = gif.map(str::trim).is_some_and(|g| !g.is_empty());

    if content.is_none() && !has_image && !has_gif {
        return Err(AppError::BadRequest("Content or image required".into()));
    }
    if let Some(ref text) = content {
        if text.chars().count() > MAX_CONTENT_LEN {
            return Err(AppError::BadRequest(format!(
                "Post must be {MAX_CONTENT_LEN} characters or less"
            )));
        }
    }
    Ok(content)
}

/// Inserts the post and its media in one transaction. Returns the new id.
pub fn insert_post(conn: &mut Connection, author_id: &str, post: &NewPost) -> AppResult<String> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    if let Some(ref parent_id) = post.parent_id {
        let exists: bool = tx.query_row(
            "SELECT COUNT(*) > 0 FROM posts WHERE id = ?1",
            params![parent_id],
            |r| r.get(0),
        )?;
        if !exists {
            return Err(AppError::not_found("Parent post"));
        }
    }

    let post_id = uuid::Uuid::now_v7().to_string();
    tx.execute(
        "INSERT INTO posts (id, content, author_id, parent_id, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![post_id, post.content, author_id, post.parent_id, now_timestamp()],
    )?;

    if let Some(ref media) = post.media {
        tx.execute(
            "INSERT INTO media (id, post_id, url, public_id, media_type)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                uuid::Uuid::now_v7().to_string(),
                post_id,
                media.url,
                media.public_id,
                media.media_type,
            ],
        )?;
    }

    tx.commit()?;
    tracing::info!(post_id = %post_id, author_id, "post created");
    Ok(post_id)
}

/// Deletes a post the caller owns, along with its reply thread.
///
/// Returns the storage ids of uploaded images that are no longer referenced;
/// the caller destroys them once this has committed.
pub fn delete_post(conn: &mut Connection, author_id: &str, post_id: &str) -> AppResult<Vec<String>> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let owned: Option<String> = tx
        .query_row(
            "SELECT id FROM posts WHERE id = ?1 AND author_id = ?2",
            params![post_id, author_id],
            |r| r.get(0),
        )
        .optional()?;
    if owned.is_none() {
        return Err(AppError::NotFound(
            "Post not found or user does not own the post".into(),
        ));
    }

    // Replies cascade with the post, so their images go too.
    let public_ids = {
        let mut stmt = tx.prepare(
            "WITH RECURSIVE thread(id) AS (
                 SELECT ?1
                 UNION ALL
                 SELECT p.id FROM posts p JOIN thread t ON p.parent_id = t.id
             )
             SELECT m.public_id FROM media m
             JOIN thread t ON m.post_id = t.id
             WHERE m.media_type = 'IMAGE' AND m.public_id IS NOT NULL",
        )?;
        let ids = stmt
            .query_map(params![post_id], |r| r.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        ids
    };

    tx.execute("DELETE FROM posts WHERE id = ?1", params![post_id])?;
    tx.commit()?;

    tracing::info!(post_id, author_id, media = public_ids.len(), "post deleted");
    Ok(public_ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::social::test_support::{insert_post as seed_post, insert_user, test_conn};

    fn post_count(conn: &Connection) -> i64 {
        conn.query_row("SELECT COUNT(*) FROM posts", [], |r| r.get(0))
            .unwrap()
    }

    #[test]
    fn normalize_content_requires_something() {
        assert!(matches!(
            normalize_content(None, false, None),
            Err(AppError::BadRequest(_))
        ));
        assert!(normalize_content(Some("   "), false, Some(" ")).is_err());
        assert_eq!(normalize_content(Some(" hi "), false, None).unwrap().as_deref(), Some("hi"));
        assert_eq!(normalize_content(None, true, None).unwrap(), None);
        assert_eq!(normalize_content(Some(""), false, Some("https://g/x.gif")).unwrap(), None);
        assert!(normalize_content(Some(&"x".repeat(2001)), false, None).is_err());
    }

    #[test]
    fn insert_post_with_media() {
        let (_tmp, mut conn) = test_conn();
        insert_user(&conn, "u", "alice");

        let id = insert_post(
            &mut conn,
            "u",
            &NewPost {
                content: None,
                parent_id: None,
                media: Some(NewMedia {
                    url: "https://g/x.gif".into(),
                    public_id: None,
                    media_type: MediaType::Gif,
                }),
            },
        )
        .unwrap();

        let (url, kind): (String, MediaType) = conn
            .query_row(
                "SELECT url, media_type FROM media WHERE post_id = ?1",
                params![id],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .unwrap();
        assert_eq!(url, "https://g/x.gif");
        assert_eq!(kind, MediaType::Gif);
    }

    #[test]
    fn reply_to_missing_parent_is_not_found_and_writes_nothing() {
        let (_tmp, mut conn) = test_conn();
        insert_user(&conn, "u", "alice");

        let err = insert_post(
            &mut conn,
            "u",
            &NewPost {
                content: Some("hi".into()),
                parent_id: Some("missing".into()),
                media: None,
            },
        )
        .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        assert_eq!(post_count(&conn), 0);
    }

    #[test]
    fn delete_by_non_owner_is_not_found_and_keeps_post() {
        let (_tmp, mut conn) = test_conn();
        insert_user(&conn, "a", "alice");
        insert_user(&conn, "b", "bob");
        seed_post(&conn, "p", "a", None, "2026-01-01T00:00:00.000Z");

        let err = delete_post(&mut conn, "b", "p").unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        assert_eq!(post_count(&conn), 1);

        let err = delete_post(&mut conn, "a", "missing").unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[test]
    fn delete_returns_image_ids_for_whole_thread() {
        let (_tmp, mut conn) = test_conn();
        insert_user(&conn, "a", "alice");
        insert_user(&conn, "b", "bob");
        seed_post(&conn, "p", "a", None, "2026-01-01T00:00:00.000Z");
        seed_post(&conn, "r", "b", Some("p"), "2026-01-01T00:00:01.000Z");
        seed_post(&conn, "other", "a", None, "2026-01-01T00:00:02.000Z");
        conn.execute_batch(
            "INSERT INTO media (id, post_id, url, public_id, media_type) VALUES
               ('m1', 'p', 'u1', 'posts/1.png', 'IMAGE'),
               ('m2', 'r', 'u2', 'posts/2.png', 'IMAGE'),
               ('m3', 'r', 'https://g/x.gif', NULL, 'GIF'),
               ('m4', 'other', 'u4', 'posts/4.png', 'IMAGE');
             INSERT INTO likes (user_id, post_id) VALUES ('b', 'p');",
        )
        .unwrap();

        let mut ids = delete_post(&mut conn, "a", "p").unwrap();
        ids.sort();
        assert_eq!(ids, vec!["posts/1.png", "posts/2.png"]);

        // Only the untouched post and its media remain.
        assert_eq!(post_count(&conn), 1);
        let media: i64 = conn
            .query_row("SELECT COUNT(*) FROM media", [], |r| r.get(0))
            .unwrap();
        assert_eq!(media, 1);
        let likes: i64 = conn
            .query_row("SELECT COUNT(*) FROM likes", [], |r| r.get(0))
            .unwrap();
        assert_eq!(likes, 0);
    }
}
