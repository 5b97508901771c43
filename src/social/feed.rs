//! Paginated, viewer-annotated post listings.

use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

use crate::db::models::{Media, UserSummary};
use crate::error::{AppError, AppResult};
use crate::social::profile::{profile_header, ProfileHeader};

pub const FEED_PAGE_SIZE: u32 = 20;
pub const REPLY_PAGE_SIZE: u32 = 10;
pub const MAX_PAGE_SIZE: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub limit: u32,
}

impl PageRequest {
    pub fn new(page: Option<u32>, limit: Option<u32>, default_limit: u32) -> AppResult<Self> {
        let page = page.unwrap_or(1);
        let limit = limit.unwrap_or(default_limit);
        if page == 0 {
            return Err(AppError::BadRequest("page must be at least 1".into()));
        }
        if limit == 0 {
            return Err(AppError::BadRequest("limit must be at least 1".into()));
        }
        Ok(Self {
            page,
            limit: limit.min(MAX_PAGE_SIZE),
        })
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.page - 1) * i64::from(self.limit)
    }

    pub fn total_pages(&self, total: i64) -> i64 {
        let limit = i64::from(self.limit);
        (total + limit - 1) / limit
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PostCounts {
    pub likes: i64,
    pub replies: i64,
    pub reposts: i64,
    pub bookmarks: i64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PostView {
    pub id: String,
    pub content: Option<String>,
    pub author_id: String,
    pub parent_id: Option<String>,
    pub created_at: String,
    pub author: UserSummary,
    pub media: Vec<Media>,
    pub counts: PostCounts,
    pub liked_by_viewer: bool,
    pub reposted_by_viewer: bool,
    pub bookmarked_by_viewer: bool,
    /// Only filled on user timelines.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reposted_by: Option<Vec<UserSummary>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedPage {
    pub posts: Vec<PostView>,
    pub total_pages: i64,
    pub current_page: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RepliesPage {
    pub parent_post: PostView,
    #[serde(flatten)]
    pub feed: FeedPage,
}

#[derive(Debug, Clone, Serialize)]
pub struct TimelinePage {
    pub user: ProfileHeader,
    #[serde(flatten)]
    pub feed: FeedPage,
}

/// Which posts a listing covers. `?2` in each filter binds the scope id.
enum Scope<'a> {
    Home { author_id: Option<&'a str> },
    Replies { parent_id: &'a str },
    Timeline { user_id: &'a str },
    Single { post_id: &'a str },
}

impl Scope<'_> {
    fn filter(&self) -> &'static str {
        match self {
            Scope::Home { .. } => "p.parent_id IS NULL AND (?2 IS NULL OR p.author_id = ?2)",
            Scope::Replies { .. } => "p.parent_id = ?2",
            Scope::Timeline { .. } => {
                "p.parent_id IS NULL AND (p.author_id = ?2 OR EXISTS \
                 (SELECT 1 FROM reposts rp WHERE rp.post_id = p.id AND rp.user_id = ?2))"
            }
            Scope::Single { .. } => "p.id = ?2",
        }
    }

    fn param(&self) -> Option<&str> {
        match self {
            Scope::Home { author_id } => *author_id,
            Scope::Replies { parent_id } => Some(*parent_id),
            Scope::Timeline { user_id } => Some(*user_id),
            Scope::Single { post_id } => Some(*post_id),
        }
    }
}

const POST_SELECT: &str = "
    SELECT p.id, p.content, p.author_id, p.parent_id, p.created_at,
           u.username, u.avatar, u.handler,
           (SELECT COUNT(*) FROM likes l WHERE l.post_id = p.id),
           (SELECT COUNT(*) FROM posts c WHERE c.parent_id = p.id),
           (SELECT COUNT(*) FROM reposts r WHERE r.post_id = p.id),
           (SELECT COUNT(*) FROM bookmarks b WHERE b.post_id = p.id),
           EXISTS (SELECT 1 FROM likes l WHERE l.post_id = p.id AND l.user_id = ?1),
           EXISTS (SELECT 1 FROM reposts r WHERE r.post_id = p.id AND r.user_id = ?1),
           EXISTS (SELECT 1 FROM bookmarks b WHERE b.post_id = p.id AND b.user_id = ?1)
    FROM posts p
    JOIN users u ON u.id = p.author_id";

fn map_post(row: &rusqlite::Row<'_>) -> rusqlite::Result<PostView> {
    let author_id: String = row.get(2)?;
    Ok(PostView {
        id: row.get(0)?,
        content: row.get(1)?,
        parent_id: row.get(3)?,
        created_at: row.get(4)?,
        author: UserSummary {
            id: author_id.clone(),
            username: row.get(5)?,
            avatar: row.get(6)?,
            handler: row.get(7)?,
        },
        author_id,
        media: Vec::new(),
        counts: PostCounts {
            likes: row.get(8)?,
            replies: row.get(9)?,
            reposts: row.get(10)?,
            bookmarks: row.get(11)?,
        },
        liked_by_viewer: row.get(12)?,
        reposted_by_viewer: row.get(13)?,
        bookmarked_by_viewer: row.get(14)?,
        reposted_by: None,
    })
}

fn query_page(
    conn: &Connection,
    viewer_id: &str,
    scope: &Scope<'_>,
    page: PageRequest,
) -> AppResult<FeedPage> {
    let sql = format!(
        "{POST_SELECT} WHERE {} ORDER BY p.created_at DESC, p.id DESC LIMIT ?3 OFFSET ?4",
        scope.filter()
    );
    let mut stmt = conn.prepare(&sql)?;
    let mut posts = stmt
        .query_map(
            params![viewer_id, scope.param(), i64::from(page.limit), page.offset()],
            map_post,
        )?
        .collect::<Result<Vec<_>, _>>()?;

    for post in &mut posts {
        post.media = load_media(conn, &post.id)?;
        if matches!(scope, Scope::Timeline { .. }) {
            post.reposted_by = Some(load_reposters(conn, &post.id)?);
        }
    }

    // ?1 is unused here but keeps the parameter numbering shared with the page query.
    let total: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM posts p WHERE {}", scope.filter()),
        params![viewer_id, scope.param()],
        |r| r.get(0),
    )?;

    Ok(FeedPage {
        posts,
        total_pages: page.total_pages(total),
        current_page: page.page,
    })
}

fn load_media(conn: &Connection, post_id: &str) -> AppResult<Vec<Media>> {
    let mut stmt = conn.prepare(
        "SELECT id, post_id, url, public_id, media_type FROM media WHERE post_id = ?1 ORDER BY id",
    )?;
    let rows = stmt
        .query_map(params![post_id], |row| {
            Ok(Media {
                id: row.get(0)?,
                post_id: row.get(1)?,
                url: row.get(2)?,
                public_id: row.get(3)?,
                media_type: row.get(4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn load_reposters(conn: &Connection, post_id: &str) -> AppResult<Vec<UserSummary>> {
    let mut stmt = conn.prepare(
        "SELECT u.id, u.username, u.avatar, u.handler
         FROM reposts r JOIN users u ON u.id = r.user_id
         WHERE r.post_id = ?1
         ORDER BY r.created_at DESC",
    )?;
    let rows = stmt
        .query_map(params![post_id], |row| {
            Ok(UserSummary {
                id: row.get(0)?,
                username: row.get(1)?,
                avatar: row.get(2)?,
                handler: row.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// One post in feed shape, or `None` if it does not exist.
pub fn load_post(conn: &Connection, viewer_id: &str, post_id: &str) -> AppResult<Option<PostView>> {
    let scope = Scope::Single { post_id };
    let sql = format!("{POST_SELECT} WHERE {}", scope.filter());
    let post = conn
        .query_row(&sql, params![viewer_id, post_id], map_post)
        .optional()?;
    match post {
        Some(mut post) => {
            post.media = load_media(conn, &post.id)?;
            Ok(Some(post))
        }
        None => Ok(None),
    }
}

/// Top-level posts, newest first, optionally limited to one author.
pub fn home_feed(
    conn: &Connection,
    viewer_id: &str,
    author_id: Option<&str>,
    page: PageRequest,
) -> AppResult<FeedPage> {
    query_page(conn, viewer_id, &Scope::Home { author_id }, page)
}

pub fn replies(
    conn: &Connection,
    viewer_id: &str,
    parent_id: &str,
    page: PageRequest,
) -> AppResult<RepliesPage> {
    let parent_post =
        load_post(conn, viewer_id, parent_id)?.ok_or_else(|| AppError::not_found("Post"))?;
    let feed = query_page(conn, viewer_id, &Scope::Replies { parent_id }, page)?;
    Ok(RepliesPage { parent_post, feed })
}

/// Top-level posts a user wrote or reposted.
pub fn user_timeline(
    conn: &Connection,
    viewer_id: &str,
    handler: &str,
    page: PageRequest,
) -> AppResult<TimelinePage> {
    let user = profile_header(conn, handler)?.ok_or_else(|| AppError::not_found("User"))?;
    let feed = query_page(conn, viewer_id, &Scope::Timeline { user_id: &user.id }, page)?;
    Ok(TimelinePage { user, feed })
}
