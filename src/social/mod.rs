//! Social graph and feed logic. Everything here takes a plain
//! `rusqlite::Connection` so it can be driven from handlers and tests alike.

pub mod feed;
pub mod posts;
pub mod profile;
pub mod toggle;

pub use feed::{FeedPage, PageRequest, PostView};
pub use toggle::{toggle_relation, RelationKind, Toggled};
