use std::sync::Arc;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::auth::token::TokenKeys;
use crate::config::Config;
use crate::media::MediaClient;

pub type DbPool = Pool<SqliteConnectionManager>;

/// Shared resources handed to every handler. Built once in `main`.
#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub config: Arc<Config>,
    pub tokens: Arc<TokenKeys>,
    pub media: MediaClient,
}
