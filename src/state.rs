use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::blog::upload::UploadStore;
use crate::config::Config;

pub type DbPool = Pool<SqliteConnectionManager>;

#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub config: Config,
    pub uploads: UploadStore,
}

impl AppState {
    pub fn new(db: DbPool, config: Config) -> Self {
        let uploads = UploadStore::new(config.uploads_path());
        Self {
            db,
            config,
            uploads,
        }
    }
}
