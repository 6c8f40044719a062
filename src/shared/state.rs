use crate::config::AppConfig;
use crate::shared::utils::DbPool;

pub struct AppState {
    pub config: AppConfig,
    pub conn: DbPool,
}

impl Clone for AppState {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            conn: self.conn.clone(),
        }
    }
}
