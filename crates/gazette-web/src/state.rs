use std::sync::Arc;
use std::time::Duration;

use tracing::error;

use gazette_db::Database;

use crate::error::AppError;
use crate::mail::Mailer;
use crate::media::MediaStore;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    /// Signs session cookies and account tokens.
    pub secret_key: String,
    /// Absolute prefix for links sent by email, e.g. `https://news.example.com`.
    pub site_url: String,
    pub media: MediaStore,
    pub mailer: Arc<dyn Mailer>,
    /// Lifetime of activation and password-reset tokens.
    pub token_timeout: Duration,
}

impl AppStateInner {
    /// Absolute URL for a site path.
    pub fn absolute_url(&self, path: &str) -> String {
        format!("{}{}", self.site_url.trim_end_matches('/'), path)
    }
}

/// Run blocking DB work off the async runtime.
pub async fn blocking<F, T>(state: &AppState, f: F) -> Result<T, AppError>
where
    F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || f(&state.db))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            AppError::Internal(e.into())
        })?
        .map_err(AppError::Internal)
}
