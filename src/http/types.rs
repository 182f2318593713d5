use crate::auth::TokenKeys;
use crate::error::HandlerErr;
use rusqlite::Connection;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{error, warn};

/// Shared request state. The store handle is opened by the caller and handed
/// back through [`AppState::close`] at shutdown.
#[derive(Clone)]
pub struct AppState {
    db: Arc<Mutex<Connection>>,
    pub keys: Arc<TokenKeys>,
    pub store_timeout: Duration,
}

impl AppState {
    pub fn new(conn: Connection, keys: TokenKeys, store_timeout: Duration) -> Self {
        Self {
            db: Arc::new(Mutex::new(conn)),
            keys: Arc::new(keys),
            store_timeout,
        }
    }

    /// Runs `f` against the store on the blocking pool. Waiting for the
    /// handle is bounded by `store_timeout`; the handle stays locked until
    /// `f` returns.
    pub async fn with_store<T, F>(&self, f: F) -> Result<T, HandlerErr>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, HandlerErr> + Send + 'static,
    {
        let mut conn = tokio::time::timeout(self.store_timeout, self.db.clone().lock_owned())
            .await
            .map_err(|_| {
                error!(
                    timeout_ms = self.store_timeout.as_millis() as u64,
                    "store handle busy"
                );
                HandlerErr::store("store_busy", "timed out waiting for the store")
            })?;
        tokio::task::spawn_blocking(move || f(&mut conn))
            .await
            .map_err(|e| {
                error!(error = %e, "store task failed");
                HandlerErr::store("store_task_failed", e)
            })?
    }

    pub fn close(self) -> anyhow::Result<()> {
        match Arc::try_unwrap(self.db) {
            Ok(m) => m
                .into_inner()
                .close()
                .map_err(|(_, e)| anyhow::Error::from(e)),
            Err(_) => {
                warn!("store handle still shared at shutdown; leaving it to drop");
                Ok(())
            }
        }
    }
}
