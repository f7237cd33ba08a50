use crate::cli::commands::session::Options;
use crate::session::{
    FileStore, Navigation, OAuthStateStore, SessionConfig, SessionManager, TokenStore,
};
use anyhow::{Context, Result};
use std::{path::PathBuf, sync::Arc, time::Duration};
use tokio::sync::mpsc::UnboundedReceiver;

pub const SESSION_FILE: &str = "session.json";
pub const OAUTH_FILE: &str = "oauth.json";

#[derive(Debug, Clone)]
pub struct GlobalArgs {
    pub api_url: String,
    pub callback_url: String,
    pub state_dir: PathBuf,
    pub timeout: Duration,
}

impl GlobalArgs {
    #[must_use]
    pub fn new(options: Options) -> Self {
        Self {
            api_url: options.api_url,
            callback_url: options.callback_url,
            state_dir: options.state_dir,
            timeout: Duration::from_secs(options.timeout_seconds),
        }
    }

    /// # Errors
    /// Returns an error if a URL option is invalid.
    pub fn session_config(&self) -> Result<SessionConfig> {
        let config = SessionConfig::new(&self.api_url)
            .context("invalid --api-url")?
            .with_callback_url(&self.callback_url)
            .context("invalid --callback-url")?
            .with_request_timeout(self.timeout);
        Ok(config)
    }

    #[must_use]
    pub fn session_path(&self) -> PathBuf {
        self.state_dir.join(SESSION_FILE)
    }

    #[must_use]
    pub fn oauth_path(&self) -> PathBuf {
        self.state_dir.join(OAUTH_FILE)
    }

    /// Opens both stores from the state directory and builds a manager.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid or a store cannot be read.
    pub fn manager(&self) -> Result<(SessionManager, UnboundedReceiver<Navigation>)> {
        let config = self.session_config()?;
        let session = FileStore::open(&self.session_path())?;
        let pending = FileStore::open(&self.oauth_path())?;

        let manager = SessionManager::new(
            config,
            TokenStore::new(Arc::new(session)),
            OAuthStateStore::new(Arc::new(pending)),
        )?;
        Ok(manager)
    }
}
