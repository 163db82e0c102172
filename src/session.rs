//! Session harvesting and single-flight caching.
//!
//! The browse API needs an API key, the client context blob and the channel's
//! external id. None of these are documented, so they are read out of a real
//! channel page through the browser collaborator and then kept for the
//! lifetime of the [`SessionCache`].

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::OnceCell;

use crate::template::{self, TemplateValues};

/// Evaluated in the channel page to pull the session bundle out of the
/// page globals.
pub const SESSION_SCRIPT: &str = r#"
(function () {
    return {
        apiKey: ytcfg.data_.INNERTUBE_API_KEY,
        context: ytcfg.data_.INNERTUBE_CONTEXT,
        channelId: ytInitialData.metadata.channelMetadataRenderer.externalId,
    };
})()
"#;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub api_key: String,
    pub context: serde_json::Value,
    pub channel_id: String,
}

impl Session {
    /// Values available to the second template pass.
    pub fn template_values(&self) -> TemplateValues {
        TemplateValues::from([
            ("apiKey".to_string(), self.api_key.clone()),
            ("channelId".to_string(), self.channel_id.clone()),
        ])
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum SessionError {
    #[error("could not open browser page: {0}")]
    Page(String),
    #[error("could not navigate to {url}: {reason}")]
    Navigate { url: String, reason: String },
    #[error("session script failed: {0}")]
    Evaluate(String),
    #[error("malformed session bundle: {0}")]
    Malformed(String),
}

/// A single browser tab.
#[async_trait]
pub trait Page: Send {
    async fn navigate(&mut self, url: &str) -> Result<(), SessionError>;
    async fn evaluate(&mut self, script: &str) -> Result<serde_json::Value, SessionError>;
    async fn close(&mut self) -> Result<(), SessionError>;
}

/// Hands out pages from a (possibly shared) browser instance.
#[async_trait]
pub trait BrowserProvider: Send + Sync {
    async fn new_page(&self) -> Result<Box<dyn Page>, SessionError>;
}

type SessionCell = OnceCell<Result<Arc<Session>, SessionError>>;

/// Lazily derives one [`Session`] and hands the same outcome to every caller.
///
/// Concurrent first callers all wait on the same derivation. A failed
/// derivation is cached too; call [`SessionCache::reset`] to allow another
/// attempt.
pub struct SessionCache {
    browser: Arc<dyn BrowserProvider>,
    channel_url: String,
    cell: Mutex<Arc<SessionCell>>,
}

impl SessionCache {
    /// `channel_url_template` is expanded with `local` values (the channel
    /// name among them) once, up front.
    pub fn new(
        browser: Arc<dyn BrowserProvider>,
        channel_url_template: &str,
        local: &TemplateValues,
    ) -> Self {
        Self {
            browser,
            channel_url: template::expand(channel_url_template, local),
            cell: Mutex::new(Arc::new(SessionCell::new())),
        }
    }

    pub fn channel_url(&self) -> &str {
        &self.channel_url
    }

    pub async fn get(&self) -> Result<Arc<Session>, SessionError> {
        let cell = self.current_cell();
        cell.get_or_init(|| async {
            let result = derive_session(self.browser.as_ref(), &self.channel_url).await;
            match &result {
                Ok(session) => info!("Derived session for channel {}", session.channel_id),
                Err(e) => warn!("Session derivation failed: {}", e),
            }
            result.map(Arc::new)
        })
        .await
        .clone()
    }

    /// Drops a settled outcome so the next [`SessionCache::get`] derives a
    /// new session. Returns `false` and does nothing while a derivation is
    /// still in flight (or none has started), so at most one derivation runs
    /// at a time.
    pub fn reset(&self) -> bool {
        let mut cell = self.lock_cell();
        if !cell.initialized() {
            debug!("No settled session to reset");
            return false;
        }
        debug!("Resetting session cache");
        *cell = Arc::new(SessionCell::new());
        true
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.current_cell().get(), Some(Ok(_)))
    }

    fn current_cell(&self) -> Arc<SessionCell> {
        self.lock_cell().clone()
    }

    fn lock_cell(&self) -> std::sync::MutexGuard<'_, Arc<SessionCell>> {
        self.cell.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

async fn derive_session(
    browser: &dyn BrowserProvider,
    channel_url: &str,
) -> Result<Session, SessionError> {
    debug!("Deriving session from {}", channel_url);
    let mut page = browser.new_page().await?;

    let evaluated = async {
        page.navigate(channel_url).await?;
        page.evaluate(SESSION_SCRIPT).await
    }
    .await;

    if let Err(e) = page.close().await {
        warn!("Could not close session page: {}", e);
    }

    serde_json::from_value(evaluated?).map_err(|e| SessionError::Malformed(e.to_string()))
}
