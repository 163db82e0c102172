//! Headless Chromium implementation of [`BrowserProvider`].

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use futures::StreamExt;
use tokio::task::JoinHandle;

use crate::session::{BrowserProvider, Page, SessionError};

#[derive(thiserror::Error, Debug)]
pub enum ChromiumError {
    #[error("invalid browser config: {0}")]
    Config(String),
    #[error("could not launch browser: {0}")]
    Launch(#[from] chromiumoxide::error::CdpError),
}

/// One browser process, shared by every page it hands out.
pub struct Chromium {
    browser: Browser,
    handler: JoinHandle<()>,
}

impl Chromium {
    pub async fn launch() -> Result<Self, ChromiumError> {
        let config = BrowserConfig::builder()
            .arg("--no-sandbox")
            .build()
            .map_err(ChromiumError::Config)?;
        let (browser, mut handler) = Browser::launch(config).await?;

        // The CDP connection only makes progress while its handler is polled.
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("Browser handler error: {}", e);
                }
            }
            debug!("Browser handler exited");
        });

        info!("Launched headless browser");
        Ok(Self { browser, handler })
    }
}

impl Drop for Chromium {
    fn drop(&mut self) {
        self.handler.abort();
    }
}

struct ChromiumPage {
    page: chromiumoxide::Page,
}

#[async_trait]
impl Page for ChromiumPage {
    async fn navigate(&mut self, url: &str) -> Result<(), SessionError> {
        self.page
            .goto(url)
            .await
            .map(|_| ())
            .map_err(|e| SessionError::Navigate {
                url: url.to_string(),
                reason: e.to_string(),
            })
    }

    async fn evaluate(&mut self, script: &str) -> Result<serde_json::Value, SessionError> {
        self.page
            .evaluate(script)
            .await
            .map_err(|e| SessionError::Evaluate(e.to_string()))?
            .into_value()
            .map_err(|e| SessionError::Evaluate(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), SessionError> {
        self.page
            .clone()
            .close()
            .await
            .map_err(|e| SessionError::Page(e.to_string()))
    }
}

#[async_trait]
impl BrowserProvider for Chromium {
    async fn new_page(&self) -> Result<Box<dyn Page>, SessionError> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .map_err(|e| SessionError::Page(e.to_string()))?;

        Ok(Box::new(ChromiumPage { page }))
    }
}
