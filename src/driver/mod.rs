//! Page drivers: the capability interface the capture loop runs against.
//!
//! Two implementations:
//! - `ChromeDriver`: headless Chromium over CDP; the page is rendered for real.
//! - `HttpDriver`: pages fetched through the authenticated session and
//!   rendered from their static HTML (images downloaded, puzzle tiles stitched).

pub mod chrome;
pub mod http;

use std::time::Duration;

use async_trait::async_trait;

use crate::config::Settings;
use crate::error::Result;
use crate::session::Session;

pub use chrome::ChromeDriver;
pub use http::HttpDriver;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Backend {
    /// Drive a headless Chrome/Chromium.
    Chrome,
    /// Fetch over HTTP and render from static HTML.
    Http,
}

#[async_trait]
pub trait PageDriver: Send {
    /// Loads `url` in the browsing context.
    async fn navigate(&mut self, url: &str) -> Result<()>;

    /// Reloads the current page.
    async fn reload(&mut self) -> Result<()>;

    /// Whether `selector` matches right now, without waiting.
    async fn exists(&mut self, selector: &str) -> Result<bool>;

    /// Waits up to `timeout` for `selector` to match. `Ok(false)` on timeout.
    async fn wait_for(&mut self, selector: &str, timeout: Duration) -> Result<bool>;

    /// PNG bytes of the rendered region of the first element matching `selector`.
    async fn screenshot(&mut self, selector: &str) -> Result<Vec<u8>>;

    /// Absolute `href`s of the elements matching `selector`; empty hrefs are skipped.
    async fn links(&mut self, selector: &str) -> Result<Vec<String>>;

    /// Trimmed text of the first element matching `selector`.
    async fn text(&mut self, selector: &str) -> Result<Option<String>>;

    /// Makes the session's current cookies visible to page loads.
    ///
    /// Called after the session logged in again. Drivers that send their
    /// requests through the session itself have nothing to do.
    async fn install_cookies(&mut self, _session: &Session) -> Result<()> {
        Ok(())
    }

    async fn close(&mut self) -> Result<()>;
}

/// Builds the driver selected in `settings`, sharing `session`'s login.
pub async fn connect<'a>(
    settings: &Settings,
    session: &'a Session,
) -> anyhow::Result<Box<dyn PageDriver + 'a>> {
    match settings.backend {
        Backend::Chrome => {
            let driver = ChromeDriver::launch(settings.chrome_executable.as_deref(), session).await?;
            Ok(Box::new(driver))
        }
        Backend::Http => {
            let mut driver = HttpDriver::new(session);
            if settings.render_with_chrome {
                let renderer =
                    ChromeDriver::launch(settings.chrome_executable.as_deref(), session).await?;
                driver = driver.with_renderer(renderer);
            }
            Ok(Box::new(driver))
        }
    }
}
