//! Page capture loop: classify a capture page and screenshot its answer region.

use std::path::{Path, PathBuf};
use std::time::Duration;

use sha2::Digest as _;

use crate::driver::PageDriver;
use crate::error::{Error, Result};
use crate::site;

/// The three mutually exclusive layouts a capture page can have.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    Puzzle,
    Image,
    Content,
}

impl Layout {
    /// Element whose rendered region is captured.
    pub fn target_selector(self) -> &'static str {
        match self {
            Self::Puzzle => site::PUZZLE_TABLE,
            Self::Image => site::DIRECT_IMAGE,
            Self::Content => site::CONTENT_BLOCK,
        }
    }
}

/// Reload policy for the puzzle overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Bounded waits before giving up; `0` never gives up.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    /// Pause after the `attempt`-th failed wait (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.initial_backoff
            .saturating_mul(1_u32 << exponent)
            .min(self.max_backoff)
    }

    fn exhausted(&self, attempts: u32) -> bool {
        self.max_attempts != 0 && attempts >= self.max_attempts
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(16),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CaptureOptions {
    pub wait_timeout: Duration,
    pub retry: RetryPolicy,
    pub screenshots_dir: PathBuf,
}

/// Probes the current page; the first matching layout wins.
pub async fn classify(driver: &mut dyn PageDriver) -> Result<Layout> {
    if driver.exists(site::PUZZLE_OVERLAY).await? {
        return Ok(Layout::Puzzle);
    }
    if driver.exists(site::DIRECT_IMAGE).await? {
        return Ok(Layout::Image);
    }
    Ok(Layout::Content)
}

/// Loads `url`, captures its answer region and returns the screenshot path.
pub async fn capture(
    driver: &mut dyn PageDriver,
    url: &str,
    options: &CaptureOptions,
) -> Result<PathBuf> {
    driver.navigate(url).await?;
    let layout = classify(driver).await?;
    let selector = layout.target_selector();
    tracing::debug!(url, ?layout, "classified capture page");

    match layout {
        Layout::Puzzle => wait_through_puzzle(driver, url, options).await?,
        Layout::Image | Layout::Content => {
            if !driver.wait_for(selector, options.wait_timeout).await? {
                return Err(Error::CaptureTimeout {
                    url: url.to_owned(),
                    selector: selector.to_owned(),
                    attempts: 1,
                });
            }
        }
    }

    let png = driver.screenshot(selector).await?;
    let path = screenshot_path(&options.screenshots_dir, url);
    write_screenshot(&path, &png).map_err(|err| Error::render(url, format!("{err:#}")))?;
    tracing::info!(url, path = %path.display(), "captured");
    Ok(path)
}

async fn wait_through_puzzle(
    driver: &mut dyn PageDriver,
    url: &str,
    options: &CaptureOptions,
) -> Result<()> {
    let policy = &options.retry;
    let mut attempts = 0_u32;
    loop {
        if driver
            .wait_for(site::PUZZLE_TABLE, options.wait_timeout)
            .await?
        {
            return Ok(());
        }
        attempts += 1;
        if policy.exhausted(attempts) {
            return Err(Error::CaptureTimeout {
                url: url.to_owned(),
                selector: site::PUZZLE_TABLE.to_owned(),
                attempts,
            });
        }

        let pause = policy.backoff(attempts);
        tracing::info!(
            url,
            attempts,
            pause_ms = pause.as_millis() as u64,
            "puzzle not solved yet; reloading"
        );
        driver.reload().await?;
        tokio::time::sleep(pause).await;
    }
}

fn write_screenshot(path: &Path, png: &[u8]) -> anyhow::Result<()> {
    use anyhow::Context as _;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create screenshot dir: {}", parent.display()))?;
    }
    std::fs::write(path, png).with_context(|| format!("write screenshot: {}", path.display()))
}

pub fn screenshot_path(dir: &Path, url: &str) -> PathBuf {
    dir.join(format!("{}.png", url_slug(url)))
}

/// Readable slug of `url` plus a short digest, stable across runs.
pub fn url_slug(url: &str) -> String {
    let mut readable = slugify(url);
    readable.truncate(80);
    while readable.ends_with('-') {
        readable.pop();
    }

    let digest = sha2::Sha256::digest(url.as_bytes());
    let short = &hex::encode(digest)[..12];
    if readable.is_empty() {
        short.to_owned()
    } else {
        format!("{readable}-{short}")
    }
}

/// Lowercase ASCII words joined by `-`.
pub fn slugify(input: &str) -> String {
    let mut slug = String::with_capacity(input.len());
    let mut pending_dash = false;
    for ch in input.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(ch.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    slug
}
