use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::Context as _;
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::CookieParam;
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::page::Page;
use futures::StreamExt as _;
use tokio::task::JoinHandle;
use url::Url;

use super::PageDriver;
use crate::error::{Error, Result};
use crate::session::Session;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Headless Chromium driven over CDP.
pub struct ChromeDriver {
    browser: Browser,
    page: Page,
    handler: JoinHandle<()>,
    current_url: String,
}

impl ChromeDriver {
    pub async fn launch(executable: Option<&Path>, session: &Session) -> anyhow::Result<Self> {
        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .window_size(1280, 2000)
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions");
        if let Some(executable) = executable {
            builder = builder.chrome_executable(executable);
        }
        let config = builder
            .build()
            .map_err(|err| anyhow::anyhow!("build browser config: {err}"))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("launch Chromium")?;
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .context("open browser page")?;

        let mut driver = Self {
            browser,
            page,
            handler,
            current_url: "about:blank".to_owned(),
        };
        driver
            .install_cookies(session)
            .await
            .context("install session cookies in browser")?;
        tracing::debug!("browser launched");
        Ok(driver)
    }

    /// Renders `html` as if it were served from `base_url` and captures `selector`.
    pub async fn render_html(&mut self, base_url: &Url, html: &str, selector: &str) -> Result<Vec<u8>> {
        let html = with_base_href(html, base_url);
        self.page
            .set_content(html)
            .await
            .map_err(|err| Error::render(base_url.as_str(), err))?;
        self.current_url = base_url.to_string();
        self.screenshot(selector).await
    }
}

#[async_trait]
impl PageDriver for ChromeDriver {
    async fn navigate(&mut self, url: &str) -> Result<()> {
        tracing::debug!(url, "browser navigate");
        self.page
            .goto(url)
            .await
            .map_err(|err| Error::render(url, format!("navigation failed: {err}")))?;
        self.current_url = self
            .page
            .url()
            .await
            .ok()
            .flatten()
            .unwrap_or_else(|| url.to_owned());
        Ok(())
    }

    async fn reload(&mut self) -> Result<()> {
        self.page
            .reload()
            .await
            .map_err(|err| Error::render(&self.current_url, format!("reload failed: {err}")))?;
        Ok(())
    }

    async fn exists(&mut self, selector: &str) -> Result<bool> {
        Ok(self.page.find_element(selector).await.is_ok())
    }

    async fn wait_for(&mut self, selector: &str, timeout: Duration) -> Result<bool> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.exists(selector).await? {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn screenshot(&mut self, selector: &str) -> Result<Vec<u8>> {
        let element = self
            .page
            .find_element(selector)
            .await
            .map_err(|err| Error::render(&self.current_url, format!("`{selector}`: {err}")))?;
        element
            .screenshot(CaptureScreenshotFormat::Png)
            .await
            .map_err(|err| Error::render(&self.current_url, format!("screenshot `{selector}`: {err}")))
    }

    async fn links(&mut self, selector: &str) -> Result<Vec<String>> {
        let base = Url::parse(&self.current_url)
            .map_err(|err| Error::render(&self.current_url, format!("page url: {err}")))?;
        let elements = self
            .page
            .find_elements(selector)
            .await
            .map_err(|err| Error::render(&self.current_url, format!("`{selector}`: {err}")))?;

        let mut links = Vec::new();
        for element in elements {
            let href = element
                .attribute("href")
                .await
                .map_err(|err| Error::render(&self.current_url, format!("read href: {err}")))?;
            let Some(href) = href.filter(|href| !href.trim().is_empty()) else {
                continue;
            };
            match base.join(href.trim()) {
                Ok(url) => links.push(url.to_string()),
                Err(err) => tracing::warn!(href, ?err, "skipping unparsable link"),
            }
        }
        Ok(links)
    }

    async fn text(&mut self, selector: &str) -> Result<Option<String>> {
        let Ok(element) = self.page.find_element(selector).await else {
            return Ok(None);
        };
        let text = element
            .inner_text()
            .await
            .map_err(|err| Error::render(&self.current_url, format!("read text: {err}")))?;
        Ok(text
            .map(|text| text.trim().to_owned())
            .filter(|text| !text.is_empty()))
    }

    async fn install_cookies(&mut self, session: &Session) -> Result<()> {
        let params = session
            .cookies()
            .into_iter()
            .map(|(name, value)| {
                CookieParam::builder()
                    .name(name.clone())
                    .value(value)
                    .url(session.base_url().to_string())
                    .build()
                    .map_err(|err| Error::render(&self.current_url, format!("cookie {name}: {err}")))
            })
            .collect::<Result<Vec<_>>>()?;
        if params.is_empty() {
            return Ok(());
        }
        let count = params.len();
        self.page
            .set_cookies(params)
            .await
            .map_err(|err| Error::render(&self.current_url, format!("set cookies: {err}")))?;
        tracing::debug!(count, "session cookies installed in browser");
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if let Err(err) = self.browser.close().await {
            tracing::debug!(?err, "browser close failed");
        }
        let _ = self.browser.wait().await;
        self.handler.abort();
        Ok(())
    }
}

fn with_base_href(html: &str, base_url: &Url) -> String {
    let base = format!(r#"<base href="{base_url}">"#);
    let lower = html.to_ascii_lowercase();
    match lower.find("<head>") {
        Some(pos) => {
            let insert_at = pos + "<head>".len();
            format!("{}{base}{}", &html[..insert_at], &html[insert_at..])
        }
        None => format!("{base}{html}"),
    }
}
