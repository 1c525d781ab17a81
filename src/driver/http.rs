use std::io::Cursor;
use std::time::Duration;

use async_trait::async_trait;
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use scraper::{ElementRef, Html, Selector};
use url::Url;

use super::{ChromeDriver, PageDriver};
use crate::error::{Error, Result};
use crate::session::Session;

/// Renders pages from the HTML the session fetches, without a browser.
pub struct HttpDriver<'a> {
    session: &'a Session,
    page: Option<LoadedPage>,
    renderer: Option<ChromeDriver>,
}

struct LoadedPage {
    url: Url,
    html: String,
}

/// How an element is turned into pixels.
#[derive(Debug, PartialEq, Eq)]
enum RenderPlan {
    Image(Url),
    Tiles(Vec<Vec<Url>>),
    Markup,
}

impl<'a> HttpDriver<'a> {
    pub fn new(session: &'a Session) -> Self {
        Self {
            session,
            page: None,
            renderer: None,
        }
    }

    /// Uses `renderer` for elements that are neither images nor tile grids.
    pub fn with_renderer(mut self, renderer: ChromeDriver) -> Self {
        self.renderer = Some(renderer);
        self
    }

    fn loaded(&self) -> Result<&LoadedPage> {
        self.page
            .as_ref()
            .ok_or_else(|| Error::render("about:blank", "no page loaded"))
    }

    async fn fetch_image(&self, url: &Url) -> Result<DynamicImage> {
        let bytes = self
            .session
            .get_bytes(url)
            .await
            .map_err(|err| Error::render(url.as_str(), format!("{err:#}")))?;
        image::load_from_memory(&bytes)
            .map_err(|err| Error::render(url.as_str(), format!("decode image: {err}")))
    }
}

#[async_trait]
impl PageDriver for HttpDriver<'_> {
    async fn navigate(&mut self, url: &str) -> Result<()> {
        let parsed = Url::parse(url).map_err(|err| Error::render(url, format!("parse url: {err}")))?;
        tracing::debug!(url, "http navigate");
        let (final_url, html) = self
            .session
            .get_html(&parsed)
            .await
            .map_err(|err| Error::render(url, format!("{err:#}")))?;
        self.page = Some(LoadedPage {
            url: final_url,
            html,
        });
        Ok(())
    }

    async fn reload(&mut self) -> Result<()> {
        let url = self.loaded()?.url.to_string();
        self.navigate(&url).await
    }

    async fn exists(&mut self, selector: &str) -> Result<bool> {
        let page = self.loaded()?;
        let selector = parse_selector(&page.url, selector)?;
        let document = Html::parse_document(&page.html);
        Ok(document.select(&selector).next().is_some())
    }

    // A fetched document never changes until it is reloaded, so there is
    // nothing to poll for.
    async fn wait_for(&mut self, selector: &str, _timeout: Duration) -> Result<bool> {
        self.exists(selector).await
    }

    async fn screenshot(&mut self, selector: &str) -> Result<Vec<u8>> {
        let page = self.loaded()?;
        let page_url = page.url.clone();
        let plan = plan_render(&page.url, &page.html, selector)?;

        let rendered = match plan {
            RenderPlan::Image(src) => self.fetch_image(&src).await?,
            RenderPlan::Tiles(rows) => {
                let mut tiles = Vec::with_capacity(rows.len());
                for row in &rows {
                    let mut images = Vec::with_capacity(row.len());
                    for src in row {
                        images.push(self.fetch_image(src).await?);
                    }
                    tiles.push(images);
                }
                stitch_tiles(&tiles)
            }
            RenderPlan::Markup => {
                let html = page.html.clone();
                let Some(renderer) = self.renderer.as_mut() else {
                    return Err(Error::render(
                        page_url.as_str(),
                        format!("`{selector}` is neither an image nor a tile grid; enable --render-with-chrome"),
                    ));
                };
                return renderer.render_html(&page_url, &html, selector).await;
            }
        };

        encode_png(&rendered).map_err(|err| Error::render(page_url.as_str(), err))
    }

    async fn links(&mut self, selector: &str) -> Result<Vec<String>> {
        let page = self.loaded()?;
        let selector = parse_selector(&page.url, selector)?;
        let document = Html::parse_document(&page.html);
        Ok(document
            .select(&selector)
            .filter_map(|element| element.value().attr("href"))
            .map(str::trim)
            .filter(|href| !href.is_empty())
            .filter_map(|href| page.url.join(href).ok())
            .map(|url| url.to_string())
            .collect())
    }

    async fn text(&mut self, selector: &str) -> Result<Option<String>> {
        let page = self.loaded()?;
        let selector = parse_selector(&page.url, selector)?;
        let document = Html::parse_document(&page.html);
        Ok(document
            .select(&selector)
            .next()
            .map(element_text)
            .filter(|text| !text.is_empty()))
    }

    async fn install_cookies(&mut self, session: &Session) -> Result<()> {
        match self.renderer.as_mut() {
            Some(renderer) => renderer.install_cookies(session).await,
            None => Ok(()),
        }
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(renderer) = self.renderer.as_mut() {
            renderer.close().await?;
        }
        Ok(())
    }
}

fn parse_selector(page_url: &Url, selector: &str) -> Result<Selector> {
    Selector::parse(selector)
        .map_err(|err| Error::render(page_url.as_str(), format!("invalid selector `{selector}`: {err}")))
}

pub(crate) fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .collect::<Vec<_>>()
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn plan_render(page_url: &Url, html: &str, selector: &str) -> Result<RenderPlan> {
    let selector_parsed = parse_selector(page_url, selector)?;
    let document = Html::parse_document(html);
    let element = document.select(&selector_parsed).next().ok_or_else(|| {
        Error::render(page_url.as_str(), format!("no element matches `{selector}`"))
    })?;

    let resolve = |src: &str| {
        page_url
            .join(src.trim())
            .map_err(|err| Error::render(page_url.as_str(), format!("image src {src:?}: {err}")))
    };

    match element.value().name() {
        "img" => {
            let src = element.value().attr("src").ok_or_else(|| {
                Error::render(page_url.as_str(), format!("`{selector}` has no src"))
            })?;
            Ok(RenderPlan::Image(resolve(src)?))
        }
        "table" => {
            let rows_selector = parse_selector(page_url, "tr")?;
            let img_selector = parse_selector(page_url, "img")?;
            let mut rows = Vec::new();
            for row in element.select(&rows_selector) {
                let mut tiles = Vec::new();
                for cell in row
                    .children()
                    .filter_map(ElementRef::wrap)
                    .filter(|cell| matches!(cell.value().name(), "td" | "th"))
                {
                    let Some(src) = cell
                        .select(&img_selector)
                        .next()
                        .and_then(|img| img.value().attr("src"))
                    else {
                        return Ok(RenderPlan::Markup);
                    };
                    tiles.push(resolve(src)?);
                }
                if !tiles.is_empty() {
                    rows.push(tiles);
                }
            }
            if rows.is_empty() {
                Ok(RenderPlan::Markup)
            } else {
                Ok(RenderPlan::Tiles(rows))
            }
        }
        _ => Ok(RenderPlan::Markup),
    }
}

/// Lays tiles out row by row on a white canvas.
fn stitch_tiles(rows: &[Vec<DynamicImage>]) -> DynamicImage {
    let width = rows
        .iter()
        .map(|row| row.iter().map(|tile| tile.width()).sum::<u32>())
        .max()
        .unwrap_or(0);
    let height = rows
        .iter()
        .map(|row| row.iter().map(|tile| tile.height()).max().unwrap_or(0))
        .sum::<u32>();

    let mut canvas = RgbaImage::from_pixel(width.max(1), height.max(1), Rgba([255, 255, 255, 255]));
    let mut y = 0_i64;
    for row in rows {
        let mut x = 0_i64;
        for tile in row {
            image::imageops::overlay(&mut canvas, &tile.to_rgba8(), x, y);
            x += i64::from(tile.width());
        }
        y += i64::from(row.iter().map(|tile| tile.height()).max().unwrap_or(0));
    }
    DynamicImage::ImageRgba8(canvas)
}

fn encode_png(image: &DynamicImage) -> std::result::Result<Vec<u8>, String> {
    let mut out = Cursor::new(Vec::new());
    image
        .write_to(&mut out, ImageFormat::Png)
        .map_err(|err| format!("encode png: {err}"))?;
    Ok(out.into_inner())
}
