use std::path::{Path, PathBuf};

use anyhow::Context as _;

use crate::capture;
use crate::config::Settings;
use crate::credentials::CredentialStore;
use crate::driver::PageDriver;
use crate::pdf;
use crate::records::RecordStore;
use crate::session::Session;
use crate::site;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessSummary {
    pub documents: usize,
    pub pages: usize,
    pub empty: usize,
}

/// Captures every record that is not open yet, marking each one open once its PDF exists.
///
/// The session is refreshed before each document when its login has expired.
/// The first failing document aborts the pass and stays pending.
pub async fn run(
    driver: &mut dyn PageDriver,
    session: &Session,
    credentials: &mut CredentialStore,
    store: &mut RecordStore,
    settings: &Settings,
) -> anyhow::Result<ProcessSummary> {
    let pending = store.pending_urls();
    tracing::info!(pending = pending.len(), "processing documents");

    let mut summary = ProcessSummary::default();
    for url in pending {
        let title = store
            .get(&url)
            .map(|record| record.title.clone())
            .unwrap_or_default();
        tracing::info!(%url, %title, "opening document");

        if session
            .ensure_fresh(credentials)
            .await
            .context("refresh session")?
        {
            driver.install_cookies(session).await?;
        }

        let captured = capture_document(driver, &url, Some(title.as_str()), settings)
            .await
            .with_context(|| format!("capture document {url}"))?;
        match captured {
            Some(document) => {
                summary.documents += 1;
                summary.pages += document.pages;
            }
            None => summary.empty += 1,
        }

        store.mark_open(&url)?;
        store.save().await.context("save records after document")?;
    }

    store.save().await.context("save records after processing")?;
    tracing::info!(
        documents = summary.documents,
        pages = summary.pages,
        empty = summary.empty,
        "processing done"
    );
    Ok(summary)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedDocument {
    pub pdf: PathBuf,
    pub pages: usize,
}

/// Captures all targets linked from the document at `url` into one PDF.
///
/// `title` names the PDF; when missing or blank the page's heading is used.
/// Returns `None` when the document links no capture targets.
pub async fn capture_document(
    driver: &mut dyn PageDriver,
    url: &str,
    title: Option<&str>,
    settings: &Settings,
) -> anyhow::Result<Option<CapturedDocument>> {
    clear_dir(&settings.screenshots_dir)?;

    driver.navigate(url).await?;
    let title = match title.map(str::trim).filter(|t| !t.is_empty()) {
        Some(title) => title.to_owned(),
        None => driver
            .text(site::DOCUMENT_TITLE)
            .await?
            .unwrap_or_else(|| url.to_owned()),
    };
    let targets = driver.links(site::CAPTURE_TARGET_LINKS).await?;
    if targets.is_empty() {
        tracing::warn!(url, "document has no capture targets");
        return Ok(None);
    }

    let mut screenshots = Vec::with_capacity(targets.len());
    for (index, target) in targets.iter().enumerate() {
        tracing::info!(target = %target, "downloading {}/{}", index + 1, targets.len());
        let path = capture::capture(driver, target, &settings.capture)
            .await
            .with_context(|| format!("capture {target}"))?;
        screenshots.push(path);
        if !settings.delay.is_zero() {
            tokio::time::sleep(settings.delay).await;
        }
    }

    let out = pdf::pdf_path(&settings.pdfs_dir, &title);
    pdf::images_to_pdf(&screenshots, &out)?;
    Ok(Some(CapturedDocument {
        pdf: out,
        pages: screenshots.len(),
    }))
}

/// Removes leftovers of an earlier, aborted document.
fn clear_dir(dir: &Path) -> anyhow::Result<()> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(err) => {
            return Err(err).with_context(|| format!("read screenshot dir: {}", dir.display()));
        }
    };
    for entry in entries {
        let path = entry?.path();
        if path.is_file() {
            std::fs::remove_file(&path)
                .with_context(|| format!("remove stale screenshot: {}", path.display()))?;
        }
    }
    Ok(())
}
