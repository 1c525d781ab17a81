use anyhow::Context as _;
use scraper::{Html, Selector};
use url::Url;

use crate::error::Error;
use crate::formats::{DocumentRecord, FilterPair};
use crate::records::RecordStore;
use crate::session::Session;
use crate::site;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoverySummary {
    pub searched: usize,
    pub skipped: usize,
    pub failed: usize,
    pub added: usize,
}

/// Searches every filter pair and merges new documents into `store`.
///
/// A failing pair is logged and does not stop the others. The state file is
/// rewritten once at the end.
pub async fn run(
    session: &Session,
    store: &mut RecordStore,
    filters: &[FilterPair],
    refresh: bool,
) -> anyhow::Result<DiscoverySummary> {
    let mut summary = DiscoverySummary::default();

    for filter in filters {
        let search_keys = filter.search_keys();
        if !refresh && store.contains_search_keys(&search_keys) {
            tracing::info!(%filter, "already searched");
            summary.skipped += 1;
            continue;
        }

        match search(session, filter).await {
            Ok(found) => {
                let found_count = found.len();
                let added = store.merge(found);
                summary.searched += 1;
                summary.added += added;
                tracing::info!(%filter, found = found_count, added, "search done");
            }
            Err(err) => {
                summary.failed += 1;
                let err = Error::Discovery {
                    filter: filter.to_string(),
                    reason: format!("{err:#}"),
                };
                tracing::warn!(%err, "search failed");
            }
        }
    }

    store.save().await.context("save records after search")?;
    tracing::info!(
        searched = summary.searched,
        skipped = summary.skipped,
        failed = summary.failed,
        added = summary.added,
        "searches done"
    );
    Ok(summary)
}

async fn search(session: &Session, filter: &FilterPair) -> anyhow::Result<Vec<DocumentRecord>> {
    let url = site::search_url(session.base_url(), filter)?;
    let (page_url, html) = session.get_html(&url).await?;
    parse_listing(&page_url, &html, filter)
}

/// Extracts document links from a search-result page, deduplicated by URL.
pub fn parse_listing(
    page_url: &Url,
    html: &str,
    filter: &FilterPair,
) -> anyhow::Result<Vec<DocumentRecord>> {
    let selector = Selector::parse(site::SEARCH_RESULT_LINKS)
        .map_err(|err| anyhow::anyhow!("parse listing selector: {err}"))?;
    let document = Html::parse_document(html);

    let mut records: Vec<DocumentRecord> = Vec::new();
    for link in document.select(&selector) {
        let Some(href) = link.value().attr("href").map(str::trim) else {
            continue;
        };
        if href.is_empty() {
            continue;
        }
        let url = match page_url.join(href) {
            Ok(url) => normalize_document_url(url),
            Err(err) => {
                tracing::warn!(href, %err, "skipping unparsable listing link");
                continue;
            }
        };
        if records.iter().any(|record| record.url == url.as_str()) {
            continue;
        }

        records.push(DocumentRecord {
            sector: filter.track.clone(),
            school: filter.school.clone(),
            title: crate::driver::http::element_text(link),
            url: url.to_string(),
            open: false,
            search_keys: filter.search_keys(),
        });
    }

    Ok(records)
}

fn normalize_document_url(url: Url) -> Url {
    let mut normalized = url;
    normalized.set_fragment(None);
    normalized
}
