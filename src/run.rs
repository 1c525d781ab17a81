use anyhow::Context as _;

use crate::cli::SearchArgs;
use crate::config::Settings;
use crate::credentials::CredentialStore;
use crate::discover::{self, DiscoverySummary};
use crate::driver::{self, PageDriver};
use crate::process::{self, CapturedDocument, ProcessSummary};
use crate::records::RecordStore;
use crate::session::Session;

async fn open_session(settings: &Settings) -> anyhow::Result<(CredentialStore, Session)> {
    let mut credentials = CredentialStore::load(&settings.account_path)
        .await
        .context("load credentials")?;
    let session = Session::establish(
        settings.base_url.clone(),
        &mut credentials,
        settings.session_ttl,
    )
    .await
    .context("authenticate")?;
    Ok((credentials, session))
}

pub async fn search(settings: &Settings, args: &SearchArgs) -> anyhow::Result<DiscoverySummary> {
    let (_credentials, session) = open_session(settings).await?;
    let mut store = RecordStore::load(&settings.state_path).await?;
    discover::run(&session, &mut store, &args.filters_or_default(), args.refresh).await
}

pub async fn process(settings: &Settings) -> anyhow::Result<ProcessSummary> {
    let (mut credentials, session) = open_session(settings).await?;
    let mut store = RecordStore::load(&settings.state_path).await?;
    process_with(settings, &session, &mut credentials, &mut store).await
}

/// `search` then `process` over one session.
pub async fn run(
    settings: &Settings,
    args: &SearchArgs,
) -> anyhow::Result<(DiscoverySummary, ProcessSummary)> {
    let (mut credentials, session) = open_session(settings).await?;
    let mut store = RecordStore::load(&settings.state_path).await?;

    tracing::info!("run: search");
    let discovered =
        discover::run(&session, &mut store, &args.filters_or_default(), args.refresh).await?;

    tracing::info!("run: process");
    let processed = process_with(settings, &session, &mut credentials, &mut store).await?;
    Ok((discovered, processed))
}

/// Captures one document URL into a PDF without touching the state file.
pub async fn capture(settings: &Settings, url: &str) -> anyhow::Result<Option<CapturedDocument>> {
    let (_credentials, session) = open_session(settings).await?;
    let mut driver = driver::connect(settings, &session).await?;
    let result = process::capture_document(driver.as_mut(), url, None, settings).await;
    close_driver(driver.as_mut()).await;
    result
}

async fn process_with(
    settings: &Settings,
    session: &Session,
    credentials: &mut CredentialStore,
    store: &mut RecordStore,
) -> anyhow::Result<ProcessSummary> {
    if store.pending_urls().is_empty() {
        tracing::info!("nothing to process");
        return Ok(ProcessSummary::default());
    }

    let mut driver = driver::connect(settings, session).await?;
    let result = process::run(driver.as_mut(), session, credentials, store, settings).await;
    close_driver(driver.as_mut()).await;
    result
}

async fn close_driver(driver: &mut dyn PageDriver) {
    if let Err(err) = driver.close().await {
        tracing::warn!(%err, "closing page driver failed");
    }
}
