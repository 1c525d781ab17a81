mod fixture_site;

use std::path::Path;

use clap::Parser as _;
use corrige::cli::{Cli, Command, SearchArgs};
use corrige::config::Settings;
use corrige::error::Error;
use corrige::formats::{Account, DocumentRecord};
use fixture_site::{DOC_PATH, FixtureConfig, FixtureSite, PASSWORD, SESSION_TOKEN};
use predicates::prelude::*;

fn corrige(workdir: &Path, site: &FixtureSite) -> assert_cmd::Command {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("corrige");
    cmd.env_remove("RUST_LOG").args([
        "--workdir",
        workdir.to_str().expect("utf-8 workdir"),
        "--base-url",
        &site.base_url,
        "--backend",
        "http",
        "--wait-ms",
        "10",
        "--puzzle-backoff-ms",
        "1",
        "--puzzle-max-backoff-ms",
        "5",
    ]);
    cmd
}

fn parse(workdir: &Path, site: &FixtureSite, extra: &[&str]) -> anyhow::Result<(Settings, Command)> {
    let mut args = vec![
        "corrige",
        "--workdir",
        workdir.to_str().expect("utf-8 workdir"),
        "--base-url",
        &site.base_url,
        "--backend",
        "http",
        "--wait-ms",
        "10",
        "--puzzle-backoff-ms",
        "1",
        "--puzzle-max-backoff-ms",
        "5",
    ];
    args.extend_from_slice(extra);
    let cli = Cli::try_parse_from(args)?;
    let settings = Settings::from_args(&cli.global)?;
    Ok((settings, cli.command))
}

fn search_args(command: Command) -> SearchArgs {
    match command {
        Command::Search(args) | Command::Run(args) => args,
        other => panic!("expected search arguments, got {other:?}"),
    }
}

fn read_records(workdir: &Path) -> anyhow::Result<Vec<DocumentRecord>> {
    let text = std::fs::read_to_string(workdir.join("urls.json"))?;
    Ok(serde_json::from_str(&text)?)
}

fn has_error(err: &anyhow::Error, matches: impl Fn(&Error) -> bool) -> bool {
    err.chain()
        .filter_map(|cause| cause.downcast_ref::<Error>())
        .any(matches)
}

#[test]
fn run_discovers_captures_and_skips_done_work_on_rerun() -> anyhow::Result<()> {
    let site = FixtureSite::spawn(FixtureConfig::default());
    let temp = tempfile::TempDir::new()?;
    fixture_site::write_account(temp.path(), PASSWORD);

    corrige(temp.path(), &site)
        .args(["run", "--filter", "PC:Polytechnique"])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "added 1 document(s); captured 1 document(s), 2 page(s)",
        ));

    let records = read_records(temp.path())?;
    assert_eq!(records.len(), 1, "both listing links point at one document");
    let record = &records[0];
    assert_eq!(record.url, format!("{}{DOC_PATH}", site.base_url));
    assert_eq!(record.title, fixture_site::DOC_TITLE);
    assert_eq!(record.sector, "PC");
    assert_eq!(record.school, "Polytechnique");
    assert_eq!(record.search_keys, "PC-Polytechnique");
    assert!(record.open);

    let pdf = temp.path().join("pdfs").join("polytechnique-pc-2023.pdf");
    let document = lopdf::Document::load(&pdf)?;
    assert_eq!(document.get_pages().len(), 2);

    assert_eq!(site.hits("/bin/users/connexion.html"), 1);
    assert_eq!(site.hits("/doc/x-pc-2023/q1"), 2, "puzzle page reloaded once");
    assert_eq!(site.hits("/tiles/3.png"), 1);

    let account: Account =
        serde_json::from_str(&std::fs::read_to_string(temp.path().join("account.json"))?)?;
    let cached = account.cookies.expect("cookies cached after login");
    assert_eq!(cached.cookies.get("ck_id").map(String::as_str), Some(SESSION_TOKEN));

    site.reset_hits();
    corrige(temp.path(), &site)
        .args(["run", "--filter", "PC:Polytechnique"])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "added 0 document(s); captured 0 document(s), 0 page(s)",
        ));

    assert_eq!(site.hits("/bin/users/connexion.html"), 0, "cached cookies reused");
    assert_eq!(site.hits("/main.html"), 0, "filter pair already searched");
    assert_eq!(site.hits(DOC_PATH), 0, "open documents are not fetched again");
    assert!(read_records(temp.path())?[0].open);
    Ok(())
}

#[tokio::test]
async fn overlapping_filters_keep_one_record_per_url() -> anyhow::Result<()> {
    let site = FixtureSite::spawn(FixtureConfig::default());
    let temp = tempfile::TempDir::new()?;
    fixture_site::write_account(temp.path(), PASSWORD);

    let (settings, command) = parse(
        temp.path(),
        &site,
        &["search", "--filter", "PC:Polytechnique", "--filter", "MP:Polytechnique"],
    )?;
    let summary = corrige::run::search(&settings, &search_args(command)).await?;

    assert_eq!(summary.searched, 2);
    assert_eq!(summary.added, 1);
    assert_eq!(site.hits("/main.html"), 2);

    let records = read_records(temp.path())?;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].search_keys, "PC-Polytechnique");
    assert!(!records[0].open);
    Ok(())
}

#[tokio::test]
async fn rejected_login_is_an_auth_error() -> anyhow::Result<()> {
    let site = FixtureSite::spawn(FixtureConfig::default());
    let temp = tempfile::TempDir::new()?;
    fixture_site::write_account(temp.path(), "wrong password");

    let (settings, command) = parse(temp.path(), &site, &["search", "--filter", "PC:Polytechnique"])?;
    let err = corrige::run::search(&settings, &search_args(command))
        .await
        .expect_err("login without session cookie must fail");

    assert!(
        has_error(&err, |e| matches!(e, Error::Auth { .. })),
        "unexpected error: {err:#}"
    );
    assert_eq!(site.hits("/main.html"), 0);
    assert!(!temp.path().join("urls.json").exists());
    Ok(())
}

#[tokio::test]
async fn unsolved_puzzle_times_out_and_leaves_document_pending() -> anyhow::Result<()> {
    let site = FixtureSite::spawn(FixtureConfig {
        puzzle_solved_from: usize::MAX,
    });
    let temp = tempfile::TempDir::new()?;
    fixture_site::write_account(temp.path(), PASSWORD);

    let (settings, command) = parse(
        temp.path(),
        &site,
        &["--puzzle-max-attempts", "2", "run", "--filter", "PC:Polytechnique"],
    )?;
    let err = corrige::run::run(&settings, &search_args(command))
        .await
        .expect_err("puzzle never resolves");

    assert!(
        has_error(&err, |e| matches!(e, Error::CaptureTimeout { attempts: 2, .. })),
        "unexpected error: {err:#}"
    );
    assert_eq!(site.hits("/doc/x-pc-2023/q1"), 2);

    let records = read_records(temp.path())?;
    assert_eq!(records.len(), 1);
    assert!(!records[0].open);
    assert!(!temp.path().join("pdfs").join("polytechnique-pc-2023.pdf").exists());
    Ok(())
}

#[tokio::test]
async fn capture_writes_pdf_without_state_file() -> anyhow::Result<()> {
    let site = FixtureSite::spawn(FixtureConfig::default());
    let temp = tempfile::TempDir::new()?;
    fixture_site::write_account(temp.path(), PASSWORD);

    let (settings, _) = parse(temp.path(), &site, &["capture"])?;
    let url = format!("{}{DOC_PATH}", site.base_url);
    let captured = corrige::run::capture(&settings, &url)
        .await?
        .expect("document has capture targets");

    assert_eq!(captured.pages, 2);
    assert_eq!(
        captured.pdf,
        temp.path().join("pdfs").join("polytechnique-pc-2023.pdf")
    );
    assert!(captured.pdf.is_file());
    assert!(!temp.path().join("urls.json").exists());
    Ok(())
}

#[tokio::test]
async fn expired_cached_cookies_trigger_a_fresh_login() -> anyhow::Result<()> {
    let site = FixtureSite::spawn(FixtureConfig::default());
    let temp = tempfile::TempDir::new()?;
    let stale = serde_json::json!({
        "email": fixture_site::EMAIL,
        "password": PASSWORD,
        "cookies": { "expiry_date": 1000.0, "cookies": { "ck_id": "stale" } }
    });
    std::fs::write(temp.path().join("account.json"), stale.to_string())?;

    let (settings, command) = parse(temp.path(), &site, &["search", "--filter", "PC:Polytechnique"])?;
    let summary = corrige::run::search(&settings, &search_args(command)).await?;

    assert_eq!(summary.added, 1);
    assert_eq!(site.hits("/bin/users/connexion.html"), 1);

    let account: Account =
        serde_json::from_str(&std::fs::read_to_string(temp.path().join("account.json"))?)?;
    let cached = account.cookies.expect("fresh cookies cached");
    assert!(cached.expiry_date > chrono::Utc::now().timestamp() as f64);
    assert_eq!(cached.cookies.get("ck_id").map(String::as_str), Some(SESSION_TOKEN));
    Ok(())
}

#[tokio::test]
async fn expired_session_is_refreshed_before_each_document() -> anyhow::Result<()> {
    let site = FixtureSite::spawn(FixtureConfig::default());
    let temp = tempfile::TempDir::new()?;
    fixture_site::write_account(temp.path(), PASSWORD);

    let (settings, command) = parse(
        temp.path(),
        &site,
        &["--session-ttl-secs", "0", "run", "--filter", "PC:Polytechnique"],
    )?;
    let (discovered, processed) = corrige::run::run(&settings, &search_args(command)).await?;

    assert_eq!(discovered.added, 1);
    assert_eq!(processed.documents, 1);
    assert_eq!(
        site.hits("/bin/users/connexion.html"),
        2,
        "one login to start, one more before the document"
    );
    assert!(read_records(temp.path())?[0].open);
    Ok(())
}
