use std::process::ExitCode;

use anyhow::Context as _;
use clap::Parser as _;

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(err) = try_main().await {
        eprintln!("{err:#}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

async fn try_main() -> anyhow::Result<()> {
    corrige::logging::init().context("init logging")?;

    let cli = corrige::cli::Cli::parse();
    tracing::debug!(?cli, "parsed cli");

    let settings = corrige::config::Settings::from_args(&cli.global).context("resolve settings")?;

    match cli.command {
        corrige::cli::Command::Search(args) => {
            let summary = corrige::run::search(&settings, &args)
                .await
                .context("search")?;
            println!(
                "searched {} filter(s), skipped {}, failed {}, added {} document(s)",
                summary.searched, summary.skipped, summary.failed, summary.added
            );
        }
        corrige::cli::Command::Process => {
            let summary = corrige::run::process(&settings).await.context("process")?;
            println!(
                "captured {} document(s), {} page(s)",
                summary.documents, summary.pages
            );
        }
        corrige::cli::Command::Run(args) => {
            let (discovered, processed) = corrige::run::run(&settings, &args)
                .await
                .context("run")?;
            println!(
                "added {} document(s); captured {} document(s), {} page(s)",
                discovered.added, processed.documents, processed.pages
            );
        }
        corrige::cli::Command::Capture(args) => {
            let url = match args.url {
                Some(url) => url,
                None => dialoguer::Input::<String>::new()
                    .with_prompt("Enter the url")
                    .interact_text()
                    .context("read url")?,
            };
            match corrige::run::capture(&settings, url.trim())
                .await
                .context("capture")?
            {
                Some(document) => println!("PDF created: {}", document.pdf.display()),
                None => println!("nothing to capture at {url}"),
            }
        }
    }

    Ok(())
}
