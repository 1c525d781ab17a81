use anyhow::Context as _;

/// Used when `RUST_LOG` is unset or unparsable. The CDP handler is chatty at info level.
const DEFAULT_FILTER: &str = "info,chromiumoxide=warn,selectors=warn,html5ever=warn";

/// Logs go to stderr so stdout only carries command results.
pub fn init() -> anyhow::Result<()> {
    let filter = log_filter()?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| anyhow::anyhow!("initialize tracing subscriber: {err}"))?;

    Ok(())
}

fn log_filter() -> anyhow::Result<tracing_subscriber::EnvFilter> {
    tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(DEFAULT_FILTER))
        .context("build log filter")
}
