use clap::{Args, Parser, Subcommand};

use crate::driver::Backend;
use crate::formats::FilterPair;

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Discover documents for the given filter pairs and record them.
    Search(SearchArgs),
    /// Capture every recorded document that is not open yet.
    Process,
    /// `search` followed by `process`.
    Run(SearchArgs),
    /// Capture a single document URL into a PDF, without touching the state file.
    Capture(CaptureArgs),
}

#[derive(Debug, Clone, Args)]
pub struct GlobalArgs {
    /// Directory holding the state file, credentials, screenshots and PDFs.
    #[arg(long, global = true, env = "CORRIGE_WORKDIR", default_value = ".")]
    pub workdir: String,

    /// State file (default: `<workdir>/urls.json`).
    #[arg(long, global = true, env = "CORRIGE_STATE")]
    pub state: Option<String>,

    /// Credentials file (default: `<workdir>/account.json`).
    #[arg(long, global = true, env = "CORRIGE_ACCOUNT")]
    pub account: Option<String>,

    /// Screenshot directory (default: `<workdir>/screenshots`).
    #[arg(long, global = true, env = "CORRIGE_SCREENSHOTS")]
    pub screenshots: Option<String>,

    /// PDF output directory (default: `<workdir>/pdfs`).
    #[arg(long, global = true, env = "CORRIGE_PDFS")]
    pub pdfs: Option<String>,

    /// Site root.
    #[arg(long, global = true, env = "CORRIGE_BASE_URL", default_value = crate::site::DEFAULT_BASE_URL)]
    pub base_url: String,

    /// Page rendering backend.
    #[arg(long, global = true, env = "CORRIGE_BACKEND", value_enum, default_value_t = Backend::Chrome)]
    pub backend: Backend,

    /// Bounded wait for the target element on a capture page.
    #[arg(long, global = true, env = "CORRIGE_WAIT_MS", default_value_t = 2000)]
    pub wait_ms: u64,

    /// Puzzle reload attempts before giving up (0 retries forever).
    #[arg(long, global = true, env = "CORRIGE_PUZZLE_MAX_ATTEMPTS", default_value_t = 10)]
    pub puzzle_max_attempts: u32,

    /// Pause after the first puzzle reload; doubles on every further attempt.
    #[arg(long, global = true, env = "CORRIGE_PUZZLE_BACKOFF_MS", default_value_t = 1000)]
    pub puzzle_backoff_ms: u64,

    /// Upper bound for the pause between puzzle reloads.
    #[arg(long, global = true, env = "CORRIGE_PUZZLE_MAX_BACKOFF_MS", default_value_t = 16000)]
    pub puzzle_max_backoff_ms: u64,

    /// How long a fresh login stays cached in the credentials file.
    #[arg(long, global = true, env = "CORRIGE_SESSION_TTL_SECS", default_value_t = 3600)]
    pub session_ttl_secs: u64,

    /// Delay between capture targets (politeness).
    #[arg(long, global = true, env = "CORRIGE_DELAY_MS", default_value_t = 0)]
    pub delay_ms: u64,

    /// Chrome/Chromium executable (default: looked up on PATH).
    #[arg(long, global = true, env = "CORRIGE_CHROME")]
    pub chrome: Option<String>,

    /// With `--backend http`, render non-image elements through headless Chrome.
    #[arg(long, global = true, env = "CORRIGE_RENDER_WITH_CHROME")]
    pub render_with_chrome: bool,
}

#[derive(Debug, Clone, Args)]
pub struct SearchArgs {
    /// Filter pair `TRACK:SCHOOL`; repeatable (default: PC/MP/PSI x Polytechnique/Mines/Centrale).
    #[arg(long = "filter")]
    pub filters: Vec<FilterPair>,

    /// Search again even if records for a filter pair already exist.
    #[arg(long)]
    pub refresh: bool,
}

impl SearchArgs {
    pub fn filters_or_default(&self) -> Vec<FilterPair> {
        if self.filters.is_empty() {
            FilterPair::defaults()
        } else {
            self.filters.clone()
        }
    }
}

#[derive(Debug, Clone, Args)]
pub struct CaptureArgs {
    /// Document URL (prompted for when missing).
    #[arg(long)]
    pub url: Option<String>,
}
