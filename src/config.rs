use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context as _;
use url::Url;

use crate::capture::{CaptureOptions, RetryPolicy};
use crate::cli::GlobalArgs;
use crate::driver::Backend;

/// Fully resolved runtime settings.
#[derive(Debug, Clone)]
pub struct Settings {
    pub state_path: PathBuf,
    pub account_path: PathBuf,
    pub screenshots_dir: PathBuf,
    pub pdfs_dir: PathBuf,
    pub base_url: Url,
    pub backend: Backend,
    pub capture: CaptureOptions,
    pub session_ttl: Duration,
    pub delay: Duration,
    pub chrome_executable: Option<PathBuf>,
    pub render_with_chrome: bool,
}

impl Settings {
    pub fn from_args(args: &GlobalArgs) -> anyhow::Result<Self> {
        let workdir = Path::new(&args.workdir);
        let resolve = |explicit: &Option<String>, default: &str| -> PathBuf {
            match explicit {
                Some(path) => PathBuf::from(path),
                None => workdir.join(default),
            }
        };

        let base_url = Url::parse(&args.base_url).context("parse --base-url")?;
        if base_url.scheme() != "http" && base_url.scheme() != "https" {
            anyhow::bail!("--base-url must be http/https: {base_url}");
        }

        let screenshots_dir = resolve(&args.screenshots, "screenshots");

        Ok(Self {
            state_path: resolve(&args.state, "urls.json"),
            account_path: resolve(&args.account, "account.json"),
            pdfs_dir: resolve(&args.pdfs, "pdfs"),
            base_url,
            backend: args.backend,
            capture: CaptureOptions {
                wait_timeout: Duration::from_millis(args.wait_ms),
                retry: RetryPolicy {
                    max_attempts: args.puzzle_max_attempts,
                    initial_backoff: Duration::from_millis(args.puzzle_backoff_ms),
                    max_backoff: Duration::from_millis(
                        args.puzzle_max_backoff_ms.max(args.puzzle_backoff_ms),
                    ),
                },
                screenshots_dir: screenshots_dir.clone(),
            },
            screenshots_dir,
            session_ttl: Duration::from_secs(args.session_ttl_secs),
            delay: Duration::from_millis(args.delay_ms),
            chrome_executable: args.chrome.as_ref().map(PathBuf::from),
            render_with_chrome: args.render_with_chrome,
        })
    }
}
