use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Context as _;
use chrono::{DateTime, Utc};

use crate::formats::{Account, CachedCookies};

#[derive(Debug)]
pub struct CredentialStore {
    path: PathBuf,
    account: Account,
}

impl CredentialStore {
    pub async fn load(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        let bytes = tokio::fs::read(&path)
            .await
            .with_context(|| format!("read credentials file: {}", path.display()))?;
        let account: Account = serde_json::from_slice(&bytes)
            .with_context(|| format!("parse credentials file: {}", path.display()))?;
        if account.email.trim().is_empty() {
            anyhow::bail!("credentials file has an empty email: {}", path.display());
        }
        Ok(Self { path, account })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn account(&self) -> &Account {
        &self.account
    }

    /// Cookies from a previous login, if they have not expired at `now`.
    pub fn valid_cookies(&self, now: DateTime<Utc>) -> Option<&BTreeMap<String, String>> {
        let cached = self.account.cookies.as_ref()?;
        if cached.cookies.is_empty() || cached.expiry_date <= timestamp(now) {
            return None;
        }
        Some(&cached.cookies)
    }

    pub async fn store_cookies(
        &mut self,
        cookies: BTreeMap<String, String>,
        expires_at: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        self.account.cookies = Some(CachedCookies {
            expiry_date: timestamp(expires_at),
            cookies,
        });
        crate::records::write_json_atomic(&self.path, &self.account)
            .await
            .with_context(|| format!("write credentials file: {}", self.path.display()))
    }
}

fn timestamp(at: DateTime<Utc>) -> f64 {
    at.timestamp_millis() as f64 / 1000.0
}
