use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use anyhow::Context as _;
use chrono::{DateTime, Utc};
use reqwest::cookie::{CookieStore as _, Jar};
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, HeaderMap, HeaderValue, USER_AGENT};
use url::Url;

use crate::credentials::CredentialStore;
use crate::error::Error;
use crate::site;

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/129.0.0.0 Safari/537.36";

/// Authenticated HTTP session shared by discovery and processing.
///
/// Logging in again only swaps the cookies, so drivers borrowing the session
/// keep working across a refresh.
#[derive(Debug)]
pub struct Session {
    base_url: Url,
    client: reqwest::Client,
    jar: Arc<Jar>,
    login: Mutex<LoginState>,
    ttl: Duration,
}

#[derive(Debug, Clone)]
struct LoginState {
    cookies: BTreeMap<String, String>,
    expires_at: DateTime<Utc>,
}

impl Session {
    /// Reuses cached cookies when they are still valid, otherwise logs in.
    pub async fn establish(
        base_url: Url,
        credentials: &mut CredentialStore,
        ttl: Duration,
    ) -> anyhow::Result<Self> {
        let jar = Arc::new(Jar::default());
        let client = reqwest::Client::builder()
            .cookie_provider(Arc::clone(&jar))
            .default_headers(default_headers())
            .timeout(Duration::from_secs(30))
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .context("build http client")?;

        let session = Self {
            base_url,
            client,
            jar,
            login: Mutex::new(LoginState {
                cookies: BTreeMap::new(),
                expires_at: Utc::now(),
            }),
            ttl,
        };

        let now = Utc::now();
        let cached = credentials.valid_cookies(now).cloned();
        let expiry = credentials
            .account()
            .cookies
            .as_ref()
            .map(|c| c.expiry_date);
        match (cached, expiry) {
            (Some(cookies), Some(expiry)) => {
                tracing::info!(account = %credentials.path().display(), "reusing cached session cookies");
                for (name, value) in &cookies {
                    session
                        .jar
                        .add_cookie_str(&format!("{name}={value}; Path=/"), &session.base_url);
                }
                let expires_at =
                    DateTime::from_timestamp_millis((expiry * 1000.0) as i64).unwrap_or(now);
                session.set_login(LoginState {
                    cookies,
                    expires_at,
                });
            }
            _ => session.login(credentials).await?,
        }

        Ok(session)
    }

    /// Logs in again once the cookies have expired. Returns whether it did.
    pub async fn ensure_fresh(&self, credentials: &mut CredentialStore) -> anyhow::Result<bool> {
        if Utc::now() < self.login_state().expires_at {
            return Ok(false);
        }
        tracing::info!("session expired; logging in again");
        self.login(credentials).await?;
        Ok(true)
    }

    async fn login(&self, credentials: &mut CredentialStore) -> anyhow::Result<()> {
        let login_url = site::login_url(&self.base_url)?;
        let account = credentials.account();
        tracing::info!(url = %login_url, email = %account.email, "logging in");

        let form = [
            (site::LOGIN_FIELD, account.email.as_str()),
            (site::PASSWORD_FIELD, account.password.as_str()),
            (site::SUBMIT_FIELD, "1"),
        ];
        let response = self
            .client
            .post(login_url.clone())
            .form(&form)
            .send()
            .await
            .map_err(|err| Error::auth(format!("POST {login_url}: {err}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::auth(format!("login returned {status}")).into());
        }

        let cookies = self.jar_cookies();
        if !cookies.contains_key(site::SESSION_COOKIE) {
            return Err(Error::auth(format!(
                "login response did not set the `{}` cookie",
                site::SESSION_COOKIE
            ))
            .into());
        }

        let expires_at = Utc::now()
            + chrono::Duration::from_std(self.ttl).context("session ttl out of range")?;
        credentials
            .store_cookies(cookies.clone(), expires_at)
            .await
            .context("cache session cookies")?;
        self.set_login(LoginState {
            cookies,
            expires_at,
        });
        tracing::info!(expires_at = %expires_at, "logged in");
        Ok(())
    }

    fn jar_cookies(&self) -> BTreeMap<String, String> {
        let Some(header) = self.jar.cookies(&self.base_url) else {
            return BTreeMap::new();
        };
        let Ok(header) = header.to_str() else {
            return BTreeMap::new();
        };
        header
            .split(';')
            .filter_map(|pair| {
                let (name, value) = pair.trim().split_once('=')?;
                Some((name.to_owned(), value.to_owned()))
            })
            .collect()
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Session cookies of the current login.
    pub fn cookies(&self) -> BTreeMap<String, String> {
        self.login_state().cookies
    }

    fn login_state(&self) -> LoginState {
        self.login
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_login(&self, state: LoginState) {
        *self.login.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    /// GETs an HTML page and returns the final URL along with the body.
    pub async fn get_html(&self, url: &Url) -> anyhow::Result<(Url, String)> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .with_context(|| format!("GET {url}"))?;
        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("GET {url} returned {status}");
        }
        let final_url = response.url().clone();
        let body = response
            .text()
            .await
            .with_context(|| format!("read body of {url}"))?;
        Ok((final_url, body))
    }

    pub async fn get_bytes(&self, url: &Url) -> anyhow::Result<Vec<u8>> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .with_context(|| format!("GET {url}"))?;
        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("GET {url} returned {status}");
        }
        let bytes = response
            .bytes()
            .await
            .with_context(|| format!("read body of {url}"))?;
        Ok(bytes.to_vec())
    }
}

fn default_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));
    headers.insert(
        ACCEPT,
        HeaderValue::from_static(
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8",
        ),
    );
    headers.insert(
        ACCEPT_LANGUAGE,
        HeaderValue::from_static("fr-FR,fr;q=0.9,en-US;q=0.8,en;q=0.7"),
    );
    headers
}
