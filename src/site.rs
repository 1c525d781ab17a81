//! URL layout and DOM selectors of the correction site.

use anyhow::Context as _;
use url::Url;

use crate::formats::FilterPair;

pub const DEFAULT_BASE_URL: &str = "https://www.doc-solus.fr";

pub const LOGIN_PATH: &str = "/bin/users/connexion.html";
pub const SEARCH_PATH: &str = "/main.html";

pub const LOGIN_FIELD: &str = "login";
pub const PASSWORD_FIELD: &str = "passwd";
pub const SUBMIT_FIELD: &str = "save";

pub const SESSION_COOKIE: &str = "ck_id";

pub const SEARCH_RESULT_LINKS: &str = ".center.maincolumn ul li a";
pub const CAPTURE_TARGET_LINKS: &str = ".center.maincolumn > section > span > a";
pub const DOCUMENT_TITLE: &str = "h1";

pub const PUZZLE_OVERLAY: &str = ".center.maincolumn > center > .puzzle";
pub const PUZZLE_TABLE: &str = ".center.maincolumn > center > .puzzle > div > table";
pub const DIRECT_IMAGE: &str = ".center.maincolumn > img";
pub const CONTENT_BLOCK: &str = ".center.maincolumn";

pub fn login_url(base: &Url) -> anyhow::Result<Url> {
    base.join(LOGIN_PATH).context("build login url")
}

pub fn search_url(base: &Url, filter: &FilterPair) -> anyhow::Result<Url> {
    let mut url = base.join(SEARCH_PATH).context("build search url")?;
    url.query_pairs_mut()
        .append_pair("filiere", &filter.track)
        .append_pair("concours", &filter.school);
    Ok(url)
}
