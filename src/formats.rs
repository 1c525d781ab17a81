use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// One discoverable correction document, as stored in the state file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub sector: String,
    pub school: String,
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub open: bool,
    #[serde(default)]
    pub search_keys: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterPair {
    pub track: String,
    pub school: String,
}

impl FilterPair {
    pub fn new(track: impl Into<String>, school: impl Into<String>) -> Self {
        Self {
            track: track.into(),
            school: school.into(),
        }
    }

    /// Value stored in `DocumentRecord::search_keys` for records found by this pair.
    pub fn search_keys(&self) -> String {
        format!("{}-{}", self.track, self.school)
    }

    pub fn defaults() -> Vec<Self> {
        let mut pairs = Vec::new();
        for school in ["Polytechnique", "Mines", "Centrale"] {
            for track in ["PC", "MP", "PSI"] {
                pairs.push(Self::new(track, school));
            }
        }
        pairs
    }
}

impl fmt::Display for FilterPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.track, self.school)
    }
}

impl FromStr for FilterPair {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (track, school) = s
            .split_once(':')
            .ok_or_else(|| anyhow::anyhow!("filter must look like TRACK:SCHOOL, got {s:?}"))?;
        let (track, school) = (track.trim(), school.trim());
        if track.is_empty() || school.is_empty() {
            anyhow::bail!("filter must look like TRACK:SCHOOL, got {s:?}");
        }
        Ok(Self::new(track, school))
    }
}

/// Contents of the credentials file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub email: String,
    pub password: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cookies: Option<CachedCookies>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CachedCookies {
    /// Unix timestamp in seconds.
    pub expiry_date: f64,
    #[serde(default)]
    pub cookies: BTreeMap<String, String>,
}
