//! Configuration data structures for wafctl.
//!
//! Two JSON documents feed a run: the site config (`config.json`, holding the API key
//! and one API secret per site) and an optional template describing a batch of changes.
//! Both are serde-friendly and default every field so that minimal files stay concise.
use std::{collections::BTreeMap, fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// Site configuration stored next to the executable (`config.json`).
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct SiteConfig {
    /// Account-wide API key
    #[serde(rename = "apiKey", alias = "apikey", skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Site name (usually the domain) mapped to that site's API secret
    pub sites: BTreeMap<String, String>,
}

impl SiteConfig {
    /// Look up the API secret of a site.
    ///
    /// Site names are domains, so an exact match is tried first and an ASCII
    /// case-insensitive one second.
    pub fn secret_for(&self, site: &str) -> Option<&str> {
        self.sites
            .get(site)
            .or_else(|| {
                self.sites
                    .iter()
                    .find(|(name, _)| name.eq_ignore_ascii_case(site))
                    .map(|(_, secret)| secret)
            })
            .map(String::as_str)
            .filter(|secret| !secret.is_empty())
    }
}

/// A batch of desired WAF changes loaded from a JSON template.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
pub struct Template {
    /// API key override for this template
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Site whose secret should be taken from the site config
    #[serde(skip_serializing_if = "Option::is_none")]
    pub site: Option<String>,
    /// Literal API secret
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_secret: Option<String>,
    #[serde(rename = "whitelistIPs")]
    pub whitelist_ips: Vec<String>,
    pub whitelist_subnets: Vec<String>,
    #[serde(rename = "blacklistIPs")]
    pub blacklist_ips: Vec<String>,
    pub blacklist_subnets: Vec<String>,
    /// URL path mapped to its match pattern
    pub whitelist_paths: BTreeMap<String, String>,
    pub blacklist_paths: BTreeMap<String, String>,
    /// Setting name mapped to its new value
    pub settings: BTreeMap<String, String>,
}

impl Template {
    /// Whether the template requests no change at all
    pub fn is_empty(&self) -> bool {
        self.whitelist_ips.is_empty()
            && self.whitelist_subnets.is_empty()
            && self.blacklist_ips.is_empty()
            && self.blacklist_subnets.is_empty()
            && self.whitelist_paths.is_empty()
            && self.blacklist_paths.is_empty()
            && self.settings.is_empty()
    }
}

/// How a whitelisted or blacklisted URL path is matched by the WAF
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum PathPattern {
    #[default]
    Matches,
    BeginsWith,
    EndsWith,
    Equals,
}

impl PathPattern {
    pub const ALL: [PathPattern; 4] = [
        PathPattern::Matches,
        PathPattern::BeginsWith,
        PathPattern::EndsWith,
        PathPattern::Equals,
    ];

    /// Name used on the wire and in templates
    pub fn as_str(&self) -> &'static str {
        match self {
            PathPattern::Matches => "matches",
            PathPattern::BeginsWith => "begins_with",
            PathPattern::EndsWith => "ends_with",
            PathPattern::Equals => "equals",
        }
    }
}

impl fmt::Display for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PathPattern {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        PathPattern::ALL
            .into_iter()
            .find(|p| p.as_str() == normalized)
            .ok_or_else(|| {
                format!("unknown path pattern '{s}' (expected matches, begins_with, ends_with or equals)")
            })
    }
}

/// Resolved API credentials for one site
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub api_key: String,
    pub api_secret: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &self.api_key)
            .field("api_secret", &"<redacted>")
            .finish()
    }
}
