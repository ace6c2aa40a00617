//! CRM data-centre regions.
//!
//! The region is always learned from the token broker's connection record,
//! never from a tool caller. It selects the API domain suffix.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
#[error("unknown CRM region: '{0}'")]
pub struct UnknownRegion(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Region {
    Us,
    Eu,
    In,
    Au,
    Cn,
    Jp,
    Ca,
    Sa,
    Uk,
}

impl Region {
    pub const ALL: [Region; 9] = [
        Region::Us,
        Region::Eu,
        Region::In,
        Region::Au,
        Region::Cn,
        Region::Jp,
        Region::Ca,
        Region::Sa,
        Region::Uk,
    ];

    /// Domain suffix used by the region's API hosts (`www.zohoapis.<domain>`)
    pub fn domain(&self) -> &'static str {
        match self {
            Region::Us => "com",
            Region::Eu => "eu",
            Region::In => "in",
            Region::Au => "com.au",
            Region::Cn => "com.cn",
            Region::Jp => "jp",
            Region::Ca => "ca",
            Region::Sa => "sa",
            Region::Uk => "uk",
        }
    }

    /// Parse a domain extension as reported by the broker (`com`, `eu`, `com.au`, ...)
    pub fn from_domain(domain: &str) -> Option<Self> {
        let normalized = domain.trim().trim_start_matches('.').to_ascii_lowercase();
        match normalized.as_str() {
            "com" | "us" => Some(Region::Us),
            "eu" => Some(Region::Eu),
            "in" => Some(Region::In),
            "com.au" | "au" => Some(Region::Au),
            "com.cn" | "cn" => Some(Region::Cn),
            "jp" => Some(Region::Jp),
            "ca" => Some(Region::Ca),
            "sa" => Some(Region::Sa),
            "uk" => Some(Region::Uk),
            _ => None,
        }
    }

    /// Derive the region from an API or accounts URL such as
    /// `https://www.zohoapis.eu` or `https://accounts.zoho.com.au`.
    pub fn from_api_domain(api_domain: &str) -> Option<Self> {
        let parsed = url::Url::parse(api_domain.trim()).ok()?;
        let host = parsed.host_str()?.to_ascii_lowercase();
        let suffix = ["zohoapis.", "zoho."]
            .iter()
            .find_map(|marker| host.find(marker).map(|idx| &host[idx + marker.len()..]))?;
        Self::from_domain(suffix)
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.domain())
    }
}

impl FromStr for Region {
    type Err = UnknownRegion;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Region::from_domain(s)
            .or_else(|| Region::from_api_domain(s))
            .ok_or_else(|| UnknownRegion(s.to_string()))
    }
}
