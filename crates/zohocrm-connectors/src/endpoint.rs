use crate::error::{ConnectorError, ConnectorResult};
use url::Url;
use zohocrm_core::{CrmError, CrmResult, Region};

pub const DOMAIN_PLACEHOLDER: &str = "{domain}";

/// Region-specific CRM API base URL
#[derive(Debug, Clone, PartialEq)]
pub struct CrmEndpoint {
    template: String,
}

impl CrmEndpoint {
    /// `template` may contain `{domain}`; without it the URL is used for
    /// every region as-is
    pub fn new(template: impl Into<String>) -> ConnectorResult<Self> {
        let template = template.into().trim_end_matches('/').to_string();
        let sample = template.replace(DOMAIN_PLACEHOLDER, Region::Us.domain());
        let parsed = Url::parse(&sample)
            .map_err(|e| ConnectorError::InvalidConfig(format!("CRM API base '{}': {}", template, e)))?;
        if parsed.cannot_be_a_base() {
            return Err(ConnectorError::InvalidConfig(format!(
                "CRM API base '{}' cannot carry a path",
                template
            )));
        }
        Ok(Self { template })
    }

    pub fn base_url(&self, region: Region) -> String {
        self.template.replace(DOMAIN_PLACEHOLDER, region.domain())
    }

    /// Base URL for `region` with `segments` appended, each percent-encoded
    pub fn url(&self, region: Region, segments: &[String]) -> CrmResult<Url> {
        let mut url = Url::parse(&self.base_url(region)).map_err(|e| invalid_endpoint(&e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| invalid_endpoint("base URL cannot carry a path"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

fn invalid_endpoint(message: &str) -> CrmError {
    CrmError::UnexpectedRemoteError {
        status: 0,
        message: format!("invalid CRM endpoint: {}", message),
    }
}
