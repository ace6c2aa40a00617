use zohocrm_core::CrmError;

/// Transport and construction failures, before they are mapped onto the
/// caller-facing [`CrmError`] taxonomy
#[derive(Debug, thiserror::Error)]
pub enum ConnectorError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Request timed out after {0}ms")]
    Timeout(u64),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Crm(#[from] CrmError),
}

/// Default mapping used for CRM calls. The broker client maps transport
/// failures to `AuthUnavailable` itself.
impl From<ConnectorError> for CrmError {
    fn from(err: ConnectorError) -> Self {
        match err {
            ConnectorError::Timeout(ms) => CrmError::NetworkTimeout(ms),
            ConnectorError::Crm(e) => e,
            ConnectorError::Http(e) => CrmError::UnexpectedRemoteError {
                status: e.status().map(|s| s.as_u16()).unwrap_or(0),
                message: e.without_url().to_string(),
            },
            ConnectorError::Connection(msg) | ConnectorError::InvalidConfig(msg) => {
                CrmError::UnexpectedRemoteError {
                    status: 0,
                    message: msg,
                }
            }
        }
    }
}

pub type ConnectorResult<T> = Result<T, ConnectorError>;
