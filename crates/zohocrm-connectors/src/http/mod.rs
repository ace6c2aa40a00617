pub mod retry_manager;
pub mod timeout_manager;

pub use retry_manager::{parse_retry_after, RetryDecision, RetryManager, RetryPolicy};
pub use timeout_manager::TimeoutManager;

use crate::error::ConnectorResult;
use reqwest::Client;

/// Build the shared HTTP client with the connect timeout applied
pub fn build_client(timeouts: &TimeoutManager) -> ConnectorResult<Client> {
    timeouts.validate()?;
    let builder = timeouts.apply_to_client_builder(Client::builder());
    Ok(builder
        .user_agent(concat!("zoho-crm-mcp/", env!("CARGO_PKG_VERSION")))
        .build()?)
}
