pub mod broker;
pub mod credential_cache;
pub mod crm;
pub mod endpoint;
pub mod error;
pub mod http;
pub mod presets;
pub mod response;

pub use broker::{BrokerClient, CredentialSource};
pub use credential_cache::{CredentialCache, CredentialProvider, EXPIRY_SKEW};
pub use crm::CrmClient;
pub use endpoint::CrmEndpoint;
pub use error::{ConnectorError, ConnectorResult};
pub use http::{RetryManager, RetryPolicy, TimeoutManager};
pub use presets::{AccountPreset, ContactPreset, LeadPreset, RecordPreset};
pub use response::{normalize, RemoteOutcome};
