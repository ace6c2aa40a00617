//! Timeout management for outbound HTTP requests

use crate::error::{ConnectorError, ConnectorResult};
use reqwest::ClientBuilder;
use std::time::Duration;
use tokio::time::timeout;

/// Applies the connect timeout to the shared client and bounds every
/// request future by the per-call timeout
#[derive(Debug, Clone)]
pub struct TimeoutManager {
    connect: Duration,
    request: Duration,
}

impl TimeoutManager {
    pub fn new(connect: Duration, request: Duration) -> Self {
        Self { connect, request }
    }

    /// Apply connection-level timeouts to a reqwest ClientBuilder.
    /// The request timeout stays per-call since the client is shared.
    pub fn apply_to_client_builder(&self, builder: ClientBuilder) -> ClientBuilder {
        builder.connect_timeout(self.connect)
    }

    pub fn request_timeout(&self) -> Duration {
        self.request
    }

    /// Execute a request future, surfacing `ConnectorError::Timeout` when it
    /// does not complete in time
    pub async fn execute_with_timeout<F, T>(&self, operation: F) -> ConnectorResult<T>
    where
        F: std::future::Future<Output = Result<T, reqwest::Error>>,
    {
        let limit_ms = self.request.as_millis() as u64;
        match timeout(self.request, operation).await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(error)) => {
                if error.is_timeout() {
                    Err(ConnectorError::Timeout(limit_ms))
                } else if error.is_connect() {
                    Err(ConnectorError::Connection(format!(
                        "Connection failed: {}",
                        error.without_url()
                    )))
                } else {
                    Err(ConnectorError::Http(error))
                }
            }
            Err(_) => Err(ConnectorError::Timeout(limit_ms)),
        }
    }

    pub fn validate(&self) -> ConnectorResult<()> {
        if self.request.is_zero() {
            return Err(ConnectorError::InvalidConfig(
                "Request timeout must be greater than 0".to_string(),
            ));
        }
        if self.connect > self.request {
            return Err(ConnectorError::InvalidConfig(
                "Connect timeout cannot be greater than request timeout".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for TimeoutManager {
    fn default() -> Self {
        Self::new(Duration::from_secs(10), Duration::from_secs(30))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::sleep;

    #[test]
    fn test_validation() {
        assert!(TimeoutManager::default().validate().is_ok());
        assert!(TimeoutManager::new(Duration::from_secs(5), Duration::ZERO)
            .validate()
            .is_err());
        assert!(
            TimeoutManager::new(Duration::from_secs(20), Duration::from_secs(10))
                .validate()
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_timeout_execution() {
        let manager = TimeoutManager::new(Duration::from_millis(50), Duration::from_millis(100));

        let quick = async {
            sleep(Duration::from_millis(10)).await;
            Ok::<_, reqwest::Error>("done")
        };
        assert_eq!(manager.execute_with_timeout(quick).await.unwrap(), "done");

        let slow = async {
            sleep(Duration::from_millis(300)).await;
            Ok::<_, reqwest::Error>("too slow")
        };
        match manager.execute_with_timeout(slow).await {
            Err(ConnectorError::Timeout(ms)) => assert_eq!(ms, 100),
            other => panic!("expected timeout, got {:?}", other),
        }
    }
}
