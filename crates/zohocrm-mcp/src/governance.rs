//! Tool exposure and concurrency controls

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use zohocrm_config::AppConfig;

/// Slack on top of the CRM retry budget before a tool call is abandoned
const CALL_TIMEOUT_MARGIN: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct GovernanceConfig {
    /// Tool patterns to expose (e.g., ["get_crm_*", "search_crm_records"]); empty exposes all
    pub allow_patterns: Vec<String>,
    /// Tool patterns to hide (e.g., ["delete_*", "*_org"])
    pub deny_patterns: Vec<String>,
    /// Maximum concurrent tool calls
    pub max_concurrency: usize,
    /// Upper bound on one tool call, retries included
    pub timeout: Duration,
    pub concurrency_limiter: Arc<Semaphore>,
}

impl GovernanceConfig {
    pub fn new(
        allow_patterns: Vec<String>,
        deny_patterns: Vec<String>,
        max_concurrency: usize,
        timeout: Duration,
    ) -> Self {
        let max_concurrency = max_concurrency.max(1);
        Self {
            allow_patterns,
            deny_patterns,
            max_concurrency,
            timeout,
            concurrency_limiter: Arc::new(Semaphore::new(max_concurrency)),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        let budget = Duration::from_secs(config.crm.retry.total_timeout_secs) + config.crm.timeout();
        Self::new(
            config.server.allow.clone(),
            config.server.deny.clone(),
            config.server.max_concurrency,
            budget + CALL_TIMEOUT_MARGIN,
        )
    }

    /// A tool is visible and callable when it matches an allow pattern
    /// (or none are set) and no deny pattern
    pub fn is_tool_allowed(&self, tool_name: &str) -> bool {
        if !self.allow_patterns.is_empty() {
            let allowed =
                self.allow_patterns.iter().any(|pattern| matches_pattern(tool_name, pattern));
            if !allowed {
                return false;
            }
        }

        !self.deny_patterns.iter().any(|pattern| matches_pattern(tool_name, pattern))
    }
}

impl Default for GovernanceConfig {
    fn default() -> Self {
        Self::new(vec![], vec![], 10, Duration::from_secs(95))
    }
}

/// `*`, exact names, `prefix*` and `*suffix`
fn matches_pattern(tool_name: &str, pattern: &str) -> bool {
    let pattern = pattern.trim();
    if pattern == "*" || pattern == tool_name {
        return true;
    }

    if let Some(prefix) = pattern.strip_suffix('*') {
        if !prefix.contains('*') {
            return tool_name.starts_with(prefix);
        }
    }

    if let Some(suffix) = pattern.strip_prefix('*') {
        if !suffix.contains('*') {
            return tool_name.ends_with(suffix);
        }
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(allow: &[&str], deny: &[&str]) -> GovernanceConfig {
        GovernanceConfig::new(
            allow.iter().map(|s| s.to_string()).collect(),
            deny.iter().map(|s| s.to_string()).collect(),
            10,
            Duration::from_secs(30),
        )
    }

    #[test]
    fn test_pattern_matching() {
        assert!(matches_pattern("get_crm_record", "get_crm_record"));
        assert!(!matches_pattern("get_crm_records", "get_crm_record"));

        assert!(matches_pattern("get_crm_records", "get_crm_*"));
        assert!(matches_pattern("get_crm_org", "get_*"));
        assert!(!matches_pattern("create_crm_lead", "get_*"));

        assert!(matches_pattern("delete_crm_record", "*_record"));
        assert!(!matches_pattern("get_crm_records", "*_record"));

        assert!(matches_pattern("anything", "*"));
        assert!(!matches_pattern("get_crm_org", "get*crm*"));
    }

    #[test]
    fn test_allow_patterns() {
        let config = config(&["get_*", "search_crm_records"], &[]);
        assert!(config.is_tool_allowed("get_crm_records"));
        assert!(config.is_tool_allowed("search_crm_records"));
        assert!(!config.is_tool_allowed("search_crm_by_email"));
        assert!(!config.is_tool_allowed("delete_crm_record"));
    }

    #[test]
    fn test_deny_wins_over_allow() {
        let config = config(&["*"], &["delete_*", "get_crm_org"]);
        assert!(config.is_tool_allowed("create_crm_record"));
        assert!(!config.is_tool_allowed("delete_crm_record"));
        assert!(!config.is_tool_allowed("get_crm_org"));
    }

    #[test]
    fn test_from_app_config() {
        let mut app = AppConfig::default();
        app.server.deny = vec!["delete_*".to_string()];
        app.server.max_concurrency = 3;
        let config = GovernanceConfig::from_config(&app);
        assert_eq!(config.max_concurrency, 3);
        assert_eq!(config.concurrency_limiter.available_permits(), 3);
        assert!(!config.is_tool_allowed("delete_crm_record"));
        assert!(config.timeout > app.crm.timeout());
    }
}
