//! mc-domain-proxy/src/firewall.rs
//! Per-domain deny rules fetched from the manager. Network failure is
//! non-fatal: the caller proceeds as though no rules matched.

use crate::config::ProxyConfig;
use serde::Deserialize;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum RuleType {
    IpBan,
    UsernameBan,
    UuidBan,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct FirewallRule {
    #[serde(rename = "type")]
    pub rule_type: RuleType,
    pub value: String,
}

/// Fetches the deny rules for `domain`. On network failure returns an empty
/// list and logs a warning; the session proceeds as if no rules matched.
pub async fn fetch_rules(domain: &str, client: &reqwest::Client, config: &ProxyConfig) -> Vec<FirewallRule> {
    let (Some(base), Some(api_key)) = (&config.manager_address, &config.manager_api_key) else {
        return Vec::new();
    };

    let url = format!("{base}/firewall/{domain}");
    let timeout = Duration::from_secs(config.external_http_timeout_secs);
    let result = client
        .get(url)
        .timeout(timeout)
        .header("X-Api-Key", api_key)
        .send()
        .await;

    match result {
        Ok(resp) => match resp.json::<Vec<FirewallRule>>().await {
            Ok(rules) => rules,
            Err(e) => {
                warn!(domain, "malformed firewall response: {}", e);
                Vec::new()
            }
        },
        Err(e) => {
            warn!(domain, "firewall fetch failed: {}", e);
            Vec::new()
        }
    }
}

/// A session is blocked iff any rule matches its ip/username/uuid exactly.
pub fn is_blocked(
    rules: &[FirewallRule],
    ip: &str,
    username: Option<&str>,
    uuid: Option<&str>,
) -> bool {
    rules.iter().any(|rule| match rule.rule_type {
        RuleType::IpBan => rule.value == ip,
        RuleType::UsernameBan => username == Some(rule.value.as_str()),
        RuleType::UuidBan => uuid == Some(rule.value.as_str()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(rule_type: RuleType, value: &str) -> FirewallRule {
        FirewallRule {
            rule_type,
            value: value.to_string(),
        }
    }

    #[test]
    fn blocks_on_exact_ip_match() {
        let rules = vec![rule(RuleType::IpBan, "1.2.3.4")];
        assert!(is_blocked(&rules, "1.2.3.4", None, None));
        assert!(!is_blocked(&rules, "1.2.3.5", None, None));
    }

    #[test]
    fn blocks_on_exact_username_match() {
        let rules = vec![rule(RuleType::UsernameBan, "alice")];
        assert!(is_blocked(&rules, "1.2.3.4", Some("alice"), None));
        assert!(!is_blocked(&rules, "1.2.3.4", Some("bob"), None));
        assert!(!is_blocked(&rules, "1.2.3.4", None, None));
    }

    #[test]
    fn blocks_on_exact_uuid_match() {
        let uuid = "00000000000000000000000000000001";
        let rules = vec![rule(RuleType::UuidBan, uuid)];
        assert!(is_blocked(&rules, "1.2.3.4", None, Some(uuid)));
        assert!(!is_blocked(&rules, "1.2.3.4", None, Some("other")));
    }

    #[test]
    fn no_rules_never_blocks() {
        assert!(!is_blocked(&[], "1.2.3.4", Some("alice"), Some("uuid")));
    }
}
