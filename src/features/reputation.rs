//! Domain reputation check (APIVoid-style service).
//!
//! The service answers with DNS/parking signals for a bare host. Error payloads
//! are free text, so they are classified by an ordered rule table instead of
//! ad-hoc matching at the call site.

use crate::types::{FailureReason, ReputationOutcome};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

#[async_trait]
pub trait ReputationService: Send + Sync {
    /// Classify `host` (no scheme). Never errors: every problem is a `Fail`.
    async fn check(&self, host: &str) -> ReputationOutcome;
}

/// First-match rule over the lowercased error text of a failed response.
struct ErrorRule {
    needles: &'static [&'static str],
    reason: FailureReason,
}

const ERROR_RULES: &[ErrorRule] = &[
    ErrorRule {
        needles: &["domain name is not valid"],
        reason: FailureReason::WrongFormat,
    },
    ErrorRule {
        needles: &["insufficient", "credit", "api key", "unauthorized", "forbidden"],
        reason: FailureReason::ApivoidApiKey,
    },
];

/// Anything the rule table does not recognize is a credential/plan problem.
const DEFAULT_ERROR_REASON: FailureReason = FailureReason::ApivoidApiKey;

pub fn classify_error_text(text: &str) -> FailureReason {
    let lower = text.to_lowercase();
    ERROR_RULES
        .iter()
        .find(|rule| rule.needles.iter().any(|n| lower.contains(n)))
        .map(|rule| rule.reason)
        .unwrap_or(DEFAULT_ERROR_REASON)
}

fn lookup_bool(body: &Value, field: &str) -> Option<bool> {
    body.get(field)
        .or_else(|| body.get("data").and_then(|d| d.get(field)))
        .and_then(Value::as_bool)
}

fn error_text(body: &Value) -> Option<String> {
    match body.get("error")? {
        Value::Null => None,
        Value::String(s) if s.trim().is_empty() => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Classify an HTTP answer from the reputation service.
///
/// `body` is the parsed JSON payload, or `Value::Null` when it was not JSON.
pub fn classify_response(host: &str, status: u16, body: &Value) -> ReputationOutcome {
    let error = error_text(body);
    if status >= 400 || error.is_some() {
        let text = error.unwrap_or_else(|| format!("HTTP {}", status));
        let reason = classify_error_text(&text);
        return ReputationOutcome::fail(
            reason,
            format!("reputation check for {} failed: {}", host, text),
        );
    }

    // An answer without the success shape (HTML error page, empty body) is a
    // service/plan problem, never a pass.
    let Some(a_records_found) = lookup_bool(body, "a_records_found") else {
        return ReputationOutcome::fail(
            FailureReason::ApivoidApiKey,
            format!("unexpected reputation response for {} (HTTP {})", host, status),
        );
    };
    if !a_records_found {
        return ReputationOutcome::fail(
            FailureReason::ARecordsNotFound,
            format!("no A records found for {}", host),
        );
    }
    if lookup_bool(body, "parked_domain") == Some(true) {
        return ReputationOutcome::fail(
            FailureReason::ParkedDomain,
            format!("{} is a parked domain", host),
        );
    }

    ReputationOutcome::Ok
}

/// HTTP client for the reputation service.
pub struct ApiVoidChecker {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl ApiVoidChecker {
    pub fn new(
        client: reqwest::Client,
        endpoint: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            api_key,
            timeout,
        }
    }
}

#[async_trait]
impl ReputationService for ApiVoidChecker {
    async fn check(&self, host: &str) -> ReputationOutcome {
        let Some(api_key) = self.api_key.as_deref() else {
            return ReputationOutcome::fail(FailureReason::ApivoidApiKey, "credential missing");
        };

        debug!("Reputation check: {}", host);
        let response = self
            .client
            .post(&self.endpoint)
            .header("X-API-Key", api_key)
            .timeout(self.timeout)
            .json(&serde_json::json!({ "host": host }))
            .send()
            .await;

        let response = match response {
            Ok(r) => r,
            Err(e) => {
                // Network trouble lands in the credential/plan bucket.
                warn!("Reputation request for {} failed: {}", host, e);
                let text = if e.is_timeout() {
                    "reputation service timeout".to_string()
                } else {
                    format!("reputation service unreachable: {}", e)
                };
                return ReputationOutcome::fail(FailureReason::ApivoidApiKey, text);
            }
        };

        let status = response.status().as_u16();
        let body = match response.text().await {
            Ok(t) => t,
            Err(e) => {
                warn!("Reputation body read for {} failed: {}", host, e);
                return ReputationOutcome::fail(
                    FailureReason::ApivoidApiKey,
                    format!("reputation response unreadable: {}", e),
                );
            }
        };
        let json = serde_json::from_str::<Value>(&body).unwrap_or(Value::Null);

        let outcome = classify_response(host, status, &json);
        if let ReputationOutcome::Fail { reason, text } = &outcome {
            debug!("Reputation verdict for {}: {} ({})", host, reason, text);
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn reason(outcome: &ReputationOutcome) -> Option<FailureReason> {
        match outcome {
            ReputationOutcome::Ok => None,
            ReputationOutcome::Fail { reason, .. } => Some(*reason),
        }
    }

    #[test]
    fn error_rules_are_first_match() {
        assert_eq!(
            classify_error_text("Domain name is NOT valid"),
            FailureReason::WrongFormat
        );
        assert_eq!(
            classify_error_text("Insufficient API credits"),
            FailureReason::ApivoidApiKey
        );
        assert_eq!(
            classify_error_text("something odd happened"),
            FailureReason::ApivoidApiKey
        );
    }

    #[test]
    fn dns_and_parking_signals() {
        let out = classify_response("a.test", 200, &json!({"a_records_found": false}));
        assert_eq!(reason(&out), Some(FailureReason::ARecordsNotFound));

        let out = classify_response(
            "a.test",
            200,
            &json!({"a_records_found": true, "parked_domain": true}),
        );
        assert_eq!(reason(&out), Some(FailureReason::ParkedDomain));

        let out = classify_response(
            "a.test",
            200,
            &json!({"a_records_found": true, "parked_domain": false}),
        );
        assert_eq!(out, ReputationOutcome::Ok);
    }

    #[test]
    fn signals_nested_under_data() {
        let out = classify_response("a.test", 200, &json!({"data": {"a_records_found": false}}));
        assert_eq!(reason(&out), Some(FailureReason::ARecordsNotFound));
    }

    #[test]
    fn error_field_wins_over_success_shape() {
        let out = classify_response(
            "bad..host",
            200,
            &json!({"error": "Domain name is not valid", "a_records_found": false}),
        );
        assert_eq!(reason(&out), Some(FailureReason::WrongFormat));
    }

    #[test]
    fn success_status_without_success_shape_fails() {
        for body in [Value::Null, json!({}), json!({"data": {"parked_domain": false}})] {
            let out = classify_response("a.test", 200, &body);
            assert_eq!(reason(&out), Some(FailureReason::ApivoidApiKey), "body: {body}");
        }
    }

    #[test]
    fn http_error_without_body() {
        let out = classify_response("a.test", 401, &Value::Null);
        match out {
            ReputationOutcome::Fail { reason, text } => {
                assert_eq!(reason, FailureReason::ApivoidApiKey);
                assert!(text.contains("401"));
            }
            ReputationOutcome::Ok => panic!("expected failure"),
        }
    }

    #[tokio::test]
    async fn missing_credential_skips_network() {
        let checker = ApiVoidChecker::new(
            reqwest::Client::new(),
            "http://127.0.0.1:1/unreachable",
            None,
            Duration::from_secs(1),
        );
        let out = checker.check("example.com").await;
        assert_eq!(
            out,
            ReputationOutcome::fail(FailureReason::ApivoidApiKey, "credential missing")
        );
    }
}
