use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// Categorized reason attached to a failed [`UrlTask`].
///
/// The serialized names are part of the public response contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// Input is not an absolute http/https URL, or the reputation service
    /// rejected the host as invalid.
    WrongFormat,
    /// Reputation service found no A records for the host.
    ARecordsNotFound,
    /// Reputation service flagged the host as a parked domain.
    ParkedDomain,
    /// Reputation credential missing, rejected, out of credits, or the
    /// service was unreachable.
    ApivoidApiKey,
    /// Headless render failed, timed out or returned an HTTP error status.
    OfflineOnPuppeteer,
    /// Rendering-proxy fallback failed or still returned a bot-wall.
    Scraperapi,
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureReason::WrongFormat => "wrong_format",
            FailureReason::ARecordsNotFound => "a_records_not_found",
            FailureReason::ParkedDomain => "parked_domain",
            FailureReason::ApivoidApiKey => "apivoid_api_key",
            FailureReason::OfflineOnPuppeteer => "offline_on_puppeteer",
            FailureReason::Scraperapi => "scraperapi",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Success,
    Failure,
}

/// One URL's run through the pipeline.
///
/// Once terminal, exactly one of `scraped_text` or
/// (`failure_reason` + `failure_text`) is populated.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UrlTask {
    pub url_input: String,
    #[serde(skip)]
    pub normalized_url: Option<String>,
    #[serde(skip)]
    pub host: Option<String>,
    pub status: TaskStatus,
    #[serde(serialize_with = "reason_or_empty")]
    pub failure_reason: Option<FailureReason>,
    pub failure_text: String,
    pub scraped_text: String,
    pub elapsed_ms: u64,
}

fn reason_or_empty<S: Serializer>(
    reason: &Option<FailureReason>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(reason.map(|r| r.as_str()).unwrap_or(""))
}

impl UrlTask {
    pub fn new(url_input: impl Into<String>) -> Self {
        Self {
            url_input: url_input.into(),
            normalized_url: None,
            host: None,
            status: TaskStatus::Pending,
            failure_reason: None,
            failure_text: String::new(),
            scraped_text: String::new(),
            elapsed_ms: 0,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status != TaskStatus::Pending
    }

    /// Finalize as success. A terminal task is never overwritten.
    pub fn succeed(&mut self, text: String) {
        if self.is_terminal() {
            return;
        }
        self.status = TaskStatus::Success;
        self.scraped_text = text;
        self.failure_reason = None;
        self.failure_text.clear();
    }

    /// Finalize as failure. A terminal task is never overwritten.
    pub fn fail(&mut self, reason: FailureReason, text: impl Into<String>) {
        if self.is_terminal() {
            return;
        }
        let text = text.into();
        self.status = TaskStatus::Failure;
        self.failure_reason = Some(reason);
        self.failure_text = if text.trim().is_empty() {
            reason.to_string()
        } else {
            text
        };
        self.scraped_text.clear();
    }
}

/// Ordered, deduplicated batch of raw URL strings accepted for scheduling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchRequest {
    pub urls: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchResult {
    pub request_id: String,
    pub results: Vec<UrlTask>,
}

// ── Stage results ────────────────────────────────────────────────────────────

/// Classified answer of the domain reputation service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReputationOutcome {
    Ok,
    Fail { reason: FailureReason, text: String },
}

impl ReputationOutcome {
    pub fn fail(reason: FailureReason, text: impl Into<String>) -> Self {
        ReputationOutcome::Fail {
            reason,
            text: text.into(),
        }
    }
}

/// Page fetched by the headless renderer or the rendering proxy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchedPage {
    pub http_status: Option<u16>,
    pub title: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchFailure {
    pub reason: FailureReason,
    pub text: String,
    pub http_status: Option<u16>,
    pub title: String,
    pub content: String,
}

impl FetchFailure {
    pub fn new(reason: FailureReason, text: impl Into<String>) -> Self {
        Self {
            reason,
            text: text.into(),
            http_status: None,
            title: String::new(),
            content: String::new(),
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.http_status = Some(status);
        self
    }
}

pub type FetchOutcome = Result<FetchedPage, FetchFailure>;

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_reason_wire_names() {
        let names: Vec<String> = [
            FailureReason::WrongFormat,
            FailureReason::ARecordsNotFound,
            FailureReason::ParkedDomain,
            FailureReason::ApivoidApiKey,
            FailureReason::OfflineOnPuppeteer,
            FailureReason::Scraperapi,
        ]
        .iter()
        .map(|r| serde_json::to_value(r).unwrap().as_str().unwrap().to_string())
        .collect();
        assert_eq!(
            names,
            vec![
                "wrong_format",
                "a_records_not_found",
                "parked_domain",
                "apivoid_api_key",
                "offline_on_puppeteer",
                "scraperapi"
            ]
        );
    }

    #[test]
    fn success_serializes_empty_failure_fields() {
        let mut task = UrlTask::new("https://example.com");
        task.succeed("hello".to_string());
        let v = serde_json::to_value(&task).unwrap();
        assert_eq!(v["status"], "success");
        assert_eq!(v["failure_reason"], "");
        assert_eq!(v["failure_text"], "");
        assert_eq!(v["scraped_text"], "hello");
        assert!(v.get("normalized_url").is_none());
    }

    #[test]
    fn terminal_task_is_not_overwritten() {
        let mut task = UrlTask::new("foobar");
        task.fail(FailureReason::WrongFormat, "bad");
        task.succeed("late".to_string());
        assert_eq!(task.status, TaskStatus::Failure);
        assert_eq!(task.failure_reason, Some(FailureReason::WrongFormat));
        assert!(task.scraped_text.is_empty());
    }

    #[test]
    fn blank_failure_text_falls_back_to_reason() {
        let mut task = UrlTask::new("https://example.com");
        task.fail(FailureReason::Scraperapi, "  ");
        assert_eq!(task.failure_text, "scraperapi");
    }
}
