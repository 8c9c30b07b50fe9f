//! Per-URL pipeline: validate → reputation → render → quality → fallback.
//!
//! Every stage failure becomes a terminal `UrlTask` failure; nothing is
//! returned as an error to the caller. A panic inside a stage is caught and
//! recorded against that stage.

use crate::content_quality::{self, BlockSignal};
use crate::tools::normalize::{extract_host, normalize_url};
use crate::types::{FailureReason, FetchedPage, ReputationOutcome, UrlTask};
use crate::AppState;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::Instant;
use tracing::{debug, error, info, warn};

pub const FALLBACK_REJECTED_TEXT: &str = "fallback returned bot-wall/short content";

/// Why a fetched page cannot be returned as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rejection {
    Blocked(BlockSignal),
    Empty,
}

fn inspect(page: &FetchedPage) -> Option<Rejection> {
    if let Some(signal) = content_quality::classify(&page.content, &page.title) {
        return Some(Rejection::Blocked(signal));
    }
    if page.content.trim().is_empty() {
        return Some(Rejection::Empty);
    }
    None
}

/// Pipeline stage currently running; decides the reason of an unexpected failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Validating,
    ReputationCheck,
    PrimaryRender,
    FallbackRender,
}

impl Stage {
    fn failure_reason(self) -> FailureReason {
        match self {
            Stage::Validating => FailureReason::WrongFormat,
            Stage::ReputationCheck => FailureReason::ApivoidApiKey,
            Stage::PrimaryRender => FailureReason::OfflineOnPuppeteer,
            Stage::FallbackRender => FailureReason::Scraperapi,
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "unknown panic"
    }
}

/// Run one URL to a terminal state. `elapsed_ms` covers the whole run.
pub async fn run_pipeline(state: &AppState, url_input: &str) -> UrlTask {
    let started = Instant::now();
    let mut task = UrlTask::new(url_input);
    let mut stage = Stage::Validating;

    let outcome = AssertUnwindSafe(drive(state, &mut task, &mut stage))
        .catch_unwind()
        .await;
    if let Err(payload) = outcome {
        let message = panic_message(&*payload);
        error!("Task {} panicked during {:?}: {}", url_input, stage, message);
        task.fail(stage.failure_reason(), format!("internal error: {}", message));
    }

    task.elapsed_ms = started.elapsed().as_millis() as u64;
    debug_assert!(task.is_terminal());
    info!(
        "Task {} finished: {:?} {} ({}ms)",
        task.url_input,
        task.status,
        task.failure_reason.map(|r| r.as_str()).unwrap_or(""),
        task.elapsed_ms
    );
    task
}

async fn drive(state: &AppState, task: &mut UrlTask, stage: &mut Stage) {
    // Validating
    let Ok(normalized) = normalize_url(&task.url_input) else {
        let text = format!("input url `{}` is not properly formatted", task.url_input);
        task.fail(FailureReason::WrongFormat, text);
        return;
    };
    task.normalized_url = Some(normalized.clone());

    // ReputationCheck (not covered by the task deadline)
    *stage = Stage::ReputationCheck;
    let Ok(host) = extract_host(&normalized) else {
        let text = format!("could not extract host from `{}`", normalized);
        task.fail(FailureReason::WrongFormat, text);
        return;
    };
    task.host = Some(host.clone());

    if let ReputationOutcome::Fail { reason, text } = state.reputation.check(&host).await {
        debug!("Reputation rejected {}: {} ({})", host, reason, text);
        task.fail(reason, text);
        return;
    }

    // PrimaryRender
    *stage = Stage::PrimaryRender;
    let deadline = tokio::time::Instant::now() + state.config.task_timeout;
    let primary = match tokio::time::timeout_at(
        deadline,
        state.renderer.render(&normalized, deadline),
    )
    .await
    {
        Ok(Ok(page)) => page,
        Ok(Err(failure)) => {
            task.fail(FailureReason::OfflineOnPuppeteer, failure.text);
            return;
        }
        Err(_) => {
            warn!("Primary render of {} hit the task deadline", normalized);
            task.fail(FailureReason::OfflineOnPuppeteer, "timeout");
            return;
        }
    };

    // QualityCheck
    let Some(rejection) = inspect(&primary) else {
        task.succeed(primary.content);
        return;
    };
    info!(
        "Primary render of {} rejected ({:?}); trying fallback",
        normalized, rejection
    );

    // FallbackRender (same deadline)
    *stage = Stage::FallbackRender;
    let fallback = match tokio::time::timeout_at(
        deadline,
        state.fallback.fetch(&normalized, deadline),
    )
    .await
    {
        Ok(Ok(page)) => page,
        Ok(Err(failure)) => {
            task.fail(FailureReason::Scraperapi, failure.text);
            return;
        }
        Err(_) => {
            warn!("Fallback fetch of {} hit the task deadline", normalized);
            task.fail(FailureReason::Scraperapi, "timeout");
            return;
        }
    };

    if let Some(rejection) = inspect(&fallback) {
        debug!("Fallback for {} rejected too ({:?})", normalized, rejection);
        task.fail(FailureReason::Scraperapi, FALLBACK_REJECTED_TEXT);
        return;
    }
    task.succeed(fallback.content);
}
