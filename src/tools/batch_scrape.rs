use crate::core::error::BatchError;
use crate::tools::pipeline::run_pipeline;
use crate::types::*;
use crate::AppState;
use futures::stream::{self, StreamExt};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

/// Validate a `{"urls": [...]}` body into a deduplicated batch.
///
/// Rejects before anything is scheduled.
pub fn parse_batch_request(body: &Value, max_unique: usize) -> Result<BatchRequest, BatchError> {
    let obj = body.as_object().ok_or(BatchError::NotAnObject)?;
    let urls = obj.get("urls").ok_or(BatchError::MissingUrls)?;
    let items = urls.as_array().ok_or(BatchError::NotAnArray)?;

    let raw = items
        .iter()
        .enumerate()
        .map(|(index, v)| {
            v.as_str()
                .map(str::to_string)
                .ok_or(BatchError::NonStringItem { index })
        })
        .collect::<Result<Vec<_>, _>>()?;

    prepare_batch(raw, max_unique)
}

/// Deduplicate `urls` (exact string equality, first occurrence wins) and
/// enforce the unique-count cap.
pub fn prepare_batch(urls: Vec<String>, max_unique: usize) -> Result<BatchRequest, BatchError> {
    let urls = dedupe_preserving_order(urls);
    if urls.len() > max_unique {
        return Err(BatchError::TooManyUrls {
            count: urls.len(),
            max: max_unique,
        });
    }
    Ok(BatchRequest { urls })
}

pub fn dedupe_preserving_order(urls: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    urls.into_iter()
        .filter(|u| seen.insert(u.clone()))
        .collect()
}

/// Run the pipeline for every URL with at most `batch_concurrency` in flight.
///
/// Results land in slots indexed by input position, so output order is the
/// (deduplicated) input order regardless of completion order.
pub async fn scrape_batch(state: &Arc<AppState>, request: BatchRequest) -> BatchResult {
    let start_time = Instant::now();
    let request_id = uuid::Uuid::new_v4().to_string();
    let total = request.urls.len();
    let max_concurrent = state.config.batch_concurrency.max(1);

    info!(
        "Batch {}: scraping {} URLs (concurrency: {})",
        request_id, total, max_concurrent
    );

    let mut slots: Vec<Option<UrlTask>> = vec![None; total];
    let mut runs = stream::iter(request.urls.into_iter().enumerate())
        .map(|(index, url)| {
            let state = Arc::clone(state);
            async move { (index, run_pipeline(&state, &url).await) }
        })
        .buffer_unordered(max_concurrent);

    while let Some((index, task)) = runs.next().await {
        if let Some(slot) = slots.get_mut(index) {
            *slot = Some(task);
        }
    }

    let results: Vec<UrlTask> = slots.into_iter().flatten().collect();
    let successful = results
        .iter()
        .filter(|t| t.status == TaskStatus::Success)
        .count();

    info!(
        "Batch {} completed: {}/{} successful, {} failed, {}ms total",
        request_id,
        successful,
        total,
        total - successful,
        start_time.elapsed().as_millis()
    );

    BatchResult {
        request_id,
        results,
    }
}
