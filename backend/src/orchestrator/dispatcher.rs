//! Batch dispatcher
//!
//! Turns every pending work item into one request and runs them all
//! concurrently. The shared limiter paces the calls; the dispatcher itself
//! imposes no ordering and no extra concurrency cap.

use crate::error::AppError;
use crate::executor::{ExecError, Executor, Payload};
use crate::io::OutputSink;
use crate::orchestrator::work_item::WorkItem;
use crate::request::RequestDescriptor;
use futures_util::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Outcome of one item in a dispatch
#[derive(Debug, Clone, PartialEq)]
pub enum Settlement {
    /// The call succeeded
    Succeeded(Payload),
    /// The call failed
    Failed(ExecError),
    /// The item was already settled and got no call
    Skipped,
}

/// Counts after [`BatchDispatcher::dispatch_into`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    /// Items whose call succeeded
    pub succeeded: usize,
    /// Items whose call failed
    pub failed: usize,
    /// Items that were already settled
    pub skipped: usize,
    /// Successful items the sink rejected
    pub unsaved: usize,
}

/// Dispatches one request per work item
pub struct BatchDispatcher {
    executor: Arc<Executor>,
}

impl BatchDispatcher {
    /// Create a dispatcher on a shared executor
    pub fn new(executor: Arc<Executor>) -> Self {
        Self { executor }
    }

    /// Run one request per pending item and wait for all of them
    ///
    /// Every pending item ends up `Done` or `Failed`; the returned settlements
    /// are in item order. One failure never affects the other items.
    ///
    /// # Arguments
    /// * `items` - Items to process; settled items are skipped
    /// * `map` - Builds the request for an item's criteria
    ///
    /// # Errors
    /// * Any error from `map`. All descriptors are built before the first
    ///   request is issued, so a bad item aborts the batch without traffic.
    pub async fn dispatch_all<C, F>(
        &self,
        items: &mut [WorkItem<C>],
        map: F,
    ) -> Result<Vec<Settlement>, AppError>
    where
        F: Fn(&C) -> Result<RequestDescriptor, AppError>,
    {
        let descriptors = items
            .iter()
            .map(|item| {
                if item.is_terminal() {
                    Ok(None)
                } else {
                    map(item.criteria()).map(Some)
                }
            })
            .collect::<Result<Vec<_>, AppError>>()?;

        let pending = descriptors.iter().filter(|d| d.is_some()).count();
        if pending == 0 {
            info!(items = items.len(), "Nothing to dispatch");
            return Ok(vec![Settlement::Skipped; items.len()]);
        }
        info!(items = items.len(), pending, "Dispatching batch");

        let settlements = join_all(items.iter_mut().zip(descriptors).map(
            |(item, descriptor)| async move {
                match descriptor {
                    Some(descriptor) => self.settle_one(item, &descriptor).await,
                    None => Settlement::Skipped,
                }
            },
        ))
        .await;

        Ok(settlements)
    }

    /// Dispatch the batch and hand every success to `sink`
    ///
    /// Failures are logged with the item key. A sink failure is logged and
    /// counted as `unsaved`; it does not stop the remaining writes.
    pub async fn dispatch_into<C, F>(
        &self,
        items: &mut [WorkItem<C>],
        map: F,
        sink: &dyn OutputSink,
    ) -> Result<BatchSummary, AppError>
    where
        F: Fn(&C) -> Result<RequestDescriptor, AppError>,
    {
        let settlements = self.dispatch_all(items, map).await?;
        let mut summary = BatchSummary::default();

        for (item, settlement) in items.iter().zip(settlements) {
            match settlement {
                Settlement::Succeeded(payload) => {
                    summary.succeeded += 1;
                    if let Err(e) = sink.accept(item.key(), &payload.into_value()).await {
                        error!(key = %item.key(), error = %e, "Failed to save result");
                        summary.unsaved += 1;
                    }
                }
                Settlement::Failed(e) => {
                    summary.failed += 1;
                    warn!(key = %item.key(), error = %e, "Request failed");
                }
                Settlement::Skipped => summary.skipped += 1,
            }
        }

        info!(
            succeeded = summary.succeeded,
            failed = summary.failed,
            skipped = summary.skipped,
            unsaved = summary.unsaved,
            "Batch finished"
        );
        Ok(summary)
    }

    async fn settle_one<C>(&self, item: &mut WorkItem<C>, descriptor: &RequestDescriptor) -> Settlement {
        match self.executor.execute(descriptor).await {
            Ok(payload) => {
                item.record_success(None, &payload);
                Settlement::Succeeded(payload)
            }
            Err(e) => {
                item.record_failure(None, e.clone());
                item.mark_failed();
                Settlement::Failed(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{MockTransport, RawResponse};
    use crate::io::MemorySink;
    use crate::limiter::{LimiterConfig, RateLimiter};
    use crate::orchestrator::work_item::ItemStatus;
    use crate::request::DescriptorBuilder;
    use serde_json::json;

    fn dispatcher(transport: Arc<MockTransport>) -> BatchDispatcher {
        let limiter = RateLimiter::new(LimiterConfig::new(50)).unwrap();
        BatchDispatcher::new(Arc::new(Executor::new(limiter, transport)))
    }

    fn by_duns(duns: &String) -> Result<RequestDescriptor, AppError> {
        DescriptorBuilder::new("https://plus.dnb.com")
            .segments(["v1", "data", "duns", duns.as_str()])
            .build()
    }

    fn transport() -> Arc<MockTransport> {
        Arc::new(MockTransport::new(|d| {
            match d.path().last().map(String::as_str) {
                Some("000000000") => Ok(RawResponse::new(500, "upstream unavailable")),
                Some(duns) => Ok(RawResponse::json(200, &json!({"organization": {"duns": duns}}))),
                None => Ok(RawResponse::new(404, "")),
            }
        }))
    }

    fn items(duns: &[&str]) -> Vec<WorkItem<String>> {
        duns.iter().map(|d| WorkItem::new(*d, d.to_string())).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_does_not_affect_other_items() {
        let transport = transport();
        let mut batch = items(&["804735132", "000000000", "060704780"]);

        let settlements = dispatcher(transport.clone())
            .dispatch_all(&mut batch, by_duns)
            .await
            .unwrap();

        assert_eq!(transport.call_count(), 3);
        assert!(matches!(settlements[0], Settlement::Succeeded(_)));
        assert!(matches!(
            settlements[1],
            Settlement::Failed(ExecError::Status { status: 500, .. })
        ));
        assert!(matches!(settlements[2], Settlement::Succeeded(_)));

        assert_eq!(batch[0].status(), ItemStatus::Done { tier: None });
        assert_eq!(batch[1].status(), ItemStatus::Failed);
        assert_eq!(batch[2].result().unwrap()["organization"]["duns"], "060704780");
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_batch_makes_no_calls() {
        let transport = transport();
        let mut batch: Vec<WorkItem<String>> = Vec::new();

        let settlements = dispatcher(transport.clone())
            .dispatch_all(&mut batch, by_duns)
            .await
            .unwrap();

        assert!(settlements.is_empty());
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_settled_items_are_skipped() {
        let transport = transport();
        let dispatcher = dispatcher(transport.clone());
        let mut batch = items(&["804735132", "000000000"]);

        dispatcher.dispatch_all(&mut batch, by_duns).await.unwrap();
        let again = dispatcher.dispatch_all(&mut batch, by_duns).await.unwrap();

        assert_eq!(transport.call_count(), 2);
        assert_eq!(again, vec![Settlement::Skipped, Settlement::Skipped]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_descriptor_error_aborts_before_any_call() {
        let transport = transport();
        let mut batch = items(&["804735132", "bad"]);

        let result = dispatcher(transport.clone())
            .dispatch_all(&mut batch, |duns: &String| {
                if duns == "bad" {
                    Err(AppError::InvalidDescriptor("not a DUNS".into()))
                } else {
                    by_duns(duns)
                }
            })
            .await;

        assert!(matches!(result, Err(AppError::InvalidDescriptor(_))));
        assert_eq!(transport.call_count(), 0);
        assert!(batch.iter().all(|item| !item.is_terminal()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispatch_into_sink() {
        let transport = transport();
        let sink = MemorySink::new();
        let mut batch = items(&["804735132", "000000000"]);

        let summary = dispatcher(transport)
            .dispatch_into(&mut batch, by_duns, &sink)
            .await
            .unwrap();

        assert_eq!(
            summary,
            BatchSummary {
                succeeded: 1,
                failed: 1,
                skipped: 0,
                unsaved: 0
            }
        );
        let saved = sink.entries();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].0, "804735132");
    }
}
