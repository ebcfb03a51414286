//! Adaptive narrowing of search queries
//!
//! A fuzzy search term that finds nothing at full length often matches once
//! it is cut down. The controller runs every pending item through an ordered
//! list of narrowing steps; the first step that produces a candidate wins and
//! the item is left out of every later step.
//!
//! Steps run one pass at a time over the whole batch, so each item sees its
//! eligible tiers in strictly descending order and never the same tier twice.
//! A step whose narrowed value equals the one the item last submitted is
//! skipped for that item.

use crate::error::AppError;
use crate::executor::{ExecError, Executor, Payload};
use crate::orchestrator::constants::DEFAULT_NARROWING_TIERS;
use crate::orchestrator::dpl_types::{candidate_count, remote_error};
use crate::orchestrator::work_item::{ItemStatus, WorkItem};
use crate::request::RequestDescriptor;
use futures_util::future::join_all;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Criteria with one field that can be narrowed
pub trait Narrowable {
    /// The field narrowing operates on
    fn narrowable_field(&self) -> &str;
}

/// One pass of the narrowing plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NarrowingStep {
    /// Cut the field to this many characters; applies to longer fields only
    Truncate(usize),
    /// Submit the field unchanged; applies to fields of at most this length
    ShortOnly(usize),
}

impl NarrowingStep {
    /// Tier number recorded on attempts made by this step
    pub fn tier(&self) -> usize {
        match self {
            NarrowingStep::Truncate(len) | NarrowingStep::ShortOnly(len) => *len,
        }
    }

    /// Whether a field of `len` characters is tried in this step
    pub fn applies_to(&self, len: usize) -> bool {
        if len == 0 {
            return false;
        }
        match self {
            NarrowingStep::Truncate(tier) => len > *tier,
            NarrowingStep::ShortOnly(max) => len <= *max,
        }
    }

    /// The value submitted for `field` in this step
    pub fn narrow(&self, field: &str) -> String {
        match self {
            NarrowingStep::Truncate(tier) => {
                let cut: String = field.chars().take(*tier).collect();
                cut.trim_end().to_string()
            }
            NarrowingStep::ShortOnly(_) => field.to_string(),
        }
    }
}

/// Ordered, validated list of narrowing steps
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NarrowingPlan {
    steps: Vec<NarrowingStep>,
}

impl NarrowingPlan {
    /// Validate a list of steps
    ///
    /// # Errors
    /// * `AppError::InvalidConfig` if the list is empty, a tier is zero,
    ///   truncation tiers are not strictly descending, a `ShortOnly` step is
    ///   not the last one, or it does not sit exactly at the last truncation
    ///   tier.
    pub fn new(steps: Vec<NarrowingStep>) -> Result<Self, AppError> {
        if steps.is_empty() {
            return Err(AppError::InvalidConfig(
                "narrowing plan needs at least one step".into(),
            ));
        }

        let mut previous: Option<usize> = None;
        for (idx, step) in steps.iter().enumerate() {
            if step.tier() == 0 {
                return Err(AppError::InvalidConfig("narrowing tiers must be > 0".into()));
            }
            match step {
                NarrowingStep::Truncate(tier) => {
                    if previous.is_some_and(|p| *tier >= p) {
                        return Err(AppError::InvalidConfig(format!(
                            "narrowing tiers must be strictly descending, {} follows {}",
                            tier,
                            previous.unwrap_or_default()
                        )));
                    }
                    previous = Some(*tier);
                }
                NarrowingStep::ShortOnly(max) => {
                    if idx != steps.len() - 1 {
                        return Err(AppError::InvalidConfig(
                            "the short-field pass must be the last narrowing step".into(),
                        ));
                    }
                    // Truncate(t) covers len > t; the short pass must cover the rest
                    if previous.is_some_and(|p| *max != p) {
                        return Err(AppError::InvalidConfig(format!(
                            "short-field pass ({}) must match the last truncation tier ({})",
                            max,
                            previous.unwrap_or_default()
                        )));
                    }
                }
            }
        }

        Ok(Self { steps })
    }

    /// Truncation passes for `tiers`, followed by a short-field pass at the
    /// smallest tier
    pub fn from_tiers(tiers: &[usize]) -> Result<Self, AppError> {
        let mut steps: Vec<NarrowingStep> =
            tiers.iter().copied().map(NarrowingStep::Truncate).collect();
        if let Some(last) = tiers.last() {
            steps.push(NarrowingStep::ShortOnly(*last));
        }
        Self::new(steps)
    }

    /// The steps, in execution order
    pub fn steps(&self) -> &[NarrowingStep] {
        &self.steps
    }

    /// Tiers a field of `len` characters will be tried at, in order
    pub fn eligible_tiers(&self, len: usize) -> Vec<usize> {
        self.steps
            .iter()
            .filter(|s| s.applies_to(len))
            .map(NarrowingStep::tier)
            .collect()
    }
}

impl Default for NarrowingPlan {
    fn default() -> Self {
        let mut steps: Vec<NarrowingStep> = DEFAULT_NARROWING_TIERS
            .iter()
            .copied()
            .map(NarrowingStep::Truncate)
            .collect();
        steps.push(NarrowingStep::ShortOnly(3));
        Self { steps }
    }
}

/// Counts after a narrowing run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NarrowingSummary {
    /// Items settled as `Done`, by tier
    pub done_by_tier: BTreeMap<usize, usize>,
    /// Items settled as `Exhausted`
    pub exhausted: usize,
    /// Items settled as `Failed` (authorization or cancellation)
    pub failed: usize,
    /// Items that were already settled and got no request
    pub skipped: usize,
    /// Requests issued
    pub requests: usize,
}

impl NarrowingSummary {
    /// Items settled as `Done`
    pub fn done(&self) -> usize {
        self.done_by_tier.values().sum()
    }
}

enum Outcome {
    Matched,
    NoMatch(String),
}

/// Runs work items through a [`NarrowingPlan`]
pub struct NarrowingController {
    executor: Arc<Executor>,
    plan: NarrowingPlan,
    candidates_field: String,
}

impl NarrowingController {
    /// Create a controller; `candidates_field` names the candidate list in
    /// the response document (e.g. `searchCandidates`)
    pub fn new(
        executor: Arc<Executor>,
        plan: NarrowingPlan,
        candidates_field: impl Into<String>,
    ) -> Self {
        Self {
            executor,
            plan,
            candidates_field: candidates_field.into(),
        }
    }

    /// The plan in use
    pub fn plan(&self) -> &NarrowingPlan {
        &self.plan
    }

    /// Narrow every pending item until it matches or runs out of tiers
    ///
    /// `map` builds the request for an item given the narrowed field value.
    /// Items that are already settled are left alone and cost no request.
    ///
    /// # Errors
    /// * Any error from `map`; descriptors for a pass are built before the
    ///   pass issues its first request.
    pub async fn run<C, F>(
        &self,
        items: &mut [WorkItem<C>],
        map: F,
    ) -> Result<NarrowingSummary, AppError>
    where
        C: Narrowable,
        F: Fn(&C, &str) -> Result<RequestDescriptor, AppError>,
    {
        let settled_before: Vec<bool> = items.iter().map(WorkItem::is_terminal).collect();
        let mut summary = NarrowingSummary {
            skipped: settled_before.iter().filter(|s| **s).count(),
            ..Default::default()
        };

        let mut last_submitted: Vec<Option<String>> = vec![None; items.len()];

        for step in self.plan.steps() {
            let mut pass = Vec::new();
            for (item, last) in items.iter_mut().zip(last_submitted.iter_mut()) {
                if item.is_terminal() {
                    continue;
                }
                let field = item.criteria().narrowable_field().trim();
                if !step.applies_to(field.chars().count()) {
                    continue;
                }
                let narrowed = step.narrow(field);
                if last.as_deref() == Some(narrowed.as_str()) {
                    debug!(key = %item.key(), tier = step.tier(), term = %narrowed, "Same query as previous tier, skipping");
                    continue;
                }
                let descriptor = map(item.criteria(), &narrowed)?;
                *last = Some(narrowed.clone());
                pass.push((item, narrowed, descriptor));
            }

            if pass.is_empty() {
                continue;
            }

            info!(tier = step.tier(), items = pass.len(), "Starting narrowing pass");
            summary.requests += pass.len();

            join_all(pass.into_iter().map(|(item, narrowed, descriptor)| async move {
                debug!(key = %item.key(), tier = step.tier(), term = %narrowed, "Submitting narrowed query");
                let outcome = self.executor.execute(&descriptor).await;
                self.settle(item, *step, outcome);
            }))
            .await;
        }

        for item in items.iter_mut().filter(|item| !item.is_terminal()) {
            item.mark_exhausted();
        }

        for (item, _) in items.iter().zip(&settled_before).filter(|(_, before)| !**before) {
            match item.status() {
                ItemStatus::Done { tier } => {
                    *summary.done_by_tier.entry(tier.unwrap_or(0)).or_default() += 1;
                }
                ItemStatus::Exhausted => summary.exhausted += 1,
                ItemStatus::Failed => summary.failed += 1,
                ItemStatus::Pending => {}
            }
        }

        info!(
            done = summary.done(),
            exhausted = summary.exhausted,
            failed = summary.failed,
            requests = summary.requests,
            "Narrowing finished"
        );

        Ok(summary)
    }

    fn settle<C>(&self, item: &mut WorkItem<C>, step: NarrowingStep, outcome: Result<Payload, ExecError>) {
        let tier = Some(step.tier());
        match outcome {
            Ok(payload) => match self.classify(&payload) {
                Outcome::Matched => {
                    debug!(key = %item.key(), tier = step.tier(), "Narrowed query matched");
                    item.record_success(tier, &payload);
                }
                Outcome::NoMatch(reason) => {
                    debug!(key = %item.key(), tier = step.tier(), reason = %reason, "No match at tier");
                    item.record_no_match(tier, &payload, reason);
                }
            },
            Err(error @ (ExecError::Auth { .. } | ExecError::Cancelled(_))) => {
                warn!(key = %item.key(), tier = step.tier(), error = %error, "Giving up on item");
                item.record_failure(tier, error);
                item.mark_failed();
            }
            Err(error) => {
                debug!(key = %item.key(), tier = step.tier(), error = %error, "Attempt failed, moving to next tier");
                item.record_failure(tier, error);
            }
        }
    }

    fn classify(&self, payload: &Payload) -> Outcome {
        let Some(doc) = payload.document() else {
            return Outcome::NoMatch("response is not a JSON document".into());
        };
        if let Some(message) = remote_error(doc) {
            return Outcome::NoMatch(message);
        }
        if candidate_count(doc, &self.candidates_field) == 0 {
            return Outcome::NoMatch(format!("no {}", self.candidates_field));
        }
        Outcome::Matched
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{MockTransport, RawResponse};
    use crate::limiter::{LimiterConfig, RateLimiter};
    use crate::orchestrator::work_item::ItemError;
    use crate::request::DescriptorBuilder;
    use serde_json::json;
    use tokio::time::Duration;

    #[test]
    fn test_step_eligibility() {
        let step = NarrowingStep::Truncate(10);
        assert!(step.applies_to(12));
        assert!(!step.applies_to(10));
        assert_eq!(step.narrow("Gorman Manufacturing"), "Gorman Man");

        let step = NarrowingStep::Truncate(7);
        assert_eq!(step.narrow("Gorman Manufacturing"), "Gorman");

        let short = NarrowingStep::ShortOnly(3);
        assert!(short.applies_to(3));
        assert!(!short.applies_to(4));
        assert!(!short.applies_to(0));
        assert_eq!(short.narrow("IBM"), "IBM");
    }

    #[test]
    fn test_truncation_counts_characters() {
        assert_eq!(NarrowingStep::Truncate(3).narrow("Zürich AG"), "Zür");
    }

    #[test]
    fn test_default_plan_tiers() {
        let plan = NarrowingPlan::default();
        assert_eq!(plan, NarrowingPlan::from_tiers(&[30, 20, 15, 10, 6, 3]).unwrap());
        assert_eq!(plan.eligible_tiers(12), vec![10, 6, 3]);
        assert_eq!(plan.eligible_tiers(31), vec![30, 20, 15, 10, 6, 3]);
        assert_eq!(plan.eligible_tiers(3), vec![3]);
        assert_eq!(plan.eligible_tiers(4), vec![3]);
        assert!(plan.eligible_tiers(0).is_empty());
    }

    #[test]
    fn test_plan_validation() {
        assert!(NarrowingPlan::new(vec![]).is_err());
        assert!(NarrowingPlan::from_tiers(&[10, 20]).is_err());
        assert!(NarrowingPlan::from_tiers(&[10, 10]).is_err());
        assert!(NarrowingPlan::from_tiers(&[10, 0]).is_err());
        assert!(NarrowingPlan::new(vec![
            NarrowingStep::ShortOnly(3),
            NarrowingStep::Truncate(2)
        ])
        .is_err());
        assert!(NarrowingPlan::new(vec![
            NarrowingStep::Truncate(5),
            NarrowingStep::ShortOnly(8)
        ])
        .is_err());
        assert!(NarrowingPlan::new(vec![
            NarrowingStep::Truncate(5),
            NarrowingStep::ShortOnly(3)
        ])
        .is_err());
        assert!(NarrowingPlan::new(vec![
            NarrowingStep::Truncate(5),
            NarrowingStep::ShortOnly(5)
        ])
        .is_ok());
        assert!(NarrowingPlan::new(vec![NarrowingStep::Truncate(5)]).is_ok());
        assert!(NarrowingPlan::new(vec![NarrowingStep::ShortOnly(3)]).is_ok());
    }

    struct Term(&'static str);

    impl Narrowable for Term {
        fn narrowable_field(&self) -> &str {
            self.0
        }
    }

    fn search(_: &Term, narrowed: &str) -> Result<RequestDescriptor, AppError> {
        DescriptorBuilder::new("https://plus.dnb.com")
            .segments(["v1", "search", "typeahead"])
            .query("searchTerm", narrowed)
            .build()
    }

    fn with_transport(transport: MockTransport) -> (NarrowingController, Arc<MockTransport>) {
        let transport = Arc::new(transport);
        let limiter = RateLimiter::new(LimiterConfig::new(50)).unwrap();
        let executor = Arc::new(
            Executor::new(limiter, transport.clone()).with_timeout(Duration::from_secs(1)),
        );
        let controller =
            NarrowingController::new(executor, NarrowingPlan::default(), "searchCandidates");
        (controller, transport)
    }

    /// Answers by the submitted term
    fn scripted<F>(respond: F) -> (NarrowingController, Arc<MockTransport>)
    where
        F: Fn(&str) -> Result<RawResponse, ExecError> + Send + Sync + 'static,
    {
        with_transport(MockTransport::new(move |d| {
            let term = d.query().get("searchTerm").cloned().unwrap_or_default();
            respond(&term)
        }))
    }

    fn candidates(term: &str) -> Result<RawResponse, ExecError> {
        Ok(RawResponse::json(
            200,
            &json!({"searchCandidates": [{"organization": {"primaryName": term}}]}),
        ))
    }

    fn no_candidates() -> Result<RawResponse, ExecError> {
        Ok(RawResponse::json(200, &json!({"searchCandidates": []})))
    }

    /// Matches only terms of at most `max_len` characters
    fn controller(max_len: usize) -> (NarrowingController, Arc<MockTransport>) {
        scripted(move |term| {
            if term == "401" {
                return Ok(RawResponse::new(401, "token expired"));
            }
            if term.chars().count() <= max_len {
                candidates(term)
            } else {
                no_candidates()
            }
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_twelve_characters_match_at_tier_three() {
        let (controller, transport) = controller(3);
        let mut items = vec![WorkItem::new("ref-1", Term("Acme Widgets"))];

        let summary = controller.run(&mut items, search).await.unwrap();

        assert_eq!(items[0].status(), ItemStatus::Done { tier: Some(3) });
        let tiers: Vec<_> = items[0].attempts().iter().map(|a| a.tier).collect();
        assert_eq!(tiers, vec![Some(10), Some(6), Some(3)]);
        assert_eq!(transport.call_count(), 3);
        assert_eq!(summary.done_by_tier.get(&3), Some(&1));
        assert_eq!(summary.requests, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_done_items_leave_later_tiers() {
        let (controller, transport) = controller(20);
        let mut items = vec![
            WorkItem::new("long", Term("Koninklijke Nederlandse Petroleum")),
            WorkItem::new("short", Term("ING")),
            WorkItem::new("empty", Term("   ")),
        ];

        let summary = controller.run(&mut items, search).await.unwrap();

        // long: 30 misses, 20 matches; short: only the short-field pass
        assert_eq!(items[0].status(), ItemStatus::Done { tier: Some(20) });
        assert_eq!(items[0].attempts().len(), 2);
        assert_eq!(items[1].status(), ItemStatus::Done { tier: Some(3) });
        assert_eq!(items[1].attempts().len(), 1);
        assert_eq!(items[2].status(), ItemStatus::Exhausted);
        assert!(items[2].attempts().is_empty());
        assert_eq!(transport.call_count(), 3);
        assert_eq!(summary.done(), 2);
        assert_eq!(summary.exhausted, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_match_everywhere_exhausts_with_last_error() {
        let (controller, _) = controller(0);
        let mut items = vec![WorkItem::new("ref-1", Term("Gorman Mfg"))];

        controller.run(&mut items, search).await.unwrap();

        assert_eq!(items[0].status(), ItemStatus::Exhausted);
        assert_eq!(items[0].attempts().len(), 2);
        assert_eq!(items[0].error().unwrap().kind(), "no_match");
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_run_makes_no_calls() {
        let (controller, transport) = controller(6);
        let mut items = vec![
            WorkItem::new("a", Term("Acme Widgets")),
            WorkItem::new("b", Term("Gorman Manufacturing Company")),
        ];

        controller.run(&mut items, search).await.unwrap();
        let calls = transport.call_count();
        let summary = controller.run(&mut items, search).await.unwrap();

        assert_eq!(transport.call_count(), calls);
        assert_eq!(summary.skipped, 2);
        assert_eq!(summary.requests, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_auth_failure_stops_the_item() {
        let (controller, transport) = controller(3);
        let mut items = vec![WorkItem::new("ref-1", Term("401"))];

        let summary = controller.run(&mut items, search).await.unwrap();

        assert_eq!(items[0].status(), ItemStatus::Failed);
        assert_eq!(items[0].error().unwrap().kind(), "auth");
        assert_eq!(transport.call_count(), 1);
        assert_eq!(summary.failed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_identical_narrowed_query_is_sent_once() {
        let (controller, transport) = controller(0);
        let mut items = vec![WorkItem::new("ref-1", Term("ABC       Holdings"))];

        let summary = controller.run(&mut items, search).await.unwrap();

        let terms: Vec<String> = transport
            .calls()
            .iter()
            .map(|c| c.url.rsplit('=').next().unwrap_or_default().to_string())
            .collect();
        assert_eq!(terms, vec!["ABC+++++++Holdi", "ABC"]);
        let tiers: Vec<_> = items[0].attempts().iter().map(|a| a.tier).collect();
        assert_eq!(tiers, vec![Some(15), Some(10)]);
        assert_eq!(items[0].status(), ItemStatus::Exhausted);
        assert_eq!(summary.requests, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_and_transport_errors_advance_tiers() {
        let (controller, _) = scripted(|term| match term.chars().count() {
            10 => Ok(RawResponse::new(404, r#"{"error": {"errorCode": "20502"}}"#)),
            6 => Err(ExecError::Transport("connection reset".into())),
            _ => candidates(term),
        });
        let mut items = vec![WorkItem::new("ref-1", Term("Acme Widgets"))];

        controller.run(&mut items, search).await.unwrap();

        assert_eq!(items[0].status(), ItemStatus::Done { tier: Some(3) });
        let statuses: Vec<_> = items[0].attempts().iter().map(|a| a.status).collect();
        assert_eq!(statuses, vec![Some(404), None, Some(200)]);
        assert_eq!(items[0].attempts()[0].payload.as_ref().unwrap()["error"]["errorCode"], "20502");
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeouts_are_recorded_and_advance() {
        let (controller, transport) = with_transport(
            MockTransport::new(|_| no_candidates()).with_latency(Duration::from_secs(5)),
        );
        let mut items = vec![WorkItem::new("ref-1", Term("Acme Widgets"))];

        controller.run(&mut items, search).await.unwrap();

        assert_eq!(transport.call_count(), 3);
        assert_eq!(items[0].attempts().len(), 3);
        assert_eq!(items[0].status(), ItemStatus::Exhausted);
        assert_eq!(items[0].error().unwrap().kind(), "timeout");
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_document_counts_as_no_match() {
        let (controller, _) = scripted(|term| {
            if term.chars().count() == 3 {
                Ok(RawResponse::json(
                    200,
                    &json!({
                        "error": {"errorCode": "10001", "errorMessage": "No match found"},
                        "searchCandidates": [{"organization": {"primaryName": term}}]
                    }),
                ))
            } else {
                no_candidates()
            }
        });
        let mut items = vec![WorkItem::new("ref-1", Term("Gorman Mfg"))];

        controller.run(&mut items, search).await.unwrap();

        assert_eq!(items[0].status(), ItemStatus::Exhausted);
        let last = items[0].attempts().last().unwrap().clone();
        assert_eq!(last.tier, Some(3));
        assert_eq!(last.status, Some(200));
        assert_eq!(
            items[0].error(),
            Some(&ItemError::NoMatch("No match found (10001)".into()))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_item_keeps_last_transport_error() {
        let (controller, _) = scripted(|term| {
            if term.chars().count() == 3 {
                Err(ExecError::Transport("connection reset".into()))
            } else {
                no_candidates()
            }
        });
        let mut items = vec![WorkItem::new("ref-1", Term("Gorman Mfg"))];

        let summary = controller.run(&mut items, search).await.unwrap();

        assert_eq!(items[0].status(), ItemStatus::Exhausted);
        assert_eq!(items[0].attempts().len(), 2);
        assert_eq!(
            items[0].error(),
            Some(&ItemError::Exec(ExecError::Transport("connection reset".into())))
        );
        assert_eq!(summary.exhausted, 1);
    }
}
