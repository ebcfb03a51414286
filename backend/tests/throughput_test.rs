//! Integration tests for pacing and traversal through the public API
//!
//! Every test runs on a paused tokio clock with the in-memory transport, so
//! elapsed virtual time is exact.

use dpl_batch::error::AppError;
use dpl_batch::executor::{Executor, MockTransport, RawResponse};
use dpl_batch::limiter::{LimiterConfig, RateLimiter};
use dpl_batch::orchestrator::{BatchDispatcher, NodeStatus, Resolver, ResolverConfig, WorkItem};
use dpl_batch::request::{DescriptorBuilder, RequestDescriptor};
use serde_json::json;
use std::sync::Arc;
use tokio::time::{Duration, Instant};

fn by_duns(duns: &str) -> Result<RequestDescriptor, AppError> {
    DescriptorBuilder::new("https://plus.dnb.com")
        .segments(["v1", "data", "duns", duns])
        .build()
}

fn executor(transport: Arc<MockTransport>, rate: u32) -> Arc<Executor> {
    let limiter = RateLimiter::new(LimiterConfig::new(rate)).unwrap();
    Arc::new(Executor::new(limiter, transport))
}

/// Ten items at four per second: ten calls, the last one 2.25 s after the first
#[tokio::test(start_paused = true)]
async fn test_ten_items_at_four_per_second() {
    let transport = Arc::new(MockTransport::new(|_| Ok(RawResponse::new(200, "{}"))));
    let dispatcher = BatchDispatcher::new(executor(transport.clone(), 4));
    let mut items: Vec<WorkItem<String>> = (0..10)
        .map(|i| WorkItem::new(i.to_string(), format!("{:09}", i)))
        .collect();
    let start = Instant::now();

    dispatcher
        .dispatch_all(&mut items, |duns: &String| by_duns(duns))
        .await
        .unwrap();

    assert_eq!(transport.call_count(), 10);
    assert!(Instant::now() - start >= Duration::from_millis(2250));
    assert!(items.iter().all(|item| item.is_done()));

    let calls = transport.calls();
    for pair in calls.windows(2) {
        assert!(pair[1].at - pair[0].at >= Duration::from_millis(250));
    }
}

/// Two business principals, one without a DUNS: root, one leaf, one resolved node
#[tokio::test(start_paused = true)]
async fn test_root_with_two_business_principals() {
    let transport = Arc::new(MockTransport::new(|_| {
        Ok(RawResponse::json(
            200,
            &json!({"organization": {"duns": "200000002", "primaryName": "Beta", "currentPrincipals": []}}),
        ))
    }));
    let resolver = Resolver::new(
        executor(transport.clone(), 10),
        ResolverConfig::default(),
        by_duns,
    )
    .unwrap();

    let mut root = json!({"organization": {
        "duns": "100000001",
        "primaryName": "Alpha",
        "mostSeniorPrincipals": [
            {"fullName": "Beta", "subjectType": "Businesses",
             "idNumbers": [{"idNumber": "200000002", "idType": {"dnbCode": 3575}}]}
        ],
        "currentPrincipals": [
            {"fullName": "Gamma", "subjectType": "Businesses", "idNumbers": []}
        ]
    }});

    let aggregate = resolver.resolve(&mut root).await.unwrap();

    assert_eq!(aggregate.len(), 3);
    assert_eq!(aggregate.count(NodeStatus::Resolved), 2);
    assert_eq!(aggregate.count(NodeStatus::NoIdentifier), 1);
    assert_eq!(transport.call_count(), 1);
    assert!(root["organization"]["mostSeniorPrincipals"][0]["org"].is_object());
}
