//! Recursive resolution of business principals
//!
//! An organization's principals can themselves be organizations. Starting from
//! a root document, every business principal with a DUNS is fetched, its own
//! principals are resolved the same way, and the result is attached to the
//! principal entry under `org`. Siblings are resolved concurrently; the shared
//! rate limiter is the only throttle.
//!
//! Ownership structures are often circular. With the default
//! [`RevisitPolicy::Suppress`] each DUNS is fetched at most once per run, which
//! guarantees termination. [`RevisitPolicy::Allow`] requires a depth limit.

use crate::error::AppError;
use crate::executor::Executor;
use crate::orchestrator::constants::UNNAMED_PRINCIPAL;
use crate::orchestrator::dpl_types::{
    business_principal_duns, organization, organization_duns, organization_label, remote_error,
    PrincipalRef,
};
use crate::request::RequestDescriptor;
use futures_util::future::{join_all, BoxFuture};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, warn};

const PRINCIPAL_LISTS: [&str; 2] = ["mostSeniorPrincipals", "currentPrincipals"];

type DescriptorFn = dyn Fn(&str) -> Result<RequestDescriptor, AppError> + Send + Sync;

/// What happened to one node of the tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    /// Not fetched because the depth limit was reached
    Unresolved,
    /// Fetched and recursed into
    Resolved,
    /// The principal is a person
    NotABusiness,
    /// A business principal without a DUNS
    NoIdentifier,
    /// The fetch failed or returned no organization
    Error,
    /// The DUNS was already resolved elsewhere in this run
    AlreadyVisited,
}

/// One row of the resolution outcome
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolutionRecord {
    /// DUNS of the node, if known
    pub key: Option<String>,
    /// DUNS of the organization this node is a principal of
    pub parent: Option<String>,
    /// Display name
    pub label: String,
    /// Outcome
    pub status: NodeStatus,
    /// Human-readable detail
    pub detail: String,
    /// Distance from the root (the root is 0)
    pub depth: usize,
    /// DUNS of the business principals found under this node
    pub children: Vec<String>,
}

/// Every record produced by one resolution, root first, then depth-first
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResultAggregate {
    records: Vec<ResolutionRecord>,
}

impl ResultAggregate {
    /// All records in order
    pub fn records(&self) -> &[ResolutionRecord] {
        &self.records
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether there are no records
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of records with the given status
    pub fn count(&self, status: NodeStatus) -> usize {
        self.records.iter().filter(|r| r.status == status).count()
    }

    /// Records for the given DUNS
    pub fn find<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a ResolutionRecord> {
        self.records
            .iter()
            .filter(move |r| r.key.as_deref() == Some(key))
    }

    /// Consume the aggregate
    pub fn into_records(self) -> Vec<ResolutionRecord> {
        self.records
    }
}

/// How to treat a DUNS seen more than once
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevisitPolicy {
    /// Fetch each DUNS once; later sightings become `AlreadyVisited`
    #[default]
    Suppress,
    /// Fetch every sighting; needs a depth limit
    Allow,
}

impl std::str::FromStr for RevisitPolicy {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "suppress" => Ok(RevisitPolicy::Suppress),
            "allow" => Ok(RevisitPolicy::Allow),
            other => Err(AppError::InvalidConfig(format!(
                "unknown revisit policy '{}', expected 'suppress' or 'allow'",
                other
            ))),
        }
    }
}

/// Resolver settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResolverConfig {
    /// Revisit policy
    pub revisit: RevisitPolicy,
    /// Deepest level that is still fetched (root principals are level 1)
    pub max_depth: Option<usize>,
}

impl ResolverConfig {
    /// Validate the settings
    pub fn validate(&self) -> Result<(), AppError> {
        if self.revisit == RevisitPolicy::Allow && self.max_depth.is_none() {
            return Err(AppError::InvalidConfig(
                "revisiting identifiers requires a maximum depth".into(),
            ));
        }
        if self.max_depth == Some(0) {
            return Err(AppError::InvalidConfig("maximum depth must be > 0".into()));
        }
        Ok(())
    }
}

/// Walks principal trees
pub struct Resolver {
    executor: Arc<Executor>,
    config: ResolverConfig,
    descriptor_for: Box<DescriptorFn>,
}

impl Resolver {
    /// Create a resolver; `descriptor_for` builds the fetch for a DUNS
    ///
    /// # Errors
    /// * `AppError::InvalidConfig` if the config does not validate
    pub fn new<F>(
        executor: Arc<Executor>,
        config: ResolverConfig,
        descriptor_for: F,
    ) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Result<RequestDescriptor, AppError> + Send + Sync + 'static,
    {
        config.validate()?;
        Ok(Self {
            executor,
            config,
            descriptor_for: Box::new(descriptor_for),
        })
    }

    /// Settings in use
    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Resolve the principals of `root` in place
    ///
    /// `root` is a data blocks response; its `organization` is enriched with
    /// the resolved principal trees.
    ///
    /// # Returns
    /// One record for the root, then one per principal encountered, depth-first
    ///
    /// # Errors
    /// * `AppError::Input` if `root` has no `organization`
    /// * Any error from the descriptor function; fetch failures are recorded
    ///   as `Error` nodes instead
    pub async fn resolve(&self, root: &mut Value) -> Result<ResultAggregate, AppError> {
        let org = root
            .get_mut("organization")
            .filter(|org| org.is_object())
            .ok_or_else(|| AppError::Input("document has no organization".into()))?;

        let root_key = organization_duns(org).map(str::to_string);
        let visited = Mutex::new(HashSet::new());
        if let Some(key) = &root_key {
            visited
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(key.clone());
        }

        let label = organization_label(org);
        info!(duns = root_key.as_deref().unwrap_or_default(), label = %label, "Resolving principals");

        let mut records = vec![ResolutionRecord {
            key: root_key.clone(),
            parent: None,
            label,
            status: NodeStatus::Resolved,
            detail: "Root organization".to_string(),
            depth: 0,
            children: business_principal_duns(org),
        }];
        records.extend(self.resolve_principals(org, root_key, 1, &visited).await?);

        let aggregate = ResultAggregate { records };
        info!(
            records = aggregate.len(),
            resolved = aggregate.count(NodeStatus::Resolved),
            errors = aggregate.count(NodeStatus::Error),
            "Principal resolution finished"
        );
        Ok(aggregate)
    }

    fn resolve_principals<'a>(
        &'a self,
        org: &'a mut Value,
        parent: Option<String>,
        depth: usize,
        visited: &'a Mutex<HashSet<String>>,
    ) -> BoxFuture<'a, Result<Vec<ResolutionRecord>, AppError>> {
        Box::pin(async move {
            let mut lists: Vec<(&str, Vec<Value>)> = PRINCIPAL_LISTS
                .iter()
                .filter_map(|field| take_array(org, field).map(|list| (*field, list)))
                .collect();

            let results = join_all(
                lists
                    .iter_mut()
                    .flat_map(|(_, list)| list.iter_mut())
                    .map(|principal| {
                        self.resolve_principal(principal, parent.as_deref(), depth, visited)
                    }),
            )
            .await;

            for (field, list) in lists {
                if let Some(obj) = org.as_object_mut() {
                    obj.insert(field.to_string(), Value::Array(list));
                }
            }

            let mut records = Vec::new();
            for result in results {
                records.extend(result?);
            }
            Ok(records)
        })
    }

    async fn resolve_principal(
        &self,
        principal: &mut Value,
        parent: Option<&str>,
        depth: usize,
        visited: &Mutex<HashSet<String>>,
    ) -> Result<Vec<ResolutionRecord>, AppError> {
        let info = PrincipalRef::from_value(principal);
        let record = |key: Option<&str>, status: NodeStatus, detail: String| ResolutionRecord {
            key: key.map(str::to_string),
            parent: parent.map(str::to_string),
            label: info
                .full_name
                .clone()
                .unwrap_or_else(|| UNNAMED_PRINCIPAL.to_string()),
            status,
            detail,
            depth,
            children: Vec::new(),
        };

        if !info.is_business() {
            return Ok(vec![record(None, NodeStatus::NotABusiness, "Not a business".into())]);
        }

        let Some(duns) = info.duns() else {
            return Ok(vec![record(
                None,
                NodeStatus::NoIdentifier,
                "No DUNS available for this business".into(),
            )]);
        };

        if let Some(max) = self.config.max_depth.filter(|max| depth > *max) {
            return Ok(vec![record(
                Some(duns),
                NodeStatus::Unresolved,
                format!("Maximum depth {} reached", max),
            )]);
        }

        if self.config.revisit == RevisitPolicy::Suppress {
            let first_visit = visited
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(duns.to_string());
            if !first_visit {
                debug!(duns = %duns, depth, "DUNS already resolved, skipping");
                return Ok(vec![record(
                    Some(duns),
                    NodeStatus::AlreadyVisited,
                    format!("DUNS {} already resolved in this run", duns),
                )]);
            }
        }

        let descriptor = (self.descriptor_for)(duns)?;
        let mut doc = match self.executor.execute(&descriptor).await {
            Ok(payload) => payload.into_value(),
            Err(e) => {
                warn!(duns = %duns, depth, error = %e, "Failed to fetch principal");
                return Ok(vec![record(Some(duns), NodeStatus::Error, e.to_string())]);
            }
        };

        if organization(&doc).is_none() {
            let detail = remote_error(&doc)
                .unwrap_or_else(|| "Response contains no organization".to_string());
            warn!(duns = %duns, depth, detail = %detail, "No organization for principal");
            return Ok(vec![record(Some(duns), NodeStatus::Error, detail)]);
        }
        let mut child = doc
            .get_mut("organization")
            .map(std::mem::take)
            .unwrap_or_default();

        let children = business_principal_duns(&child);
        let subtree = self
            .resolve_principals(&mut child, Some(duns.to_string()), depth + 1, visited)
            .await?;

        if let Some(obj) = principal.as_object_mut() {
            obj.insert("org".to_string(), principal_subset(&mut child));
        }

        let mut node = record(
            Some(duns),
            NodeStatus::Resolved,
            format!("Recursive request for DUNS {}", duns),
        );
        node.children = children;

        let mut records = Vec::with_capacity(subtree.len() + 1);
        records.push(node);
        records.extend(subtree);
        Ok(records)
    }
}

fn take_array(org: &mut Value, field: &str) -> Option<Vec<Value>> {
    match org.get_mut(field) {
        Some(Value::Array(list)) => Some(std::mem::take(list)),
        _ => None,
    }
}

/// The part of a fetched organization that is attached to its principal entry
fn principal_subset(org: &mut Value) -> Value {
    let mut take = |field: &str| {
        org.get_mut(field)
            .map(std::mem::take)
            .unwrap_or(Value::Null)
    };
    json!({
        "principalsSummary": take("principalsSummary"),
        "mostSeniorPrincipals": take("mostSeniorPrincipals"),
        "currentPrincipals": take("currentPrincipals"),
    })
}
