//! Principal trees for a list of DUNS
//!
//! Every root is fetched with the company, principals and hierarchy blocks,
//! then its business principals are resolved recursively. The enriched root
//! document and the flat resolution records are written side by side.

use crate::error::AppError;
use crate::io::{pad_duns, read_duns_file, JsonFileSink, OutputSink};
use crate::jobs::{JobContext, JobReport};
use crate::orchestrator::constants::PRINCIPALS_BLOCK;
use crate::orchestrator::dpl_types::{organization, organization_label};
use crate::orchestrator::{BatchDispatcher, Resolver, WorkItem};
use crate::request::EndpointKind;
use futures_util::future::join_all;
use serde_json::Value;
use tracing::{error, info, warn};

/// Input file under the input directory
pub const INPUT_FILE: &str = "DUNS.txt";
/// File name prefix of the enriched documents
pub const OUTPUT_PREFIX: &str = "dnb_dpl_nat_pers_principals_";
/// File name prefix of the resolution records
pub const RECORDS_PREFIX: &str = "dnb_dpl_principals_tree_";
/// Data blocks requested for every root
pub const ROOT_BLOCK_IDS: &str =
    "companyinfo_L2_v1,principalscontacts_L3_v1,hierarchyconnections_L1_v1";

enum RootOutcome {
    Written { unsaved: bool },
    Failed,
}

/// Resolve the principal tree of `duns`, or of every DUNS in the input file
pub async fn run(ctx: &JobContext, duns: Option<&str>) -> Result<JobReport, AppError> {
    let duns = match duns.filter(|d| !d.trim().is_empty()) {
        Some(duns) => {
            info!(duns = %duns, "Getting principals for a single DUNS");
            vec![pad_duns(duns)]
        }
        None => read_duns_file(ctx.input_dir.join(INPUT_FILE)).await?,
    };
    if duns.is_empty() {
        warn!("No valid DUNS available");
        return Ok(JobReport::default());
    }

    let mut roots: Vec<WorkItem<String>> =
        duns.into_iter().map(|d| WorkItem::new(d.clone(), d)).collect();
    BatchDispatcher::new(ctx.executor.clone())
        .dispatch_all(&mut roots, |duns: &String| {
            ctx.requests.build(
                EndpointKind::DataBlocks,
                &[duns.as_str()],
                &[("blockIDs", ROOT_BLOCK_IDS)],
            )
        })
        .await?;

    let requests = ctx.requests.clone();
    let resolver = Resolver::new(
        ctx.executor.clone(),
        ctx.orchestrator.resolver.clone(),
        move |duns| {
            requests.build(
                EndpointKind::DataBlocks,
                &[duns],
                &[("blockIDs", PRINCIPALS_BLOCK)],
            )
        },
    )?;
    let documents = JsonFileSink::new(&ctx.output_dir, OUTPUT_PREFIX);
    let records = JsonFileSink::new(&ctx.output_dir, RECORDS_PREFIX);

    let (resolver, documents, records) = (&resolver, &documents, &records);
    let outcomes = join_all(roots.iter().map(|root| async move {
        match root.result() {
            Some(doc) => resolve_root(resolver, root.key(), doc.clone(), documents, records).await,
            None => {
                warn!(duns = %root.key(), error = ?root.error().map(ToString::to_string), "Root request failed");
                Ok(RootOutcome::Failed)
            }
        }
    }))
    .await;

    let mut report = JobReport {
        items: roots.len(),
        ..Default::default()
    };
    for outcome in outcomes {
        match outcome? {
            RootOutcome::Written { unsaved } => {
                report.succeeded += 1;
                if unsaved {
                    report.unsaved += 1;
                }
            }
            RootOutcome::Failed => report.failed += 1,
        }
    }
    Ok(report)
}

async fn resolve_root(
    resolver: &Resolver,
    duns: &str,
    mut doc: Value,
    documents: &dyn OutputSink,
    records: &dyn OutputSink,
) -> Result<RootOutcome, AppError> {
    let aggregate = match resolver.resolve(&mut doc).await {
        Ok(aggregate) => aggregate,
        Err(AppError::Input(reason)) => {
            warn!(duns = %duns, reason = %reason, "Cannot resolve principals");
            return Ok(RootOutcome::Failed);
        }
        Err(e) => return Err(e),
    };

    let label = organization(&doc)
        .map(organization_label)
        .unwrap_or_else(|| duns.to_string());
    info!("Finished processing: {}", label);

    let records_value = serde_json::to_value(&aggregate)
        .map_err(|e| AppError::Output(format!("Failed to serialize records for {}: {}", duns, e)))?;

    let mut unsaved = false;
    for (sink, value) in [(documents, &doc), (records, &records_value)] {
        if let Err(e) = sink.accept(duns, value).await {
            error!(duns = %duns, error = %e, "Failed to save result");
            unsaved = true;
        }
    }
    Ok(RootOutcome::Written { unsaved })
}
