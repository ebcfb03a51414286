//! LEI lookup for a list of DUNS
//!
//! Two dependent batches: the D&B company block (traded up to the
//! headquarters) yields the Dutch Chamber of Commerce number, which is then
//! looked up in the GLEIF register.

use crate::error::AppError;
use crate::io::{read_duns_file, JsonFileSink, OutputSink};
use crate::jobs::{JobContext, JobReport};
use crate::orchestrator::constants::KVK_REGISTRATION_TYPE_CODE;
use crate::orchestrator::dpl_types::{first_lei, organization, registration_number};
use crate::orchestrator::{BatchDispatcher, WorkItem};
use crate::request::EndpointKind;
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, error, info, warn};

/// Input file under the input directory
pub const INPUT_FILE: &str = "DUNS.txt";
/// File name prefix of the results
pub const OUTPUT_PREFIX: &str = "LEI_";
/// Recorded when no LEI could be established
pub const NOT_AVAILABLE: &str = "NA";

const LEI_COUNTRY: &str = "nl";

/// Outcome for one DUNS
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeiRecord {
    /// The DUNS looked up
    pub duns: String,
    /// Chamber of Commerce number of the headquarters, if found
    pub registration_number: Option<String>,
    /// LEI, or `NA`
    pub lei: String,
}

/// Look up the LEI of every DUNS in the input file and write one record per
/// DUNS
pub async fn run(ctx: &JobContext) -> Result<JobReport, AppError> {
    let duns = read_duns_file(ctx.input_dir.join(INPUT_FILE)).await?;
    if duns.is_empty() {
        warn!("No valid DUNS available");
        return Ok(JobReport::default());
    }
    info!(records = duns.len(), "Input file contains DUNS records");

    let dispatcher = BatchDispatcher::new(ctx.executor.clone());

    let mut companies: Vec<WorkItem<String>> =
        duns.into_iter().map(|d| WorkItem::new(d.clone(), d)).collect();
    dispatcher
        .dispatch_all(&mut companies, |duns: &String| {
            ctx.requests.build(
                EndpointKind::DataBlocks,
                &[duns.as_str()],
                &[("blockIDs", "companyinfo_L1_v1"), ("tradeUp", "hq")],
            )
        })
        .await?;

    let mut lookups: Vec<WorkItem<String>> = Vec::new();
    for company in &companies {
        let Some(doc) = company.result() else {
            continue;
        };
        match organization(doc).and_then(|org| registration_number(org, KVK_REGISTRATION_TYPE_CODE)) {
            Some(number) => {
                debug!(duns = %company.key(), registration_number = %number, "Registration number found");
                lookups.push(WorkItem::new(company.key(), number));
            }
            None => info!(duns = %company.key(), "Unable to establish a registration number"),
        }
    }

    dispatcher
        .dispatch_all(&mut lookups, |number: &String| {
            ctx.requests.build(
                EndpointKind::LeiRecords,
                &[],
                &[
                    ("page[size]", "10"),
                    ("page[number]", "1"),
                    ("filter[entity.legalAddress.country]", LEI_COUNTRY),
                    ("filter[entity.registeredAs]", number.as_str()),
                ],
            )
        })
        .await?;

    let by_duns: HashMap<&str, &WorkItem<String>> =
        lookups.iter().map(|item| (item.key(), item)).collect();

    let sink = JsonFileSink::new(&ctx.output_dir, OUTPUT_PREFIX);
    let mut report = JobReport {
        items: companies.len(),
        ..Default::default()
    };

    for company in &companies {
        let lookup = by_duns.get(company.key());
        let record = LeiRecord {
            duns: company.key().to_string(),
            registration_number: lookup.map(|l| l.criteria().clone()),
            lei: lookup
                .and_then(|l| l.result())
                .and_then(first_lei)
                .unwrap_or_else(|| NOT_AVAILABLE.to_string()),
        };

        if record.lei == NOT_AVAILABLE {
            report.failed += 1;
        } else {
            report.succeeded += 1;
        }
        info!(duns = %record.duns, lei = %record.lei, "LEI lookup finished");

        let value = serde_json::to_value(&record)
            .map_err(|e| AppError::Output(format!("Failed to serialize {}: {}", record.duns, e)))?;
        if let Err(e) = sink.accept(&record.duns, &value).await {
            error!(duns = %record.duns, error = %e, "Failed to save result");
            report.unsaved += 1;
        }
    }

    Ok(report)
}
