//! Identity resolution (cleanseMatch) for a list of criteria objects

use crate::error::AppError;
use crate::io::{read_criteria_json, Criteria, JsonFileSink};
use crate::jobs::{JobContext, JobReport};
use crate::orchestrator::{BatchDispatcher, WorkItem};
use crate::request::EndpointKind;
use tracing::{info, warn};

/// Input file under the input directory
pub const INPUT_FILE: &str = "arrCriteria.json";
/// File name prefix of the results
pub const OUTPUT_PREFIX: &str = "IDR_";
/// Criteria field used as the item key
pub const KEY_FIELD: &str = "customerReference1";

/// Submit every criteria object to cleanseMatch and write one file per object
///
/// Objects without a `customerReference1` are keyed by their 1-based position.
pub async fn run(ctx: &JobContext) -> Result<JobReport, AppError> {
    let criteria = read_criteria_json(ctx.input_dir.join(INPUT_FILE)).await?;
    if criteria.is_empty() {
        warn!("No valid criteria available");
        return Ok(JobReport::default());
    }
    info!(records = criteria.len(), "Input file contains criteria records");

    let mut items: Vec<WorkItem<Criteria>> = criteria
        .into_iter()
        .enumerate()
        .map(|(idx, c)| {
            let key = c
                .get(KEY_FIELD)
                .map(str::to_string)
                .unwrap_or_else(|| (idx + 1).to_string());
            WorkItem::new(key, c)
        })
        .collect();
    let sink = JsonFileSink::new(&ctx.output_dir, OUTPUT_PREFIX);

    let summary = BatchDispatcher::new(ctx.executor.clone())
        .dispatch_into(
            &mut items,
            |criteria: &Criteria| {
                let query: Vec<(&str, &str)> = criteria
                    .params()
                    .iter()
                    .map(|(k, v)| (k.as_str(), v.as_str()))
                    .collect();
                ctx.requests.build(EndpointKind::CleanseMatch, &[], &query)
            },
            &sink,
        )
        .await?;

    Ok(JobReport {
        items: items.len(),
        succeeded: summary.succeeded,
        failed: summary.failed,
        unsaved: summary.unsaved,
    })
}
