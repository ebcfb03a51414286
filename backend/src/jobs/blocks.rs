//! Data blocks for a list of DUNS

use crate::error::AppError;
use crate::io::{read_duns_file, JsonFileSink};
use crate::jobs::{JobContext, JobReport};
use crate::orchestrator::{BatchDispatcher, WorkItem};
use crate::request::EndpointKind;
use tracing::{info, warn};

/// Input file under the input directory
pub const INPUT_FILE: &str = "DUNS.txt";
/// File name prefix of the results
pub const OUTPUT_PREFIX: &str = "dnb_dpl_ci_l2_pc_l3_";
/// Data blocks requested for every DUNS
pub const BLOCK_IDS: &str = "companyinfo_L2_v1,principalscontacts_L3_v1";

/// Fetch the data blocks for every DUNS in the input file and write one file
/// per DUNS
pub async fn run(ctx: &JobContext, trade_up: Option<&str>) -> Result<JobReport, AppError> {
    let duns = read_duns_file(ctx.input_dir.join(INPUT_FILE)).await?;
    if duns.is_empty() {
        warn!("No valid DUNS available");
        return Ok(JobReport::default());
    }
    info!(records = duns.len(), "Input file contains DUNS records");

    let mut query = vec![("blockIDs", BLOCK_IDS)];
    if let Some(trade_up) = trade_up.filter(|t| !t.is_empty()) {
        query.push(("tradeUp", trade_up));
    }

    let mut items: Vec<WorkItem<String>> =
        duns.into_iter().map(|d| WorkItem::new(d.clone(), d)).collect();
    let sink = JsonFileSink::new(&ctx.output_dir, OUTPUT_PREFIX);

    let summary = BatchDispatcher::new(ctx.executor.clone())
        .dispatch_into(
            &mut items,
            |duns: &String| ctx.requests.build(EndpointKind::DataBlocks, &[duns.as_str()], &query),
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
