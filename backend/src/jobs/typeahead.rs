//! Typeahead search with adaptive narrowing

use crate::error::AppError;
use crate::io::{read_delimited_criteria, Criteria, JsonFileSink, OutputSink};
use crate::jobs::{JobContext, JobReport};
use crate::orchestrator::{ItemStatus, Narrowable, NarrowingController, WorkItem};
use crate::request::EndpointKind;
use serde::Serialize;
use tracing::{error, info, warn};

/// Input file under the input directory
pub const INPUT_FILE: &str = "MatchCriteria.txt";
/// File name prefix of the results
pub const OUTPUT_PREFIX: &str = "typeahead_results_";
/// Column names of the input file, in order
pub const FIELDS: [&str; 3] = ["searchTerm", "countryISOAlpha2Code", "customerReference"];

const SEARCH_TERM: &str = "searchTerm";
const KEY_FIELD: &str = "customerReference";

/// Typeahead criteria; the search term is the narrowable field
#[derive(Debug, Clone, Serialize)]
#[serde(transparent)]
pub struct TypeaheadCriteria(pub Criteria);

impl Narrowable for TypeaheadCriteria {
    fn narrowable_field(&self) -> &str {
        self.0.get(SEARCH_TERM).unwrap_or_default()
    }
}

/// Narrow every search in the input file and write the final state of each
/// item, matched or not
pub async fn run(ctx: &JobContext) -> Result<JobReport, AppError> {
    let criteria = read_delimited_criteria(ctx.input_dir.join(INPUT_FILE), &FIELDS).await?;
    if criteria.is_empty() {
        warn!("No valid search criteria available");
        return Ok(JobReport::default());
    }
    info!(records = criteria.len(), "Input file contains search criteria");

    let mut items: Vec<WorkItem<TypeaheadCriteria>> = criteria
        .into_iter()
        .enumerate()
        .map(|(idx, c)| {
            let key = c
                .get(KEY_FIELD)
                .filter(|k| !k.is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| (idx + 1).to_string());
            WorkItem::new(key, TypeaheadCriteria(c))
        })
        .collect();

    let controller = NarrowingController::new(
        ctx.executor.clone(),
        ctx.orchestrator.narrowing.clone(),
        ctx.orchestrator.candidates_field.clone(),
    );

    let summary = controller
        .run(&mut items, |criteria: &TypeaheadCriteria, narrowed: &str| {
            let query: Vec<(&str, &str)> = criteria
                .0
                .params()
                .iter()
                .map(|(k, v)| {
                    if k == SEARCH_TERM {
                        (k.as_str(), narrowed)
                    } else {
                        (k.as_str(), v.as_str())
                    }
                })
                .collect();
            ctx.requests.build(EndpointKind::Typeahead, &[], &query)
        })
        .await?;

    let sink = JsonFileSink::new(&ctx.output_dir, OUTPUT_PREFIX);
    let mut unsaved = 0;
    for item in &items {
        if item.status() == ItemStatus::Exhausted {
            info!(key = %item.key(), error = ?item.error().map(ToString::to_string), "No match at any tier");
        }
        let value = serde_json::to_value(item)
            .map_err(|e| AppError::Output(format!("Failed to serialize {}: {}", item.key(), e)))?;
        if let Err(e) = sink.accept(item.key(), &value).await {
            error!(key = %item.key(), error = %e, "Failed to save result");
            unsaved += 1;
        }
    }

    Ok(JobReport {
        items: items.len(),
        succeeded: summary.done(),
        failed: summary.exhausted + summary.failed,
        unsaved,
    })
}
