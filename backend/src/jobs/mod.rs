//! Batch jobs
//!
//! Each job reads its input file, drives one or more orchestrator components
//! against the shared executor and writes its results through an
//! [`OutputSink`](crate::io::OutputSink). The binary picks a job from its
//! first positional argument.

pub mod blocks;
pub mod idr;
pub mod lei;
pub mod principals;
pub mod typeahead;

use crate::error::AppError;
use crate::executor::Executor;
use crate::orchestrator::OrchestratorConfig;
use crate::request::RequestBuilder;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Everything a job needs to run
#[derive(Clone)]
pub struct JobContext {
    /// Shared, rate-limited executor
    pub executor: Arc<Executor>,
    /// Descriptor factory for the remote endpoints
    pub requests: Arc<dyn RequestBuilder>,
    /// Narrowing and resolver settings
    pub orchestrator: OrchestratorConfig,
    /// Directory the input files are read from
    pub input_dir: PathBuf,
    /// Directory results are written to
    pub output_dir: PathBuf,
}

impl fmt::Debug for JobContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobContext")
            .field("orchestrator", &self.orchestrator)
            .field("input_dir", &self.input_dir)
            .field("output_dir", &self.output_dir)
            .finish_non_exhaustive()
    }
}

/// Counts reported at the end of a job
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JobReport {
    /// Input records read
    pub items: usize,
    /// Records that produced a result
    pub succeeded: usize,
    /// Records that ended without a result
    pub failed: usize,
    /// Results that could not be written
    pub unsaved: usize,
}

/// The available jobs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Job {
    /// Data blocks for every DUNS in the input file
    Blocks {
        /// `tradeUp` parameter (e.g. `hq`)
        trade_up: Option<String>,
    },
    /// Identity resolution for every criteria object
    Idr,
    /// Typeahead search with adaptive narrowing
    Typeahead,
    /// Principal trees for one DUNS or every DUNS in the input file
    Principals {
        /// Single DUNS to resolve instead of the input file
        duns: Option<String>,
    },
    /// LEI lookup through the Dutch registration number
    Lei,
}

impl Job {
    /// Parse a job from command line arguments (without the program name)
    ///
    /// # Errors
    /// * `AppError::InvalidConfig` if no job or an unknown job is named
    pub fn from_args<I, S>(args: I) -> Result<Self, AppError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut args = args.into_iter();
        let name = args.next().ok_or_else(|| {
            AppError::InvalidConfig(format!("No job given, expected one of: {}", Self::NAMES))
        })?;
        let next = args.next().map(|a| a.as_ref().trim().to_string());

        match name.as_ref() {
            "blocks" => Ok(Job::Blocks { trade_up: next }),
            "idr" => Ok(Job::Idr),
            "typeahead" => Ok(Job::Typeahead),
            "principals" => Ok(Job::Principals { duns: next }),
            "lei" => Ok(Job::Lei),
            other => Err(AppError::InvalidConfig(format!(
                "Unknown job '{}', expected one of: {}",
                other,
                Self::NAMES
            ))),
        }
    }

    const NAMES: &'static str = "blocks, idr, typeahead, principals, lei";

    /// Short job name, used in logs
    pub fn name(&self) -> &'static str {
        match self {
            Job::Blocks { .. } => "blocks",
            Job::Idr => "idr",
            Job::Typeahead => "typeahead",
            Job::Principals { .. } => "principals",
            Job::Lei => "lei",
        }
    }

    /// Run the job
    pub async fn run(&self, ctx: &JobContext) -> Result<JobReport, AppError> {
        match self {
            Job::Blocks { trade_up } => blocks::run(ctx, trade_up.as_deref()).await,
            Job::Idr => idr::run(ctx).await,
            Job::Typeahead => typeahead::run(ctx).await,
            Job::Principals { duns } => principals::run(ctx, duns.as_deref()).await,
            Job::Lei => lei::run(ctx).await,
        }
    }
}
