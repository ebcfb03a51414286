//! Orchestrator module
//!
//! Everything above a single request: work items and their state, the batch
//! dispatcher, adaptive narrowing of search queries and recursive principal
//! resolution. All of it drives the shared [`crate::executor::Executor`] and
//! never talks to the network directly.

pub mod config;
pub mod constants;
pub mod dispatcher;
pub mod dpl_types;
pub mod narrowing;
pub mod resolver;
pub mod work_item;

pub use config::OrchestratorConfig;
pub use dispatcher::{BatchDispatcher, BatchSummary, Settlement};
pub use narrowing::{
    Narrowable, NarrowingController, NarrowingPlan, NarrowingStep, NarrowingSummary,
};
pub use resolver::{
    NodeStatus, ResolutionRecord, Resolver, ResolverConfig, ResultAggregate, RevisitPolicy,
};
pub use work_item::{AttemptRecord, ItemError, ItemStatus, WorkItem};
