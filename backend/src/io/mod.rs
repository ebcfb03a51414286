//! Input sources and output sinks
//!
//! Jobs read their work items from plain files under the input directory and
//! hand every result to an [`OutputSink`].

pub mod input;
pub mod sink;

pub use input::{pad_duns, read_criteria_json, read_delimited_criteria, read_duns_file, Criteria};
pub use sink::{JsonFileSink, MemorySink, OutputSink};
