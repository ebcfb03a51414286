//! Orchestrator constants
//!
//! Centralized constants used throughout the orchestrator module.

/// `idType.dnbCode` marking a DUNS number in an `idNumbers` array
pub const DUNS_ID_TYPE_CODE: i64 = 3575;

/// `typeDnBCode` of a Dutch Chamber of Commerce (KvK) registration number
pub const KVK_REGISTRATION_TYPE_CODE: i64 = 6256;

/// `subjectType` of a principal that is itself a business
pub const BUSINESS_SUBJECT_TYPE: &str = "Businesses";

/// Default narrowing tiers (truncation lengths, descending)
pub const DEFAULT_NARROWING_TIERS: &[usize] = &[30, 20, 15, 10, 6, 3];

/// Candidate list returned by the typeahead endpoint
pub const TYPEAHEAD_CANDIDATES_FIELD: &str = "searchCandidates";

/// Data block holding the principals of an organization
pub const PRINCIPALS_BLOCK: &str = "principalscontacts_L3_v1";

/// Placeholder label for a principal without a name
pub const UNNAMED_PRINCIPAL: &str = "(unnamed principal)";
