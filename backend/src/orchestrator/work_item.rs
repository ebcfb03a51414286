//! Work items and their per-item state
//!
//! A work item is one input record plus everything that happened to it. It is
//! owned by whichever component is processing it, and state only moves
//! forward: `Pending` until exactly one terminal status is reached.

use crate::executor::{ExecError, Payload};
use chrono::{DateTime, Utc};
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use serde_json::Value;
use thiserror::Error;

/// Where an item stands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ItemStatus {
    /// Not settled yet
    Pending,
    /// Settled successfully; `tier` is the narrowing tier that matched
    Done {
        /// Narrowing tier of the successful attempt, if narrowing was used
        tier: Option<usize>,
    },
    /// Settled as a permanent failure
    Failed,
    /// Every eligible narrowing tier was tried without a match
    Exhausted,
}

impl ItemStatus {
    /// Whether the item has reached its final status
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ItemStatus::Pending)
    }
}

/// Why an item did not (yet) succeed
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ItemError {
    /// The call itself failed
    #[error("{0}")]
    Exec(#[from] ExecError),

    /// The remote answered but reported no usable candidate
    #[error("No match: {0}")]
    NoMatch(String),

    /// No attempt produced a usable error
    #[error("No result")]
    NoResult,
}

impl ItemError {
    /// Short machine-readable kind
    pub fn kind(&self) -> &'static str {
        match self {
            ItemError::Exec(ExecError::Transport(_)) => "transport",
            ItemError::Exec(ExecError::Status { .. }) => "status",
            ItemError::Exec(ExecError::Decode(_)) => "decode",
            ItemError::Exec(ExecError::Timeout(_)) => "timeout",
            ItemError::Exec(ExecError::Auth { .. }) => "auth",
            ItemError::Exec(ExecError::Cancelled(_)) => "cancelled",
            ItemError::NoMatch(_) => "no_match",
            ItemError::NoResult => "no_result",
        }
    }
}

impl Serialize for ItemError {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("ItemError", 2)?;
        state.serialize_field("kind", self.kind())?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}

/// One call made on behalf of an item
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttemptRecord {
    /// Narrowing tier used, if any
    pub tier: Option<usize>,
    /// HTTP status, if the remote answered
    pub status: Option<u16>,
    /// Response body (decoded when possible)
    pub payload: Option<Value>,
    /// When the attempt settled
    pub at: DateTime<Utc>,
}

/// Mutable state carried by a work item
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemState {
    status: ItemStatus,
    attempts: Vec<AttemptRecord>,
    error: Option<ItemError>,
}

impl Default for ItemState {
    fn default() -> Self {
        Self {
            status: ItemStatus::Pending,
            attempts: Vec::new(),
            error: None,
        }
    }
}

/// One input record and its processing state
#[derive(Debug, Clone, Serialize)]
pub struct WorkItem<C> {
    key: String,
    criteria: C,
    state: ItemState,
}

impl<C> WorkItem<C> {
    /// New pending item; `key` names the item in logs and output
    pub fn new(key: impl Into<String>, criteria: C) -> Self {
        Self {
            key: key.into(),
            criteria,
            state: ItemState::default(),
        }
    }

    /// Item key
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Input criteria
    pub fn criteria(&self) -> &C {
        &self.criteria
    }

    /// Current status
    pub fn status(&self) -> ItemStatus {
        self.state.status
    }

    /// Whether the item settled successfully
    pub fn is_done(&self) -> bool {
        matches!(self.state.status, ItemStatus::Done { .. })
    }

    /// Whether the item reached a final status
    pub fn is_terminal(&self) -> bool {
        self.state.status.is_terminal()
    }

    /// Attempts made so far, oldest first
    pub fn attempts(&self) -> &[AttemptRecord] {
        &self.state.attempts
    }

    /// Last recorded error
    pub fn error(&self) -> Option<&ItemError> {
        self.state.error.as_ref()
    }

    /// Payload of the successful attempt
    pub fn result(&self) -> Option<&Value> {
        if self.is_done() {
            self.state.attempts.last().and_then(|a| a.payload.as_ref())
        } else {
            None
        }
    }

    /// Put a settled item back to `Pending`, keeping its attempt history
    pub fn reset(&mut self) {
        self.state.status = ItemStatus::Pending;
        self.state.error = None;
    }

    /// Record a successful attempt and settle as `Done`
    pub(crate) fn record_success(&mut self, tier: Option<usize>, payload: &Payload) {
        self.push_attempt(tier, Some(payload.status), Some(payload.to_value()));
        self.state.error = None;
        self.state.status = ItemStatus::Done { tier };
    }

    /// Record an answered attempt that did not match; the item stays pending
    pub(crate) fn record_no_match(&mut self, tier: Option<usize>, payload: &Payload, reason: String) {
        self.push_attempt(tier, Some(payload.status), Some(payload.to_value()));
        self.state.error = Some(ItemError::NoMatch(reason));
    }

    /// Record a failed attempt; the item stays pending
    pub(crate) fn record_failure(&mut self, tier: Option<usize>, error: ExecError) {
        let payload = match &error {
            ExecError::Status { body, .. } | ExecError::Auth { body, .. } => Some(
                serde_json::from_str(body).unwrap_or_else(|_| Value::String(body.clone())),
            ),
            _ => None,
        };
        self.push_attempt(tier, error.status(), payload);
        self.state.error = Some(ItemError::Exec(error));
    }

    /// Settle as a permanent failure
    pub(crate) fn mark_failed(&mut self) {
        self.state.status = ItemStatus::Failed;
    }

    /// Settle as exhausted, keeping the last error or recording `NoResult`
    pub(crate) fn mark_exhausted(&mut self) {
        if self.state.error.is_none() {
            self.state.error = Some(ItemError::NoResult);
        }
        self.state.status = ItemStatus::Exhausted;
    }

    fn push_attempt(&mut self, tier: Option<usize>, status: Option<u16>, payload: Option<Value>) {
        self.state.attempts.push(AttemptRecord {
            tier,
            status,
            payload,
            at: Utc::now(),
        });
    }
}
