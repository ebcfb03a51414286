//! Orchestrator configuration
//!
//! Centralized configuration for the narrowing controller and the resolver.

use crate::error::AppError;
use crate::orchestrator::constants::TYPEAHEAD_CANDIDATES_FIELD;
use crate::orchestrator::narrowing::NarrowingPlan;
use crate::orchestrator::resolver::{ResolverConfig, RevisitPolicy};
use serde::Serialize;
use std::env;

/// Orchestrator configuration
#[derive(Debug, Clone, Serialize)]
pub struct OrchestratorConfig {
    /// Narrowing steps used for typeahead-style searches
    pub narrowing: NarrowingPlan,
    /// Candidate list that decides whether a search matched
    pub candidates_field: String,
    /// Principal resolution settings
    pub resolver: ResolverConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            narrowing: NarrowingPlan::default(),
            candidates_field: TYPEAHEAD_CANDIDATES_FIELD.to_string(),
            resolver: ResolverConfig::default(),
        }
    }
}

impl OrchestratorConfig {
    /// Reject settings the orchestrator cannot run with
    pub fn validate(&self) -> Result<(), AppError> {
        NarrowingPlan::new(self.narrowing.steps().to_vec())?;
        if self.candidates_field.trim().is_empty() {
            return Err(AppError::InvalidConfig(
                "candidate list field cannot be empty".into(),
            ));
        }
        self.resolver.validate()
    }
}

/// Optional overrides for the orchestrator configuration
#[derive(Debug, Default)]
pub struct ConfigUpdateRequest {
    /// Truncation tiers, comma separated (e.g. `30,20,10`)
    pub tiers: Option<String>,
    /// Candidate list name
    pub candidates_field: Option<String>,
    /// `suppress` or `allow`
    pub revisit: Option<String>,
    /// Maximum resolution depth
    pub max_depth: Option<String>,
}

impl ConfigUpdateRequest {
    /// Read overrides from `DPL_TIERS`, `DPL_CANDIDATES_FIELD`, `DPL_REVISIT`
    /// and `DPL_MAX_DEPTH`
    pub fn from_env() -> Self {
        Self::from_vars(|key| env::var(key).ok())
    }

    /// Read overrides from an arbitrary variable lookup
    pub fn from_vars<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            tiers: lookup("DPL_TIERS"),
            candidates_field: lookup("DPL_CANDIDATES_FIELD"),
            revisit: lookup("DPL_REVISIT"),
            max_depth: lookup("DPL_MAX_DEPTH"),
        }
    }
}

/// Validate and apply configuration updates
///
/// This function validates the update request and applies valid changes to the config.
/// Returns an error if any validation fails.
///
/// # Arguments
/// * `config` - The current config to update
/// * `request` - The update request with optional fields
///
/// # Returns
/// * `Ok(OrchestratorConfig)` - The updated configuration
/// * `Err(AppError)` - If validation fails
pub fn validate_and_apply_config_update(
    mut config: OrchestratorConfig,
    request: ConfigUpdateRequest,
) -> Result<OrchestratorConfig, AppError> {
    if let Some(tiers) = request.tiers {
        let parsed = tiers
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(|t| {
                t.parse::<usize>().map_err(|_| {
                    AppError::InvalidConfig(format!("DPL_TIERS: '{}' is not a number", t))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        config.narrowing = NarrowingPlan::from_tiers(&parsed)?;
    }

    if let Some(field) = request.candidates_field {
        if field.trim().is_empty() {
            return Err(AppError::InvalidConfig(
                "DPL_CANDIDATES_FIELD cannot be empty".into(),
            ));
        }
        config.candidates_field = field.trim().to_string();
    }

    if let Some(revisit) = request.revisit {
        config.resolver.revisit = revisit.parse::<RevisitPolicy>()?;
    }

    if let Some(depth) = request.max_depth {
        let depth = depth.trim().parse::<usize>().map_err(|_| {
            AppError::InvalidConfig(format!("DPL_MAX_DEPTH: '{}' is not a number", depth))
        })?;
        config.resolver.max_depth = Some(depth);
    }

    config.validate()?;
    Ok(config)
}
