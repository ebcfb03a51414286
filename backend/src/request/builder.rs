//! Endpoint-aware request builder
//!
//! Knows the endpoints the batch jobs talk to and produces a fresh descriptor
//! for each call, cloning the endpoint's default headers every time.

use crate::error::AppError;
use crate::request::credentials::CredentialProvider;
use crate::request::descriptor::{DescriptorBuilder, RequestDescriptor};
use std::fmt;
use std::sync::Arc;

const DATA_BLOCKS_PATH: &[&str] = &["v1", "data", "duns"];
const CLEANSE_MATCH_PATH: &[&str] = &["v1", "match", "cleanseMatch"];
const TYPEAHEAD_PATH: &[&str] = &["v1", "search", "typeahead"];
const LEI_RECORDS_PATH: &[&str] = &["api", "v1", "lei-records"];

/// Endpoints known to the builder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndpointKind {
    /// D&B Direct+ data blocks for one DUNS (`/v1/data/duns/{duns}`)
    DataBlocks,
    /// D&B Direct+ identity resolution (`/v1/match/cleanseMatch`)
    CleanseMatch,
    /// D&B Direct+ typeahead search (`/v1/search/typeahead`)
    Typeahead,
    /// GLEIF LEI records (`/api/v1/lei-records`)
    LeiRecords,
}

impl EndpointKind {
    /// Number of caller-supplied path segments the endpoint takes
    fn expected_segments(self) -> usize {
        match self {
            EndpointKind::DataBlocks => 1,
            EndpointKind::CleanseMatch | EndpointKind::Typeahead | EndpointKind::LeiRecords => 0,
        }
    }

    fn base_path(self) -> &'static [&'static str] {
        match self {
            EndpointKind::DataBlocks => DATA_BLOCKS_PATH,
            EndpointKind::CleanseMatch => CLEANSE_MATCH_PATH,
            EndpointKind::Typeahead => TYPEAHEAD_PATH,
            EndpointKind::LeiRecords => LEI_RECORDS_PATH,
        }
    }
}

/// Produces ready-to-send descriptors
pub trait RequestBuilder: Send + Sync {
    /// Build a descriptor for `kind` with extra path `segments` and `query`
    fn build(
        &self,
        kind: EndpointKind,
        segments: &[&str],
        query: &[(&str, &str)],
    ) -> Result<RequestDescriptor, AppError>;
}

/// Builder for the D&B Direct+ and GLEIF endpoints
#[derive(Clone)]
pub struct DplRequestBuilder {
    dpl_base_url: String,
    gleif_base_url: String,
    credentials: Arc<dyn CredentialProvider>,
}

impl DplRequestBuilder {
    /// Create a builder for the given hosts
    pub fn new(
        dpl_base_url: impl Into<String>,
        gleif_base_url: impl Into<String>,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Self {
        Self {
            dpl_base_url: dpl_base_url.into(),
            gleif_base_url: gleif_base_url.into(),
            credentials,
        }
    }
}

impl fmt::Debug for DplRequestBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DplRequestBuilder")
            .field("dpl_base_url", &self.dpl_base_url)
            .field("gleif_base_url", &self.gleif_base_url)
            .finish_non_exhaustive()
    }
}

impl RequestBuilder for DplRequestBuilder {
    fn build(
        &self,
        kind: EndpointKind,
        segments: &[&str],
        query: &[(&str, &str)],
    ) -> Result<RequestDescriptor, AppError> {
        if segments.len() != kind.expected_segments() {
            return Err(AppError::InvalidDescriptor(format!(
                "{:?} takes {} path segment(s), got {}",
                kind,
                kind.expected_segments(),
                segments.len()
            )));
        }

        let mut builder = match kind {
            EndpointKind::LeiRecords => DescriptorBuilder::new(self.gleif_base_url.as_str())
                .header("Accept", "application/vnd.api+json"),
            _ => {
                let token = self.credentials.bearer_token()?;
                DescriptorBuilder::new(self.dpl_base_url.as_str())
                    .header("Content-Type", "application/json")
                    .header("Authorization", format!("Bearer {}", token))
            }
        };

        builder = builder
            .segments(kind.base_path().iter().copied())
            .segments(segments.iter().copied());

        for (key, value) in query {
            builder = builder.query(*key, *value);
        }

        builder.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::StaticCredentials;

    fn builder() -> DplRequestBuilder {
        DplRequestBuilder::new(
            "https://plus.dnb.com",
            "https://api.gleif.org",
            Arc::new(StaticCredentials::new("secret-token")),
        )
    }

    #[test]
    fn test_data_blocks_descriptor() {
        let descriptor = builder()
            .build(
                EndpointKind::DataBlocks,
                &["804735132"],
                &[("blockIDs", "companyinfo_L2_v1")],
            )
            .unwrap();

        assert_eq!(
            descriptor.url().as_str(),
            "https://plus.dnb.com/v1/data/duns/804735132?blockIDs=companyinfo_L2_v1"
        );
        assert!(descriptor
            .headers()
            .contains(&("Authorization".to_string(), "Bearer secret-token".to_string())));
    }

    #[test]
    fn test_lei_descriptor_has_no_bearer() {
        let descriptor = builder()
            .build(
                EndpointKind::LeiRecords,
                &[],
                &[("filter[entity.registeredAs]", "33302047")],
            )
            .unwrap();

        assert!(descriptor.url().as_str().starts_with("https://api.gleif.org/api/v1/lei-records?"));
        assert!(descriptor
            .headers()
            .iter()
            .all(|(name, _)| name != "Authorization"));
    }

    #[test]
    fn test_segment_count_is_checked() {
        let err = builder()
            .build(EndpointKind::DataBlocks, &[], &[])
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidDescriptor(_)));

        assert!(builder()
            .build(EndpointKind::Typeahead, &["extra"], &[])
            .is_err());
    }

    #[test]
    fn test_each_call_gets_its_own_descriptor() {
        let b = builder();
        let first = b
            .build(EndpointKind::Typeahead, &[], &[("searchTerm", "dnb")])
            .unwrap();
        let second = b
            .build(EndpointKind::Typeahead, &[], &[("searchTerm", "gleif")])
            .unwrap();
        assert_ne!(first, second);
        assert_eq!(first.headers(), second.headers());
    }
}
