//! Immutable request descriptors

use crate::error::AppError;
use reqwest::{Method, Url};
use std::collections::BTreeMap;
use std::fmt;

/// How the response body should be handed back to the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseFormat {
    /// Decode the body as a JSON document
    #[default]
    Json,
    /// Return the body text untouched
    Raw,
}

/// A fully specified outbound request
///
/// Built once through [`DescriptorBuilder`] and never mutated afterwards.
/// Query parameters are kept sorted so the rendered URL is stable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestDescriptor {
    target: Url,
    path: Vec<String>,
    query: BTreeMap<String, String>,
    method: Method,
    headers: Vec<(String, String)>,
    format: ResponseFormat,
}

impl RequestDescriptor {
    /// Base URL of the endpoint (scheme, host and port)
    pub fn target(&self) -> &Url {
        &self.target
    }

    /// Resource path segments, in order
    pub fn path(&self) -> &[String] {
        &self.path
    }

    /// Query parameters
    pub fn query(&self) -> &BTreeMap<String, String> {
        &self.query
    }

    /// HTTP method
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Request headers
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Expected response format
    pub fn format(&self) -> ResponseFormat {
        self.format
    }

    /// Render the complete URL, percent-encoding segments and parameters
    pub fn url(&self) -> Url {
        let mut url = self.target.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().extend(&self.path);
        }
        if !self.query.is_empty() {
            url.query_pairs_mut().extend_pairs(&self.query);
        }
        url
    }
}

impl fmt::Display for RequestDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} /{}", self.method, self.path.join("/"))
    }
}

/// Builder producing one [`RequestDescriptor`]
#[derive(Debug, Clone)]
pub struct DescriptorBuilder {
    target: String,
    path: Vec<String>,
    query: BTreeMap<String, String>,
    method: Method,
    headers: Vec<(String, String)>,
    format: ResponseFormat,
}

impl DescriptorBuilder {
    /// Start a GET request against `target` (e.g. `https://plus.dnb.com`)
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            path: Vec::new(),
            query: BTreeMap::new(),
            method: Method::GET,
            headers: Vec::new(),
            format: ResponseFormat::Json,
        }
    }

    /// Set the HTTP method
    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Append one path segment
    pub fn segment(mut self, segment: impl Into<String>) -> Self {
        self.path.push(segment.into());
        self
    }

    /// Append several path segments
    pub fn segments<I, S>(mut self, segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.path.extend(segments.into_iter().map(Into::into));
        self
    }

    /// Add a query parameter, replacing an earlier value for the same key
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(key.into(), value.into());
        self
    }

    /// Add a header
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Set the expected response format
    pub fn format(mut self, format: ResponseFormat) -> Self {
        self.format = format;
        self
    }

    /// Validate and freeze the descriptor
    ///
    /// # Errors
    /// * `AppError::InvalidDescriptor` if the target is not an absolute
    ///   http(s) URL, a path segment is empty or contains `/`, or a header or
    ///   query name is empty.
    pub fn build(self) -> Result<RequestDescriptor, AppError> {
        let target = Url::parse(&self.target).map_err(|e| {
            AppError::InvalidDescriptor(format!("Invalid target '{}': {}", self.target, e))
        })?;

        if !matches!(target.scheme(), "http" | "https") || target.host_str().is_none() {
            return Err(AppError::InvalidDescriptor(format!(
                "Target must be an absolute http(s) URL: {}",
                self.target
            )));
        }

        if let Some(bad) = self
            .path
            .iter()
            .find(|segment| segment.is_empty() || segment.contains('/'))
        {
            return Err(AppError::InvalidDescriptor(format!(
                "Invalid path segment '{}'",
                bad
            )));
        }

        if self.query.keys().any(|key| key.is_empty()) {
            return Err(AppError::InvalidDescriptor(
                "Query parameter names cannot be empty".into(),
            ));
        }

        if self.headers.iter().any(|(name, _)| name.is_empty()) {
            return Err(AppError::InvalidDescriptor(
                "Header names cannot be empty".into(),
            ));
        }

        Ok(RequestDescriptor {
            target,
            path: self.path,
            query: self.query,
            method: self.method,
            headers: self.headers,
            format: self.format,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_rendering() {
        let descriptor = DescriptorBuilder::new("https://plus.dnb.com")
            .segments(["v1", "data", "duns", "123456789"])
            .query("tradeUp", "hq")
            .query("blockIDs", "companyinfo_L2_v1,principalscontacts_L3_v1")
            .build()
            .unwrap();

        assert_eq!(
            descriptor.url().as_str(),
            "https://plus.dnb.com/v1/data/duns/123456789?blockIDs=companyinfo_L2_v1%2Cprincipalscontacts_L3_v1&tradeUp=hq"
        );
        assert_eq!(descriptor.to_string(), "GET /v1/data/duns/123456789");
    }

    #[test]
    fn test_segments_are_encoded() {
        let descriptor = DescriptorBuilder::new("http://127.0.0.1:1234/")
            .segment("search")
            .segment("a b")
            .query("searchTerm", "Gorman & Sons")
            .build()
            .unwrap();

        assert_eq!(
            descriptor.url().as_str(),
            "http://127.0.0.1:1234/search/a%20b?searchTerm=Gorman+%26+Sons"
        );
    }

    #[test]
    fn test_rejects_malformed_parts() {
        assert!(DescriptorBuilder::new("not a url").build().is_err());
        assert!(DescriptorBuilder::new("ftp://example.com").build().is_err());
        assert!(DescriptorBuilder::new("https://example.com")
            .segment("")
            .build()
            .is_err());
        assert!(DescriptorBuilder::new("https://example.com")
            .segment("v1/data")
            .build()
            .is_err());
        assert!(DescriptorBuilder::new("https://example.com")
            .header("", "x")
            .build()
            .is_err());
    }
}
