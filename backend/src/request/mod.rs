//! Outbound request description
//!
//! Request descriptors are immutable values built fresh for every call. The
//! orchestration layer only ever asks a [`RequestBuilder`] for one and hands it
//! to the executor; it never assembles URLs or headers itself.

pub mod builder;
pub mod credentials;
pub mod descriptor;

pub use builder::{DplRequestBuilder, EndpointKind, RequestBuilder};
pub use credentials::{CredentialProvider, FileCredentials, StaticCredentials};
pub use descriptor::{DescriptorBuilder, RequestDescriptor, ResponseFormat};
