//! Capability errors.

use thiserror::Error;

use crate::apihub::ApiHubError;

use super::capability::CapabilityLocator;

/// An OpenAPI document could not be turned into operations.
#[derive(Debug, Error)]
pub enum SpecError {
    #[error("Failed to parse spec: {0}")]
    Parse(String),

    #[error("No 'paths' key in OpenAPI spec")]
    MissingPaths,

    #[error("Unresolvable reference: {0}")]
    BadReference(String),

    #[error("Spec declares no operations")]
    NoOperations,
}

/// Materialization failed. Always carries the locator that was being built.
#[derive(Debug, Error)]
pub enum MaterializeError {
    #[error("Failed to fetch spec {locator}: {source}")]
    Fetch {
        locator: CapabilityLocator,
        #[source]
        source: ApiHubError,
    },

    #[error("Spec {locator} is malformed: {source}")]
    Malformed {
        locator: CapabilityLocator,
        #[source]
        source: SpecError,
    },
}

impl MaterializeError {
    pub fn locator(&self) -> &CapabilityLocator {
        match self {
            Self::Fetch { locator, .. } | Self::Malformed { locator, .. } => locator,
        }
    }
}

/// Invoking a single operation failed.
#[derive(Debug, Error)]
pub enum OperationError {
    #[error("Missing required argument '{0}'")]
    MissingArgument(String),

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("Operation '{0}' has no server URL")]
    NoBaseUrl(String),

    #[error("Unsupported HTTP method: {0}")]
    UnsupportedMethod(String),

    #[error("Request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("API returned HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },
}
