//! # Capabilities
//!
//! A capability is one discovered API: the locator search returned for a
//! query, and the operations materialized from the spec behind it.
//!
//! ## Flow
//!
//! 1. [`CapabilitySearch::search`] maps a query to a [`CapabilityLocator`]
//! 2. [`Materializer::materialize`] fetches the spec and parses it into
//!    [`Operation`]s, attaching the static credential where required
//! 3. The resulting [`CapabilitySet`] is bound to a fresh execution delegate

pub mod capability;
pub mod error;
pub mod materializer;
pub mod openapi_parser;
pub mod operation;
pub mod search;

pub use capability::{CapabilityLocator, CapabilitySet};
pub use error::{MaterializeError, OperationError, SpecError};
pub use materializer::{ApiHubMaterializer, Materializer};
pub use openapi_parser::parse_openapi_spec;
pub use operation::{Operation, OperationDescriptor, OperationParameter, ParameterLocation};
pub use search::CapabilitySearch;
