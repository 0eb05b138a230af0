//! Capability locators and capability sets.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::operation::{Operation, OperationDescriptor};

/// Opaque reference to a spec resource in the catalog.
///
/// Produced by search, consumed once by the materializer; never interpreted
/// beyond being passed through.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CapabilityLocator(String);

impl CapabilityLocator {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CapabilityLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The operations materialized for one discovery query.
///
/// Immutable once built. Operation names are unique within a set.
#[derive(Debug, Clone)]
pub struct CapabilitySet {
    query: String,
    locator: CapabilityLocator,
    display_name: String,
    description: String,
    operations: Vec<Operation>,
}

impl CapabilitySet {
    pub fn new(
        locator: CapabilityLocator,
        display_name: impl Into<String>,
        description: impl Into<String>,
        operations: Vec<Operation>,
    ) -> Self {
        Self {
            query: String::new(),
            locator,
            display_name: display_name.into(),
            description: description.into(),
            operations,
        }
    }

    /// Record the discovery query that produced this set.
    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = query.into();
        self
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn locator(&self) -> &CapabilityLocator {
        &self.locator
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn operation_names(&self) -> Vec<String> {
        self.operations.iter().map(|op| op.name.clone()).collect()
    }

    pub fn get(&self, name: &str) -> Option<&Operation> {
        self.operations.iter().find(|op| op.name == name)
    }

    pub fn descriptors(&self) -> Vec<OperationDescriptor> {
        self.operations.iter().map(Operation::descriptor).collect()
    }
}
