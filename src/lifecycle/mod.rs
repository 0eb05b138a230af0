//! Delegate lifecycle: the single slot holding the current delegate.
//!
//! [`DelegateSlot::replace`] and [`DelegateSlot::reset`] are the only
//! mutators. The slot itself is not synchronized; the router keeps it behind
//! an async mutex.

use std::sync::Arc;

use crate::capabilities::CapabilitySet;
use crate::delegate::{CapabilityExecutor, DelegateHandle, ExecutionDelegate};

#[derive(Debug)]
pub struct DelegateSlot {
    current: Option<DelegateHandle>,
    executor: Arc<dyn CapabilityExecutor>,
    http: reqwest::Client,
    generation: u64,
}

impl DelegateSlot {
    /// `executor` is shared by every delegate this slot creates.
    pub fn new(executor: Arc<dyn CapabilityExecutor>, http: reqwest::Client) -> Self {
        Self {
            current: None,
            executor,
            http,
            generation: 0,
        }
    }

    /// Discard any current delegate, then install one bound to `capabilities`.
    pub fn replace(&mut self, capabilities: CapabilitySet) -> DelegateHandle {
        if let Some(previous) = self.current.take() {
            tracing::info!(previous_tools = ?previous.tools(), "Replacing existing delegate");
        }

        let delegate = ExecutionDelegate::new(capabilities, self.executor.clone(), self.http.clone());
        let handle = DelegateHandle::new(delegate);
        self.generation += 1;
        tracing::info!(
            generation = self.generation,
            tools = ?handle.tools(),
            "Installed execution delegate"
        );
        self.current = Some(handle.clone());
        handle
    }

    /// Tear down the current delegate, returning its operation names.
    /// An empty slot yields an empty list.
    pub fn reset(&mut self) -> Vec<String> {
        match self.current.take() {
            Some(previous) => {
                let tools = previous.tools();
                tracing::info!(tools = ?tools, "Destroyed execution delegate");
                tools
            }
            None => Vec::new(),
        }
    }

    pub fn current(&self) -> Option<&DelegateHandle> {
        self.current.as_ref()
    }

    pub fn current_tools(&self) -> Vec<String> {
        self.current.as_ref().map(DelegateHandle::tools).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.current.is_none()
    }

    /// Number of delegates installed so far.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}
