//! Model-facing tools.
//!
//! The root assistant works through exactly three tools, one per router
//! entry point.

pub mod router_tools;

pub use router_tools::{
    dispatch, router_tool_declarations, DiscoverToolSchema, ExecuteToolSchema, DISCOVER_TOOL,
    EXECUTE_TOOL, RESET_TOOL,
};
