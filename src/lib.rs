//! # talk2api
//!
//! A natural-language front end over REST APIs. A request is matched to an
//! API in API Hub, the API's OpenAPI spec is turned into callable
//! operations, and a short-lived execution delegate bound to exactly those
//! operations carries out the request. When the delegate cannot help it
//! says so with a `TOOL_NOT_FOUND` marker, and the caller discovers again.
//!
//! The pieces, bottom up:
//!
//! - [`config`] and [`auth`]: settings read at call time, credential chain
//! - [`apihub`]: capability search and spec fetching
//! - [`capabilities`]: OpenAPI parsing into an immutable [`capabilities::CapabilitySet`]
//! - [`delegate`] and [`lifecycle`]: the execution delegate and its single slot
//! - [`router`]: the three entry points
//! - [`llms`], [`tools`] and [`assistant`]: the model-driven front end
//! - [`server`]: the HTTP surface

pub mod apihub;
pub mod assistant;
pub mod auth;
pub mod capabilities;
pub mod config;
pub mod delegate;
pub mod lifecycle;
pub mod llms;
pub mod router;
pub mod server;
pub mod tools;

pub use assistant::Assistant;
pub use delegate::{DelegateOutcome, SENTINEL};
pub use llms::base_llm::BaseLLM;
pub use router::RequestRouter;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
