//! The queue backend, as seen by filachat.
//!
//! - [`catalog`]: the static set of operations advertised to the model
//! - [`mcp`]: the HTTP JSON-RPC client that executes them

pub mod catalog;
pub mod mcp;

pub use catalog::{CREATE_TICKET, GET_TERMINAL, default_catalog};
pub use mcp::McpInvoker;
