//! Core types and error definitions for the toolmesh workspace.
//!
//! This crate provides the foundational types shared by the MCP connection
//! layer and its hosts, including error handling, the normalized content
//! segment handed back to the agent, and the batch invocation request.
//!
//! # Main types
//!
//! - [`ToolMeshError`]: Unified error enum for connection, protocol and batch failures.
//! - [`ToolMeshResult`]: Convenience alias for `Result<T, ToolMeshError>`.
//! - [`ContentSegment`]: A normalized piece of tool output (text or data-URI image).
//! - [`InvocationRequest`]: One `(server, tool, params)` entry of a batch call.

/// Error taxonomy shared by every toolmesh crate.
pub mod error;
/// Content segments and invocation requests.
pub mod segment;

pub use error::{ToolMeshError, ToolMeshResult};
pub use segment::{ContentSegment, InvocationRequest, Params, DEFAULT_MIME_TYPE};
