//! MCP (Model Context Protocol) connection management for toolmesh.
//!
//! Keeps a registry of live sessions to remote MCP servers in step with a
//! declarative configuration, runs batches of tool calls against it and
//! normalizes the heterogeneous results into [`toolmesh_core::ContentSegment`]s.
//!
//! # Main types
//!
//! - [`ServerConnection`]: One session: connect, list tools, call with one reconnect-and-retry.
//! - [`ConnectionRegistry`]: Name-to-connection map of the applied configuration.
//! - [`ConfigReconciler`]: Fingerprints the configuration and rebuilds the registry on change.
//! - [`BatchDispatcher`]: Runs `(server, tool, params)` batches with per-request error isolation.
//! - [`ContentNormalizer`]: Maps result content to text and data-URI image segments.
//! - [`McpToolsPlugin`]: Host-facing lifecycle, prompt and call entry points.
//! - [`SseConnector`]: Stock HTTP + SSE transport.

/// Tool catalog rendering for agent prompts.
pub mod catalog;
pub mod config;
pub mod connection;
/// Batch execution with per-request error isolation.
pub mod dispatcher;
/// Tool result content to content segments.
pub mod normalize;
/// Host-facing plugin surface.
pub mod plugin;
pub mod protocol;
/// Configuration fingerprinting and registry rebuilds.
pub mod reconcile;
/// The name-to-connection map.
pub mod registry;
pub mod transport;

pub use catalog::{render_services, render_tool_catalog};
pub use config::{
    fingerprint, parse_config, ConfigSource, McpConfig, ServerDescriptor, SharedConfig,
    DEFAULT_CONFIG,
};
pub use connection::{ConnectionState, ServerConnection};
pub use dispatcher::BatchDispatcher;
pub use normalize::ContentNormalizer;
pub use plugin::McpToolsPlugin;
pub use protocol::{CallToolResult, ContentItem, ParameterSpec, ToolDescriptor};
pub use reconcile::{ConfigReconciler, ReconcileOutcome};
pub use registry::{ConnectionRegistry, SharedConnection};
pub use transport::{McpTransport, SseConnector, TransportConnector};
