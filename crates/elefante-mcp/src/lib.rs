//! # Elefante MCP
//!
//! Thin I/O shell over [`elefante_core`]: line-delimited JSON-RPC 2.0 over
//! stdio, a tool dispatcher with transaction-scoped write locking, and the
//! dashboard snapshot writer. All memory semantics live in the core crate;
//! this crate only frames, dispatches, and stamps the mandatory-protocol
//! reminder envelope onto responses.

pub mod protocol;
pub mod server;
pub mod snapshot;
pub mod tools;

pub use protocol::stdio::StdioTransport;
pub use server::McpServer;
