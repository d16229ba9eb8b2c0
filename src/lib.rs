//! hubtools exposes the tools of a remote MCP hub as locally callable tools.
//!
//! The crate is organized around a small set of collaborating layers:
//! - [`schema`] converts hub JSON Schemas into a typed parameter model that
//!   provider validators accept.
//! - [`mcp`] owns transports, the connection cache, the tool registry and the
//!   generic hub facade.
//! - [`core`] holds configuration, the result envelope and the clock.
//! - [`server`] serves the operator control endpoints.
//!
//! The binary routes through [`cli::main`].

pub mod cli;
pub mod core;
pub mod logging;
pub mod mcp;
pub mod schema;
pub mod server;
