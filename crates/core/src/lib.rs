//! Core domain types, errors, and constants for the DevPod MCP server.
//!
//! This crate establishes the foundational error handling and shared
//! constants used throughout the workspace.
//!
//! ## Key Components
//!
//! - **`errors`**: Defines the primary `Error` enum and `Result` type alias,
//!   centralizing all possible failure modes for predictable error handling.
//! - **`constants`**: Shared static constants such as environment variable
//!   names and protocol defaults.

pub mod constants;
pub mod errors;

pub use self::{
    constants::*,
    errors::{Error, Result},
};
