//! Shared library for the Tsunagi chat matching system.
//!
//! Cross-cutting utilities used by the server package: time handling with a
//! clock abstraction for testability, and logging setup.

pub mod logger;
pub mod time;
