//! Session coordination server for the Tsunagi chat matching system.
//!
//! Pairs anonymous participants into bounded-size chat rooms, relays
//! real-time messages between room members over WebSocket, and optionally
//! injects a delayed automated participant into the conversation.

// layers
pub mod domain;
pub mod infrastructure;
pub mod ui;
pub mod usecase;
