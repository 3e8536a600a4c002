//! UI 層
//!
//! Axum の Router・HTTP / WebSocket ハンドラ・共有状態を提供します。

pub mod handler;
pub mod server;
pub mod signal;
pub mod state;

pub use server::Server;
pub use state::AppState;
