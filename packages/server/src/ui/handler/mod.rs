//! HTTP / WebSocket ハンドラ

pub mod http;
pub mod websocket;
