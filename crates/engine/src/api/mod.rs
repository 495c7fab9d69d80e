//! HTTP and WebSocket entry points.

pub mod dice_ws;
pub mod http;
