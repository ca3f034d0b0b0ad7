//! WebSocket transport: wire protocol, socket handling and outbound delivery

pub mod handler;
pub mod hub;
pub mod protocol;

pub use hub::{ConnectionHub, Outbound};
