//! Pong Match Server - authoritative dedicated server for one two-player match

pub mod app;
pub mod config;
pub mod game;
pub mod http;
pub mod platform;
pub mod util;
pub mod ws;
