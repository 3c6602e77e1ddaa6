//! tether - an interactive terminal client for WebSocket pub/sub channels
//!
//! This crate provides the core functionality for tether, including:
//! - Server type detection (channel server vs. generic streaming API)
//! - Mode-dependent command interpretation
//! - Inbound event dispatch and subscription tracking
//! - The concurrent session loop tying them together
//!
//! # Architecture
//!
//! tether talks to one WebSocket endpoint per run:
//! - A channel server greets with `request_info` and speaks typed JSON records
//! - Any other endpoint is driven with raw JSON typed by the operator
//! - Operator input and server events are handled by independent tasks

pub mod client;
pub mod config;
pub mod protocol;
pub mod transport;
