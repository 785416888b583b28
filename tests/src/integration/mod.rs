//! # Integration Flows
//!
//! Cross-applet behavior over the in-memory transport.

pub mod channel_flows;
pub mod fan_out;
