//! Protocol
//!
//! JSON-RPC 2.0 over line-delimited stdio or HTTP POST.

pub mod http;
pub mod messages;
pub mod stdio;
pub mod types;
