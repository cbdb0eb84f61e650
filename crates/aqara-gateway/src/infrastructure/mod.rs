//! Infrastructure layer for the gateway client.
//!
//! Contains OS-facing adapters: UDP sockets, network interface lookup and
//! file-system configuration storage.

pub mod network;
pub mod storage;
