//! aqara-gateway library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the binary entry point in `main.rs` share the same module tree.
//!
//! # What does aqara-gateway do? (for beginners)
//!
//! An Aqara gateway bridges Zigbee sensors onto the LAN.  This crate talks
//! to it over UDP:
//!
//! 1. **Discovery** multicasts a `whois` query and collects the gateways
//!    that answer with `iam`.
//! 2. A **[`Gateway`]** handle owns one point-to-point UDP socket to its
//!    device and runs strictly sequential request/response exchanges on it
//!    (`get_id_list`, `read`, `write`).  Writes are authorised with a key
//!    derived from the gateway password and the latest session token.
//! 3. The **listener** joins the report multicast group and turns every
//!    status packet from a known gateway into a [`ListenResult`].
//!
//! [`Gateway`]: infrastructure::network::gateway::Gateway
//! [`ListenResult`]: infrastructure::network::listener::ListenResult

/// Application layer: use cases built on the network adapters.
pub mod application;

/// Infrastructure layer: sockets, interface lookup and configuration storage.
pub mod infrastructure;
