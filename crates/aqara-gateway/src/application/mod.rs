//! Application layer use cases for the gateway client.
//!
//! Use cases here depend on abstractions (the
//! [`GatewayDiscovery`](crate::infrastructure::network::discovery::GatewayDiscovery)
//! trait) rather than on sockets, so they can be tested without a network.
//!
//! # Sub-modules
//!
//! - **`resolve_gateways`** – Turns command-line options and the
//!   configuration file into ready [`Gateway`](crate::infrastructure::network::gateway::Gateway)
//!   handles, running discovery when no static address is known.

pub mod resolve_gateways;
