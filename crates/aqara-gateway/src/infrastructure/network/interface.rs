//! Network interface lookup.
//!
//! Gateways only answer on the LAN segment they live on, so every socket in
//! this crate is bound to the IPv4 address of one chosen interface.  The
//! interface is configured either by name (`eth0`, `wlan0`) or directly as an
//! IPv4 address (`192.168.1.10`), the latter being handy on hosts with
//! several addresses per interface.

use std::net::{IpAddr, Ipv4Addr};

use thiserror::Error;

/// Error type for interface lookup.
#[derive(Debug, Error)]
pub enum InterfaceError {
    /// The OS interface list could not be read.
    #[error("failed to enumerate network interfaces: {0}")]
    Enumerate(#[source] std::io::Error),

    /// No interface with this name exists.
    #[error("network interface `{0}` not found")]
    NotFound(String),

    /// The interface exists but carries no IPv4 address.
    #[error("network interface `{0}` has no IPv4 address")]
    NoIpv4(String),
}

/// Resolves `interface` to the IPv4 address sockets should bind to.
///
/// A literal IPv4 address is returned as-is.  Otherwise the first IPv4
/// address of the interface with that name is used.
///
/// # Errors
///
/// Returns [`InterfaceError::NotFound`] for an unknown name and
/// [`InterfaceError::NoIpv4`] for an interface without an IPv4 address.
pub fn interface_ipv4(interface: &str) -> Result<Ipv4Addr, InterfaceError> {
    if let Ok(addr) = interface.parse::<Ipv4Addr>() {
        return Ok(addr);
    }

    let all = if_addrs::get_if_addrs().map_err(InterfaceError::Enumerate)?;
    let mut found = false;
    for iface in all.iter().filter(|i| i.name == interface) {
        found = true;
        if let IpAddr::V4(addr) = iface.ip() {
            return Ok(addr);
        }
    }

    if found {
        Err(InterfaceError::NoIpv4(interface.to_string()))
    } else {
        Err(InterfaceError::NotFound(interface.to_string()))
    }
}
